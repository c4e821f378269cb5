use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use futures_util::FutureExt;
use groupbuy_engine::events::{EventHandlers, EventHooks, EventProducers, GroupBuyStatusChangedEvent, NotificationEvent};
use log::*;

/// Event hooks that remember everything they were sent.
#[derive(Default, Clone)]
pub struct RecordingHooks {
    notifications: Arc<Mutex<Vec<NotificationEvent>>>,
    status_changes: Arc<Mutex<Vec<GroupBuyStatusChangedEvent>>>,
}

impl RecordingHooks {
    /// Starts the event handlers and returns the producers to hand to the engine.
    pub async fn start(&self) -> EventProducers {
        let mut hooks = EventHooks::default();
        let notifications = self.notifications.clone();
        hooks.on_notification(move |ev| {
            trace!("🪝️ {} -> {}", ev.template, ev.user_id);
            let notifications = notifications.clone();
            async move {
                notifications.lock().unwrap().push(ev);
            }
            .boxed()
        });
        let status_changes = self.status_changes.clone();
        hooks.on_status_changed(move |ev| {
            let status_changes = status_changes.clone();
            async move {
                status_changes.lock().unwrap().push(ev);
            }
            .boxed()
        });
        let handlers = EventHandlers::new(128, hooks);
        let producers = handlers.producers();
        handlers.start_handlers().await;
        producers
    }

    pub fn notifications(&self) -> Vec<NotificationEvent> {
        self.notifications.lock().unwrap().clone()
    }

    pub fn with_template(&self, template: &str) -> Vec<NotificationEvent> {
        self.notifications().into_iter().filter(|n| n.template == template).collect()
    }

    pub fn status_changes(&self) -> Vec<GroupBuyStatusChangedEvent> {
        self.status_changes.lock().unwrap().clone()
    }

    /// Handlers run on their own tasks. Waits until at least `count` messages with the template arrived, then a little
    /// longer so that unexpected extra messages show up too.
    pub async fn wait_for(&self, template: &str, count: usize) -> Vec<NotificationEvent> {
        for _ in 0..100 {
            if self.with_template(template).len() >= count {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        self.with_template(template)
    }

    pub async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(150)).await;
    }
}
