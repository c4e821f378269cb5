//! Fire-and-forget delivery of engine events to user-supplied hooks.
//!
//! An [`EventHandler`] owns one hook and the receiving end of a bounded channel. Every event it receives is handed to
//! the hook on its own task, so a slow mail server never holds up a state transition. The hook only sees the event,
//! never the engine.
//!
//! The handler runs until every [`EventProducer`] it gave out has been dropped, then waits for hooks that are still
//! running before it returns.
use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use log::*;
use tokio::{sync::mpsc, task::JoinSet};

pub type Handler<E> = Arc<dyn Fn(E) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct EventHandler<E: Send + Sync + 'static> {
    listener: mpsc::Receiver<E>,
    sender: mpsc::Sender<E>,
    handler: Handler<E>,
}

impl<E: Send + Sync + 'static> EventHandler<E> {
    pub fn new(buffer_size: usize, handler: Handler<E>) -> Self {
        let (sender, receiver) = mpsc::channel(buffer_size);
        Self { listener: receiver, sender, handler }
    }

    pub fn subscribe(&self) -> EventProducer<E> {
        EventProducer::new(self.sender.clone())
    }

    pub async fn start_handler(self) {
        let Self { mut listener, sender, handler } = self;
        // Only subscribers may keep the channel open
        drop(sender);
        debug!("📬️ Event handler started");
        let mut running = JoinSet::new();
        let mut handled = 0usize;
        while let Some(ev) = listener.recv().await {
            running.spawn((handler)(ev));
            while let Some(done) = running.try_join_next() {
                handled += 1;
                log_hook_result(done);
            }
        }
        if !running.is_empty() {
            debug!("📬️ All producers are gone. Waiting for {} running hooks.", running.len());
        }
        while let Some(done) = running.join_next().await {
            handled += 1;
            log_hook_result(done);
        }
        debug!("📬️ Event handler has shut down after {handled} events");
    }
}

fn log_hook_result(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        warn!("📬️ An event hook did not run to completion: {e}");
    }
}

#[derive(Clone)]
pub struct EventProducer<E: Send + Sync> {
    sender: mpsc::Sender<E>,
}

impl<E: Send + Sync> EventProducer<E> {
    pub fn new(sender: mpsc::Sender<E>) -> Self {
        Self { sender }
    }

    /// Queues the event, waiting as long as it takes for buffer space. Returns `false` if the handler has gone away.
    pub async fn publish_event(&self, event: E) -> bool {
        match self.sender.send(event).await {
            Ok(()) => true,
            Err(e) => {
                error!("📬️ Failed to send event: {e}");
                false
            },
        }
    }

    /// Queues the event, giving up after `timeout` if the buffer stays full. Never returns an error: a failure is
    /// logged and reported as `false`.
    pub async fn publish_event_with_timeout(&self, event: E, timeout: Duration) -> bool {
        match self.sender.send_timeout(event, timeout).await {
            Ok(()) => true,
            Err(e) => {
                warn!("📬️ Event was not delivered to its handler: {e}");
                false
            },
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::AtomicU64;

    use super::*;

    #[tokio::test]
    async fn test_event_handler() {
        let _ = env_logger::try_init();
        let count = Arc::new(AtomicU64::new(0));
        let c2 = count.clone();
        let handler = Arc::new(move |v| {
            let count = count.clone();
            Box::pin(async move {
                debug!("Handler received {v}");
                let _ = count.fetch_add(v, std::sync::atomic::Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
            }) as Pin<Box<dyn Future<Output = ()> + Send>>
        });
        let event_handler = EventHandler::new(1, handler);
        let producer_1 = event_handler.subscribe();
        let producer_2 = event_handler.subscribe();
        tokio::spawn(async move {
            for i in 0..5 {
                assert!(producer_1.publish_event(i * 2 + 1).await);
            }
        });
        tokio::spawn(async move {
            for i in 0..5 {
                assert!(producer_2.publish_event_with_timeout(i * 2, Duration::from_secs(5)).await);
            }
        });

        event_handler.start_handler().await;
        assert_eq!(c2.load(std::sync::atomic::Ordering::SeqCst), 45);
    }

    #[tokio::test]
    async fn a_panicking_hook_does_not_stop_the_handler() {
        let _ = env_logger::try_init();
        let count = Arc::new(AtomicU64::new(0));
        let c2 = count.clone();
        let handler: Handler<u64> = Arc::new(move |v: u64| {
            let count = count.clone();
            Box::pin(async move {
                if v == 2 {
                    panic!("hook failed on {v}");
                }
                count.fetch_add(v, std::sync::atomic::Ordering::SeqCst);
            }) as Pin<Box<dyn Future<Output = ()> + Send>>
        });
        let event_handler = EventHandler::new(4, handler);
        let producer = event_handler.subscribe();
        tokio::spawn(async move {
            for v in 1..=4 {
                assert!(producer.publish_event(v).await);
            }
        });
        event_handler.start_handler().await;
        assert_eq!(c2.load(std::sync::atomic::Ordering::SeqCst), 8);
    }

    #[tokio::test]
    async fn publishing_to_a_full_buffer_times_out() {
        let _ = env_logger::try_init();
        let handler: Handler<u64> =
            Arc::new(|_: u64| Box::pin(async {}) as Pin<Box<dyn Future<Output = ()> + Send>>);
        let event_handler = EventHandler::new(1, handler);
        let producer = event_handler.subscribe();
        // Nobody is draining the channel, so the second event cannot be queued
        assert!(producer.publish_event_with_timeout(1, Duration::from_millis(10)).await);
        assert!(!producer.publish_event_with_timeout(2, Duration::from_millis(10)).await);
        drop(event_handler);
        assert!(!producer.publish_event(3).await);
    }
}
