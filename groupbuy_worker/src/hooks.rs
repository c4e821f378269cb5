use futures::FutureExt;
use groupbuy_engine::events::{EventHandlers, EventHooks, GroupBuyStatusChangedEvent, NotificationEvent};
use log::*;

/// Creates the stock event handlers for the worker.
///
/// 1. NotificationEvent - The rendered payload is written to the log, tagged with the recipient and template. A
///    deployment that talks to a mail or push service swaps this hook out.
/// 2. GroupBuyStatusChangedEvent - Every status change is logged as an audit line.
pub fn create_logging_event_handlers(buffer_size: usize) -> EventHandlers {
    let mut hooks = EventHooks::default();
    hooks.on_notification(|ev: NotificationEvent| {
        async move {
            info!(
                "📬️ [{}] to {} for group buy {}: {}",
                ev.template, ev.user_id, ev.group_buy_id, ev.payload
            );
        }
        .boxed()
    });
    hooks.on_status_changed(|ev: GroupBuyStatusChangedEvent| {
        async move {
            info!(
                "📬️ Group buy {} ({}) moved from {} to {} by {} at {}",
                ev.group_buy_id, ev.product_ref, ev.old_status, ev.new_status, ev.changed_by, ev.timestamp
            );
        }
        .boxed()
    });
    EventHandlers::new(buffer_size, hooks)
}
