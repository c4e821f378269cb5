use std::time::Duration;

use log::*;
use serde_json::{json, Value};

use crate::{
    db::traits::GroupBuyManagement,
    db_types::{AdminStatusEntry, GroupBuy, GroupBuyStatus},
    events::{EventProducers, GroupBuyStatusChangedEvent, NotificationEvent},
};

pub const DEFAULT_NOTIFICATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Publishes customer notifications and status change events to the registered hooks.
///
/// Sending never fails from the caller's point of view. Undeliverable messages are logged and counted, never
/// escalated, and never cause a state transition to be rolled back.
#[derive(Clone)]
pub struct Notifier {
    producers: EventProducers,
    timeout: Duration,
}

impl Notifier {
    pub fn new(producers: EventProducers, timeout: Duration) -> Self {
        Self { producers, timeout }
    }

    /// Sends one message to one user. Returns `true` if every subscriber accepted it within the timeout.
    pub async fn send(&self, user_id: &str, template: &str, group: &GroupBuy, extra: Option<&Value>) -> bool {
        let payload = payload_for(group, extra);
        let mut delivered = true;
        for producer in &self.producers.notification_producer {
            let event = NotificationEvent::new(user_id, template, group.id, payload.clone());
            delivered &= producer.publish_event_with_timeout(event, self.timeout).await;
        }
        if !delivered {
            warn!("📬️ Notification '{template}' to {user_id} for group buy {} was not delivered", group.id);
        }
        delivered
    }

    /// Sends every template to every participant of the group buy. Returns the number of messages delivered.
    pub async fn notify_participants(&self, group: &GroupBuy, templates: &[&str], extra: Option<&Value>) -> usize {
        let mut sent = 0;
        for participant in &group.participants {
            for template in templates {
                if self.send(&participant.user_id, template, group, extra).await {
                    sent += 1;
                }
            }
        }
        debug!(
            "📬️ {sent} messages ({}) sent to {} participants of group buy {}",
            templates.join(", "),
            group.participant_count(),
            group.id
        );
        sent
    }

    /// Fans out the notifications for a status history entry, at most once per entry. The entry's `notification_sent`
    /// flag is claimed first, so a concurrent caller (or a replay) that loses the claim sends nothing.
    pub async fn announce<B: GroupBuyManagement>(
        &self,
        db: &B,
        group: &GroupBuy,
        entry: &AdminStatusEntry,
        templates: &[&str],
    ) -> usize {
        match db.claim_notification(entry.id).await {
            Ok(true) => self.notify_participants(group, templates, None).await,
            Ok(false) => {
                debug!("📬️ Participants of {} were already told about history entry {}", group.id, entry.id);
                0
            },
            Err(e) => {
                error!("📬️ Could not claim the notification for history entry {} of {}: {e}", entry.id, group.id);
                0
            },
        }
    }

    /// Publishes a status change event to the status change subscribers.
    pub async fn status_changed(&self, group: &GroupBuy, old_status: GroupBuyStatus, entry: &AdminStatusEntry) {
        for producer in &self.producers.status_changed_producer {
            let event = GroupBuyStatusChangedEvent {
                group_buy_id: group.id,
                product_ref: group.product_ref.clone(),
                old_status,
                new_status: entry.status,
                changed_by: entry.changed_by.clone(),
                timestamp: entry.timestamp,
            };
            producer.publish_event_with_timeout(event, self.timeout).await;
        }
    }
}

fn payload_for(group: &GroupBuy, extra: Option<&Value>) -> Value {
    let mut payload = json!({
        "group_buy_id": group.id.value(),
        "product_ref": group.product_ref,
        "status": group.status,
        "units_sold": group.units_sold,
        "minimum_viable_units": group.minimum_viable_units,
        "expires_at": group.expires_at,
    });
    if let (Some(Value::Object(extra)), Value::Object(fields)) = (extra, &mut payload) {
        for (k, v) in extra {
            fields.insert(k.clone(), v.clone());
        }
    }
    if !group.fulfillment.is_empty() {
        payload["fulfillment"] = json!(group.fulfillment);
    }
    payload
}
