use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db_types::{GroupBuyId, GroupBuyStatus};

/// A message for one customer. The hook that receives it is responsible for rendering `template` with `payload` and
/// delivering it over whatever channel the application uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub user_id: String,
    pub template: String,
    pub payload: Value,
    pub group_buy_id: GroupBuyId,
}

impl NotificationEvent {
    pub fn new<U: Into<String>, T: Into<String>>(
        user_id: U,
        template: T,
        group_buy_id: GroupBuyId,
        payload: Value,
    ) -> Self {
        Self { user_id: user_id.into(), template: template.into(), payload, group_buy_id }
    }
}

/// Emitted once for every status change that was persisted, whoever caused it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupBuyStatusChangedEvent {
    pub group_buy_id: GroupBuyId,
    pub product_ref: String,
    pub old_status: GroupBuyStatus,
    pub new_status: GroupBuyStatus,
    pub changed_by: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventType {
    Notification(NotificationEvent),
    StatusChanged(GroupBuyStatusChangedEvent),
}
