use chrono::{DateTime, Utc};

use crate::db_types::{
    AdminStatusEntry,
    FulfillmentData,
    GroupBuyStatus,
    ItemGroupStatus,
    NewProgressEntry,
    OrderStatusType,
    Participant,
    WalletTransaction,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOrderResult {
    Inserted(i64),
    AlreadyExists(i64),
}

#[derive(Debug, Clone)]
pub struct JoinedGroupBuy {
    pub participant: Participant,
    /// Set when this join crossed the threshold and moved the group buy to `successful`.
    pub threshold_entry: Option<AdminStatusEntry>,
}

#[derive(Debug, Clone)]
pub enum JoinResult {
    Joined(JoinedGroupBuy),
    NotFound,
    Closed,
    CapacityExceeded { remaining_capacity: i64 },
}

/// A conditional status change. It is only applied if the group buy still has status `from`.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub from: GroupBuyStatus,
    pub to: GroupBuyStatus,
    pub changed_by: String,
    pub notes: String,
    pub fulfillment: FulfillmentData,
    /// Stamp `finalized_at` if it is not already set.
    pub finalize: bool,
    pub timestamp: DateTime<Utc>,
}

impl StatusChange {
    pub fn new<S: Into<String>, N: Into<String>>(
        from: GroupBuyStatus,
        to: GroupBuyStatus,
        changed_by: S,
        notes: N,
    ) -> Self {
        Self {
            from,
            to,
            changed_by: changed_by.into(),
            notes: notes.into(),
            fulfillment: FulfillmentData::default(),
            finalize: false,
            timestamp: Utc::now(),
        }
    }

    pub fn with_fulfillment(mut self, fulfillment: FulfillmentData) -> Self {
        self.fulfillment = fulfillment;
        self
    }

    pub fn finalizing(mut self) -> Self {
        self.finalize = true;
        self
    }
}

#[derive(Debug, Clone)]
pub enum TransitionResult {
    Applied(AdminStatusEntry),
    /// The group buy moved on before the write. Holds the status that was found instead.
    Stale(GroupBuyStatus),
    NotFound,
}

#[derive(Debug, Clone)]
pub enum RefundResult {
    Credited(WalletTransaction),
    AlreadyRefunded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemSync {
    pub item_id: i64,
    /// The mirrored status the item held when the update was planned.
    pub expected: GroupBuyStatus,
    pub group_buy_status: GroupBuyStatus,
    pub group_status: ItemGroupStatus,
}

/// Everything a single cross-sync step changes on one order. Applied atomically, or not at all if the order was written
/// to after `expected_version` was read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSyncUpdate {
    pub order_id: i64,
    pub expected_version: i64,
    pub items: Vec<ItemSync>,
    pub progress: Vec<NewProgressEntry>,
    /// `(expected, new)` order status.
    pub status_change: Option<(OrderStatusType, OrderStatusType)>,
    pub all_groups_secured: bool,
    pub priority_score: i64,
    pub timestamp: DateTime<Utc>,
}
