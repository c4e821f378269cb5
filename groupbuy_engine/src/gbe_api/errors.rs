use std::fmt::Display;

use thiserror::Error;

use crate::db_types::{GroupBuyId, GroupBuyStatus, OrderId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GroupBuyError {
    #[error("Invalid request: {0}")]
    ValidationError(String),
    #[error("Group buy {0} does not exist")]
    GroupBuyNotFound(GroupBuyId),
    #[error("Order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("Group buy {0} is no longer accepting participants")]
    GroupClosed(GroupBuyId),
    #[error("Only {remaining_capacity} units are left in this group buy")]
    CapacityExceeded { remaining_capacity: i64 },
    #[error("Cannot move a group buy from {from} to {to}. Allowed next states: {}", display_statuses(.allowed))]
    InvalidTransition { from: GroupBuyStatus, to: GroupBuyStatus, allowed: Vec<GroupBuyStatus> },
    #[error("Group buy {0} has already been refunded")]
    AlreadyRefunded(GroupBuyId),
    #[error("Order {0} kept changing while it was being synced. Try again later.")]
    SyncConflict(OrderId),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl GroupBuyError {
    /// Wraps a storage backend error.
    pub fn database<E: Display>(e: E) -> Self {
        Self::DatabaseError(e.to_string())
    }
}

fn display_statuses(statuses: &[GroupBuyStatus]) -> String {
    if statuses.is_empty() {
        return "none".to_string();
    }
    statuses.iter().map(GroupBuyStatus::as_str).collect::<Vec<_>>().join(", ")
}
