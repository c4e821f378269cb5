//! #  Storage contracts.
//!
//! This module provides the interfaces that define the interface contracts of the group buy engine storage
//! *backends*.
//!
//! ## Aggregates
//! A **group buy** pools purchases of one product until its minimum viable units are reached. An **order** is created
//! at checkout and references one or more group buys through its line items. The two are independent aggregates:
//! group buy changes flow into orders, never the other way around.
//!
//! ## Traits
//! * [`GroupBuyManagement`] owns the group buy document: participants, the unit counter, status and history. Every
//!   method that changes status is a conditional write, so that concurrent callers cannot both win a transition.
//! * [`OrderManagement`] stores orders and applies cross-sync updates with optimistic checks on the mirrored status.
//! * [`WalletManagement`] is the wallet ledger used for refunds.
//! * [`GroupBuyDatabase`] is a convenience bound for backends that implement all three.
mod data_objects;
mod group_buy_management;
mod order_management;
mod wallet_management;

pub use data_objects::{
    InsertOrderResult,
    ItemSync,
    JoinResult,
    JoinedGroupBuy,
    OrderSyncUpdate,
    RefundResult,
    StatusChange,
    TransitionResult,
};
pub use group_buy_management::GroupBuyManagement;
pub use order_management::OrderManagement;
pub use wallet_management::WalletManagement;

/// A backend that can serve every part of the engine.
pub trait GroupBuyDatabase: GroupBuyManagement + OrderManagement + WalletManagement + Clone {}

impl<T> GroupBuyDatabase for T where T: GroupBuyManagement + OrderManagement + WalletManagement + Clone {}
