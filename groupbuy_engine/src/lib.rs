//! Group Buy Engine
//!
//! The group buy engine coordinates group buying: buyers pool their purchases of one product until a minimum number
//! of units is reached, after which the purchase is fulfilled. If the threshold is not met by the deadline, the pool
//! is reviewed and, failing that, everyone is refunded.
//!
//! The library is divided into two main sections:
//! 1. Database management and control ([`mod@db`]). SQLite is the supported backend. You should never need to access
//!    the database directly. Instead, use the public API provided by the engine. The exception is the data types used
//!    in the database. These are defined in the `db_types` module and are public.
//! 2. The engine public API ([`mod@gbe_api`]). This is where the group buy state machine, the order cross-sync, the
//!    admin transition rules, the monitoring sweep and the refund orchestrator live. Backends need to implement the
//!    traits in [`mod@db`] in order to serve it.
//!
//! The engine also provides a set of events that can be subscribed to. Customer notifications and status changes are
//! published as events, and the application delivers them from its own hooks.
mod db;

pub mod db_types;
pub mod events;
mod gbe_api;

#[cfg(feature = "sqlite")]
pub use db::sqlite::{SqliteDatabase, SqliteDatabaseError};
pub use db::traits::{
    GroupBuyDatabase,
    GroupBuyManagement,
    InsertOrderResult,
    ItemSync,
    JoinResult,
    JoinedGroupBuy,
    OrderManagement,
    OrderSyncUpdate,
    RefundResult,
    StatusChange,
    TransitionResult,
    WalletManagement,
};
pub use gbe_api::{
    admin_api::{AdminApi, AdminOutcome, ReviewAction},
    errors::GroupBuyError,
    group_buy_api::GroupBuyApi,
    notifier::{Notifier, DEFAULT_NOTIFICATION_TIMEOUT},
    order_sync_api::{plan_order_sync, OrderSyncApi, SyncReport},
    refund_api::{RefundApi, RefundError, RefundSummary, DEFAULT_REFUND_TIMEOUT},
    sweep_api::{SweepApi, SweepError, SweepReport},
    transitions,
};
