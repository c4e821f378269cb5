//! # Group buy engine public API
//!
//! The `gbe_api` module exposes the programmatic API of the group buy engine. Like the storage layer, it is split by
//! concern, so that a client can pick the parts it needs.
//!
//! * [`group_buy_api`] opens and joins group buys, and reports their progress.
//! * [`order_sync_api`] places orders at checkout and mirrors group buy progress into them.
//! * [`admin_api`] validates and applies operator status changes, including the review of group buys that expired
//!   short of their threshold.
//! * [`sweep_api`] is one tick of the periodic monitoring sweep.
//! * [`refund_api`] credits participants of failed group buys to their wallets.
//!
//! # API usage
//!
//! An API instance is created by supplying a database backend that implements the backend traits the API needs.
//! APIs that notify customers also take a [`notifier::Notifier`] built from the event producers.
//!
//! ```rust,ignore
//! use groupbuy_engine::{events::EventProducers, GroupBuyApi, Notifier, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url(...).await?;
//! let notifier = Notifier::new(EventProducers::default(), Duration::from_secs(5));
//! let api = GroupBuyApi::new(db, notifier);
//! let report = api.status(group_buy_id).await?;
//! ```

pub mod admin_api;
pub mod errors;
pub mod group_buy_api;
pub mod notifier;
pub mod order_sync_api;
pub mod refund_api;
pub mod sweep_api;
pub mod transitions;
