//! # Group buy worker
//! The worker is the long-running half of the group buy engine. It is responsible for:
//! * Running the database migrations on start-up (unless disabled).
//! * Wiring the notification and status-change hooks. The stock hooks write every event to the log; deployments that
//!   deliver to e-mail or push replace them.
//! * Running the monitoring sweep on a fixed interval. See [sweep_worker](sweep_worker/index.html).
//!
//! ## Configuration
//! The worker is configured via environment variables. See [config](config/index.html) for more information.

pub mod cli;
pub mod config;
pub mod errors;
pub mod hooks;
pub mod sweep_worker;
pub mod worker;
