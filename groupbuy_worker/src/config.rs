use std::{env, str::FromStr, time::Duration};

use gb_common::parse_boolean_flag;
use log::*;

const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);
const DEFAULT_NOTIFICATION_TIMEOUT: Duration = Duration::from_millis(5_000);
const DEFAULT_MAX_CONNECTIONS: u32 = 25;
const DEFAULT_DATABASE_URL: &str = "sqlite://groupbuy.db?mode=rwc";
const DEFAULT_EVENT_BUFFER_SIZE: usize = 50;

#[derive(Clone, Debug)]
pub struct WorkerConfig {
    pub database_url: String,
    /// The time between two monitoring sweeps. The first sweep runs as soon as the worker starts.
    pub sweep_interval: Duration,
    /// How long the engine waits for room in a hook's buffer before dropping a notification.
    pub notification_timeout: Duration,
    pub max_connections: u32,
    /// If false, the schema is assumed to be up to date and migrations are skipped.
    pub run_migrations: bool,
    pub event_buffer_size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            notification_timeout: DEFAULT_NOTIFICATION_TIMEOUT,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            run_migrations: true,
            event_buffer_size: DEFAULT_EVENT_BUFFER_SIZE,
        }
    }
}

impl WorkerConfig {
    pub fn from_env_or_default() -> Self {
        let database_url = env::var("GBW_DATABASE_URL").ok().unwrap_or_else(|| {
            warn!("🪛️ GBW_DATABASE_URL is not set. Using the default, {DEFAULT_DATABASE_URL}, instead.");
            DEFAULT_DATABASE_URL.to_string()
        });
        let sweep_interval = match env_value::<u64>("GBW_SWEEP_INTERVAL") {
            Some(0) => {
                error!("🪛️ GBW_SWEEP_INTERVAL must be at least one second. Using the default instead.");
                DEFAULT_SWEEP_INTERVAL
            },
            Some(secs) => Duration::from_secs(secs),
            None => DEFAULT_SWEEP_INTERVAL,
        };
        let notification_timeout = env_value::<u64>("GBW_NOTIFICATION_TIMEOUT")
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_NOTIFICATION_TIMEOUT);
        let max_connections = match env_value::<u32>("GBW_MAX_CONNECTIONS") {
            Some(0) => {
                error!("🪛️ GBW_MAX_CONNECTIONS cannot be zero. Using the default, {DEFAULT_MAX_CONNECTIONS}, instead.");
                DEFAULT_MAX_CONNECTIONS
            },
            Some(n) => n,
            None => DEFAULT_MAX_CONNECTIONS,
        };
        let run_migrations = parse_boolean_flag(env::var("GBW_RUN_MIGRATIONS").ok(), true);
        let event_buffer_size = env_value::<usize>("GBW_EVENT_BUFFER_SIZE").unwrap_or(DEFAULT_EVENT_BUFFER_SIZE);
        Self {
            database_url,
            sweep_interval,
            notification_timeout,
            max_connections,
            run_migrations,
            event_buffer_size,
        }
    }
}

/// Reads and parses an environment variable. Unset variables are silently ignored; values that do not parse are
/// reported and ignored.
fn env_value<T>(name: &str) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let s = env::var(name).ok()?;
    s.trim()
        .parse::<T>()
        .map_err(|e| error!("🪛️ {s} is not a valid value for {name}. {e} Using the default instead."))
        .ok()
}
