use groupbuy_engine::{Notifier, SqliteDatabase, SweepApi};
use log::*;

use crate::{config::WorkerConfig, errors::WorkerError, hooks::create_logging_event_handlers, sweep_worker};

/// Connects to the database, starts the event hooks and runs the sweep worker until it stops.
pub async fn run_worker(config: WorkerConfig) -> Result<(), WorkerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, config.max_connections)
        .await
        .map_err(|e| WorkerError::InitializeError(e.to_string()))?;
    if config.run_migrations {
        db.run_migrations().await.map_err(|e| WorkerError::MigrationError(e.to_string()))?;
    } else {
        info!("🪛️ Migrations are disabled. Assuming the schema at {} is up to date.", db.url());
    }
    let handlers = create_logging_event_handlers(config.event_buffer_size);
    let producers = handlers.producers();
    handlers.start_handlers().await;
    let notifier = Notifier::new(producers, config.notification_timeout);
    let api = SweepApi::new(db, notifier);
    let worker = sweep_worker::start_sweep_worker(api, config.sweep_interval);
    worker.await.map_err(|e| WorkerError::SweepWorkerStopped(e.to_string()))
}
