use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Could not initialize worker. {0}")]
    InitializeError(String),
    #[error("Could not bring the database schema up to date. {0}")]
    MigrationError(String),
    #[error("The sweep worker stopped unexpectedly. {0}")]
    SweepWorkerStopped(String),
}
