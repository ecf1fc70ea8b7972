use thiserror::Error;

/// Errors that may occur when interacting with the runtime engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Ingestion error: the event is structurally invalid and was not stored.
    #[error("invalid event: {0}")]
    InvalidEvent(String),
    #[error("event not found: {0}")]
    EventNotFound(String),
    /// Infrastructure error: the event store write failed. Surfaced
    /// synchronously so the producer knows the event was not recorded.
    #[error("event store failure: {0}")]
    StoreFailure(String),
    /// Infrastructure error: the execution log write failed.
    #[error("execution log failure: {0}")]
    LogFailure(String),
    #[error("runtime is shutting down")]
    ShuttingDown,
}
