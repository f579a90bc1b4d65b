use thiserror::Error;

use crate::broker::BrokerError;

pub type OutboxResult<T> = Result<T, OutboxError>;

/// Errors that can occur while moving a record through the outbox: the
/// ingress insert, the producer's claim-and-dispatch, or the worker's status
/// trail updates.
#[derive(Error, Debug)]
pub enum OutboxError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("failed to (de)serialize task envelope: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid mail request: {0}")]
    InvalidRequest(String),

    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),
}
