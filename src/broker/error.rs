use thiserror::Error;

pub type BrokerResult<T> = Result<T, BrokerError>;

#[derive(Error, Debug)]
pub enum BrokerError {
    /// Broker unreachable, out of memory, or some other transport-level
    /// failure. Callers should treat this as transient.
    #[error("broker transport error: {0}")]
    Transport(String),
}
