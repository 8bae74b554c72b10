// src/error.rs
use crate::retry::{RetryError, Retryable};
use thiserror::Error;

/// Failure of a single store operation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("transient store error: {0}")]
    Transient(String),
    #[error("store error: {0}")]
    Permanent(String),
    #[error("store operation timed out after {0} ms")]
    Timeout(u64),
}

impl Retryable for StoreError {
    fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_) | StoreError::Timeout(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if is_transient_sqlx(&e) {
            StoreError::Transient(e.to_string())
        } else {
            StoreError::Permanent(e.to_string())
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Permanent(e.to_string())
    }
}

/// Connection-level problems and contention are worth another attempt;
/// bad SQL, constraint and decode errors are not.
fn is_transient_sqlx(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::Tls(_) => true,
        sqlx::Error::Protocol(_) | sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(db) => db
            .code()
            .map(|code| is_transient_sqlstate(&code))
            .unwrap_or(false),
        _ => false,
    }
}

/// SQLSTATE classes: 08 connection exception, 53 insufficient resources,
/// 57P admin/crash shutdown, plus serialization failure and deadlock.
pub fn is_transient_sqlstate(code: &str) -> bool {
    code.starts_with("08")
        || code.starts_with("53")
        || code.starts_with("57P")
        || code == "40001"
        || code == "40P01"
}

/// Failure of the broadcast channel.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("broadcast connection failed: {0}")]
    Connect(String),
    #[error("publish failed: {0}")]
    Publish(String),
    #[error("publish timed out after {0} ms")]
    Timeout(u64),
    #[error("subscribe failed: {0}")]
    Subscribe(String),
}

impl From<redis::RedisError> for BusError {
    fn from(e: redis::RedisError) -> Self {
        BusError::Publish(e.to_string())
    }
}

/// What a sink reports back to the fan-out.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("store gave up after {attempts} attempts: {source}")]
    StoreExhausted { attempts: u32, source: StoreError },
    #[error("store rejected item: {0}")]
    StoreRejected(StoreError),
    #[error("broadcast failed: {0}")]
    Broadcast(#[from] BusError),
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl From<RetryError<StoreError>> for SinkError {
    fn from(e: RetryError<StoreError>) -> Self {
        match e {
            RetryError::Exhausted { attempts, last } => SinkError::StoreExhausted {
                attempts,
                source: last,
            },
            RetryError::Permanent { error, .. } => SinkError::StoreRejected(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlstate_classification() {
        assert!(is_transient_sqlstate("08006"));
        assert!(is_transient_sqlstate("40001"));
        assert!(is_transient_sqlstate("57P01"));
        assert!(!is_transient_sqlstate("23505"));
        assert!(!is_transient_sqlstate("42P01"));
    }

    #[test]
    fn timeouts_are_retryable() {
        assert!(StoreError::Timeout(5).is_transient());
        assert!(StoreError::Transient("x".into()).is_transient());
        assert!(!StoreError::Permanent("x".into()).is_transient());
    }

    #[test]
    fn pool_timeout_is_transient() {
        assert!(StoreError::from(sqlx::Error::PoolTimedOut).is_transient());
        assert!(!StoreError::from(sqlx::Error::RowNotFound).is_transient());
    }
}
