//! PostgreSQL persistence gateway.
//!
//! - `topology`: find-or-create of devices by serial number
//! - `writer`: one transaction per poll cycle
//! - `queries`: read-only projections for the HTTP API
//!
//! Callers outside this module only see the re-exports below.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::{BatchWriter, NormalizedBatch};

mod queries;
mod topology;
mod writer;

pub use queries::{devices, latest_readings, sensor_history, TimeRange};
pub use topology::DeviceId;
pub use writer::WriteResult;

// ---

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[source] sqlx::Error),

    #[error("constraint violation: {0}")]
    ConstraintViolation(#[source] sqlx::Error),

    #[error("transient storage error: {0}")]
    Transient(#[source] sqlx::Error),
}

impl From<sqlx::Error> for WriteError {
    fn from(err: sqlx::Error) -> Self {
        // ---
        let code = err
            .as_database_error()
            .map(|db| db.code().map(|c| c.into_owned()));

        match code {
            None => WriteError::StorageUnavailable(err),
            Some(code) => match ErrorClass::of(code.as_deref()) {
                ErrorClass::Unavailable => WriteError::StorageUnavailable(err),
                ErrorClass::Transient => WriteError::Transient(err),
                ErrorClass::Constraint => WriteError::ConstraintViolation(err),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ErrorClass {
    Unavailable,
    Transient,
    Constraint,
}

impl ErrorClass {
    /// Bucket a server error by the two-character class of its SQLSTATE.
    fn of(sqlstate: Option<&str>) -> Self {
        // ---
        match sqlstate.and_then(|code| code.get(..2)) {
            // 08 connection exception, 53 insufficient resources
            Some("08") | Some("53") => ErrorClass::Unavailable,
            // 40 rollback, 55 lock not available, 57 operator intervention
            Some("40") | Some("55") | Some("57") => ErrorClass::Transient,
            _ => ErrorClass::Constraint,
        }
    }
}

#[async_trait]
impl BatchWriter for PgPool {
    async fn write(&self, batch: &NormalizedBatch) -> Result<WriteResult, WriteError> {
        writer::write(self, batch).await
    }
}


#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_transport_failures_are_storage_unavailable() {
        // ---
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");

        assert!(matches!(
            WriteError::from(sqlx::Error::Io(io)),
            WriteError::StorageUnavailable(_)
        ));
        assert!(matches!(
            WriteError::from(sqlx::Error::PoolTimedOut),
            WriteError::StorageUnavailable(_)
        ));
        assert!(matches!(
            WriteError::from(sqlx::Error::PoolClosed),
            WriteError::StorageUnavailable(_)
        ));
    }

    #[test]
    fn test_sqlstate_classes() {
        // ---
        assert_eq!(ErrorClass::of(Some("08006")), ErrorClass::Unavailable);
        assert_eq!(ErrorClass::of(Some("08001")), ErrorClass::Unavailable);
        assert_eq!(ErrorClass::of(Some("53300")), ErrorClass::Unavailable);
        assert_eq!(ErrorClass::of(Some("53100")), ErrorClass::Unavailable);

        assert_eq!(ErrorClass::of(Some("40001")), ErrorClass::Transient);
        assert_eq!(ErrorClass::of(Some("40P01")), ErrorClass::Transient);
        assert_eq!(ErrorClass::of(Some("55P03")), ErrorClass::Transient);
        assert_eq!(ErrorClass::of(Some("57P01")), ErrorClass::Transient);

        assert_eq!(ErrorClass::of(Some("23505")), ErrorClass::Constraint);
        assert_eq!(ErrorClass::of(Some("22P05")), ErrorClass::Constraint);
        assert_eq!(ErrorClass::of(Some("0")), ErrorClass::Constraint);
        assert_eq!(ErrorClass::of(None), ErrorClass::Constraint);
    }
}
