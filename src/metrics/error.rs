//! Metrics Store error type.

use std::fmt;

#[derive(Debug)]
pub enum MetricsError {
    ConnectionFailed(String),
    QueryFailed(String),
    MigrationFailed(String),
    InvalidConfig(String),
    SerializationError(String),
    IoError(String),
    OutOfOrderSample { fingerprint: String, metric: String },
}

impl fmt::Display for MetricsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricsError::ConnectionFailed(msg) => write!(f, "connection failed: {msg}"),
            MetricsError::QueryFailed(msg) => write!(f, "query failed: {msg}"),
            MetricsError::MigrationFailed(msg) => write!(f, "migration failed: {msg}"),
            MetricsError::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            MetricsError::SerializationError(msg) => write!(f, "serialization error: {msg}"),
            MetricsError::IoError(msg) => write!(f, "io error: {msg}"),
            MetricsError::OutOfOrderSample { fingerprint, metric } => write!(
                f,
                "rejected out-of-order sample for {fingerprint}/{metric}"
            ),
        }
    }
}

impl std::error::Error for MetricsError {}

impl From<std::io::Error> for MetricsError {
    fn from(err: std::io::Error) -> Self {
        MetricsError::IoError(err.to_string())
    }
}

impl From<sqlx::Error> for MetricsError {
    fn from(err: sqlx::Error) -> Self {
        MetricsError::QueryFailed(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for MetricsError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        MetricsError::MigrationFailed(err.to_string())
    }
}

pub type MetricsResult<T> = Result<T, MetricsError>;
