//! Error types for quarry operations.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type QuarryResult<T> = Result<T, QuarryError>;

/// Errors surfaced by query construction, rendering and execution.
#[derive(Debug, Error)]
pub enum QuarryError {
    /// A dialect was asked to render a clause group it does not support.
    #[error("Dialect '{dialect}' does not support {clause}")]
    Unsupported { clause: String, dialect: String },

    /// A value or column could not be mapped to a known data kind.
    #[error("No data kind mapping for {0}")]
    Unmapped(String),

    /// The query is structurally invalid (e.g. UPDATE without SET).
    #[error("Validation error: {0}")]
    Validation(String),

    /// A cell could not be decoded into the requested type.
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// A statement was executed and the engine reported a failure.
    #[error("Execution error: {0}")]
    Execution(String),

    /// Expected at least one row, got none.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A connection could not be established or configured.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Error from the PostgreSQL driver.
    #[error("Database error: {0}")]
    Driver(#[from] tokio_postgres::Error),

    /// Error from the connection pool.
    #[cfg(feature = "pool")]
    #[error("Pool error: {0}")]
    Pool(String),
}

impl QuarryError {
    pub fn unsupported(clause: impl Into<String>, dialect: impl Into<String>) -> Self {
        Self::Unsupported {
            clause: clause.into(),
            dialect: dialect.into(),
        }
    }

    pub fn unmapped(what: impl Into<String>) -> Self {
        Self::Unmapped(what.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }
}

#[cfg(feature = "pool")]
impl From<deadpool_postgres::PoolError> for QuarryError {
    fn from(e: deadpool_postgres::PoolError) -> Self {
        Self::Pool(e.to_string())
    }
}

#[cfg(feature = "pool")]
impl From<deadpool_postgres::CreatePoolError> for QuarryError {
    fn from(e: deadpool_postgres::CreatePoolError) -> Self {
        Self::Pool(e.to_string())
    }
}
