//! Persistence error types.

use tributary_types::EtlError;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors produced by [`SqlConnection`](crate::SqlConnection) implementations
/// and the persistence layer built on top of them.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A statement failed. Carries the SQL text that was executed.
    #[error("failed to execute `{sql}`: {source}")]
    Sql {
        sql: String,
        #[source]
        source: BoxError,
    },

    /// File-system I/O failure (e.g. creating the database directory).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation is not possible on this backend or in this state.
    #[error("{0}")]
    Unsupported(String),

    /// A cached table was read before its population completed.
    #[error("cached table {0} is not queryable")]
    CacheNotReady(String),

    /// Internal mutex was poisoned by a panicked thread.
    #[error("store lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    pub fn sql(sql: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Sql {
            sql: sql.into(),
            source: source.into(),
        }
    }
}

impl From<StoreError> for EtlError {
    fn from(value: StoreError) -> Self {
        EtlError::Store(value.to_string())
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sql_error_embeds_statement() {
        let inner = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(1),
            Some("no such table: t".into()),
        );
        let err = StoreError::sql("SELECT * FROM t", inner);
        let msg = err.to_string();
        assert!(msg.contains("SELECT * FROM t"), "got: {msg}");
        assert!(msg.contains("no such table"), "got: {msg}");
    }

    #[test]
    fn converts_into_etl_store_error() {
        let err: EtlError = StoreError::CacheNotReady("orders".into()).into();
        assert_eq!(
            err.to_string(),
            "store error: cached table orders is not queryable"
        );
    }

    #[test]
    fn lock_poisoned_displays() {
        assert_eq!(StoreError::LockPoisoned.to_string(), "store lock poisoned");
    }
}
