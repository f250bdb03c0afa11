//! Error types for the catalog data layer
//!
//! This module defines error types using thiserror for ergonomic error handling.
//! Every facade operation returns [`Result`], so callers always receive an
//! explicit failure signal instead of a sentinel value or a panic.
//!
//! ## Categories
//!
//! - **Construction/configuration**: unsupported backend, bad config files
//! - **Connection**: the single session could not be opened or was lost
//! - **Records**: delete/update targets that do not exist
//! - **Constraints**: unique, foreign-key, not-null and check violations
//!   reported by the storage engine
//! - **Arguments**: unknown attributes, undeclared relations, comparisons that
//!   make no sense for the given value

use std::fmt;
use thiserror::Error;

/// Result type alias using our CatalogError type
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Which declarative constraint the storage engine enforced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    Unique,
    ForeignKey,
    NotNull,
    Check,
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConstraintKind::Unique => "unique",
            ConstraintKind::ForeignKey => "foreign key",
            ConstraintKind::NotNull => "not null",
            ConstraintKind::Check => "check",
        };
        f.write_str(name)
    }
}

/// Main error type for the catalog
#[derive(Error, Debug)]
pub enum CatalogError {
    // ===== Construction Errors =====

    /// Backend identifier is not one of the supported kinds
    #[error("Unsupported database backend: {0} (expected 'sqlite' or 'mysql')")]
    UnsupportedBackend(String),

    /// Configuration is invalid or incomplete
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Connection could not be established or was lost
    #[error("Database connection failed: {0}")]
    ConnectionFailed(String),

    // ===== Record Errors =====

    /// No row matched the requested attribute or key
    #[error("Record not found: {0}")]
    RecordNotFound(String),

    /// Storage engine rejected a write
    #[error("{kind} constraint violated: {message}")]
    ConstraintViolation {
        kind: ConstraintKind,
        message: String,
    },

    /// Caller passed an attribute, relation or comparison the schema can't honor
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // ===== External Library Errors =====

    /// Generic file I/O error
    #[error("File I/O error: {0}")]
    FileIoError(String),

    /// Database driver error from sqlx that has no more specific category
    #[error("Database error: {0}")]
    SqlxError(sqlx::Error),
}

impl From<sqlx::Error> for CatalogError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => {
                let kind = match db_err.kind() {
                    sqlx::error::ErrorKind::UniqueViolation => Some(ConstraintKind::Unique),
                    sqlx::error::ErrorKind::ForeignKeyViolation => Some(ConstraintKind::ForeignKey),
                    sqlx::error::ErrorKind::NotNullViolation => Some(ConstraintKind::NotNull),
                    sqlx::error::ErrorKind::CheckViolation => Some(ConstraintKind::Check),
                    _ => None,
                };
                match kind {
                    Some(kind) => CatalogError::ConstraintViolation {
                        kind,
                        message: db_err.message().to_string(),
                    },
                    None => CatalogError::SqlxError(sqlx::Error::Database(db_err)),
                }
            }
            sqlx::Error::Io(e) => CatalogError::ConnectionFailed(e.to_string()),
            sqlx::Error::Tls(e) => CatalogError::ConnectionFailed(e.to_string()),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::WorkerCrashed => {
                CatalogError::ConnectionFailed(err.to_string())
            }
            sqlx::Error::Configuration(e) => CatalogError::InvalidConfiguration(e.to_string()),
            sqlx::Error::RowNotFound => CatalogError::RecordNotFound("no rows returned".to_string()),
            other => CatalogError::SqlxError(other),
        }
    }
}

impl From<std::io::Error> for CatalogError {
    fn from(err: std::io::Error) -> Self {
        CatalogError::FileIoError(err.to_string())
    }
}

impl From<toml::de::Error> for CatalogError {
    fn from(err: toml::de::Error) -> Self {
        CatalogError::InvalidConfiguration(format!("Malformed config file: {}", err))
    }
}

// Helper methods for creating common errors
impl CatalogError {
    /// Create a RecordNotFound error with a resource description
    pub fn not_found<S: Into<String>>(resource: S) -> Self {
        CatalogError::RecordNotFound(resource.into())
    }

    /// Create an InvalidArgument error with a message
    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        CatalogError::InvalidArgument(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CatalogError::RecordNotFound(_))
    }

    /// Check if the storage engine rejected a write
    ///
    /// Pass `Some(kind)` to match one constraint only.
    pub fn is_constraint_violation(&self, which: Option<ConstraintKind>) -> bool {
        match (self, which) {
            (CatalogError::ConstraintViolation { .. }, None) => true,
            (CatalogError::ConstraintViolation { kind, .. }, Some(expected)) => *kind == expected,
            _ => false,
        }
    }

    /// Short label used in diagnostics
    pub fn category(&self) -> &'static str {
        match self {
            CatalogError::UnsupportedBackend(_) | CatalogError::InvalidConfiguration(_) => "config",
            CatalogError::ConnectionFailed(_) => "connection",
            CatalogError::RecordNotFound(_) => "not_found",
            CatalogError::ConstraintViolation { .. } => "constraint",
            CatalogError::InvalidArgument(_) => "argument",
            CatalogError::FileIoError(_) | CatalogError::SqlxError(_) => "storage",
        }
    }

    /// Get user-friendly error message suitable for display
    pub fn user_message(&self) -> String {
        match self {
            CatalogError::UnsupportedBackend(name) => {
                format!("'{}' is not a supported database. Use 'sqlite' or 'mysql'.", name)
            }
            CatalogError::ConstraintViolation { kind: ConstraintKind::Unique, .. } => {
                "A record with the same unique value already exists.".to_string()
            }
            CatalogError::ConstraintViolation { kind: ConstraintKind::ForeignKey, .. } => {
                "The record refers to a genre or author that does not exist.".to_string()
            }
            CatalogError::ConnectionFailed(_) => {
                "Could not reach the database. Check the connection settings.".to_string()
            }
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_not_found_maps_to_record_not_found() {
        let err: CatalogError = sqlx::Error::RowNotFound.into();
        assert!(err.is_not_found());
        assert_eq!(err.category(), "not_found");
    }

    #[test]
    fn test_io_maps_to_connection_failed() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err: CatalogError = sqlx::Error::Io(io).into();
        assert!(matches!(err, CatalogError::ConnectionFailed(_)));
    }

    #[test]
    fn test_constraint_kind_filter() {
        let err = CatalogError::ConstraintViolation {
            kind: ConstraintKind::Unique,
            message: "UNIQUE constraint failed: users.email".to_string(),
        };
        assert!(err.is_constraint_violation(None));
        assert!(err.is_constraint_violation(Some(ConstraintKind::Unique)));
        assert!(!err.is_constraint_violation(Some(ConstraintKind::ForeignKey)));
        assert_eq!(err.to_string(), "unique constraint violated: UNIQUE constraint failed: users.email");
    }

    #[test]
    fn test_unsupported_backend_message() {
        let err = CatalogError::UnsupportedBackend("oracle".to_string());
        assert!(err.user_message().contains("'oracle'"));
        assert_eq!(err.category(), "config");
    }
}
