//! Database error classification.
//!
//! Unique-constraint violations are first-class here: they are the primary
//! exactly-once guard for idempotency keys and processor identifiers, and
//! callers branch on them.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseErrorKind {
    /// A unique index rejected the write. `constraint` is the index name
    /// when the driver reports one.
    UniqueViolation { constraint: String },
    /// Foreign key violated.
    ForeignKeyViolation { constraint: String },
    /// Row expected but absent.
    NotFound,
    /// Pool exhausted or connection lost.
    Connection { message: String },
    /// Anything else.
    Other { message: String },
}

#[derive(Debug, Clone, Error)]
#[error("database error: {message}")]
pub struct DatabaseError {
    kind: DatabaseErrorKind,
    message: String,
}

impl DatabaseError {
    pub fn new(kind: DatabaseErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found() -> Self {
        Self::new(DatabaseErrorKind::NotFound, "row not found")
    }

    pub fn kind(&self) -> &DatabaseErrorKind {
        &self.kind
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self.kind, DatabaseErrorKind::UniqueViolation { .. })
    }

    pub fn from_sqlx(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => Self::not_found(),
            sqlx::Error::Database(db) => {
                let constraint = db.constraint().unwrap_or("").to_string();
                match db.code().as_deref() {
                    Some("23505") => Self::new(
                        DatabaseErrorKind::UniqueViolation { constraint },
                        db.message().to_string(),
                    ),
                    Some("23503") => Self::new(
                        DatabaseErrorKind::ForeignKeyViolation { constraint },
                        db.message().to_string(),
                    ),
                    _ => Self::new(
                        DatabaseErrorKind::Other {
                            message: db.message().to_string(),
                        },
                        db.message().to_string(),
                    ),
                }
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => Self::new(
                DatabaseErrorKind::Connection {
                    message: err.to_string(),
                },
                err.to_string(),
            ),
            _ => Self::new(
                DatabaseErrorKind::Other {
                    message: err.to_string(),
                },
                err.to_string(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_not_found_maps_to_not_found() {
        let err = DatabaseError::from_sqlx(sqlx::Error::RowNotFound);
        assert_eq!(*err.kind(), DatabaseErrorKind::NotFound);
        assert!(!err.is_unique_violation());
    }

    #[test]
    fn unique_violation_is_detectable() {
        let err = DatabaseError::new(
            DatabaseErrorKind::UniqueViolation {
                constraint: "orders_idempotency_key_key".to_string(),
            },
            "duplicate key value",
        );
        assert!(err.is_unique_violation());
    }
}
