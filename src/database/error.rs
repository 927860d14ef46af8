use std::fmt;
use thiserror::Error;

/// Database error with a structured kind for callers that need to branch
/// on not-found or unique-violation outcomes.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct DatabaseError {
    kind: DatabaseErrorKind,
}

#[derive(Debug)]
pub enum DatabaseErrorKind {
    NotFound { entity: String, id: String },
    UniqueViolation { constraint: String },
    Connection { message: String },
    Query { message: String },
    Unknown { message: String },
}

impl fmt::Display for DatabaseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseErrorKind::NotFound { entity, id } => {
                write!(f, "{} '{}' not found", entity, id)
            }
            DatabaseErrorKind::UniqueViolation { constraint } => {
                write!(f, "unique constraint violated: {}", constraint)
            }
            DatabaseErrorKind::Connection { message } => {
                write!(f, "database connection error: {}", message)
            }
            DatabaseErrorKind::Query { message } => write!(f, "query failed: {}", message),
            DatabaseErrorKind::Unknown { message } => write!(f, "database error: {}", message),
        }
    }
}

impl DatabaseError {
    pub fn new(kind: DatabaseErrorKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> &DatabaseErrorKind {
        &self.kind
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, DatabaseErrorKind::Connection { .. })
    }

    pub fn from_sqlx(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => Self::new(DatabaseErrorKind::NotFound {
                entity: "row".to_string(),
                id: String::new(),
            }),
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                Self::new(DatabaseErrorKind::UniqueViolation {
                    constraint: db_err.constraint().unwrap_or("unknown").to_string(),
                })
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Self::new(DatabaseErrorKind::Connection {
                    message: err.to_string(),
                })
            }
            _ => Self::new(DatabaseErrorKind::Query {
                message: err.to_string(),
            }),
        }
    }
}

impl From<DatabaseError> for crate::error::AppError {
    fn from(err: DatabaseError) -> Self {
        use crate::error::{AppError, AppErrorKind, DomainError, InfrastructureError};

        let kind = match err.kind() {
            DatabaseErrorKind::NotFound { entity, id } => AppErrorKind::Domain(DomainError::NotFound {
                entity: entity.clone(),
                id: id.clone(),
            }),
            _ => AppErrorKind::Infrastructure(InfrastructureError::Database {
                message: err.to_string(),
                is_retryable: err.is_retryable(),
            }),
        };

        AppError::new(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_404_app_error() {
        let err = DatabaseError::new(DatabaseErrorKind::NotFound {
            entity: "Wallet".to_string(),
            id: "abc".to_string(),
        });
        let app_err: crate::error::AppError = err.into();
        assert_eq!(app_err.status_code(), 404);
    }

    #[test]
    fn query_error_maps_to_500_app_error() {
        let err = DatabaseError::new(DatabaseErrorKind::Query {
            message: "syntax error".to_string(),
        });
        let app_err: crate::error::AppError = err.into();
        assert_eq!(app_err.status_code(), 500);
        assert!(!app_err.is_retryable());
    }

    #[test]
    fn connection_error_is_retryable() {
        let err = DatabaseError::new(DatabaseErrorKind::Connection {
            message: "pool timed out".to_string(),
        });
        assert!(err.is_retryable());
    }
}
