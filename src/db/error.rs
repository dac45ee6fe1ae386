use sea_orm::DbErr;
use thiserror::Error;

/// Typed failures surfaced by the repositories. The API layer maps each
/// variant to a status code; nothing is swallowed on the way up.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("referential integrity violation: {0}")]
    ReferentialIntegrity(String),

    #[error("{field} \"{value}\" is already taken")]
    UniqueViolation { field: &'static str, value: String },

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// Identity was created but token provisioning failed. The surrounding
    /// transaction has been rolled back, so no half-created user persists.
    #[error("partial write: {0}")]
    PartialWrite(String),

    #[error(transparent)]
    Db(#[from] DbErr),

    #[error("{0}")]
    Internal(String),
}

impl DataError {
    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Re-map a unique-constraint failure from the driver into the typed
    /// variant; everything else passes through as a database error.
    pub fn from_insert(err: DbErr, field: &'static str, value: &str) -> Self {
        match err.sql_err() {
            Some(sea_orm::SqlErr::UniqueConstraintViolation(_)) => Self::UniqueViolation {
                field,
                value: value.to_string(),
            },
            _ => Self::Db(err),
        }
    }
}

pub type DataResult<T> = Result<T, DataError>;
