//! Repository error taxonomy.

use crate::db::DbError;
use crate::model::entity::{EntityId, RecordError};
use crate::projection::{ProjectionDepthError, ProjectionMappingError};
use crate::query::error::{DerivationError, ParameterBindingError};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Error returned by every repository and session operation.
///
/// Nothing is retried internally; store failures pass through unchanged.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    Derivation(DerivationError),
    ParameterBinding(ParameterBindingError),
    ProjectionDepth(ProjectionDepthError),
    ProjectionMapping(ProjectionMappingError),
    /// Duplicate identifier or other store-side constraint failure.
    ConstraintViolation {
        target: String,
        message: String,
    },
    NotFound {
        table: &'static str,
        id: EntityId,
    },
    /// A single-result query matched more than one row.
    NonUniqueResult {
        actual: usize,
    },
    InvalidArgument(String),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Derivation(err) => write!(f, "{err}"),
            Self::ParameterBinding(err) => write!(f, "{err}"),
            Self::ProjectionDepth(err) => write!(f, "{err}"),
            Self::ProjectionMapping(err) => write!(f, "{err}"),
            Self::ConstraintViolation { target, message } => {
                write!(f, "constraint violation on {target}: {message}")
            }
            Self::NotFound { table, id } => write!(f, "{table} row not found: {id}"),
            Self::NonUniqueResult { actual } => {
                write!(f, "expected at most one result, got {actual}")
            }
            Self::InvalidArgument(message) => write!(f, "invalid argument: {message}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Derivation(err) => Some(err),
            Self::ParameterBinding(err) => Some(err),
            Self::ProjectionDepth(err) => Some(err),
            Self::ProjectionMapping(err) => Some(err),
            Self::ConstraintViolation { .. }
            | Self::NotFound { .. }
            | Self::NonUniqueResult { .. }
            | Self::InvalidArgument(_)
            | Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<DerivationError> for RepoError {
    fn from(value: DerivationError) -> Self {
        Self::Derivation(value)
    }
}

impl From<ParameterBindingError> for RepoError {
    fn from(value: ParameterBindingError) -> Self {
        Self::ParameterBinding(value)
    }
}

impl From<ProjectionDepthError> for RepoError {
    fn from(value: ProjectionDepthError) -> Self {
        Self::ProjectionDepth(value)
    }
}

impl From<ProjectionMappingError> for RepoError {
    fn from(value: ProjectionMappingError) -> Self {
        Self::ProjectionMapping(value)
    }
}

impl From<RecordError> for RepoError {
    fn from(value: RecordError) -> Self {
        Self::InvalidData(value.to_string())
    }
}
