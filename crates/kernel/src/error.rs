//! Query engine error types.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::ResourceKind;
use crate::query::ScalarKind;

/// Which side of the default/custom split a record lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ownership {
    Default,
    Custom,
}

impl Ownership {
    pub fn from_is_custom(is_custom: bool) -> Self {
        if is_custom {
            Ownership::Custom
        } else {
            Ownership::Default
        }
    }
}

impl fmt::Display for Ownership {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ownership::Default => f.write_str("default"),
            Ownership::Custom => f.write_str("custom"),
        }
    }
}

/// Query engine errors.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("custom-only scope requires an owner id")]
    InvalidScopeCombination,

    #[error("sort field '{field}' is not supported for {resource}")]
    UnsupportedSortField {
        resource: ResourceKind,
        field: String,
    },

    #[error("filter field '{field}' is not supported for {resource}")]
    UnsupportedFilterField {
        resource: ResourceKind,
        field: String,
    },

    #[error("filter field '{field}' on {resource} expects a {expected} value")]
    InvalidFilterValue {
        resource: ResourceKind,
        field: String,
        expected: ScalarKind,
    },

    #[error("invalid page request: {0}")]
    InvalidPageRequest(String),

    #[error("{resource} {id} not found")]
    ResourceNotFound { resource: ResourceKind, id: i64 },

    #[error("{resource} {id} is {actual}, but {requested} was requested")]
    WrongScopeRequested {
        resource: ResourceKind,
        id: i64,
        actual: Ownership,
        requested: Ownership,
    },

    #[error("{resource} {id} belongs to a different owner")]
    OwnerMismatch { resource: ResourceKind, id: i64 },

    #[error("datastore error: {0}")]
    Datastore(#[from] anyhow::Error),
}

impl QueryError {
    /// Whether the caller caused the error (as opposed to the datastore).
    pub fn is_client_error(&self) -> bool {
        !matches!(self, QueryError::Datastore(_))
    }
}

/// Result type alias using QueryError.
pub type QueryResult<T> = Result<T, QueryError>;
