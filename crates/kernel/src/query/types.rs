//! Request-side types for resource queries.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A comparable value for exact-match filters.
///
/// Deserialization tries the variants in order, so a UUID-shaped string
/// becomes `Uuid` rather than `Text`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Bool(bool),
    Integer(i64),
    Uuid(Uuid),
    Text(String),
}

/// The value type an exact-match column accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarKind {
    Bool,
    Integer,
    Uuid,
    Text,
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarKind::Bool => f.write_str("boolean"),
            ScalarKind::Integer => f.write_str("integer"),
            ScalarKind::Uuid => f.write_str("uuid"),
            ScalarKind::Text => f.write_str("text"),
        }
    }
}

impl ScalarValue {
    pub fn kind(&self) -> ScalarKind {
        match self {
            ScalarValue::Bool(_) => ScalarKind::Bool,
            ScalarValue::Integer(_) => ScalarKind::Integer,
            ScalarValue::Uuid(_) => ScalarKind::Uuid,
            ScalarValue::Text(_) => ScalarKind::Text,
        }
    }

    /// This value as `kind`, or `None` if it cannot be compared against a
    /// column of that type.
    ///
    /// A UUID is accepted for a text column, since deserialization turns
    /// UUID-shaped strings into `Uuid`. No other conversion is made: `"true"`
    /// is not a boolean and `1` is not a boolean either.
    pub fn coerce_to(&self, kind: ScalarKind) -> Option<ScalarValue> {
        match (self, kind) {
            (ScalarValue::Uuid(id), ScalarKind::Text) => Some(ScalarValue::Text(id.to_string())),
            (value, kind) if value.kind() == kind => Some(value.clone()),
            _ => None,
        }
    }
}

impl From<bool> for ScalarValue {
    fn from(value: bool) -> Self {
        ScalarValue::Bool(value)
    }
}

impl From<i64> for ScalarValue {
    fn from(value: i64) -> Self {
        ScalarValue::Integer(value)
    }
}

impl From<Uuid> for ScalarValue {
    fn from(value: Uuid) -> Self {
        ScalarValue::Uuid(value)
    }
}

impl From<String> for ScalarValue {
    fn from(value: String) -> Self {
        ScalarValue::Text(value)
    }
}

impl From<&str> for ScalarValue {
    fn from(value: &str) -> Self {
        ScalarValue::Text(value.to_string())
    }
}

/// Attribute and association constraints for a page query.
///
/// Maps are ordered so the same filters always produce the same plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    /// Attribute to case-insensitive substring.
    #[serde(default)]
    pub text: BTreeMap<String, String>,

    /// Attribute to exact value.
    #[serde(default)]
    pub exact: BTreeMap<String, ScalarValue>,

    /// Association to requested item ids; matches entities linked to any of them.
    #[serde(default)]
    pub membership: BTreeMap<String, BTreeSet<i64>>,
}

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a case-insensitive substring filter.
    pub fn contains(mut self, field: impl Into<String>, needle: impl Into<String>) -> Self {
        self.text.insert(field.into(), needle.into());
        self
    }

    /// Add an exact-match filter.
    pub fn equals(mut self, field: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        self.exact.insert(field.into(), value.into());
        self
    }

    /// Add a membership filter over an association.
    pub fn member_of(
        mut self,
        association: impl Into<String>,
        ids: impl IntoIterator<Item = i64>,
    ) -> Self {
        self.membership
            .entry(association.into())
            .or_default()
            .extend(ids);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.exact.is_empty() && self.membership.is_empty()
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// Requested sort order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,

    #[serde(default)]
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// Zero-based page request, as supplied by the caller.
///
/// Signed so that bad input survives deserialization and is rejected by
/// [`PageWindow::from_request`](super::page::PageWindow::from_request).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page_number: i64,
    pub page_size: i64,
}

impl PageRequest {
    pub fn new(page_number: i64, page_size: i64) -> Self {
        Self {
            page_number,
            page_size,
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page_number: 0,
            page_size: 10,
        }
    }
}

/// Everything `GetPage` needs besides the resource kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageQuery {
    /// `None` merges defaults with the owner's custom records.
    #[serde(default)]
    pub is_custom: Option<bool>,

    #[serde(default)]
    pub owner_id: Option<Uuid>,

    #[serde(default)]
    pub filters: FilterSpec,

    #[serde(default)]
    pub sort: Option<SortSpec>,

    #[serde(default)]
    pub page: PageRequest,
}
