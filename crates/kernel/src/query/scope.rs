//! Visibility scope resolution.
//!
//! Default records are visible to everyone; custom records only to their
//! owner. A scope carrying an owner can only be produced by
//! [`VisibilityScope::resolve`].

use uuid::Uuid;

use crate::error::{QueryError, QueryResult};

/// An owner id that has passed scope resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopedOwner(Uuid);

impl ScopedOwner {
    pub fn id(&self) -> Uuid {
        self.0
    }
}

/// Which records a query may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisibilityScope {
    /// System-owned records only.
    DefaultOnly,
    /// The owner's custom records only.
    CustomOnly(ScopedOwner),
    /// System-owned records plus the owner's custom records.
    Merged(ScopedOwner),
}

impl VisibilityScope {
    /// Resolve the caller's ownership selector and owner id.
    ///
    /// | is_custom | owner   | scope                     |
    /// |-----------|---------|---------------------------|
    /// | None      | Some(o) | `Merged(o)`               |
    /// | None      | None    | `DefaultOnly`             |
    /// | false     | any     | `DefaultOnly`             |
    /// | true      | Some(o) | `CustomOnly(o)`           |
    /// | true      | None    | `InvalidScopeCombination` |
    pub fn resolve(is_custom: Option<bool>, owner_id: Option<Uuid>) -> QueryResult<Self> {
        match (is_custom, owner_id) {
            (None, Some(owner)) => Ok(VisibilityScope::Merged(ScopedOwner(owner))),
            (None, None) | (Some(false), _) => Ok(VisibilityScope::DefaultOnly),
            (Some(true), Some(owner)) => Ok(VisibilityScope::CustomOnly(ScopedOwner(owner))),
            (Some(true), None) => Err(QueryError::InvalidScopeCombination),
        }
    }

    pub fn owner(&self) -> Option<Uuid> {
        match self {
            VisibilityScope::DefaultOnly => None,
            VisibilityScope::CustomOnly(owner) | VisibilityScope::Merged(owner) => Some(owner.id()),
        }
    }

    /// Whether a record with this ownership is visible.
    pub fn admits(&self, is_custom: bool, owner_id: Option<Uuid>) -> bool {
        match self {
            VisibilityScope::DefaultOnly => !is_custom,
            VisibilityScope::CustomOnly(owner) => is_custom && owner_id == Some(owner.id()),
            VisibilityScope::Merged(owner) => !is_custom || owner_id == Some(owner.id()),
        }
    }

    /// Short label for log fields.
    pub fn label(&self) -> &'static str {
        match self {
            VisibilityScope::DefaultOnly => "default",
            VisibilityScope::CustomOnly(_) => "custom",
            VisibilityScope::Merged(_) => "merged",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn absent_selector_with_owner_merges() {
        let owner = Uuid::now_v7();
        let scope = VisibilityScope::resolve(None, Some(owner)).unwrap();
        assert!(matches!(scope, VisibilityScope::Merged(_)));
        assert_eq!(scope.owner(), Some(owner));
    }

    #[test]
    fn absent_selector_without_owner_is_default_only() {
        let scope = VisibilityScope::resolve(None, None).unwrap();
        assert_eq!(scope, VisibilityScope::DefaultOnly);
    }

    #[test]
    fn default_selector_ignores_owner() {
        let scope = VisibilityScope::resolve(Some(false), Some(Uuid::now_v7())).unwrap();
        assert_eq!(scope, VisibilityScope::DefaultOnly);
        assert_eq!(scope.owner(), None);

        let scope = VisibilityScope::resolve(Some(false), None).unwrap();
        assert_eq!(scope, VisibilityScope::DefaultOnly);
    }

    #[test]
    fn custom_selector_with_owner() {
        let owner = Uuid::now_v7();
        let scope = VisibilityScope::resolve(Some(true), Some(owner)).unwrap();
        assert!(matches!(scope, VisibilityScope::CustomOnly(_)));
        assert_eq!(scope.owner(), Some(owner));
    }

    #[test]
    fn custom_selector_without_owner_is_rejected() {
        let err = VisibilityScope::resolve(Some(true), None).unwrap_err();
        assert!(matches!(err, QueryError::InvalidScopeCombination));
    }

    #[test]
    fn admits_follows_scope() {
        let owner = Uuid::now_v7();
        let stranger = Uuid::now_v7();

        let default_only = VisibilityScope::DefaultOnly;
        assert!(default_only.admits(false, None));
        assert!(!default_only.admits(true, Some(owner)));

        let custom = VisibilityScope::resolve(Some(true), Some(owner)).unwrap();
        assert!(custom.admits(true, Some(owner)));
        assert!(!custom.admits(true, Some(stranger)));
        assert!(!custom.admits(false, None));

        let merged = VisibilityScope::resolve(None, Some(owner)).unwrap();
        assert!(merged.admits(false, None));
        assert!(merged.admits(true, Some(owner)));
        assert!(!merged.admits(true, Some(stranger)));
    }
}
