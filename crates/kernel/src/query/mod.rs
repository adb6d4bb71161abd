//! Resource query engine.
//!
//! Serves paginated, filtered, sorted listings and single-entity lookups for
//! every resource kind, merging system defaults with a user's custom records:
//! - Visibility scopes (default, custom, merged)
//! - Allow-listed sort and filter fields per kind
//! - One plan per request, rendered to parameterized SQL
//! - Folding of LEFT JOIN rows into nested entities
//! - Aggregates derived from child collections

pub mod aggregate;
pub mod catalog;
pub mod datastore;
pub mod engine;
pub mod fold;
pub mod memory;
pub mod page;
pub mod plan;
pub mod render;
pub mod scope;
pub mod types;

pub use aggregate::{any_flag, apply_aggregates};
pub use catalog::{
    AggregateDescriptor, AllowListProvider, AssociationDescriptor, JoinPath, ResourceMetadata,
    StaticCatalog,
};
pub use datastore::{Datastore, PgDatastore};
pub use engine::QueryEngine;
pub use fold::{JoinedItem, PrimaryRow, RawJoinRow, fold_rows};
pub use memory::{MemoryDatastore, StoredRecord};
pub use page::{PageResult, PageWindow};
pub use plan::{CountPlan, OrderTerm, Predicate, QueryPlan};
pub use scope::{ScopedOwner, VisibilityScope};
pub use types::{
    FilterSpec, PageQuery, PageRequest, ScalarKind, ScalarValue, SortDirection, SortSpec,
};
