//! Vigor query kernel.
//!
//! Paginated, filtered and sorted reads over the fitness catalog (workouts,
//! exercises, mental activities, nutrition items and reference links), each
//! split into system defaults and per-user custom records.

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod models;
pub mod query;

pub use config::{Config, EngineConfig};
pub use error::{Ownership, QueryError, QueryResult};
pub use models::{AssociatedItem, ResourceEntity, ResourceKind};
pub use query::{
    FilterSpec, MemoryDatastore, PageQuery, PageRequest, PageResult, PgDatastore, QueryEngine,
    SortSpec, StaticCatalog,
};
