//! Resource models.

pub mod resource;

pub use resource::{AssociatedItem, ResourceEntity, ResourceKind, UnknownResourceKind};
