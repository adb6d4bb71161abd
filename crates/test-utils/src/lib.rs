//! Vigor test utilities.
//!
//! Helpers for integration testing: resource fixtures, seeded in-memory
//! datastores, and assertion utilities for paged results.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use uuid::Uuid;
use vigor_kernel::query::{AllowListProvider, MemoryDatastore, StoredRecord};
use vigor_kernel::{AssociatedItem, EngineConfig, QueryEngine, ResourceKind, StaticCatalog};

/// Create a default (system-owned) test resource.
pub fn test_resource(id: i64, title: &str) -> TestResource {
    TestResource {
        id,
        title: title.to_string(),
        description: None,
        owner_id: None,
        created_at: format!("2024-01-01T00:00:{:02}Z", id.rem_euclid(60)),
        attributes: Map::new(),
        associations: BTreeMap::new(),
    }
}

/// A resource builder for creating test fixtures.
#[derive(Debug, Clone)]
pub struct TestResource {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub owner_id: Option<Uuid>,
    pub created_at: String,
    pub attributes: Map<String, Value>,
    pub associations: BTreeMap<String, Vec<AssociatedItem>>,
}

impl TestResource {
    /// Make this a custom resource owned by `owner_id`.
    pub fn owned_by(mut self, owner_id: Uuid) -> Self {
        self.owner_id = Some(owner_id);
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn with_created_at(mut self, created_at: &str) -> Self {
        self.created_at = created_at.to_string();
        self
    }

    /// Set a resource-specific column such as `equipment_needed` or `url`.
    pub fn with_attribute(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    /// Attach an associated item.
    pub fn with_item(mut self, association: &str, item: AssociatedItem) -> Self {
        self.associations
            .entry(association.to_string())
            .or_default()
            .push(item);
        self
    }

    /// Convert into a record for the in-memory datastore.
    pub fn into_record(self) -> StoredRecord {
        let base = match self.owner_id {
            Some(owner) => StoredRecord::custom_record(self.id, owner),
            None => StoredRecord::default_record(self.id),
        };
        let mut record = base
            .with_attribute("title", self.title)
            .with_attribute("created_at", self.created_at);
        if let Some(description) = self.description {
            record = record.with_attribute("description", description);
        }
        record.attributes.extend(self.attributes);
        record.associations = self.associations;
        record
    }
}

/// A body part tag.
pub fn body_part(id: i64, name: &str) -> AssociatedItem {
    AssociatedItem::new(id).with_attribute("name", name)
}

/// An exercise as seen through a workout.
pub fn exercise_item(id: i64, title: &str, equipment_needed: bool) -> AssociatedItem {
    AssociatedItem::new(id)
        .with_attribute("title", title)
        .with_attribute("equipment_needed", equipment_needed)
}

/// A reference link as seen through its parent resource.
pub fn reference_link_item(id: i64, title: &str, url: &str) -> AssociatedItem {
    AssociatedItem::new(id)
        .with_attribute("title", title)
        .with_attribute("url", url)
}

/// Build an in-memory datastore holding `resources` of one kind.
pub fn seeded_datastore(
    kind: ResourceKind,
    resources: impl IntoIterator<Item = TestResource>,
) -> anyhow::Result<Arc<MemoryDatastore>> {
    let store = MemoryDatastore::new();
    store.insert_all(kind, resources.into_iter().map(TestResource::into_record))?;
    Ok(Arc::new(store))
}

/// A query engine over `store` with the built-in catalog.
pub fn engine_over(store: Arc<MemoryDatastore>) -> anyhow::Result<Arc<QueryEngine>> {
    engine_with_config(store, EngineConfig::default())
}

pub fn engine_with_config(
    store: Arc<MemoryDatastore>,
    config: EngineConfig,
) -> anyhow::Result<Arc<QueryEngine>> {
    let catalog: Arc<dyn AllowListProvider> = Arc::new(StaticCatalog::new()?);
    Ok(QueryEngine::new(store, catalog, config))
}

/// Install a test-friendly tracing subscriber. Safe to call repeatedly.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Assertion helpers for query results.
pub mod assert {
    use vigor_kernel::{PageResult, ResourceEntity};

    /// Ids of entities, in order.
    pub fn ids(entities: &[ResourceEntity]) -> Vec<i64> {
        entities.iter().map(|e| e.id).collect()
    }

    /// Assert a page holds exactly `expected` ids, in order.
    pub fn page_ids(page: &PageResult<ResourceEntity>, expected: &[i64]) {
        let actual = ids(&page.content);
        let number = page.page_number;
        assert_eq!(actual, expected, "content of page {number}");
    }

    /// Assert an association holds exactly `expected` item ids, in order.
    pub fn item_ids(entity: &ResourceEntity, association: &str, expected: &[i64]) {
        let actual: Vec<i64> = entity
            .association(association)
            .iter()
            .map(|i| i.id)
            .collect();
        let id = entity.id;
        assert_eq!(actual, expected, "'{association}' items of entity {id}");
    }
}
