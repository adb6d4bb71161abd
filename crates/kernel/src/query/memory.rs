//! In-process datastore.
//!
//! Evaluates plans over a snapshot of stored records with the same predicate,
//! ordering, window and LEFT JOIN semantics as the PostgreSQL adapter. Used
//! by tests and by embedders without a database.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use anyhow::{Result, bail};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use super::catalog::{AssociationDescriptor, ResourceMetadata};
use super::datastore::Datastore;
use super::fold::{PrimaryRow, RawJoinRow};
use super::plan::{CountPlan, OrderTerm, Predicate, QueryPlan};
use super::types::{ScalarValue, SortDirection};
use crate::models::{AssociatedItem, ResourceKind};

/// A stored primary record with its associated items.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub id: i64,
    pub is_custom: bool,
    pub owner_id: Option<Uuid>,
    pub attributes: Map<String, Value>,
    pub associations: BTreeMap<String, Vec<AssociatedItem>>,
}

impl StoredRecord {
    /// A system-owned record.
    pub fn default_record(id: i64) -> Self {
        Self {
            id,
            is_custom: false,
            owner_id: None,
            attributes: Map::new(),
            associations: BTreeMap::new(),
        }
    }

    /// A user-owned record.
    pub fn custom_record(id: i64, owner_id: Uuid) -> Self {
        Self {
            is_custom: true,
            owner_id: Some(owner_id),
            ..Self::default_record(id)
        }
    }

    pub fn with_attribute(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    pub fn with_item(mut self, association: &str, item: AssociatedItem) -> Self {
        self.associations
            .entry(association.to_string())
            .or_default()
            .push(item);
        self
    }

    fn column(&self, column: &str) -> Value {
        if column == ResourceMetadata::ID_COLUMN {
            Value::from(self.id)
        } else {
            self.attributes.get(column).cloned().unwrap_or(Value::Null)
        }
    }
}

/// Datastore over in-memory records, keyed by resource kind.
#[derive(Debug, Default)]
pub struct MemoryDatastore {
    records: RwLock<HashMap<ResourceKind, Vec<StoredRecord>>>,
}

impl MemoryDatastore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a record, replacing any record of the same kind and id.
    pub fn insert(&self, kind: ResourceKind, record: StoredRecord) -> Result<()> {
        if record.is_custom != record.owner_id.is_some() {
            bail!(
                "{kind} {} has is_custom={} but owner_id={:?}",
                record.id,
                record.is_custom,
                record.owner_id
            );
        }

        let mut records = self.records.write();
        let table = records.entry(kind).or_default();
        table.retain(|r| r.id != record.id);
        table.push(record);
        Ok(())
    }

    pub fn insert_all(
        &self,
        kind: ResourceKind,
        records: impl IntoIterator<Item = StoredRecord>,
    ) -> Result<()> {
        for record in records {
            self.insert(kind, record)?;
        }
        Ok(())
    }

    pub fn len(&self, kind: ResourceKind) -> usize {
        self.records.read().get(&kind).map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().values().all(Vec::is_empty)
    }

    fn matching(
        &self,
        resource: &ResourceMetadata,
        predicates: &[Predicate<'_>],
    ) -> Vec<StoredRecord> {
        self.records
            .read()
            .get(&resource.kind)
            .map(|table| {
                table
                    .iter()
                    .filter(|record| predicates.iter().all(|p| matches(record, p)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl Datastore for MemoryDatastore {
    async fn execute_content(&self, plan: &QueryPlan<'_>) -> Result<Vec<RawJoinRow>> {
        let mut matched = self.matching(plan.resource, &plan.predicates);
        matched.sort_by(|a, b| compare_records(a, b, &plan.order));

        let offset = usize::try_from(plan.window.offset()).unwrap_or(usize::MAX);
        let limit = usize::try_from(plan.window.limit()).unwrap_or(usize::MAX);
        let page: Vec<StoredRecord> = matched.into_iter().skip(offset).take(limit).collect();

        let mut rows = Vec::new();
        if plan.joins.is_empty() {
            for record in &page {
                rows.push(RawJoinRow::bare(primary_row(plan.resource, record)?));
            }
        }
        for association in &plan.joins {
            for record in &page {
                let items = record
                    .associations
                    .get(association.name)
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                if items.is_empty() {
                    rows.push(RawJoinRow::bare(primary_row(plan.resource, record)?));
                }
                for item in items {
                    rows.push(RawJoinRow::with_item(
                        primary_row(plan.resource, record)?,
                        association.name,
                        project_item(association, item),
                    ));
                }
            }
        }

        debug!(
            resource = %plan.resource.kind,
            entities = page.len(),
            rows = rows.len(),
            "evaluated content plan in memory"
        );
        Ok(rows)
    }

    async fn execute_count(&self, plan: &CountPlan<'_>) -> Result<u64> {
        let total = self.matching(plan.resource, &plan.predicates).len();
        Ok(u64::try_from(total)?)
    }
}

fn primary_row(resource: &ResourceMetadata, record: &StoredRecord) -> Result<PrimaryRow> {
    let attributes = resource
        .columns
        .iter()
        .map(|column| (column.to_string(), record.column(column)))
        .collect();
    PrimaryRow::new(record.id, record.is_custom, record.owner_id, attributes)
}

/// Keep only the columns the association projects.
fn project_item(association: &AssociationDescriptor, item: &AssociatedItem) -> AssociatedItem {
    AssociatedItem {
        id: item.id,
        attributes: association
            .target_columns
            .iter()
            .map(|column| {
                let value = item.attributes.get(*column).cloned().unwrap_or(Value::Null);
                (column.to_string(), value)
            })
            .collect(),
    }
}

fn matches(record: &StoredRecord, predicate: &Predicate<'_>) -> bool {
    match predicate {
        Predicate::Scope(scope) => scope.admits(record.is_custom, record.owner_id),
        Predicate::IdEquals(id) => record.id == *id,
        Predicate::ContainsText { column, needle } => record
            .attributes
            .get(*column)
            .and_then(Value::as_str)
            .is_some_and(|text| text.to_lowercase().contains(&needle.to_lowercase())),
        Predicate::Equals { column, value } => scalar_matches(value, &record.column(column)),
        Predicate::MemberOf { association, ids } => record
            .associations
            .get(association.name)
            .is_some_and(|items| items.iter().any(|item| ids.contains(&item.id))),
    }
}

fn scalar_matches(expected: &ScalarValue, actual: &Value) -> bool {
    match expected {
        ScalarValue::Bool(b) => actual.as_bool() == Some(*b),
        ScalarValue::Integer(i) => actual.as_i64() == Some(*i),
        ScalarValue::Text(s) => actual.as_str() == Some(s.as_str()),
        ScalarValue::Uuid(u) => actual
            .as_str()
            .and_then(|s| Uuid::parse_str(s).ok())
            .is_some_and(|parsed| parsed == *u),
    }
}

fn compare_records(a: &StoredRecord, b: &StoredRecord, order: &[OrderTerm<'_>]) -> Ordering {
    for term in order {
        let ordering = compare_values(&a.column(term.column), &b.column(term.column));
        let ordering = match term.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// NULL sorts after every value, matching PostgreSQL's default.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Greater,
        (_, Value::Null) => Ordering::Less,
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => x
                .as_f64()
                .partial_cmp(&y.as_f64())
                .unwrap_or(Ordering::Equal),
        },
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Bool(_) => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Array(_) => 3,
        Value::Object(_) => 4,
        Value::Null => 5,
    }
}
