//! Folding flat joined rows into nested entities.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};

use anyhow::{Result, bail};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::models::{AssociatedItem, ResourceEntity};

/// Primary-record columns of a joined row.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimaryRow {
    pub id: i64,
    pub is_custom: bool,
    pub owner_id: Option<Uuid>,
    pub attributes: Map<String, Value>,
}

impl PrimaryRow {
    /// Build a row, rejecting ownership that breaks the default/custom split.
    pub fn new(
        id: i64,
        is_custom: bool,
        owner_id: Option<Uuid>,
        attributes: Map<String, Value>,
    ) -> Result<Self> {
        if is_custom != owner_id.is_some() {
            bail!("record {id} has is_custom={is_custom} but owner_id={owner_id:?}");
        }
        Ok(Self {
            id,
            is_custom,
            owner_id,
            attributes,
        })
    }
}

/// The joined side of a row: which association it came through, and the item.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedItem {
    pub association: String,
    pub item: AssociatedItem,
}

/// One row of a LEFT JOIN result. `joined` is `None` on a join miss.
#[derive(Debug, Clone, PartialEq)]
pub struct RawJoinRow {
    pub primary: PrimaryRow,
    pub joined: Option<JoinedItem>,
}

impl RawJoinRow {
    pub fn bare(primary: PrimaryRow) -> Self {
        Self {
            primary,
            joined: None,
        }
    }

    pub fn with_item(primary: PrimaryRow, association: &str, item: AssociatedItem) -> Self {
        Self {
            primary,
            joined: Some(JoinedItem {
                association: association.to_string(),
                item,
            }),
        }
    }
}

struct Folding {
    primary: PrimaryRow,
    associations: BTreeMap<String, BTreeMap<i64, AssociatedItem>>,
}

impl Folding {
    fn new(primary: PrimaryRow, associations: &[&str]) -> Self {
        Self {
            primary,
            associations: associations
                .iter()
                .map(|name| (name.to_string(), BTreeMap::new()))
                .collect(),
        }
    }

    fn finish(self) -> ResourceEntity {
        let PrimaryRow {
            id,
            is_custom,
            owner_id,
            attributes,
        } = self.primary;
        ResourceEntity {
            id,
            is_custom,
            owner_id,
            attributes,
            associations: self
                .associations
                .into_iter()
                .map(|(name, items)| (name, items.into_values().collect()))
                .collect(),
            aggregates: BTreeMap::new(),
        }
    }
}

/// Collapse rows into one entity per distinct primary id.
///
/// Entities keep the order in which their id first appears. Each association
/// named in `associations` is present on every entity, deduplicated by item
/// id and sorted by it. Later duplicates of an item are ignored.
pub fn fold_rows<I>(rows: I, associations: &[&str]) -> Vec<ResourceEntity>
where
    I: IntoIterator<Item = RawJoinRow>,
{
    let mut positions: HashMap<i64, usize> = HashMap::new();
    let mut folded: Vec<Folding> = Vec::new();

    for RawJoinRow { primary, joined } in rows {
        let index = match positions.entry(primary.id) {
            Entry::Occupied(entry) => *entry.get(),
            Entry::Vacant(entry) => {
                entry.insert(folded.len());
                folded.push(Folding::new(primary, associations));
                folded.len() - 1
            }
        };

        if let Some(JoinedItem { association, item }) = joined {
            folded[index]
                .associations
                .entry(association)
                .or_default()
                .entry(item.id)
                .or_insert(item);
        }
    }

    folded.into_iter().map(Folding::finish).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn primary(id: i64, title: &str) -> PrimaryRow {
        let mut attributes = Map::new();
        attributes.insert("title".to_string(), Value::from(title));
        PrimaryRow::new(id, false, None, attributes).unwrap()
    }

    fn tag(id: i64, name: &str) -> AssociatedItem {
        AssociatedItem::new(id).with_attribute("name", name)
    }

    fn item_ids(entity: &ResourceEntity, association: &str) -> Vec<i64> {
        entity
            .association(association)
            .iter()
            .map(|i| i.id)
            .collect()
    }

    #[test]
    fn interleaved_rows_fold_in_first_appearance_order() {
        let a = || primary(1, "Squat");
        let b = || primary(2, "Row");
        let rows = vec![
            RawJoinRow::with_item(a(), "body_parts", tag(2, "tag2")),
            RawJoinRow::with_item(b(), "body_parts", tag(24, "tagX")),
            RawJoinRow::with_item(a(), "body_parts", tag(1, "tag1")),
            RawJoinRow::with_item(a(), "body_parts", tag(3, "tag3")),
            RawJoinRow::with_item(b(), "body_parts", tag(25, "tagY")),
        ];

        let entities = fold_rows(rows, &["body_parts"]);
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].id, 1);
        assert_eq!(item_ids(&entities[0], "body_parts"), vec![1, 2, 3]);
        assert_eq!(entities[1].id, 2);
        assert_eq!(item_ids(&entities[1], "body_parts"), vec![24, 25]);

        let names: Vec<&str> = entities[0]
            .association("body_parts")
            .iter()
            .filter_map(|item| item.attributes["name"].as_str())
            .collect();
        assert_eq!(names, vec!["tag1", "tag2", "tag3"]);
    }

    #[test]
    fn items_are_deduplicated_and_sorted() {
        let rows = vec![
            RawJoinRow::with_item(primary(1, "Squat"), "body_parts", tag(12, "core")),
            RawJoinRow::with_item(primary(1, "Squat"), "body_parts", tag(10, "legs")),
            RawJoinRow::with_item(primary(1, "Squat"), "body_parts", tag(12, "duplicate")),
        ];

        let entities = fold_rows(rows, &["body_parts"]);
        assert_eq!(item_ids(&entities[0], "body_parts"), vec![10, 12]);
        assert_eq!(
            entities[0].association("body_parts")[1].attributes["name"],
            "core"
        );
    }

    #[test]
    fn join_miss_yields_empty_collection() {
        let rows = vec![RawJoinRow::bare(primary(3, "Plank"))];

        let entities = fold_rows(rows, &["body_parts", "reference_links"]);
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].associations.len(), 2);
        assert!(entities[0].association("body_parts").is_empty());
        assert!(entities[0].association("reference_links").is_empty());
    }

    #[test]
    fn separate_associations_stay_separate() {
        let link = AssociatedItem::new(10).with_attribute("url", "https://example.com");
        let rows = vec![
            RawJoinRow::with_item(primary(1, "Squat"), "body_parts", tag(10, "legs")),
            RawJoinRow::bare(primary(2, "Row")),
            RawJoinRow::with_item(primary(1, "Squat"), "reference_links", link),
        ];

        let entities = fold_rows(rows, &["body_parts", "reference_links"]);
        assert_eq!(item_ids(&entities[0], "body_parts"), vec![10]);
        assert_eq!(item_ids(&entities[0], "reference_links"), vec![10]);
        assert!(entities[1].association("body_parts").is_empty());
    }

    #[test]
    fn empty_input_folds_to_nothing() {
        assert!(fold_rows(Vec::new(), &["body_parts"]).is_empty());
    }

    #[test]
    fn primary_row_rejects_broken_ownership() {
        let owner = Some(Uuid::now_v7());
        assert!(PrimaryRow::new(1, true, None, Map::new()).is_err());
        assert!(PrimaryRow::new(1, false, owner, Map::new()).is_err());
        assert!(PrimaryRow::new(1, true, owner, Map::new()).is_ok());
    }
}
