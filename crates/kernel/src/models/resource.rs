//! Resource models: the fitness resource kinds and their folded entities.
//!
//! Every resource kind is split into system-owned default records and
//! user-owned custom records:
//! - ResourceKind: Workouts, exercises, mental activities, nutrition items, links
//! - ResourceEntity: A primary record with its associations folded in
//! - AssociatedItem: A tag/lookup row or child record hanging off an entity

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

/// Resource kinds served by the query engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Workout,
    Exercise,
    MentalActivity,
    NutritionItem,
    ReferenceLink,
}

impl ResourceKind {
    /// All resource kinds, in catalog order.
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Workout,
        ResourceKind::Exercise,
        ResourceKind::MentalActivity,
        ResourceKind::NutritionItem,
        ResourceKind::ReferenceLink,
    ];

    /// Machine name, identical to the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Workout => "workout",
            ResourceKind::Exercise => "exercise",
            ResourceKind::MentalActivity => "mental_activity",
            ResourceKind::NutritionItem => "nutrition_item",
            ResourceKind::ReferenceLink => "reference_link",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when parsing an unknown resource kind name.
#[derive(Debug, Error)]
#[error("unknown resource kind: {0}")]
pub struct UnknownResourceKind(pub String);

impl FromStr for ResourceKind {
    type Err = UnknownResourceKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownResourceKind(s.to_string()))
    }
}

/// An item reached through an association (body part tag, linked exercise, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssociatedItem {
    /// Item identifier; the dedup and ordering key inside a collection.
    pub id: i64,

    /// Projected item columns.
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl AssociatedItem {
    /// Create an item with no attributes.
    pub fn new(id: i64) -> Self {
        Self {
            id,
            attributes: Map::new(),
        }
    }

    /// Set an attribute.
    pub fn with_attribute(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    /// Read a boolean attribute; missing or non-boolean values read as `false`.
    pub fn flag(&self, name: &str) -> bool {
        self.attributes
            .get(name)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// A resource record with its associations folded into nested collections.
///
/// `is_custom == false` exactly when `owner_id` is `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceEntity {
    pub id: i64,

    /// User-owned (custom) rather than system-owned (default).
    pub is_custom: bool,

    /// Owner of a custom record.
    pub owner_id: Option<Uuid>,

    /// Scalar columns of the primary record (title, description, url, ...).
    #[serde(flatten)]
    pub attributes: Map<String, Value>,

    /// Association name to items, each collection sorted by item id.
    #[serde(default)]
    pub associations: BTreeMap<String, Vec<AssociatedItem>>,

    /// Attributes derived from child collections.
    #[serde(default)]
    pub aggregates: BTreeMap<String, bool>,
}

impl ResourceEntity {
    /// Look up a scalar attribute.
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// The record title, if projected.
    pub fn title(&self) -> Option<&str> {
        self.attribute("title").and_then(Value::as_str)
    }

    /// Items of an association; empty when the association was not loaded.
    pub fn association(&self, name: &str) -> &[AssociatedItem] {
        self.associations
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// A derived attribute; `false` when not computed.
    pub fn aggregate(&self, name: &str) -> bool {
        self.aggregates.get(name).copied().unwrap_or(false)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn resource_kind_round_trips_through_str() {
        for kind in ResourceKind::ALL {
            let parsed: ResourceKind = kind.as_str().parse().unwrap();
            assert_eq!(parsed, kind);
        }
        assert!("workouts".parse::<ResourceKind>().is_err());
    }

    #[test]
    fn resource_kind_serialization() {
        let json = serde_json::to_string(&ResourceKind::MentalActivity).unwrap();
        assert_eq!(json, "\"mental_activity\"");
    }

    #[test]
    fn associated_item_flag_defaults_false() {
        let item = AssociatedItem::new(1).with_attribute("equipment_needed", true);
        assert!(item.flag("equipment_needed"));
        assert!(!item.flag("missing"));

        let text = AssociatedItem::new(2).with_attribute("equipment_needed", "yes");
        assert!(!text.flag("equipment_needed"));
    }

    #[test]
    fn entity_serializes_attributes_flat() {
        let mut attributes = Map::new();
        attributes.insert("title".to_string(), Value::from("Push-up"));
        let entity = ResourceEntity {
            id: 7,
            is_custom: false,
            owner_id: None,
            attributes,
            associations: BTreeMap::new(),
            aggregates: BTreeMap::new(),
        };

        let json = serde_json::to_value(&entity).unwrap();
        assert_eq!(json["title"], "Push-up");
        assert_eq!(json["id"], 7);
        assert_eq!(entity.title(), Some("Push-up"));
        assert!(entity.association("body_parts").is_empty());
        assert!(!entity.aggregate("equipment_needed"));
    }
}
