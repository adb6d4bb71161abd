//! Attributes derived from child collections.

use super::catalog::AggregateDescriptor;
use crate::models::{AssociatedItem, ResourceEntity};

/// True when any item has `flag` set. Empty collections are `false`.
pub fn any_flag(items: &[AssociatedItem], flag: &str) -> bool {
    items.iter().any(|item| item.flag(flag))
}

/// Fill in every declared aggregate on a folded entity.
pub fn apply_aggregates(entity: &mut ResourceEntity, aggregates: &[AggregateDescriptor]) {
    for aggregate in aggregates {
        let items = entity.association(aggregate.association);
        let value = any_flag(items, aggregate.item_flag);
        entity.aggregates.insert(aggregate.name.to_string(), value);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::Map;

    use super::*;

    const EQUIPMENT: AggregateDescriptor = AggregateDescriptor {
        name: "equipment_needed",
        association: "exercises",
        item_flag: "equipment_needed",
    };

    fn workout(exercises: Vec<AssociatedItem>) -> ResourceEntity {
        let mut associations = BTreeMap::new();
        associations.insert("exercises".to_string(), exercises);
        ResourceEntity {
            id: 1,
            is_custom: false,
            owner_id: None,
            attributes: Map::new(),
            associations,
            aggregates: BTreeMap::new(),
        }
    }

    fn exercise(id: i64, equipment_needed: bool) -> AssociatedItem {
        AssociatedItem::new(id).with_attribute("equipment_needed", equipment_needed)
    }

    #[test]
    fn empty_collection_is_false() {
        let mut entity = workout(Vec::new());
        apply_aggregates(&mut entity, &[EQUIPMENT]);
        assert_eq!(entity.aggregates.get("equipment_needed"), Some(&false));
    }

    #[test]
    fn any_true_item_makes_it_true() {
        let exercises = vec![exercise(1, false), exercise(2, true), exercise(3, false)];
        let mut entity = workout(exercises);
        apply_aggregates(&mut entity, &[EQUIPMENT]);
        assert!(entity.aggregate("equipment_needed"));
    }

    #[test]
    fn all_false_items_are_false() {
        let mut entity = workout(vec![exercise(1, false), AssociatedItem::new(2)]);
        apply_aggregates(&mut entity, &[EQUIPMENT]);
        assert!(!entity.aggregate("equipment_needed"));
    }

    #[test]
    fn missing_association_is_false() {
        let mut entity = workout(Vec::new());
        entity.associations.clear();
        apply_aggregates(&mut entity, &[EQUIPMENT]);
        assert_eq!(entity.aggregates.get("equipment_needed"), Some(&false));
    }
}
