//! Allow-listed query metadata per resource kind.
//!
//! Every identifier that reaches rendered SQL comes from a
//! [`ResourceMetadata`]; caller input only selects among them.

use anyhow::{Result, bail};

use super::types::ScalarKind;
use crate::models::ResourceKind;

/// How an association reaches its items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinPath {
    /// Many-to-many through a link table.
    Link {
        table: &'static str,
        /// Link column holding the primary record id.
        local_key: &'static str,
        /// Link column holding the item id.
        foreign_key: &'static str,
    },
    /// One-to-many: the item row carries the parent id.
    Child { parent_key: &'static str },
}

/// An association loaded alongside the primary record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssociationDescriptor {
    pub name: &'static str,
    pub path: JoinPath,
    pub target_table: &'static str,
    /// Item columns projected besides `id`.
    pub target_columns: &'static [&'static str],
    /// Whether membership filters may name this association.
    pub filterable: bool,
}

/// A boolean derived by OR-ing an item flag across an association.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateDescriptor {
    pub name: &'static str,
    pub association: &'static str,
    pub item_flag: &'static str,
}

/// Query metadata for one resource kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceMetadata {
    pub kind: ResourceKind,
    pub table: &'static str,
    /// Default sort column.
    pub natural_key: &'static str,
    /// Scalar columns projected besides id, is_custom and owner_id.
    pub columns: &'static [&'static str],
    pub sortable: &'static [&'static str],
    pub text_filters: &'static [&'static str],
    /// Exact-match columns and the value type each one accepts.
    pub exact_filters: &'static [(&'static str, ScalarKind)],
    pub associations: &'static [AssociationDescriptor],
    pub aggregates: &'static [AggregateDescriptor],
}

impl ResourceMetadata {
    pub const ID_COLUMN: &'static str = "id";
    pub const IS_CUSTOM_COLUMN: &'static str = "is_custom";
    pub const OWNER_COLUMN: &'static str = "owner_id";

    /// The catalog's spelling of a sortable field, if allowed.
    pub fn sortable_column(&self, field: &str) -> Option<&'static str> {
        self.sortable.iter().copied().find(|c| *c == field)
    }

    pub fn text_filter_column(&self, field: &str) -> Option<&'static str> {
        self.text_filters.iter().copied().find(|c| *c == field)
    }

    /// The catalog's spelling of an exact-match field and its value type.
    pub fn exact_filter_column(&self, field: &str) -> Option<(&'static str, ScalarKind)> {
        self.exact_filters
            .iter()
            .copied()
            .find(|(c, _)| *c == field)
    }

    pub fn association(&self, name: &str) -> Option<&'static AssociationDescriptor> {
        self.associations.iter().find(|a| a.name == name)
    }

    fn projects(&self, column: &str) -> bool {
        column == Self::ID_COLUMN || self.columns.contains(&column)
    }

    /// Every identifier this metadata can put into SQL.
    fn identifiers(&self) -> Vec<&'static str> {
        let mut identifiers = vec![self.table, self.natural_key];
        identifiers.extend(self.columns);
        for association in self.associations {
            identifiers.extend([association.name, association.target_table]);
            identifiers.extend(association.target_columns);
            match association.path {
                JoinPath::Link {
                    table,
                    local_key,
                    foreign_key,
                } => identifiers.extend([table, local_key, foreign_key]),
                JoinPath::Child { parent_key } => identifiers.push(parent_key),
            }
        }
        identifiers
    }

    /// Check identifiers and cross references. Returns every problem found.
    pub fn validate(&self) -> Vec<String> {
        let kind = self.kind;
        let mut errors = Vec::new();

        for identifier in self.identifiers() {
            if !is_valid_identifier(identifier) {
                errors.push(format!("{kind}: invalid identifier '{identifier}'"));
            }
        }

        if !self.projects(self.natural_key) {
            errors.push(format!(
                "{kind}: natural key '{}' is not a projected column",
                self.natural_key
            ));
        }
        for field in self.sortable {
            if !self.projects(field) {
                errors.push(format!("{kind}: sortable '{field}' is not projected"));
            }
        }
        let exact = self.exact_filters.iter().map(|(column, _)| column);
        for field in self.text_filters.iter().chain(exact) {
            if !self.columns.contains(field) {
                errors.push(format!("{kind}: filter '{field}' is not projected"));
            }
        }
        for aggregate in self.aggregates {
            match self.association(aggregate.association) {
                Some(assoc) if assoc.target_columns.contains(&aggregate.item_flag) => {}
                Some(_) => errors.push(format!(
                    "{kind}: aggregate '{}' reads unprojected flag '{}'",
                    aggregate.name, aggregate.item_flag
                )),
                None => errors.push(format!(
                    "{kind}: aggregate '{}' references unknown association '{}'",
                    aggregate.name, aggregate.association
                )),
            }
        }

        errors
    }
}

/// Identifier rule: non-empty, starts with an ASCII letter or underscore,
/// continues with ASCII alphanumerics or underscores.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Source of per-kind query metadata.
pub trait AllowListProvider: Send + Sync {
    fn metadata(&self, kind: ResourceKind) -> &ResourceMetadata;
}

const RESOURCE_COLUMNS: &[&str] = &["title", "description", "created_at"];
const SORTABLE: &[&str] = &["id", "title", "created_at"];
const TITLE_AND_DESCRIPTION: &[&str] = &["title", "description"];

const fn reference_links(
    link_table: &'static str,
    local_key: &'static str,
) -> AssociationDescriptor {
    AssociationDescriptor {
        name: "reference_links",
        path: JoinPath::Link {
            table: link_table,
            local_key,
            foreign_key: "reference_link_id",
        },
        target_table: "reference_link",
        target_columns: &["title", "url"],
        filterable: true,
    }
}

const EXERCISE_LINKS: AssociationDescriptor =
    reference_links("exercise_reference_link", "exercise_id");
const MENTAL_ACTIVITY_LINKS: AssociationDescriptor =
    reference_links("mental_activity_reference_link", "mental_activity_id");
const NUTRITION_ITEM_LINKS: AssociationDescriptor =
    reference_links("nutrition_item_reference_link", "nutrition_item_id");

static WORKOUT: ResourceMetadata = ResourceMetadata {
    kind: ResourceKind::Workout,
    table: "workout",
    natural_key: "title",
    columns: RESOURCE_COLUMNS,
    sortable: SORTABLE,
    text_filters: TITLE_AND_DESCRIPTION,
    exact_filters: &[],
    associations: &[AssociationDescriptor {
        name: "exercises",
        path: JoinPath::Link {
            table: "workout_exercise",
            local_key: "workout_id",
            foreign_key: "exercise_id",
        },
        target_table: "exercise",
        target_columns: &["title", "equipment_needed"],
        filterable: true,
    }],
    aggregates: &[AggregateDescriptor {
        name: "equipment_needed",
        association: "exercises",
        item_flag: "equipment_needed",
    }],
};

static EXERCISE: ResourceMetadata = ResourceMetadata {
    kind: ResourceKind::Exercise,
    table: "exercise",
    natural_key: "title",
    columns: &["title", "description", "equipment_needed", "created_at"],
    sortable: SORTABLE,
    text_filters: TITLE_AND_DESCRIPTION,
    exact_filters: &[("equipment_needed", ScalarKind::Bool)],
    associations: &[
        AssociationDescriptor {
            name: "body_parts",
            path: JoinPath::Link {
                table: "exercise_body_part",
                local_key: "exercise_id",
                foreign_key: "body_part_id",
            },
            target_table: "body_part",
            target_columns: &["name"],
            filterable: true,
        },
        EXERCISE_LINKS,
    ],
    aggregates: &[],
};

static MENTAL_ACTIVITY: ResourceMetadata = ResourceMetadata {
    kind: ResourceKind::MentalActivity,
    table: "mental_activity",
    natural_key: "title",
    columns: RESOURCE_COLUMNS,
    sortable: SORTABLE,
    text_filters: TITLE_AND_DESCRIPTION,
    exact_filters: &[],
    associations: &[MENTAL_ACTIVITY_LINKS],
    aggregates: &[],
};

static NUTRITION_ITEM: ResourceMetadata = ResourceMetadata {
    kind: ResourceKind::NutritionItem,
    table: "nutrition_item",
    natural_key: "title",
    columns: RESOURCE_COLUMNS,
    sortable: SORTABLE,
    text_filters: TITLE_AND_DESCRIPTION,
    exact_filters: &[],
    associations: &[NUTRITION_ITEM_LINKS],
    aggregates: &[],
};

static REFERENCE_LINK: ResourceMetadata = ResourceMetadata {
    kind: ResourceKind::ReferenceLink,
    table: "reference_link",
    natural_key: "title",
    columns: &["title", "description", "url", "created_at"],
    sortable: SORTABLE,
    text_filters: &["title", "description", "url"],
    exact_filters: &[],
    associations: &[],
    aggregates: &[],
};

/// The built-in catalog of fitness resources.
#[derive(Debug)]
pub struct StaticCatalog {
    _validated: (),
}

impl StaticCatalog {
    /// Build the catalog, rejecting it if any metadata fails validation.
    pub fn new() -> Result<Self> {
        let errors: Vec<String> = ResourceKind::ALL
            .into_iter()
            .flat_map(|kind| Self::resource(kind).validate())
            .collect();
        if !errors.is_empty() {
            bail!("invalid resource catalog: {}", errors.join("; "));
        }
        Ok(Self { _validated: () })
    }

    /// Built-in metadata for a kind, without going through validation.
    pub fn resource(kind: ResourceKind) -> &'static ResourceMetadata {
        match kind {
            ResourceKind::Workout => &WORKOUT,
            ResourceKind::Exercise => &EXERCISE,
            ResourceKind::MentalActivity => &MENTAL_ACTIVITY,
            ResourceKind::NutritionItem => &NUTRITION_ITEM,
            ResourceKind::ReferenceLink => &REFERENCE_LINK,
        }
    }
}

impl AllowListProvider for StaticCatalog {
    fn metadata(&self, kind: ResourceKind) -> &ResourceMetadata {
        Self::resource(kind)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn static_catalog_is_valid() {
        let catalog = StaticCatalog::new().unwrap();
        for kind in ResourceKind::ALL {
            let metadata = catalog.metadata(kind);
            assert_eq!(metadata.kind, kind);
            assert!(
                metadata.validate().is_empty(),
                "{kind}: {:?}",
                metadata.validate()
            );
        }
    }

    #[test]
    fn identifier_rule() {
        assert!(is_valid_identifier("title"));
        assert!(is_valid_identifier("_private"));
        assert!(is_valid_identifier("field_name_123"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("123abc"));
        assert!(!is_valid_identifier("title; DROP TABLE"));
        assert!(!is_valid_identifier("fields.title"));
        assert!(!is_valid_identifier("title\""));
    }

    #[test]
    fn validate_reports_bad_metadata() {
        let broken = ResourceMetadata {
            kind: ResourceKind::Workout,
            table: "workout",
            natural_key: "name",
            columns: &["title"],
            sortable: &["id", "rating"],
            text_filters: &["title", "summary"],
            exact_filters: &[("indoor", ScalarKind::Bool)],
            associations: &[AssociationDescriptor {
                name: "exercises",
                path: JoinPath::Link {
                    table: "workout exercise",
                    local_key: "workout_id",
                    foreign_key: "exercise_id",
                },
                target_table: "exercise",
                target_columns: &["title"],
                filterable: true,
            }],
            aggregates: &[
                AggregateDescriptor {
                    name: "equipment_needed",
                    association: "exercises",
                    item_flag: "equipment_needed",
                },
                AggregateDescriptor {
                    name: "outdoor",
                    association: "locations",
                    item_flag: "outdoor",
                },
            ],
        };

        let errors = broken.validate();
        assert!(errors.iter().any(|e| e.contains("'workout exercise'")));
        assert!(errors.iter().any(|e| e.contains("natural key 'name'")));
        assert!(errors.iter().any(|e| e.contains("sortable 'rating'")));
        assert!(errors.iter().any(|e| e.contains("filter 'summary'")));
        assert!(errors.iter().any(|e| e.contains("filter 'indoor'")));
        assert!(errors.iter().any(|e| e.contains("unprojected flag")));
        assert!(
            errors
                .iter()
                .any(|e| e.contains("unknown association 'locations'"))
        );
        assert_eq!(errors.len(), 7, "{errors:?}");
    }

    #[test]
    fn lookups_return_catalog_spelling() {
        let catalog = StaticCatalog::new().unwrap();
        let exercise = catalog.metadata(ResourceKind::Exercise);
        assert_eq!(exercise.sortable_column("title"), Some("title"));
        assert_eq!(exercise.sortable_column("description"), None);
        assert_eq!(
            exercise.exact_filter_column("equipment_needed"),
            Some(("equipment_needed", ScalarKind::Bool))
        );
        assert_eq!(exercise.exact_filter_column("title"), None);
        assert!(exercise.association("body_parts").is_some());
        assert!(exercise.association("exercises").is_none());
    }
}
