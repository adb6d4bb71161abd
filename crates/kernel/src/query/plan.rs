//! Structured query plans.
//!
//! A [`QueryPlan`] is built once per request from validated inputs and
//! holds only catalog-owned identifiers. The [`CountPlan`] is derived from it
//! structurally, so the two can never disagree on what they select.

use super::catalog::{AssociationDescriptor, ResourceMetadata};
use super::page::PageWindow;
use super::scope::VisibilityScope;
use super::types::{FilterSpec, ScalarValue, SortDirection, SortSpec};
use crate::error::{QueryError, QueryResult};

/// A row predicate over the primary table. Predicates are AND-ed.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate<'m> {
    Scope(VisibilityScope),
    IdEquals(i64),
    /// Case-insensitive substring match. The needle is raw; escaping happens
    /// when it is rendered.
    ContainsText { column: &'m str, needle: String },
    Equals {
        column: &'m str,
        /// Already checked against the column's type.
        value: ScalarValue,
    },
    /// Entities linked to any of `ids` through `association`.
    MemberOf {
        association: &'m AssociationDescriptor,
        ids: Vec<i64>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderTerm<'m> {
    pub column: &'m str,
    pub direction: SortDirection,
}

/// Content plan: which entities, in what order, which window, which joins.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan<'m> {
    pub resource: &'m ResourceMetadata,
    pub predicates: Vec<Predicate<'m>>,
    pub joins: Vec<&'m AssociationDescriptor>,
    pub order: Vec<OrderTerm<'m>>,
    pub window: PageWindow,
}

impl<'m> QueryPlan<'m> {
    /// Compose scope, filters, sort and window into a plan.
    ///
    /// Every field named by the caller is checked against the metadata
    /// before anything is built.
    pub fn build(
        resource: &'m ResourceMetadata,
        scope: VisibilityScope,
        filters: &FilterSpec,
        sort: Option<&SortSpec>,
        window: PageWindow,
    ) -> QueryResult<Self> {
        let order = order_terms(resource, sort)?;

        let mut predicates = vec![Predicate::Scope(scope)];

        for (field, needle) in &filters.text {
            let column = resource
                .text_filter_column(field)
                .ok_or_else(|| unsupported_filter(resource, field))?;
            if needle.trim().is_empty() {
                continue;
            }
            predicates.push(Predicate::ContainsText {
                column,
                needle: needle.clone(),
            });
        }

        for (field, value) in &filters.exact {
            let (column, kind) = resource
                .exact_filter_column(field)
                .ok_or_else(|| unsupported_filter(resource, field))?;
            let value = value
                .coerce_to(kind)
                .ok_or_else(|| QueryError::InvalidFilterValue {
                    resource: resource.kind,
                    field: field.clone(),
                    expected: kind,
                })?;
            predicates.push(Predicate::Equals { column, value });
        }

        for (name, ids) in &filters.membership {
            let association = resource
                .association(name)
                .filter(|a| a.filterable)
                .ok_or_else(|| unsupported_filter(resource, name))?;
            if ids.is_empty() {
                continue;
            }
            predicates.push(Predicate::MemberOf {
                association,
                ids: ids.iter().copied().collect(),
            });
        }

        Ok(Self {
            resource,
            predicates,
            joins: resource.associations.iter().collect(),
            order,
            window,
        })
    }

    /// Plan for fetching one entity by id, regardless of ownership.
    ///
    /// Ownership is checked after the fetch so a mismatch can be reported
    /// rather than looking like a missing record.
    pub fn by_id(resource: &'m ResourceMetadata, id: i64) -> Self {
        Self {
            resource,
            predicates: vec![Predicate::IdEquals(id)],
            joins: resource.associations.iter().collect(),
            order: vec![OrderTerm {
                column: ResourceMetadata::ID_COLUMN,
                direction: SortDirection::Asc,
            }],
            window: PageWindow::single(),
        }
    }

    pub fn scope(&self) -> Option<VisibilityScope> {
        self.predicates.iter().find_map(|p| match p {
            Predicate::Scope(scope) => Some(*scope),
            _ => None,
        })
    }

    pub fn association_names(&self) -> Vec<&'m str> {
        self.joins.iter().map(|a| a.name).collect()
    }
}

fn unsupported_filter(resource: &ResourceMetadata, field: &str) -> QueryError {
    QueryError::UnsupportedFilterField {
        resource: resource.kind,
        field: field.to_string(),
    }
}

fn order_terms<'m>(
    resource: &'m ResourceMetadata,
    sort: Option<&SortSpec>,
) -> QueryResult<Vec<OrderTerm<'m>>> {
    let primary = match sort {
        Some(sort) => {
            let column = resource
                .sortable_column(&sort.field)
                .ok_or_else(|| QueryError::UnsupportedSortField {
                    resource: resource.kind,
                    field: sort.field.clone(),
                })?;
            OrderTerm {
                column,
                direction: sort.direction,
            }
        }
        None => OrderTerm {
            column: resource.natural_key,
            direction: SortDirection::Asc,
        },
    };

    let mut order = vec![primary];
    if primary.column != ResourceMetadata::ID_COLUMN {
        order.push(OrderTerm {
            column: ResourceMetadata::ID_COLUMN,
            direction: SortDirection::Asc,
        });
    }
    Ok(order)
}

/// Count plan: the content plan's predicates and joins, without order or window.
#[derive(Debug, Clone, PartialEq)]
pub struct CountPlan<'m> {
    pub resource: &'m ResourceMetadata,
    pub predicates: Vec<Predicate<'m>>,
    pub joins: Vec<&'m AssociationDescriptor>,
}

impl<'m> CountPlan<'m> {
    pub fn derive(plan: &QueryPlan<'m>) -> Self {
        Self {
            resource: plan.resource,
            predicates: plan.predicates.clone(),
            joins: plan.joins.clone(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::models::ResourceKind;
    use crate::query::catalog::StaticCatalog;
    use crate::query::types::{PageRequest, ScalarKind};
    use uuid::Uuid;

    fn window(page_number: i64, page_size: i64) -> PageWindow {
        PageWindow::from_request(&PageRequest::new(page_number, page_size), 100).unwrap()
    }

    fn exercise() -> &'static ResourceMetadata {
        StaticCatalog::resource(ResourceKind::Exercise)
    }

    #[test]
    fn scope_predicate_comes_first() {
        let owner = Uuid::now_v7();
        let scope = VisibilityScope::resolve(None, Some(owner)).unwrap();
        let filters = FilterSpec::new().contains("title", "press");
        let plan = QueryPlan::build(exercise(), scope, &filters, None, window(0, 10)).unwrap();

        assert_eq!(plan.predicates[0], Predicate::Scope(scope));
        assert_eq!(plan.scope(), Some(scope));
        assert_eq!(plan.predicates.len(), 2);
    }

    #[test]
    fn natural_order_with_id_tiebreak() {
        let plan = QueryPlan::build(
            exercise(),
            VisibilityScope::DefaultOnly,
            &FilterSpec::new(),
            None,
            window(0, 10),
        )
        .unwrap();

        let columns: Vec<&str> = plan.order.iter().map(|t| t.column).collect();
        assert_eq!(columns, vec!["title", "id"]);
        assert!(plan.order.iter().all(|t| t.direction == SortDirection::Asc));
    }

    #[test]
    fn sorting_by_id_has_no_tiebreak() {
        let sort = SortSpec::desc("id");
        let plan = QueryPlan::build(
            exercise(),
            VisibilityScope::DefaultOnly,
            &FilterSpec::new(),
            Some(&sort),
            window(0, 10),
        )
        .unwrap();

        assert_eq!(
            plan.order,
            vec![OrderTerm {
                column: "id",
                direction: SortDirection::Desc
            }]
        );
    }

    #[test]
    fn unknown_sort_field_is_rejected() {
        let sort = SortSpec::asc("description");
        let err = QueryPlan::build(
            exercise(),
            VisibilityScope::DefaultOnly,
            &FilterSpec::new(),
            Some(&sort),
            window(0, 10),
        )
        .unwrap_err();

        assert!(matches!(
            err,
            QueryError::UnsupportedSortField { ref field, .. } if field == "description"
        ));
    }

    #[test]
    fn unknown_filter_fields_are_rejected() {
        let cases = [
            FilterSpec::new().contains("url", "x"),
            FilterSpec::new().equals("title", "x"),
            FilterSpec::new().member_of("exercises", [1]),
        ];
        for filters in cases {
            let err = QueryPlan::build(
                exercise(),
                VisibilityScope::DefaultOnly,
                &filters,
                None,
                window(0, 10),
            )
            .unwrap_err();
            assert!(
                matches!(err, QueryError::UnsupportedFilterField { .. }),
                "{filters:?}"
            );
        }
    }

    #[test]
    fn mistyped_exact_filter_is_rejected() {
        let cases = [
            FilterSpec::new().equals("equipment_needed", "true"),
            FilterSpec::new().equals("equipment_needed", 1_i64),
            FilterSpec::new().equals("equipment_needed", Uuid::now_v7()),
        ];
        for filters in cases {
            let err = QueryPlan::build(
                exercise(),
                VisibilityScope::DefaultOnly,
                &filters,
                None,
                window(0, 10),
            )
            .unwrap_err();
            let expected = match err {
                QueryError::InvalidFilterValue { expected, .. } => expected,
                other => panic!("unexpected error {other:?}"),
            };
            assert_eq!(expected, ScalarKind::Bool, "{filters:?}");
        }
    }

    #[test]
    fn blank_text_and_empty_membership_are_omitted() {
        let filters = FilterSpec::new()
            .contains("title", "   ")
            .member_of("body_parts", []);
        let plan = QueryPlan::build(
            exercise(),
            VisibilityScope::DefaultOnly,
            &filters,
            None,
            window(0, 10),
        )
        .unwrap();

        assert_eq!(
            plan.predicates,
            vec![Predicate::Scope(VisibilityScope::DefaultOnly)]
        );
    }

    #[test]
    fn filters_become_predicates_in_map_order() {
        let filters = FilterSpec::new()
            .contains("title", "Press")
            .contains("description", "bar")
            .equals("equipment_needed", true)
            .member_of("body_parts", [4, 2]);
        let plan = QueryPlan::build(
            exercise(),
            VisibilityScope::DefaultOnly,
            &filters,
            None,
            window(0, 10),
        )
        .unwrap();

        assert_eq!(plan.predicates.len(), 5);
        assert!(matches!(
            plan.predicates[1],
            Predicate::ContainsText {
                column: "description",
                ..
            }
        ));
        assert!(matches!(
            plan.predicates[2],
            Predicate::ContainsText {
                column: "title",
                ..
            }
        ));
        assert!(matches!(
            plan.predicates[3],
            Predicate::Equals {
                column: "equipment_needed",
                value: ScalarValue::Bool(true)
            }
        ));
        match &plan.predicates[4] {
            Predicate::MemberOf { association, ids } => {
                assert_eq!(association.name, "body_parts");
                assert_eq!(ids, &vec![2, 4]);
            }
            other => panic!("unexpected predicate {other:?}"),
        }
    }

    #[test]
    fn joins_cover_every_association() {
        let plan = QueryPlan::by_id(exercise(), 9);
        assert_eq!(
            plan.association_names(),
            vec!["body_parts", "reference_links"]
        );
        assert_eq!(plan.predicates, vec![Predicate::IdEquals(9)]);
        assert_eq!(plan.window, PageWindow::single());
        assert_eq!(plan.scope(), None);
    }

    #[test]
    fn count_plan_keeps_predicates_and_joins() {
        let filters = FilterSpec::new().contains("title", "row");
        let plan = QueryPlan::build(
            exercise(),
            VisibilityScope::DefaultOnly,
            &filters,
            Some(&SortSpec::desc("created_at")),
            window(3, 10),
        )
        .unwrap();
        let count = CountPlan::derive(&plan);

        assert_eq!(count.predicates, plan.predicates);
        assert_eq!(count.joins, plan.joins);
        assert_eq!(count.resource, plan.resource);
    }
}
