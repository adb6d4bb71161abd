//! Plan rendering using SeaQuery.
//!
//! Plans become PostgreSQL statements with positional parameters:
//! - Content: the window is applied to primary records in a subquery, then
//!   one LEFT JOIN statement is rendered per association
//! - Each content statement is wrapped to return one `row_to_json` object per
//!   row, ordered again by the outer select
//! - Count: `COUNT(DISTINCT id)` over the same predicates and joins
//!
//! Identifiers come from catalog metadata. Every caller-supplied value,
//! including LIMIT and OFFSET, is a bound parameter.

use sea_query::{
    Alias, Cond, Condition, Expr, Func, Order, PostgresQueryBuilder, Query, SelectStatement,
    SimpleExpr, Value, Values,
};

use super::catalog::{AssociationDescriptor, JoinPath, ResourceMetadata};
use super::plan::{CountPlan, Predicate, QueryPlan};
use super::scope::{ScopedOwner, VisibilityScope};
use super::types::{ScalarValue, SortDirection};

/// Alias of the paged primary subquery.
pub const PAGE_ALIAS: &str = "page";
/// Alias of the link table in a content statement.
pub const LINK_ALIAS: &str = "link";
/// Alias of the item table in a content statement.
pub const ITEM_ALIAS: &str = "item";
/// Prefix of projected item columns, e.g. `item__id`.
pub const ITEM_PREFIX: &str = "item__";
/// Alias of a content select inside its `row_to_json` wrapper.
pub const JSON_ROW_ALIAS: &str = "content_row";

/// SQL text and the values for its `$n` placeholders.
#[derive(Debug, Clone)]
pub struct RenderedStatement {
    pub sql: String,
    pub values: Values,
}

impl RenderedStatement {
    fn from_select(query: &SelectStatement) -> Self {
        let (sql, values) = query.build(PostgresQueryBuilder);
        Self { sql, values }
    }
}

/// A content statement and the association its item columns belong to.
#[derive(Debug, Clone)]
pub struct ContentStatement<'m> {
    pub association: Option<&'m AssociationDescriptor>,
    pub statement: RenderedStatement,
}

/// Render the content statements for a plan.
///
/// Without associations this is a single statement returning one row per
/// primary record.
pub fn render_content<'m>(plan: &QueryPlan<'m>) -> Vec<ContentStatement<'m>> {
    if plan.joins.is_empty() {
        return vec![ContentStatement {
            association: None,
            statement: as_json_rows(paged_primary(plan), plan, None),
        }];
    }

    plan.joins
        .iter()
        .map(|association| ContentStatement {
            association: Some(*association),
            statement: as_json_rows(joined_page(plan, association), plan, Some(association)),
        })
        .collect()
}

/// Render the count statement for a plan.
pub fn render_count(plan: &CountPlan<'_>) -> RenderedStatement {
    let resource = plan.resource;
    let mut query = Query::select();

    // Identifiers are catalog-validated.
    query.expr(Expr::cust(format!(
        "COUNT(DISTINCT \"{}\".\"{}\")",
        resource.table,
        ResourceMetadata::ID_COLUMN
    )));
    query.from(Alias::new(resource.table));

    for association in &plan.joins {
        join_association(
            &mut query,
            association,
            resource.table,
            &format!("{}_link", association.name),
            association.name,
        );
    }

    add_predicates(&mut query, resource, &plan.predicates);

    RenderedStatement::from_select(&query)
}

/// SELECT primary columns FROM table WHERE ... ORDER BY ... LIMIT/OFFSET
fn paged_primary(plan: &QueryPlan<'_>) -> SelectStatement {
    let resource = plan.resource;
    let table = resource.table;
    let mut query = Query::select();

    for column in primary_columns(resource) {
        query.column(qualified(table, column));
    }
    query.from(Alias::new(table));

    add_predicates(&mut query, resource, &plan.predicates);

    for term in &plan.order {
        query.order_by(qualified(table, term.column), order(term.direction));
    }

    query.limit(plan.window.limit());
    query.offset(plan.window.offset());

    query
}

/// The paged primary subquery LEFT JOINed to one association.
fn joined_page(plan: &QueryPlan<'_>, association: &AssociationDescriptor) -> SelectStatement {
    let mut query = Query::select();

    for column in primary_columns(plan.resource) {
        query.column(qualified(PAGE_ALIAS, column));
    }
    for column in item_columns(association) {
        query.expr_as(
            Expr::col(qualified(ITEM_ALIAS, column)),
            Alias::new(format!("{ITEM_PREFIX}{column}")),
        );
    }

    query.from_subquery(paged_primary(plan), Alias::new(PAGE_ALIAS));
    join_association(&mut query, association, PAGE_ALIAS, LINK_ALIAS, ITEM_ALIAS);

    query
}

/// SELECT row_to_json(..) FROM (inner) ORDER BY the plan's order, then item id.
///
/// A subquery's ORDER BY does not carry over, so the order is applied to the
/// projected columns of `inner`.
fn as_json_rows(
    inner: SelectStatement,
    plan: &QueryPlan<'_>,
    association: Option<&AssociationDescriptor>,
) -> RenderedStatement {
    let mut query = Query::select();
    query.expr(Expr::cust(format!("row_to_json(\"{JSON_ROW_ALIAS}\")")));
    query.from_subquery(inner, Alias::new(JSON_ROW_ALIAS));

    for term in &plan.order {
        let column = qualified(JSON_ROW_ALIAS, term.column);
        query.order_by(column, order(term.direction));
    }
    if association.is_some() {
        let item_id = format!("{ITEM_PREFIX}{}", ResourceMetadata::ID_COLUMN);
        query.order_by(qualified(JSON_ROW_ALIAS, &item_id), Order::Asc);
    }

    RenderedStatement::from_select(&query)
}

/// A column reference as `"table"."column"`.
fn qualified(table: &str, column: &str) -> (Alias, Alias) {
    (Alias::new(table), Alias::new(column))
}

fn primary_columns(resource: &ResourceMetadata) -> impl Iterator<Item = &'static str> + '_ {
    [
        ResourceMetadata::ID_COLUMN,
        ResourceMetadata::IS_CUSTOM_COLUMN,
        ResourceMetadata::OWNER_COLUMN,
    ]
    .into_iter()
    .chain(resource.columns.iter().copied())
}

fn item_columns(association: &AssociationDescriptor) -> impl Iterator<Item = &'static str> + '_ {
    let columns = association.target_columns.iter().copied();
    std::iter::once(ResourceMetadata::ID_COLUMN).chain(columns)
}

/// LEFT JOIN an association's items onto `parent`.
fn join_association(
    query: &mut SelectStatement,
    association: &AssociationDescriptor,
    parent: &str,
    link_alias: &str,
    item_alias: &str,
) {
    match association.path {
        JoinPath::Link {
            table,
            local_key,
            foreign_key,
        } => {
            query.join_as(
                sea_query::JoinType::LeftJoin,
                Alias::new(table),
                Alias::new(link_alias),
                Expr::col(qualified(link_alias, local_key))
                    .equals(qualified(parent, ResourceMetadata::ID_COLUMN)),
            );
            query.join_as(
                sea_query::JoinType::LeftJoin,
                Alias::new(association.target_table),
                Alias::new(item_alias),
                Expr::col(qualified(item_alias, ResourceMetadata::ID_COLUMN))
                    .equals(qualified(link_alias, foreign_key)),
            );
        }
        JoinPath::Child { parent_key } => {
            query.join_as(
                sea_query::JoinType::LeftJoin,
                Alias::new(association.target_table),
                Alias::new(item_alias),
                Expr::col(qualified(item_alias, parent_key))
                    .equals(qualified(parent, ResourceMetadata::ID_COLUMN)),
            );
        }
    }
}

fn add_predicates(
    query: &mut SelectStatement,
    resource: &ResourceMetadata,
    predicates: &[Predicate<'_>],
) {
    for predicate in predicates {
        query.cond_where(predicate_condition(resource, predicate));
    }
}

fn predicate_condition(resource: &ResourceMetadata, predicate: &Predicate<'_>) -> Condition {
    let table = resource.table;
    let col = |column: &str| Expr::col(qualified(table, column));

    match predicate {
        Predicate::Scope(scope) => scope_condition(table, scope),
        Predicate::IdEquals(id) => Cond::all().add(col(ResourceMetadata::ID_COLUMN).eq(*id)),
        Predicate::ContainsText { column, needle } => {
            let pattern = format!("%{}%", escape_like_wildcards(&needle.to_lowercase()));
            Cond::all().add(Expr::expr(Func::lower(col(*column))).like(pattern))
        }
        Predicate::Equals { column, value } => {
            let value = scalar_value(value);
            Cond::all().add(col(*column).eq(value))
        }
        Predicate::MemberOf { association, ids } => {
            let members = member_ids(association, ids);
            Cond::all().add(col(ResourceMetadata::ID_COLUMN).in_subquery(members))
        }
    }
}

fn scope_condition(table: &str, scope: &VisibilityScope) -> Condition {
    let col = |column: &str| Expr::col(qualified(table, column));
    let is_custom = || col(ResourceMetadata::IS_CUSTOM_COLUMN);
    let owned_by = |owner: &ScopedOwner| {
        Cond::all()
            .add(is_custom().eq(true))
            .add(col(ResourceMetadata::OWNER_COLUMN).eq(owner.id()))
    };

    match scope {
        VisibilityScope::DefaultOnly => Cond::all().add(is_custom().eq(false)),
        VisibilityScope::CustomOnly(owner) => owned_by(owner),
        VisibilityScope::Merged(owner) => {
            let defaults = is_custom().eq(false);
            Cond::any().add(defaults).add(owned_by(owner))
        }
    }
}

/// SELECT parent ids linked to any of `ids`.
fn member_ids(association: &AssociationDescriptor, ids: &[i64]) -> SelectStatement {
    let (table, parent_column, item_column) = match association.path {
        JoinPath::Link {
            table,
            local_key,
            foreign_key,
        } => (table, local_key, foreign_key),
        JoinPath::Child { parent_key } => (
            association.target_table,
            parent_key,
            ResourceMetadata::ID_COLUMN,
        ),
    };

    let item = Expr::col(qualified(table, item_column));
    let mut sub = Query::select();
    sub.column(qualified(table, parent_column))
        .from(Alias::new(table))
        .and_where(item.is_in(ids.iter().copied()));
    sub
}

fn scalar_value(value: &ScalarValue) -> SimpleExpr {
    let value: Value = match value {
        ScalarValue::Bool(b) => (*b).into(),
        ScalarValue::Integer(i) => (*i).into(),
        ScalarValue::Uuid(u) => (*u).into(),
        ScalarValue::Text(s) => s.clone().into(),
    };
    value.into()
}

fn order(direction: SortDirection) -> Order {
    match direction {
        SortDirection::Asc => Order::Asc,
        SortDirection::Desc => Order::Desc,
    }
}

/// Escape SQL LIKE wildcard characters (`%`, `_`, `\`) in a value.
fn escape_like_wildcards(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}
