//! Query engine façade.
//!
//! Orchestrates scope resolution, plan building, datastore execution,
//! folding, aggregation and page assembly for every resource kind.

use std::sync::Arc;
use std::time::Instant;

use tracing::debug;
use uuid::Uuid;

use super::aggregate::apply_aggregates;
use super::catalog::{AllowListProvider, ResourceMetadata};
use super::datastore::Datastore;
use super::fold::{RawJoinRow, fold_rows};
use super::page::{PageResult, PageWindow};
use super::plan::{CountPlan, QueryPlan};
use super::scope::VisibilityScope;
use super::types::PageQuery;
use crate::config::EngineConfig;
use crate::error::{Ownership, QueryError, QueryResult};
use crate::models::{ResourceEntity, ResourceKind};

/// Stateless query engine shared behind an `Arc`.
pub struct QueryEngine {
    datastore: Arc<dyn Datastore>,
    catalog: Arc<dyn AllowListProvider>,
    config: EngineConfig,
}

impl QueryEngine {
    pub fn new(
        datastore: Arc<dyn Datastore>,
        catalog: Arc<dyn AllowListProvider>,
        config: EngineConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            datastore,
            catalog,
            config,
        })
    }

    /// Fetch one page of a resource kind.
    pub async fn get_page(
        &self,
        kind: ResourceKind,
        query: &PageQuery,
    ) -> QueryResult<PageResult<ResourceEntity>> {
        let started = Instant::now();

        let scope = VisibilityScope::resolve(query.is_custom, query.owner_id)?;
        let window = PageWindow::from_request(&query.page, self.config.max_page_size)?;

        let resource = self.catalog.metadata(kind);
        let plan = QueryPlan::build(resource, scope, &query.filters, query.sort.as_ref(), window)?;
        let count = CountPlan::derive(&plan);

        debug!(
            resource = %kind,
            scope = scope.label(),
            predicates = plan.predicates.len(),
            joins = plan.joins.len(),
            page_number = window.page_number(),
            page_size = window.page_size(),
            "executing page plan"
        );

        let (rows, total) = self.datastore.execute_page(&plan, &count).await?;
        let content = materialize(resource, rows, &plan.association_names());

        debug!(
            resource = %kind,
            returned = content.len(),
            total,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "page query completed"
        );

        Ok(PageResult::assemble(content, total, window))
    }

    /// Fetch one entity, requiring it to be on the requested side of the
    /// default/custom split and, when custom, to belong to `owner_id`.
    pub async fn get_by_id(
        &self,
        kind: ResourceKind,
        id: i64,
        required_is_custom: bool,
        owner_id: Option<Uuid>,
    ) -> QueryResult<ResourceEntity> {
        let resource = self.catalog.metadata(kind);
        let plan = QueryPlan::by_id(resource, id);

        let rows = self.datastore.execute_content(&plan).await?;
        let entity = materialize(resource, rows, &plan.association_names())
            .into_iter()
            .next()
            .ok_or(QueryError::ResourceNotFound { resource: kind, id })?;

        if entity.is_custom != required_is_custom {
            return Err(QueryError::WrongScopeRequested {
                resource: kind,
                id,
                actual: Ownership::from_is_custom(entity.is_custom),
                requested: Ownership::from_is_custom(required_is_custom),
            });
        }
        if required_is_custom && entity.owner_id != owner_id {
            return Err(QueryError::OwnerMismatch { resource: kind, id });
        }

        debug!(resource = %kind, id, "entity fetched");
        Ok(entity)
    }
}

fn materialize(
    resource: &ResourceMetadata,
    rows: Vec<RawJoinRow>,
    associations: &[&str],
) -> Vec<ResourceEntity> {
    let mut entities = fold_rows(rows, associations);
    for entity in &mut entities {
        apply_aggregates(entity, resource.aggregates);
    }
    entities
}
