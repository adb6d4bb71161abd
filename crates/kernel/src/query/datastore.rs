//! Datastore port and the PostgreSQL adapter.
//!
//! The engine hands structured plans to a [`Datastore`]; adapters decide how
//! to execute them. [`PgDatastore`] renders them with SeaQuery and runs them
//! through sqlx.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use sea_query::{Value, Values};
use serde_json::Map;
use sqlx::PgPool;
use sqlx::postgres::{PgArguments, PgConnection, Postgres};
use sqlx::query::QueryScalar;
use tracing::debug;
use uuid::Uuid;

use super::catalog::{AssociationDescriptor, ResourceMetadata};
use super::fold::{JoinedItem, PrimaryRow, RawJoinRow};
use super::plan::{CountPlan, QueryPlan};
use super::render::{ITEM_PREFIX, render_content, render_count};
use crate::config::Config;
use crate::db;
use crate::models::AssociatedItem;

/// Executes query plans against a record store.
#[async_trait]
pub trait Datastore: Send + Sync {
    /// Rows for the plan's window, one per (entity, item) pair, or one bare
    /// row per entity on a join miss.
    async fn execute_content(&self, plan: &QueryPlan<'_>) -> Result<Vec<RawJoinRow>>;

    /// Number of distinct primary records matching the plan.
    async fn execute_count(&self, plan: &CountPlan<'_>) -> Result<u64>;

    /// Run both reads of a page. Runs them concurrently unless overridden.
    async fn execute_page(
        &self,
        content: &QueryPlan<'_>,
        count: &CountPlan<'_>,
    ) -> Result<(Vec<RawJoinRow>, u64)> {
        tokio::try_join!(self.execute_content(content), self.execute_count(count))
    }
}

/// PostgreSQL datastore.
///
/// Each call runs in a read-only REPEATABLE READ transaction with a
/// statement timeout, so a page's content and count see the same snapshot.
pub struct PgDatastore {
    pool: PgPool,
    statement_timeout_ms: u64,
}

impl PgDatastore {
    pub fn new(pool: PgPool, statement_timeout_ms: u64) -> Self {
        Self {
            pool,
            statement_timeout_ms,
        }
    }

    /// Connect using the pool and timeout settings from `config`.
    pub async fn connect(config: &Config) -> Result<Self> {
        let pool = db::create_pool(config).await?;
        Ok(Self::new(pool, config.statement_timeout_ms))
    }

    pub async fn is_healthy(&self) -> bool {
        db::check_health(&self.pool).await
    }

    async fn begin_snapshot(&self) -> Result<sqlx::Transaction<'static, Postgres>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin transaction")?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await
            .context("failed to set transaction isolation")?;

        sqlx::query(&format!(
            "SET LOCAL statement_timeout = {}",
            self.statement_timeout_ms
        ))
        .execute(&mut *tx)
        .await
        .context("failed to set statement timeout")?;

        Ok(tx)
    }
}

#[async_trait]
impl Datastore for PgDatastore {
    async fn execute_content(&self, plan: &QueryPlan<'_>) -> Result<Vec<RawJoinRow>> {
        let mut tx = self.begin_snapshot().await?;
        let rows = fetch_content(&mut *tx, plan).await?;
        tx.commit().await.context("failed to commit transaction")?;
        Ok(rows)
    }

    async fn execute_count(&self, plan: &CountPlan<'_>) -> Result<u64> {
        let mut tx = self.begin_snapshot().await?;
        let total = fetch_count(&mut *tx, plan).await?;
        tx.commit().await.context("failed to commit transaction")?;
        Ok(total)
    }

    async fn execute_page(
        &self,
        content: &QueryPlan<'_>,
        count: &CountPlan<'_>,
    ) -> Result<(Vec<RawJoinRow>, u64)> {
        let mut tx = self.begin_snapshot().await?;
        let total = fetch_count(&mut *tx, count).await?;
        let rows = fetch_content(&mut *tx, content).await?;
        tx.commit().await.context("failed to commit transaction")?;
        Ok((rows, total))
    }
}

async fn fetch_content(conn: &mut PgConnection, plan: &QueryPlan<'_>) -> Result<Vec<RawJoinRow>> {
    let mut rows = Vec::new();

    for content in render_content(plan) {
        let statement = &content.statement;
        debug!(
            resource = %plan.resource.kind,
            association = content.association.map_or("", |a| a.name),
            sql = %statement.sql,
            "executing content query"
        );

        let query = sqlx::query_scalar::<_, serde_json::Value>(&statement.sql);
        let json_rows = bind_values(query, &statement.values)?
            .fetch_all(&mut *conn)
            .await
            .context("failed to execute content query")?;

        for json in json_rows {
            rows.push(decode_row(plan.resource, content.association, json)?);
        }
    }

    Ok(rows)
}

async fn fetch_count(conn: &mut PgConnection, plan: &CountPlan<'_>) -> Result<u64> {
    let statement = render_count(plan);
    debug!(resource = %plan.resource.kind, sql = %statement.sql, "executing count query");

    let query = sqlx::query_scalar::<_, i64>(&statement.sql);
    let total: i64 = bind_values(query, &statement.values)?
        .fetch_one(&mut *conn)
        .await
        .context("failed to execute count query")?;

    u64::try_from(total).context("count query returned a negative total")
}

/// Bind SeaQuery values in placeholder order.
fn bind_values<'q, O>(
    mut query: QueryScalar<'q, Postgres, O, PgArguments>,
    values: &Values,
) -> Result<QueryScalar<'q, Postgres, O, PgArguments>>
where
    O: Send + Unpin,
{
    for value in &values.0 {
        query = match value {
            Value::Bool(v) => query.bind(*v),
            Value::Int(v) => query.bind(*v),
            Value::BigInt(v) => query.bind(*v),
            Value::BigUnsigned(v) => {
                let v = v
                    .map(i64::try_from)
                    .transpose()
                    .context("unsigned bind value out of range")?;
                query.bind(v)
            }
            Value::String(v) => query.bind(v.as_deref().cloned()),
            Value::Uuid(v) => query.bind(v.as_deref().copied()),
            other => bail!("unsupported bind value: {other:?}"),
        };
    }
    Ok(query)
}

/// Decode one `row_to_json` object into a joined row.
///
/// Item columns carry the `item__` prefix; a NULL `item__id` is a join miss.
fn decode_row(
    resource: &ResourceMetadata,
    association: Option<&AssociationDescriptor>,
    json: serde_json::Value,
) -> Result<RawJoinRow> {
    let serde_json::Value::Object(mut columns) = json else {
        bail!("{} row is not a JSON object", resource.kind);
    };

    let id = columns
        .remove(ResourceMetadata::ID_COLUMN)
        .and_then(|v| v.as_i64())
        .with_context(|| format!("{} row has no integer id", resource.kind))?;
    let is_custom = columns
        .remove(ResourceMetadata::IS_CUSTOM_COLUMN)
        .and_then(|v| v.as_bool())
        .with_context(|| format!("{} {id} has no is_custom flag", resource.kind))?;
    let owner_id = match columns.remove(ResourceMetadata::OWNER_COLUMN) {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => {
            let owner = Uuid::parse_str(&s)
                .with_context(|| format!("{} {id} has invalid owner_id", resource.kind))?;
            Some(owner)
        }
        Some(other) => bail!("{} {id} has non-string owner_id: {other}", resource.kind),
    };

    let item_keys: Vec<String> = columns
        .keys()
        .filter(|k| k.starts_with(ITEM_PREFIX))
        .cloned()
        .collect();
    let mut item_id = None;
    let mut item_attributes = Map::new();
    for key in item_keys {
        let Some(value) = columns.remove(&key) else {
            continue;
        };
        let name = &key[ITEM_PREFIX.len()..];
        if name == ResourceMetadata::ID_COLUMN {
            item_id = value.as_i64();
        } else {
            item_attributes.insert(name.to_string(), value);
        }
    }

    let primary = PrimaryRow::new(id, is_custom, owner_id, columns)?;
    let joined = match (association, item_id) {
        (Some(association), Some(item_id)) => Some(JoinedItem {
            association: association.name.to_string(),
            item: AssociatedItem {
                id: item_id,
                attributes: item_attributes,
            },
        }),
        _ => None,
    };

    Ok(RawJoinRow { primary, joined })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::models::ResourceKind;
    use crate::query::catalog::StaticCatalog;
    use serde_json::json;

    fn exercise() -> &'static ResourceMetadata {
        StaticCatalog::resource(ResourceKind::Exercise)
    }

    fn body_parts() -> &'static AssociationDescriptor {
        exercise().association("body_parts").unwrap()
    }

    #[test]
    fn decode_joined_row() {
        let row = decode_row(
            exercise(),
            Some(body_parts()),
            json!({
                "id": 4,
                "is_custom": false,
                "owner_id": null,
                "title": "Squat",
                "equipment_needed": true,
                "item__id": 10,
                "item__name": "legs"
            }),
        )
        .unwrap();

        assert_eq!(row.primary.id, 4);
        assert!(!row.primary.is_custom);
        assert_eq!(row.primary.attributes["title"], "Squat");
        assert!(!row.primary.attributes.contains_key("item__name"));
        let joined = row.joined.unwrap();
        assert_eq!(joined.association, "body_parts");
        assert_eq!(joined.item.id, 10);
        assert_eq!(joined.item.attributes["name"], "legs");
    }

    #[test]
    fn decode_join_miss() {
        let owner = Uuid::now_v7();
        let row = decode_row(
            exercise(),
            Some(body_parts()),
            json!({
                "id": 5,
                "is_custom": true,
                "owner_id": owner.to_string(),
                "title": "Custom press",
                "item__id": null,
                "item__name": null
            }),
        )
        .unwrap();

        assert_eq!(row.primary.owner_id, Some(owner));
        assert!(row.joined.is_none());
        assert!(!row.primary.attributes.contains_key("item__id"));
    }

    #[test]
    fn decode_rejects_broken_ownership() {
        let result = decode_row(
            exercise(),
            None,
            json!({ "id": 5, "is_custom": true, "owner_id": null }),
        );
        assert!(result.is_err());
    }

    #[test]
    fn decode_rejects_missing_id() {
        let result = decode_row(exercise(), None, json!({ "is_custom": false }));
        assert!(result.is_err());
        let result = decode_row(exercise(), None, json!([1, 2]));
        assert!(result.is_err());
    }
}
