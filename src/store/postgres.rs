//! Postgres-backed Order/Escrow persistence, behind the `postgres`
//! feature. Uses the same compare-and-swap update-with-expected-state
//! pattern as the in-memory store, applied here to a JSONB document per
//! row rather than one column per field — the order/escrow shapes are
//! still settling and a rigid schema would fight every future field
//! addition.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::ids::OrderId;
use crate::order::{Order, OrderState, OrderStore, StatusChange};

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Error::not_found("row"),
            other => Error::Internal(format!("postgres: {other}")),
        }
    }
}

pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let max_connections = std::env::var("PG_POOL_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;

        tracing::info!("postgres connection pool established");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// `orders_tb(id TEXT PRIMARY KEY, state SMALLINT, doc JSONB, updated_at TIMESTAMPTZ)`
    /// plus the append-only `order_status_log` transition history.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS orders_tb (
                id TEXT PRIMARY KEY,
                state SMALLINT NOT NULL,
                doc JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS order_status_log (
                id BIGSERIAL PRIMARY KEY,
                order_id TEXT NOT NULL REFERENCES orders_tb(id),
                from_state SMALLINT NOT NULL,
                to_state SMALLINT NOT NULL,
                changed_by TEXT NOT NULL,
                reason TEXT NOT NULL,
                metadata JSONB NOT NULL,
                changed_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

pub struct PgOrderStore {
    db: Database,
}

impl PgOrderStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn insert(&self, order: Order) -> Result<()> {
        let doc = serde_json::to_value(&order).map_err(|e| Error::Internal(e.to_string()))?;
        sqlx::query("INSERT INTO orders_tb (id, state, doc, updated_at) VALUES ($1, $2, $3, now())")
            .bind(order.id.to_string())
            .bind(order.state.id())
            .bind(doc)
            .execute(self.db.pool())
            .await?;
        Ok(())
    }

    async fn get(&self, id: &OrderId) -> Result<Option<Order>> {
        let row = sqlx::query("SELECT doc FROM orders_tb WHERE id = $1")
            .bind(id.to_string())
            .fetch_optional(self.db.pool())
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let doc: serde_json::Value = row.get("doc");
        let order: Order = serde_json::from_value(doc).map_err(|e| Error::Internal(e.to_string()))?;
        Ok(Some(order))
    }

    async fn update_state_if(
        &self,
        id: &OrderId,
        expected: OrderState,
        new: OrderState,
        changed_by: &str,
        reason: &str,
        metadata: serde_json::Value,
        mutate: Box<dyn FnOnce(&mut Order) + Send>,
    ) -> Result<Order> {
        let mut order = self
            .get(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("order {id}")))?;
        order.state = new;
        order.updated_at = chrono::Utc::now();
        mutate(&mut order);
        let doc = serde_json::to_value(&order).map_err(|e| Error::Internal(e.to_string()))?;

        let result = sqlx::query("UPDATE orders_tb SET state = $1, doc = $2, updated_at = now() WHERE id = $3 AND state = $4")
            .bind(new.id())
            .bind(doc)
            .bind(id.to_string())
            .bind(expected.id())
            .execute(self.db.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::invalid_transition(format!("{:?}", expected), format!("{:?}", new)));
        }

        sqlx::query(
            "INSERT INTO order_status_log (order_id, from_state, to_state, changed_by, reason, metadata, changed_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(id.to_string())
        .bind(expected.id())
        .bind(new.id())
        .bind(changed_by)
        .bind(reason)
        .bind(&metadata)
        .bind(order.updated_at)
        .execute(self.db.pool())
        .await?;

        Ok(order)
    }

    async fn due_for_auto_complete(&self, cutoff: chrono::DateTime<chrono::Utc>) -> Result<Vec<Order>> {
        let rows = sqlx::query("SELECT doc FROM orders_tb WHERE state = $1 AND updated_at <= $2")
            .bind(OrderState::Delivered.id())
            .bind(cutoff)
            .fetch_all(self.db.pool())
            .await?;
        rows.into_iter()
            .map(|row| {
                let doc: serde_json::Value = row.get("doc");
                serde_json::from_value(doc).map_err(|e| Error::Internal(e.to_string()))
            })
            .collect()
    }

    async fn status_log(&self, id: &OrderId) -> Result<Vec<StatusChange>> {
        let rows = sqlx::query(
            "SELECT order_id, from_state, to_state, changed_by, reason, metadata, changed_at \
             FROM order_status_log WHERE order_id = $1 ORDER BY id ASC",
        )
        .bind(id.to_string())
        .fetch_all(self.db.pool())
        .await?;

        rows.into_iter()
            .map(|row| {
                let from_state: i16 = row.get("from_state");
                let to_state: i16 = row.get("to_state");
                Ok(StatusChange {
                    order_id: *id,
                    from: OrderState::from_id(from_state)
                        .ok_or_else(|| Error::Internal(format!("unknown order state id {from_state}")))?,
                    to: OrderState::from_id(to_state)
                        .ok_or_else(|| Error::Internal(format!("unknown order state id {to_state}")))?,
                    changed_by: row.get("changed_by"),
                    reason: row.get("reason"),
                    metadata: row.get("metadata"),
                    timestamp: row.get("changed_at"),
                })
            })
            .collect()
    }
}
