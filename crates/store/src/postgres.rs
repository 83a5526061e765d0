use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::{
    CustomerId, CustomerOrder, MirrorKey, MirrorKind, NewOrder, Order, OrderChanges, OrderFilter,
    OrderId, OrderProduct, ProductId, Result, StoreError, store::OrderStore,
};

/// PostgreSQL-backed order store.
///
/// The pool is shared by every request and sync handler.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Creates a new PostgreSQL order store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to the database behind `dsn`.
    pub async fn connect(dsn: &str) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(dsn)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        tracing::info!("database migrations applied");
        Ok(())
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        Ok(Order {
            id: OrderId::new(row.try_get("id")?),
            customer_id: CustomerId::new(row.try_get("customer_id")?),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            products: Vec::new(),
        })
    }

    fn not_found(id: OrderId) -> StoreError {
        StoreError::NotFound {
            entity: "order",
            id: id.as_i64(),
        }
    }
}

/// Maps constraint violations onto the store's error kinds.
fn classify(err: sqlx::Error, key: Option<MirrorKey>) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.is_unique_violation()
            && let Some(key) = key
        {
            return StoreError::Duplicate {
                entity: key.kind().as_str(),
                id: key.as_i64(),
            };
        }
        if db_err.is_foreign_key_violation() {
            tracing::debug!(constraint = ?db_err.constraint(), "foreign key violation");
            return StoreError::ForeignKey(db_err.message().to_string());
        }
    }
    StoreError::Database(err)
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn list_orders(&self, filter: OrderFilter) -> Result<Vec<Order>> {
        let rows = match filter.customer_id {
            Some(customer_id) => {
                sqlx::query(
                    r#"
                    SELECT id, customer_id, created_at, updated_at
                    FROM orders
                    WHERE customer_id = $1
                    ORDER BY id ASC
                    "#,
                )
                .bind(customer_id.as_i64())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT id, customer_id, created_at, updated_at
                    FROM orders
                    ORDER BY id ASC
                    "#,
                )
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter().map(Self::row_to_order).collect()
    }

    async fn get_order(&self, id: OrderId) -> Result<Order> {
        let row = sqlx::query(
            "SELECT id, customer_id, created_at, updated_at FROM orders WHERE id = $1",
        )
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_order)
            .transpose()?
            .ok_or_else(|| Self::not_found(id))
    }

    async fn create_order(&self, new: NewOrder) -> Result<Order> {
        let row = sqlx::query(
            r#"
            INSERT INTO orders (customer_id)
            VALUES ($1)
            RETURNING id, customer_id, created_at, updated_at
            "#,
        )
        .bind(new.customer_id.as_i64())
        .fetch_one(&self.pool)
        .await?;

        Self::row_to_order(row)
    }

    async fn update_order(&self, id: OrderId, changes: OrderChanges) -> Result<Order> {
        let row = sqlx::query(
            r#"
            UPDATE orders
            SET customer_id = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING id, customer_id, created_at, updated_at
            "#,
        )
        .bind(id.as_i64())
        .bind(changes.customer_id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_order)
            .transpose()?
            .ok_or_else(|| Self::not_found(id))
    }

    async fn delete_order(&self, id: OrderId) -> Result<()> {
        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id.as_i64())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Self::not_found(id));
        }
        Ok(())
    }

    async fn create_customer_order(
        &self,
        customer_id: CustomerId,
        order_id: OrderId,
    ) -> Result<CustomerOrder> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO customer_orders (customer_id, order_id) VALUES ($1, $2) RETURNING id",
        )
        .bind(customer_id.as_i64())
        .bind(order_id.as_i64())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| classify(e, None))?;

        Ok(CustomerOrder {
            id,
            customer_id,
            order_id,
        })
    }

    async fn create_order_products(
        &self,
        order_id: OrderId,
        product_ids: &[ProductId],
    ) -> Result<Vec<OrderProduct>> {
        if product_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.pool.begin().await?;
        let mut records = Vec::with_capacity(product_ids.len());

        for product_id in product_ids {
            let id: i64 = sqlx::query_scalar(
                "INSERT INTO order_products (order_id, product_id) VALUES ($1, $2) RETURNING id",
            )
            .bind(order_id.as_i64())
            .bind(product_id.as_i64())
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| classify(e, None))?;

            records.push(OrderProduct {
                id,
                order_id,
                product_id: *product_id,
            });
        }

        tx.commit().await?;
        Ok(records)
    }

    async fn insert_mirror(&self, key: MirrorKey) -> Result<()> {
        let sql = format!("INSERT INTO {} (id) VALUES ($1)", key.kind().table());
        sqlx::query(&sql)
            .bind(key.as_i64())
            .execute(&self.pool)
            .await
            .map_err(|e| classify(e, Some(key)))?;
        Ok(())
    }

    async fn upsert_mirror(&self, key: MirrorKey) -> Result<()> {
        // Mirrors carry only the key, so replacing a row is a no-op.
        let sql = format!(
            "INSERT INTO {} (id) VALUES ($1) ON CONFLICT (id) DO NOTHING",
            key.kind().table()
        );
        sqlx::query(&sql)
            .bind(key.as_i64())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_mirror(&self, key: MirrorKey) -> Result<bool> {
        let sql = format!("DELETE FROM {} WHERE id = $1", key.kind().table());
        let result = sqlx::query(&sql)
            .bind(key.as_i64())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            tracing::debug!(%key, "no mirror row to delete");
        }
        Ok(result.rows_affected() > 0)
    }

    async fn mirror_exists(&self, key: MirrorKey) -> Result<bool> {
        let sql = format!(
            "SELECT EXISTS (SELECT 1 FROM {} WHERE id = $1)",
            key.kind().table()
        );
        let exists: bool = sqlx::query_scalar(&sql)
            .bind(key.as_i64())
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn mirror_count(&self, kind: MirrorKind) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", kind.table());
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(count as u64)
    }
}
