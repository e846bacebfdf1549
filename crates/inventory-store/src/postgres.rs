use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{LineItemId, OrderId, ProductId, ReservationId, UserId, Version};
use domain::{
    CustomerOrder, LineItem, Money, OrderLike, OrderRecord, PriceList, Product,
    Reservation, ReservationUpsert, StockOrder,
};
use sqlx::{PgConnection, PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    OrderQuery, Result, StoreError,
    store::{InventoryStore, ProductSnapshot, SweepOutcome, UpsertOutcome},
};

const RESERVATION_COLUMNS: &str =
    "id, product_id, order_id, author_id, quantity, for_stock, reserved_at, expires_at";

const LINE_ITEM_COLUMNS: &str = "id, order_id, product_id, author_id, item_count, reserved_id, \
     in_progress, for_stock, unit_price_cents";

/// PostgreSQL-backed inventory store.
///
/// Each trait method runs in its own transaction.
#[derive(Clone)]
pub struct PostgresInventoryStore {
    pool: PgPool,
}

impl PostgresInventoryStore {
    /// Creates a new PostgreSQL inventory store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn count(row: &PgRow, column: &str) -> Result<u32> {
        let raw: i64 = row.try_get(column)?;
        u32::try_from(raw).map_err(|e| StoreError::Database(sqlx::Error::Decode(Box::new(e))))
    }

    fn row_to_reservation(row: &PgRow) -> Result<Reservation> {
        Ok(Reservation {
            id: ReservationId::from_uuid(row.try_get::<Uuid, _>("id")?),
            product: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
            order: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            author: UserId::from_uuid(row.try_get::<Uuid, _>("author_id")?),
            quantity: Self::count(row, "quantity")?,
            for_stock: row.try_get("for_stock")?,
            reserved_at: row.try_get::<DateTime<Utc>, _>("reserved_at")?,
            expires_at: row.try_get::<DateTime<Utc>, _>("expires_at")?,
        })
    }

    fn row_to_line_item(row: &PgRow) -> Result<LineItem> {
        Ok(LineItem {
            id: LineItemId::from_uuid(row.try_get::<Uuid, _>("id")?),
            order: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            product: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
            author: UserId::from_uuid(row.try_get::<Uuid, _>("author_id")?),
            item_count: Self::count(row, "item_count")?,
            reserved: row
                .try_get::<Option<Uuid>, _>("reserved_id")?
                .map(ReservationId::from_uuid),
            in_progress: row.try_get("in_progress")?,
            for_stock: row.try_get("for_stock")?,
            unit_price: row
                .try_get::<Option<i64>, _>("unit_price_cents")?
                .map(Money::from_cents),
        })
    }

    fn row_to_order(row: &PgRow) -> Result<OrderRecord> {
        let body: serde_json::Value = row.try_get("body")?;
        let mut order: OrderRecord = serde_json::from_value(body)?;
        // The column is authoritative for optimistic saves.
        order.set_version(Version::new(row.try_get("version")?));
        Ok(order)
    }

    async fn load_product(conn: &mut PgConnection, id: ProductId) -> Result<Option<Product>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT id, external_id, title, physical_count, retail_price_cents,
                   wholesale_price_cents, distributor_price_cents, reservation_version
            FROM products
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *conn)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let reservations: Vec<Uuid> = sqlx::query_scalar(
            "SELECT id FROM reservations WHERE product_id = $1 ORDER BY reserved_at, id",
        )
        .bind(id.as_uuid())
        .fetch_all(&mut *conn)
        .await?;

        Ok(Some(Product {
            id,
            external_id: row.try_get("external_id")?,
            title: row.try_get("title")?,
            physical_count: Self::count(&row, "physical_count")?,
            prices: PriceList {
                retail: Money::from_cents(row.try_get("retail_price_cents")?),
                wholesale: Money::from_cents(row.try_get("wholesale_price_cents")?),
                distributor: Money::from_cents(row.try_get("distributor_price_cents")?),
            },
            reservations: reservations.into_iter().map(ReservationId::from_uuid).collect(),
            reservation_version: Version::new(row.try_get("reservation_version")?),
        }))
    }

    async fn reservations_by(
        &self,
        column: &'static str,
        value: Uuid,
    ) -> Result<Vec<Reservation>> {
        let sql = format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE {column} = $1 ORDER BY reserved_at, id"
        );
        let rows = sqlx::query(&sql).bind(value).fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_reservation).collect()
    }

    /// Deletes a reservation and its references inside an open transaction.
    async fn delete_in_tx(
        conn: &mut PgConnection,
        id: ReservationId,
    ) -> Result<Option<Reservation>> {
        let sql = format!("DELETE FROM reservations WHERE id = $1 RETURNING {RESERVATION_COLUMNS}");
        let row: Option<PgRow> = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *conn)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let reservation = Self::row_to_reservation(&row)?;

        sqlx::query("UPDATE line_items SET reserved_id = NULL WHERE reserved_id = $1")
            .bind(id.as_uuid())
            .execute(&mut *conn)
            .await?;

        sqlx::query(
            "UPDATE products SET reservation_version = reservation_version + 1 WHERE id = $1",
        )
        .bind(reservation.product.as_uuid())
        .execute(&mut *conn)
        .await?;

        Ok(Some(reservation))
    }

    fn map_order_insert_error(e: sqlx::Error, author: UserId) -> StoreError {
        if let sqlx::Error::Database(ref db_err) = e {
            match db_err.constraint() {
                Some("one_in_progress_customer_order") => {
                    return StoreError::DuplicateInProgressOrder(author);
                }
                Some("one_empty_stock_order") => return StoreError::EmptyStockOrderExists(author),
                _ => {}
            }
        }
        StoreError::Database(e)
    }

    fn item_count(order: &OrderRecord) -> i32 {
        i32::try_from(order.items().len()).unwrap_or(i32::MAX)
    }
}

#[async_trait]
impl InventoryStore for PostgresInventoryStore {
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        let mut conn = self.pool.acquire().await?;
        Self::load_product(&mut conn, id).await
    }

    async fn save_product(&self, product: Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, external_id, title, physical_count, retail_price_cents,
                                  wholesale_price_cents, distributor_price_cents)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                external_id = EXCLUDED.external_id,
                title = EXCLUDED.title,
                physical_count = EXCLUDED.physical_count,
                retail_price_cents = EXCLUDED.retail_price_cents,
                wholesale_price_cents = EXCLUDED.wholesale_price_cents,
                distributor_price_cents = EXCLUDED.distributor_price_cents,
                reservation_version = products.reservation_version + 1
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(&product.external_id)
        .bind(&product.title)
        .bind(i64::from(product.physical_count))
        .bind(product.prices.retail.cents())
        .bind(product.prices.wholesale.cents())
        .bind(product.prices.distributor.cents())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_product_count(&self, id: ProductId, physical_count: u32) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE products
            SET physical_count = $2, reservation_version = reservation_version + 1
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(i64::from(physical_count))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::ProductNotFound(id));
        }
        Ok(())
    }

    async fn product_snapshot(&self, id: ProductId) -> Result<Option<ProductSnapshot>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .execute(&mut *tx)
            .await?;

        let Some(product) = Self::load_product(&mut tx, id).await? else {
            return Ok(None);
        };

        let sql = format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE product_id = $1 ORDER BY reserved_at, id"
        );
        let rows = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_all(&mut *tx)
            .await?;
        let reservations = rows
            .iter()
            .map(Self::row_to_reservation)
            .collect::<Result<Vec<_>>>()?;

        tx.commit().await?;
        Ok(Some(ProductSnapshot {
            product,
            reservations,
        }))
    }

    async fn get_reservation(&self, id: ReservationId) -> Result<Option<Reservation>> {
        let sql = format!("SELECT {RESERVATION_COLUMNS} FROM reservations WHERE id = $1");
        let row: Option<PgRow> = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_reservation).transpose()
    }

    async fn find_reservation(
        &self,
        product: ProductId,
        order: OrderId,
    ) -> Result<Option<Reservation>> {
        let sql = format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE product_id = $1 AND order_id = $2"
        );
        let row: Option<PgRow> = sqlx::query(&sql)
            .bind(product.as_uuid())
            .bind(order.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_reservation).transpose()
    }

    async fn reservations_for_product(&self, product: ProductId) -> Result<Vec<Reservation>> {
        self.reservations_by("product_id", product.as_uuid()).await
    }

    async fn reservations_for_order(&self, order: OrderId) -> Result<Vec<Reservation>> {
        self.reservations_by("order_id", order.as_uuid()).await
    }

    async fn reservations_for_author(&self, author: UserId) -> Result<Vec<Reservation>> {
        self.reservations_by("author_id", author.as_uuid()).await
    }

    async fn expired_reservations(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Reservation>> {
        let sql = format!(
            r#"
            SELECT {RESERVATION_COLUMNS} FROM reservations r
            WHERE r.expires_at <= $1
              AND EXISTS (
                  SELECT 1 FROM line_items li
                  WHERE li.reserved_id = r.id AND li.in_progress
              )
            ORDER BY r.expires_at, r.id
            LIMIT $2
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(now)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_reservation).collect()
    }

    async fn upsert_reservation(
        &self,
        upsert: ReservationUpsert,
        expected: Option<Version>,
    ) -> Result<UpsertOutcome> {
        let mut tx = self.pool.begin().await?;

        // Advance the version only if it still matches what the caller read.
        let bumped: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE products SET reservation_version = reservation_version + 1
            WHERE id = $1 AND ($2::BIGINT IS NULL OR reservation_version = $2)
            RETURNING reservation_version
            "#,
        )
        .bind(upsert.product.as_uuid())
        .bind(expected.map(|v| v.as_i64()))
        .fetch_optional(&mut *tx)
        .await?;

        let Some(product_version) = bumped.map(Version::new) else {
            let actual: Option<i64> =
                sqlx::query_scalar("SELECT reservation_version FROM products WHERE id = $1")
                    .bind(upsert.product.as_uuid())
                    .fetch_optional(&mut *tx)
                    .await?;

            return match (actual, expected) {
                (Some(actual), Some(expected)) => {
                    metrics::counter!("store_concurrency_conflicts_total").increment(1);
                    Err(StoreError::ConcurrencyConflict {
                        product: upsert.product,
                        expected,
                        actual: Version::new(actual),
                    })
                }
                _ => Err(StoreError::ProductNotFound(upsert.product)),
            };
        };

        let fresh = upsert.new_reservation();
        let sql = format!(
            r#"
            INSERT INTO reservations ({RESERVATION_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (product_id, order_id) DO UPDATE SET
                quantity = EXCLUDED.quantity,
                reserved_at = EXCLUDED.reserved_at
            RETURNING {RESERVATION_COLUMNS}, (xmax = 0) AS created
            "#
        );
        let row = sqlx::query(&sql)
            .bind(fresh.id.as_uuid())
            .bind(fresh.product.as_uuid())
            .bind(fresh.order.as_uuid())
            .bind(fresh.author.as_uuid())
            .bind(i64::from(fresh.quantity))
            .bind(fresh.for_stock)
            .bind(fresh.reserved_at)
            .bind(fresh.expires_at)
            .fetch_one(&mut *tx)
            .await?;

        let reservation = Self::row_to_reservation(&row)?;
        let created: bool = row.try_get("created")?;

        tx.commit().await?;
        tracing::debug!(
            reservation_id = %reservation.id,
            product_id = %reservation.product,
            created,
            "reservation upserted"
        );

        Ok(UpsertOutcome {
            reservation,
            created,
            product_version,
        })
    }

    async fn delete_reservation(&self, id: ReservationId) -> Result<Option<Reservation>> {
        let mut tx = self.pool.begin().await?;
        let deleted = Self::delete_in_tx(&mut tx, id).await?;
        tx.commit().await?;
        Ok(deleted)
    }

    async fn release_expired_reservation(
        &self,
        id: ReservationId,
        now: DateTime<Utc>,
    ) -> Result<SweepOutcome> {
        let mut tx = self.pool.begin().await?;

        let expires_at: Option<DateTime<Utc>> =
            sqlx::query_scalar("SELECT expires_at FROM reservations WHERE id = $1 FOR UPDATE")
                .bind(id.as_uuid())
                .fetch_optional(&mut *tx)
                .await?;

        match expires_at {
            Some(at) if at <= now => {}
            _ => return Ok(SweepOutcome::Gone),
        }

        // Locks the line item so a concurrent commit waits for the decision.
        let in_progress: Option<bool> = sqlx::query_scalar(
            "SELECT in_progress FROM line_items WHERE reserved_id = $1 LIMIT 1 FOR UPDATE",
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?;

        let outcome = match in_progress {
            None => SweepOutcome::Orphaned,
            Some(false) => SweepOutcome::Committed,
            Some(true) => Self::delete_in_tx(&mut tx, id)
                .await?
                .map_or(SweepOutcome::Gone, SweepOutcome::Released),
        };

        tx.commit().await?;
        Ok(outcome)
    }

    async fn get_line_item(&self, id: LineItemId) -> Result<Option<LineItem>> {
        let sql = format!("SELECT {LINE_ITEM_COLUMNS} FROM line_items WHERE id = $1");
        let row: Option<PgRow> = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_line_item).transpose()
    }

    async fn find_line_item(&self, order: OrderId, product: ProductId) -> Result<Option<LineItem>> {
        let sql = format!(
            "SELECT {LINE_ITEM_COLUMNS} FROM line_items WHERE order_id = $1 AND product_id = $2 LIMIT 1"
        );
        let row: Option<PgRow> = sqlx::query(&sql)
            .bind(order.as_uuid())
            .bind(product.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_line_item).transpose()
    }

    async fn line_items_for_order(&self, order: OrderId) -> Result<Vec<LineItem>> {
        let sql =
            format!("SELECT {LINE_ITEM_COLUMNS} FROM line_items WHERE order_id = $1 ORDER BY seq");
        let rows = sqlx::query(&sql)
            .bind(order.as_uuid())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_line_item).collect()
    }

    async fn save_line_item(&self, item: LineItem) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO line_items (id, order_id, product_id, author_id, item_count, reserved_id,
                                    in_progress, for_stock, unit_price_cents)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO UPDATE SET
                item_count = EXCLUDED.item_count,
                reserved_id = EXCLUDED.reserved_id,
                in_progress = EXCLUDED.in_progress,
                unit_price_cents = EXCLUDED.unit_price_cents
            "#,
        )
        .bind(item.id.as_uuid())
        .bind(item.order.as_uuid())
        .bind(item.product.as_uuid())
        .bind(item.author.as_uuid())
        .bind(i64::from(item.item_count))
        .bind(item.reserved.map(|r| r.as_uuid()))
        .bind(item.in_progress)
        .bind(item.for_stock)
        .bind(item.unit_price.map(|p| p.cents()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_line_item(&self, id: LineItemId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM line_items WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<OrderRecord>> {
        let row: Option<PgRow> = sqlx::query("SELECT version, body FROM orders WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_order).transpose()
    }

    async fn find_in_progress_customer_order(
        &self,
        author: UserId,
    ) -> Result<Option<CustomerOrder>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT version, body FROM orders
            WHERE author_id = $1 AND kind = 'customer' AND status = 'in_progress'
            "#,
        )
        .bind(author.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row
            .as_ref()
            .map(Self::row_to_order)
            .transpose()?
            .and_then(OrderRecord::into_customer))
    }

    async fn in_progress_stock_orders(&self, author: UserId) -> Result<Vec<StockOrder>> {
        let rows = sqlx::query(
            r#"
            SELECT version, body FROM orders
            WHERE author_id = $1 AND kind = 'stock' AND status = 'in_progress'
            ORDER BY created_at DESC
            "#,
        )
        .bind(author.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in &rows {
            if let Some(order) = Self::row_to_order(row)?.into_stock() {
                orders.push(order);
            }
        }
        Ok(orders)
    }

    async fn insert_order(&self, order: OrderRecord) -> Result<OrderRecord> {
        let body = serde_json::to_value(&order)?;
        let author = order.author();

        sqlx::query(
            r#"
            INSERT INTO orders (id, kind, author_id, status, version, created_at, item_count, body)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(order.kind().as_str())
        .bind(author.as_uuid())
        .bind(order.status_str())
        .bind(order.version().as_i64())
        .bind(order.created_at())
        .bind(Self::item_count(&order))
        .bind(body)
        .execute(&self.pool)
        .await
        .map_err(|e| Self::map_order_insert_error(e, author))?;

        Ok(order)
    }

    async fn save_order(&self, mut order: OrderRecord) -> Result<OrderRecord> {
        let id = order.id();
        let expected = order.version();
        order.set_version(expected.next());
        let body = serde_json::to_value(&order)?;

        let result = sqlx::query(
            r#"
            UPDATE orders SET status = $2, version = $3, item_count = $4, body = $5
            WHERE id = $1 AND version = $6
            "#,
        )
        .bind(id.as_uuid())
        .bind(order.status_str())
        .bind(order.version().as_i64())
        .bind(Self::item_count(&order))
        .bind(body)
        .bind(expected.as_i64())
        .execute(&self.pool)
        .await
        .map_err(|e| Self::map_order_insert_error(e, order.author()))?;

        if result.rows_affected() == 0 {
            let actual: Option<i64> = sqlx::query_scalar("SELECT version FROM orders WHERE id = $1")
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;

            return match actual {
                Some(actual) => Err(StoreError::OrderVersionConflict {
                    order: id,
                    expected,
                    actual: Version::new(actual),
                }),
                None => Err(StoreError::OrderNotFound(id)),
            };
        }

        Ok(order)
    }

    async fn delete_order(&self, id: OrderId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn discard_empty_order(&self, id: OrderId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM orders o
            WHERE o.id = $1
              AND o.item_count = 0
              AND NOT EXISTS (SELECT 1 FROM line_items li WHERE li.order_id = o.id)
            "#,
        )
        .bind(id.as_uuid())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_orders(&self, query: OrderQuery) -> Result<Vec<OrderRecord>> {
        let mut sql = String::from("SELECT version, body FROM orders WHERE 1=1");
        let mut param_count = 0;

        // Build dynamic query
        if query.kind.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND kind = ${param_count}"));
        }
        if query.author.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND author_id = ${param_count}"));
        }
        if query.statuses.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND status = ANY(${param_count})"));
        }

        sql.push_str(" ORDER BY created_at DESC, id");

        if query.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }
        if query.offset.is_some() {
            param_count += 1;
            sql.push_str(&format!(" OFFSET ${param_count}"));
        }

        let mut sqlx_query = sqlx::query(&sql);

        if let Some(kind) = query.kind {
            sqlx_query = sqlx_query.bind(kind.as_str());
        }
        if let Some(author) = query.author {
            sqlx_query = sqlx_query.bind(author.as_uuid());
        }
        if let Some(statuses) = query.statuses {
            let statuses: Vec<String> = statuses.into_iter().map(String::from).collect();
            sqlx_query = sqlx_query.bind(statuses);
        }
        if let Some(limit) = query.limit {
            sqlx_query = sqlx_query.bind(limit as i64);
        }
        if let Some(offset) = query.offset {
            sqlx_query = sqlx_query.bind(offset as i64);
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_order).collect()
    }
}
