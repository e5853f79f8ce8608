//! `PostgreSQL` storage backend.
//!
//! Queries are runtime-checked (`sqlx::query*` functions) so the crate builds
//! without a live database. JSONB array columns are decoded into `Vec<String>`
//! here and nowhere else.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};

use storehub_core::{
    Email, OrderId, OrderItemId, OrderStatus, PaymentMethod, ProductId, Quantity, StoreId,
};

use super::{Catalog, LedgerTx, OrderLedger, ReportSource, StatusChange, escape_like};
use crate::db::{RepositoryError, map_unique_violation};
use crate::models::{
    LineItem, LowStockProduct, NewOrder, NewProduct, Order, OrderDetail, OrderFilter, OrderItem,
    OrderStats, Product, RecentOrder, RevenuePoint, Store,
};

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct StoreRow {
    id: i64,
    slug: String,
    name: String,
    description: Option<String>,
    logo_url: Option<String>,
    contact_number: Option<String>,
}

impl From<StoreRow> for Store {
    fn from(row: StoreRow) -> Self {
        Self {
            id: StoreId::new(row.id),
            slug: row.slug,
            name: row.name,
            description: row.description,
            logo_url: row.logo_url,
            contact_number: row.contact_number,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: i64,
    store_id: i64,
    name: String,
    price: Decimal,
    stock: i32,
    description: Option<String>,
    image_url: Option<String>,
    available_sizes: Json<Vec<String>>,
    available_colors: Json<Vec<String>>,
    created_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Self {
            id: ProductId::new(row.id),
            store_id: StoreId::new(row.store_id),
            name: row.name,
            price: row.price,
            stock: row.stock,
            description: row.description,
            image_url: row.image_url,
            available_sizes: row.available_sizes.0,
            available_colors: row.available_colors.0,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: i64,
    store_id: i64,
    customer_name: String,
    customer_email: String,
    location: String,
    phone: String,
    payment_method: PaymentMethod,
    total_price: Decimal,
    status: OrderStatus,
    created_at: DateTime<Utc>,
    delivered_at: Option<DateTime<Utc>>,
}

impl TryFrom<OrderRow> for Order {
    type Error = RepositoryError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let customer_email = Email::parse(&row.customer_email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email on order {}: {e}", row.id))
        })?;

        Ok(Self {
            id: OrderId::new(row.id),
            store_id: StoreId::new(row.store_id),
            customer_name: row.customer_name,
            customer_email,
            location: row.location,
            phone: row.phone,
            payment_method: row.payment_method,
            total_price: row.total_price,
            status: row.status,
            created_at: row.created_at,
            delivered_at: row.delivered_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderItemRow {
    id: i64,
    product_id: i64,
    product_name: Option<String>,
    quantity: i32,
    price: Decimal,
    selected_size: Option<String>,
    selected_color: Option<String>,
}

impl From<OrderItemRow> for OrderItem {
    fn from(row: OrderItemRow) -> Self {
        Self {
            id: OrderItemId::new(row.id),
            product_id: ProductId::new(row.product_id),
            product_name: row.product_name,
            quantity: row.quantity,
            price: row.price,
            selected_size: row.selected_size,
            selected_color: row.selected_color,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RevenueRow {
    date: NaiveDate,
    revenue: Decimal,
}

#[derive(Debug, sqlx::FromRow)]
struct LowStockRow {
    id: i64,
    name: String,
    stock: i32,
}

#[derive(Debug, sqlx::FromRow)]
struct RecentOrderRow {
    id: i64,
    customer_name: String,
    phone: String,
    total_price: Decimal,
    status: OrderStatus,
    created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct StatsRow {
    total_orders: i64,
    total_revenue: Decimal,
}

// =============================================================================
// Ledger
// =============================================================================

/// `PostgreSQL`-backed storage. Cheap to clone (wraps the pool).
#[derive(Debug, Clone)]
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    /// Wrap an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool (health checks, shutdown).
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create a store. Used by seeding; store management lives elsewhere.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the slug is taken.
    pub async fn create_store(
        &self,
        slug: &str,
        name: &str,
        description: Option<&str>,
    ) -> Result<Store, RepositoryError> {
        let row = sqlx::query_as::<_, StoreRow>(
            r"
            INSERT INTO storehub.store (slug, name, description)
            VALUES ($1, $2, $3)
            RETURNING id, slug, name, description, logo_url, contact_number
            ",
        )
        .bind(slug)
        .bind(name)
        .bind(description)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "store slug"))?;

        Ok(row.into())
    }

    /// Create a product. Used by seeding; product management lives elsewhere.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails (including a
    /// non-positive price or negative stock).
    pub async fn create_product(
        &self,
        store_id: StoreId,
        product: &NewProduct,
    ) -> Result<Product, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(
            r"
            INSERT INTO storehub.product (
                store_id, name, price, stock, description, image_url,
                available_sizes, available_colors
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING
                id, store_id, name, price, stock, description, image_url,
                available_sizes, available_colors, created_at
            ",
        )
        .bind(store_id)
        .bind(&product.name)
        .bind(product.price)
        .bind(product.stock)
        .bind(product.description.as_deref())
        .bind(product.image_url.as_deref())
        .bind(Json(&product.available_sizes))
        .bind(Json(&product.available_colors))
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    /// Current stock of a product regardless of store or deletion.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn stock_of(&self, product_id: ProductId) -> Result<Option<i32>, RepositoryError> {
        let stock = sqlx::query_scalar::<_, i32>("SELECT stock FROM storehub.product WHERE id = $1")
            .bind(product_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(stock)
    }
}

/// An open `PostgreSQL` transaction. Rolls back on drop unless committed.
#[derive(Debug)]
pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

impl LedgerTx for PgTx {
    async fn product_stock(
        &mut self,
        store_id: StoreId,
        product_id: ProductId,
    ) -> Result<Option<i32>, RepositoryError> {
        let stock = sqlx::query_scalar::<_, i32>(
            r"
            SELECT stock
            FROM storehub.product
            WHERE id = $1 AND store_id = $2 AND NOT deleted
            ",
        )
        .bind(product_id)
        .bind(store_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(stock)
    }

    async fn insert_order(
        &mut self,
        store_id: StoreId,
        order: &NewOrder,
    ) -> Result<OrderId, RepositoryError> {
        let customer = order.customer();
        let id = sqlx::query_scalar::<_, i64>(
            r"
            INSERT INTO storehub.customer_order (
                store_id, customer_name, customer_email, location, phone,
                payment_method, total_price, idempotency_key
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            ",
        )
        .bind(store_id)
        .bind(&customer.name)
        .bind(customer.email.as_str())
        .bind(&customer.location)
        .bind(&customer.phone)
        .bind(order.payment_method())
        .bind(order.total_price())
        .bind(order.idempotency_key())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_unique_violation(e, "idempotency key"))?;

        Ok(OrderId::new(id))
    }

    async fn insert_item(&mut self, order_id: OrderId, item: &LineItem) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO storehub.order_item (
                order_id, product_id, quantity, price, selected_size, selected_color
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            ",
        )
        .bind(order_id)
        .bind(item.product_id)
        .bind(item.quantity.get())
        .bind(item.unit_price)
        .bind(item.size.as_deref())
        .bind(item.color.as_deref())
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn decrement_stock(
        &mut self,
        store_id: StoreId,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<bool, RepositoryError> {
        // The guard is re-evaluated against the row version this statement
        // locks, so a concurrent committed decrement is always observed.
        let result = sqlx::query(
            r"
            UPDATE storehub.product
            SET stock = stock - $1, updated_at = NOW()
            WHERE id = $2 AND store_id = $3 AND NOT deleted AND stock >= $1
            ",
        )
        .bind(quantity.get())
        .bind(product_id)
        .bind(store_id)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn commit(self) -> Result<(), RepositoryError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<(), RepositoryError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

impl OrderLedger for PgLedger {
    type Tx = PgTx;

    async fn begin(&self) -> Result<PgTx, RepositoryError> {
        let tx = self.pool.begin().await?;
        Ok(PgTx { tx })
    }

    async fn find_order_by_key(
        &self,
        store_id: StoreId,
        key: &str,
    ) -> Result<Option<OrderId>, RepositoryError> {
        let id = sqlx::query_scalar::<_, i64>(
            r"
            SELECT id
            FROM storehub.customer_order
            WHERE store_id = $1 AND idempotency_key = $2
            ",
        )
        .bind(store_id)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(id.map(OrderId::new))
    }

    async fn set_status(
        &self,
        order_id: OrderId,
        store_id: StoreId,
        change: StatusChange,
    ) -> Result<u64, RepositoryError> {
        // Mirrors `OrderStatus::delivered_at_after`.
        let result = sqlx::query(
            r"
            UPDATE storehub.customer_order
            SET status = $1,
                delivered_at = CASE
                    WHEN $1 = 'delivered'::storehub.order_status
                        THEN COALESCE(delivered_at, $2)
                    ELSE NULL
                END
            WHERE id = $3 AND store_id = $4
            ",
        )
        .bind(change.status)
        .bind(change.at)
        .bind(order_id)
        .bind(store_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

impl ReportSource for PgLedger {
    async fn delivered_count(&self, store_id: StoreId) -> Result<i64, RepositoryError> {
        let count = sqlx::query_scalar::<_, i64>(
            r"
            SELECT COUNT(*)
            FROM storehub.customer_order
            WHERE store_id = $1 AND status = 'delivered'
            ",
        )
        .bind(store_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn revenue_series(
        &self,
        store_id: StoreId,
        first: NaiveDate,
        last: NaiveDate,
    ) -> Result<Vec<RevenuePoint>, RepositoryError> {
        // Left join against the generated calendar so empty days stay in the series.
        let rows = sqlx::query_as::<_, RevenueRow>(
            r"
            SELECT d::date AS date,
                   COALESCE(SUM(o.total_price), 0) AS revenue
            FROM generate_series(
                CAST($2 AS date)::timestamp,
                CAST($3 AS date)::timestamp,
                INTERVAL '1 day'
            ) AS d
            LEFT JOIN storehub.customer_order o
                ON (o.delivered_at AT TIME ZONE 'UTC')::date = d::date
               AND o.status = 'delivered'
               AND o.store_id = $1
            GROUP BY d
            ORDER BY d ASC
            ",
        )
        .bind(store_id)
        .bind(first)
        .bind(last)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| RevenuePoint {
                date: r.date,
                revenue: r.revenue,
            })
            .collect())
    }

    async fn product_count(&self, store_id: StoreId) -> Result<i64, RepositoryError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM storehub.product WHERE store_id = $1 AND NOT deleted",
        )
        .bind(store_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn low_stock(
        &self,
        store_id: StoreId,
        threshold: i32,
    ) -> Result<Vec<LowStockProduct>, RepositoryError> {
        let rows = sqlx::query_as::<_, LowStockRow>(
            r"
            SELECT id, name, stock
            FROM storehub.product
            WHERE store_id = $1 AND stock <= $2 AND NOT deleted
            ORDER BY stock ASC, id ASC
            ",
        )
        .bind(store_id)
        .bind(threshold)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| LowStockProduct {
                id: ProductId::new(r.id),
                name: r.name,
                stock: r.stock,
            })
            .collect())
    }

    async fn recent_orders(
        &self,
        store_id: StoreId,
        limit: i64,
    ) -> Result<Vec<RecentOrder>, RepositoryError> {
        let rows = sqlx::query_as::<_, RecentOrderRow>(
            r"
            SELECT id, customer_name, phone, total_price, status, created_at
            FROM storehub.customer_order
            WHERE store_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            ",
        )
        .bind(store_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| RecentOrder {
                id: OrderId::new(r.id),
                customer_name: r.customer_name,
                phone: r.phone,
                total_price: r.total_price,
                status: r.status,
                created_at: r.created_at,
            })
            .collect())
    }
}

impl Catalog for PgLedger {
    async fn store_by_slug(&self, slug: &str) -> Result<Option<Store>, RepositoryError> {
        let row = sqlx::query_as::<_, StoreRow>(
            r"
            SELECT id, slug, name, description, logo_url, contact_number
            FROM storehub.store
            WHERE slug = $1
            ",
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn products(&self, store_id: StoreId) -> Result<Vec<Product>, RepositoryError> {
        let rows = sqlx::query_as::<_, ProductRow>(
            r"
            SELECT id, store_id, name, price, stock, description, image_url,
                   available_sizes, available_colors, created_at
            FROM storehub.product
            WHERE store_id = $1 AND NOT deleted
            ORDER BY id
            ",
        )
        .bind(store_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn orders(
        &self,
        store_id: StoreId,
        filter: &OrderFilter,
    ) -> Result<Vec<Order>, RepositoryError> {
        let mut query = QueryBuilder::<Postgres>::new(
            r"
            SELECT id, store_id, customer_name, customer_email, location, phone,
                   payment_method, total_price, status, created_at, delivered_at
            FROM storehub.customer_order
            WHERE store_id = ",
        );
        query.push_bind(store_id);

        if let Some(name) = &filter.customer_name {
            query
                .push(" AND customer_name ILIKE ")
                .push_bind(format!("%{}%", escape_like(name)));
        }
        if let Some(phone) = &filter.customer_phone {
            query
                .push(" AND phone ILIKE ")
                .push_bind(format!("%{}%", escape_like(phone)));
        }
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status);
        }
        query.push(" ORDER BY created_at DESC, id DESC");

        let rows = query
            .build_query_as::<OrderRow>()
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Order::try_from).collect()
    }

    async fn order_detail(
        &self,
        store_id: StoreId,
        order_id: OrderId,
    ) -> Result<Option<OrderDetail>, RepositoryError> {
        let Some(row) = sqlx::query_as::<_, OrderRow>(
            r"
            SELECT id, store_id, customer_name, customer_email, location, phone,
                   payment_method, total_price, status, created_at, delivered_at
            FROM storehub.customer_order
            WHERE id = $1 AND store_id = $2
            ",
        )
        .bind(order_id)
        .bind(store_id)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let items = sqlx::query_as::<_, OrderItemRow>(
            r"
            SELECT oi.id, oi.product_id, p.name AS product_name, oi.quantity,
                   oi.price, oi.selected_size, oi.selected_color
            FROM storehub.order_item oi
            LEFT JOIN storehub.product p ON p.id = oi.product_id
            WHERE oi.order_id = $1
            ORDER BY oi.id
            ",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(OrderDetail {
            order: row.try_into()?,
            items: items.into_iter().map(Into::into).collect(),
        }))
    }

    async fn order_stats(&self, store_id: StoreId) -> Result<OrderStats, RepositoryError> {
        let row = sqlx::query_as::<_, StatsRow>(
            r"
            SELECT COUNT(*) AS total_orders,
                   COALESCE(SUM(total_price) FILTER (WHERE status = 'delivered'), 0)
                       AS total_revenue
            FROM storehub.customer_order
            WHERE store_id = $1
            ",
        )
        .bind(store_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(OrderStats {
            total_orders: row.total_orders,
            total_revenue: row.total_revenue,
        })
    }
}
