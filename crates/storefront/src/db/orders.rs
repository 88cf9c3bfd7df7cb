//! Order repository.
//!
//! Orders are only written when the payment processor reports a completed
//! checkout; the payment session id is unique, so replaying a webhook cannot
//! create a second order. Signed-in users read them back as order history.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use emporium_core::{OrderId, OrderStatus, Price, ProductId, Quantity, UserId};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

use super::RepositoryError;
use crate::payments::OrderStore;

/// Order header to insert.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: UserId,
    pub total: Price,
    pub payment_session_id: String,
    pub payment_intent_id: Option<String>,
    pub shipping_address: Option<serde_json::Value>,
}

/// One purchased line, priced at checkout time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct NewOrderItem {
    pub product_id: ProductId,
    pub quantity: Quantity,
    pub price: Price,
}

impl NewOrderItem {
    /// `price * quantity`.
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.price.times(self.quantity)
    }
}

/// A recorded order with its items, newest first in history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderSummary {
    pub id: OrderId,
    pub status: OrderStatus,
    pub total: Price,
    pub created_at: DateTime<Utc>,
    pub items: Vec<OrderLine>,
}

/// One item of a recorded order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub quantity: Quantity,
    /// Unit price at checkout time.
    pub price: Price,
    /// Current product name and first image, if the product still exists.
    pub product: Option<OrderedProduct>,
}

/// Display data for an ordered product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderedProduct {
    pub name: String,
    pub image: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: OrderId,
    status: OrderStatus,
    total: Price,
    created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct OrderItemRow {
    order_id: OrderId,
    product_id: ProductId,
    quantity: i32,
    price: Price,
    name: Option<String>,
    image: Option<String>,
}

impl TryFrom<OrderItemRow> for OrderLine {
    type Error = RepositoryError;

    fn try_from(row: OrderItemRow) -> Result<Self, Self::Error> {
        let quantity = Quantity::try_from(row.quantity).map_err(|e| {
            RepositoryError::DataCorruption(format!("order item for {}: {e}", row.product_id))
        })?;
        Ok(Self {
            product_id: row.product_id,
            quantity,
            price: row.price,
            product: row.name.map(|name| OrderedProduct {
                name,
                image: row.image,
            }),
        })
    }
}

/// Repository for order database operations.
pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert an order in `processing` status.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if an order already exists for the
    /// payment session.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn create(&self, order: &NewOrder) -> Result<OrderId, RepositoryError> {
        sqlx::query_scalar(
            r"
            INSERT INTO storefront.orders
                (user_id, status, total, payment_session_id, payment_intent_id, shipping_address)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            ",
        )
        .bind(order.user_id)
        .bind(OrderStatus::Processing)
        .bind(order.total)
        .bind(&order.payment_session_id)
        .bind(order.payment_intent_id.as_deref())
        .bind(order.shipping_address.as_ref().map(Json))
        .fetch_one(self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return RepositoryError::Conflict(format!(
                    "order already recorded for session {}",
                    order.payment_session_id
                ));
            }
            RepositoryError::Database(e)
        })
    }

    /// Look up the order recorded for a payment session.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_by_payment_session(
        &self,
        payment_session_id: &str,
    ) -> Result<Option<OrderId>, RepositoryError> {
        let id = sqlx::query_scalar(
            r"
            SELECT id FROM storefront.orders
            WHERE payment_session_id = $1
            ",
        )
        .bind(payment_session_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(id)
    }

    /// A user's orders with their items, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::DataCorruption` if a stored quantity is out
    /// of range, or `RepositoryError::Database` if a query fails.
    pub async fn list_for_user(&self, user_id: UserId) -> Result<Vec<OrderSummary>, RepositoryError> {
        let orders = sqlx::query_as::<_, OrderRow>(
            r"
            SELECT id, status, total, created_at
            FROM storefront.orders
            WHERE user_id = $1
            ORDER BY created_at DESC, id
            ",
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        if orders.is_empty() {
            return Ok(Vec::new());
        }

        let order_ids: Vec<Uuid> = orders.iter().map(|o| o.id.as_uuid()).collect();
        let rows = sqlx::query_as::<_, OrderItemRow>(
            r"
            SELECT oi.order_id, oi.product_id, oi.quantity, oi.price,
                   p.name, p.images[1] AS image
            FROM storefront.order_items oi
            LEFT JOIN storefront.products p ON p.id = oi.product_id
            WHERE oi.order_id = ANY($1)
            ORDER BY oi.created_at, oi.id
            ",
        )
        .bind(&order_ids)
        .fetch_all(self.pool)
        .await?;

        let mut items: HashMap<OrderId, Vec<OrderLine>> = HashMap::new();
        for row in rows {
            let order_id = row.order_id;
            items.entry(order_id).or_default().push(row.try_into()?);
        }

        Ok(orders
            .into_iter()
            .map(|order| OrderSummary {
                items: items.remove(&order.id).unwrap_or_default(),
                id: order.id,
                status: order.status,
                total: order.total,
                created_at: order.created_at,
            })
            .collect())
    }

    /// Insert all items of an order in one statement.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn insert_items(
        &self,
        order_id: OrderId,
        items: &[NewOrderItem],
    ) -> Result<(), RepositoryError> {
        if items.is_empty() {
            return Ok(());
        }

        let product_ids: Vec<ProductId> = items.iter().map(|i| i.product_id).collect();
        let quantities: Vec<i32> = items.iter().map(|i| i.quantity.get()).collect();
        let prices: Vec<Decimal> = items.iter().map(|i| i.price.amount()).collect();

        sqlx::query(
            r"
            INSERT INTO storefront.order_items (order_id, product_id, quantity, price)
            SELECT $1, item.product_id, item.quantity, item.price
            FROM UNNEST($2::uuid[], $3::int[], $4::numeric[])
                AS item(product_id, quantity, price)
            ",
        )
        .bind(order_id)
        .bind(&product_ids)
        .bind(&quantities)
        .bind(&prices)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Reduce a product's stock, clamped at zero.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the call fails.
    pub async fn decrement_stock(
        &self,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<(), RepositoryError> {
        sqlx::query("SELECT storefront.decrement_stock($1, $2)")
            .bind(product_id)
            .bind(quantity.get())
            .execute(self.pool)
            .await?;

        Ok(())
    }
}

/// Order store backed by `storefront.orders`.
#[derive(Debug, Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    /// Create a store over a connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn repo(&self) -> OrderRepository<'_> {
        OrderRepository::new(&self.pool)
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn create_order(&self, order: &NewOrder) -> Result<OrderId, RepositoryError> {
        self.repo().create(order).await
    }

    async fn find_by_payment_session(
        &self,
        payment_session_id: &str,
    ) -> Result<Option<OrderId>, RepositoryError> {
        self.repo().find_by_payment_session(payment_session_id).await
    }

    async fn insert_items(
        &self,
        order_id: OrderId,
        items: &[NewOrderItem],
    ) -> Result<(), RepositoryError> {
        self.repo().insert_items(order_id, items).await
    }

    async fn decrement_stock(
        &self,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<(), RepositoryError> {
        self.repo().decrement_stock(product_id, quantity).await
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<OrderSummary>, RepositoryError> {
        self.repo().list_for_user(user_id).await
    }
}
