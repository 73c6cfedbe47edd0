//! Order and cart persistence.
//!
//! A user's cart is their single `pending` order (enforced by a partial
//! unique index). All multi-step mutations run inside one database
//! transaction with the order row locked, so concurrent cart calls for the
//! same user serialize instead of interleaving.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::clients::ProductDetails;
use crate::domain::OrderStatus;
use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: String,
    pub total_amount: Decimal,
    pub coupon_code: Option<String>,
    pub discount_amount: Decimal,
    pub final_total: Decimal,
    pub shipping_address_id: Option<Uuid>,
    pub payment_method: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn status(&self) -> Result<OrderStatus> {
        self.status.parse()
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub product_image_url: Option<String>,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
}

pub async fn find_pending(db: &PgPool, user_id: Uuid) -> Result<Option<Order>> {
    Ok(sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE user_id = $1 AND status = 'pending'")
        .bind(user_id)
        .fetch_optional(db)
        .await?)
}

pub async fn items_for(db: &PgPool, order_id: Uuid) -> Result<Vec<OrderItem>> {
    Ok(sqlx::query_as::<_, OrderItem>("SELECT * FROM order_items WHERE order_id = $1 ORDER BY created_at")
        .bind(order_id)
        .fetch_all(db)
        .await?)
}

/// Items for a batch of orders, grouped by order id (avoids per-order
/// round trips when listing histories).
pub async fn items_for_orders(db: &PgPool, order_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<OrderItem>>> {
    if order_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows = sqlx::query_as::<_, OrderItem>(
        "SELECT * FROM order_items WHERE order_id = ANY($1) ORDER BY created_at",
    )
    .bind(order_ids)
    .fetch_all(db)
    .await?;
    let mut grouped: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
    for row in rows {
        grouped.entry(row.order_id).or_default().push(row);
    }
    Ok(grouped)
}

async fn lock_pending(conn: &mut PgConnection, user_id: Uuid) -> Result<Option<Order>> {
    Ok(sqlx::query_as::<_, Order>(
        "SELECT * FROM orders WHERE user_id = $1 AND status = 'pending' FOR UPDATE",
    )
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?)
}

async fn find_or_create_pending(conn: &mut PgConnection, user_id: Uuid) -> Result<Order> {
    if let Some(order) = lock_pending(conn, user_id).await? {
        return Ok(order);
    }
    let inserted = sqlx::query_as::<_, Order>(
        "INSERT INTO orders (id, user_id, status) VALUES ($1, $2, 'pending')
         ON CONFLICT (user_id) WHERE status = 'pending' DO NOTHING
         RETURNING *",
    )
    .bind(Uuid::now_v7())
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?;
    match inserted {
        Some(order) => Ok(order),
        // Lost a create race; the winner's row exists now.
        None => Ok(sqlx::query_as::<_, Order>(
            "SELECT * FROM orders WHERE user_id = $1 AND status = 'pending' FOR UPDATE",
        )
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await?),
    }
}

/// Recomputes `total_amount` from the line items and keeps
/// `final_total == total_amount - discount_amount`. An already-applied
/// discount is clamped to the new total, so shrinking the cart can never
/// push the final total negative.
async fn recalculate(conn: &mut PgConnection, order_id: Uuid) -> Result<Order> {
    Ok(sqlx::query_as::<_, Order>(
        "UPDATE orders SET
            total_amount = sub.total,
            discount_amount = LEAST(orders.discount_amount, sub.total),
            final_total = sub.total - LEAST(orders.discount_amount, sub.total),
            updated_at = NOW()
         FROM (SELECT COALESCE(SUM(unit_price * quantity), 0) AS total
               FROM order_items WHERE order_id = $1) AS sub
         WHERE orders.id = $1
         RETURNING orders.*",
    )
    .bind(order_id)
    .fetch_one(&mut *conn)
    .await?)
}

/// Adds a product to the user's cart, creating the pending order if needed.
/// The price and name are snapshotted from the catalog at insert time so
/// later product edits cannot rewrite historical orders.
pub async fn add_item(db: &PgPool, user_id: Uuid, product: &ProductDetails, quantity: i32) -> Result<(Order, Vec<OrderItem>)> {
    let mut tx = db.begin().await?;
    let order = find_or_create_pending(&mut tx, user_id).await?;

    sqlx::query(
        "INSERT INTO order_items (id, order_id, product_id, product_name, product_image_url, unit_price, quantity)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         ON CONFLICT (order_id, product_id)
         DO UPDATE SET quantity = order_items.quantity + EXCLUDED.quantity",
    )
    .bind(Uuid::now_v7())
    .bind(order.id)
    .bind(product.id)
    .bind(&product.name)
    .bind(&product.image_url)
    .bind(product.price)
    .bind(quantity)
    .execute(&mut *tx)
    .await?;

    let order = recalculate(&mut tx, order.id).await?;
    let items = sqlx::query_as::<_, OrderItem>("SELECT * FROM order_items WHERE order_id = $1 ORDER BY created_at")
        .bind(order.id)
        .fetch_all(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok((order, items))
}

pub async fn update_item_quantity(db: &PgPool, user_id: Uuid, product_id: Uuid, quantity: i32) -> Result<(Order, Vec<OrderItem>)> {
    let mut tx = db.begin().await?;
    let order = lock_pending(&mut tx, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Pending cart not found.".to_string()))?;

    let touched = sqlx::query("UPDATE order_items SET quantity = $3 WHERE order_id = $1 AND product_id = $2")
        .bind(order.id)
        .bind(product_id)
        .bind(quantity)
        .execute(&mut *tx)
        .await?;
    if touched.rows_affected() == 0 {
        return Err(AppError::NotFound("Cart item not found.".to_string()));
    }

    let order = recalculate(&mut tx, order.id).await?;
    let items = sqlx::query_as::<_, OrderItem>("SELECT * FROM order_items WHERE order_id = $1 ORDER BY created_at")
        .bind(order.id)
        .fetch_all(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok((order, items))
}

/// Removes a line item. The pending order survives even when its last item
/// goes; an empty cart is a valid state.
pub async fn remove_item(db: &PgPool, user_id: Uuid, product_id: Uuid) -> Result<(Order, Vec<OrderItem>)> {
    let mut tx = db.begin().await?;
    let order = lock_pending(&mut tx, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Pending cart not found.".to_string()))?;

    let deleted = sqlx::query("DELETE FROM order_items WHERE order_id = $1 AND product_id = $2")
        .bind(order.id)
        .bind(product_id)
        .execute(&mut *tx)
        .await?;
    if deleted.rows_affected() == 0 {
        return Err(AppError::NotFound("Cart item not found.".to_string()));
    }

    let order = recalculate(&mut tx, order.id).await?;
    let items = sqlx::query_as::<_, OrderItem>("SELECT * FROM order_items WHERE order_id = $1 ORDER BY created_at")
        .bind(order.id)
        .fetch_all(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok((order, items))
}

/// Stores a validated coupon on the pending order. Re-applying a different
/// code overwrites the previous discount; there is no stacking.
pub async fn apply_coupon(db: &PgPool, user_id: Uuid, code: &str, discount: Decimal) -> Result<Order> {
    sqlx::query_as::<_, Order>(
        "UPDATE orders SET
            coupon_code = $2,
            discount_amount = $3,
            final_total = total_amount - $3,
            updated_at = NOW()
         WHERE user_id = $1 AND status = 'pending'
         RETURNING *",
    )
    .bind(user_id)
    .bind(code)
    .bind(discount)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| AppError::NotFound("No pending order found to apply coupon.".to_string()))
}

pub async fn set_shipping_address(db: &PgPool, user_id: Uuid, shipping_address_id: Uuid) -> Result<Order> {
    sqlx::query_as::<_, Order>(
        "UPDATE orders SET shipping_address_id = $2, updated_at = NOW()
         WHERE user_id = $1 AND status = 'pending'
         RETURNING *",
    )
    .bind(user_id)
    .bind(shipping_address_id)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| AppError::NotFound("No pending order (cart) found to place.".to_string()))
}

pub async fn find_user_order(db: &PgPool, user_id: Uuid, order_id: Uuid) -> Result<Option<Order>> {
    Ok(sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1 AND user_id = $2")
        .bind(order_id)
        .bind(user_id)
        .fetch_optional(db)
        .await?)
}

/// Order history excludes the live cart.
pub async fn history(db: &PgPool, user_id: Uuid) -> Result<Vec<Order>> {
    Ok(sqlx::query_as::<_, Order>(
        "SELECT * FROM orders WHERE user_id = $1 AND status <> 'pending' ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(db)
    .await?)
}

pub async fn all_orders(db: &PgPool) -> Result<Vec<Order>> {
    Ok(sqlx::query_as::<_, Order>("SELECT * FROM orders ORDER BY created_at DESC")
        .fetch_all(db)
        .await?)
}

#[derive(Debug)]
pub struct TransitionOutcome {
    pub order: Order,
    pub previous: OrderStatus,
    pub changed: bool,
}

/// Applies a guarded status transition under a row lock. Illegal moves are
/// rejected; a move to the current status is an accepted no-op.
pub async fn transition(db: &PgPool, order_id: Uuid, next: OrderStatus) -> Result<TransitionOutcome> {
    let mut tx = db.begin().await?;
    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
        .bind(order_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Order not found.".to_string()))?;

    let previous = order.status()?;
    let changed = previous.transition_to(next)?;
    let order = if changed {
        sqlx::query_as::<_, Order>(
            "UPDATE orders SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(order_id)
        .bind(next.as_str())
        .fetch_one(&mut *tx)
        .await?
    } else {
        order
    };
    tx.commit().await?;
    Ok(TransitionOutcome { order, previous, changed })
}

/// The `pending → placed` step of order placement, recording the chosen
/// payment method in the same statement.
pub async fn mark_placed(db: &PgPool, order_id: Uuid, payment_method: &str) -> Result<Order> {
    let mut tx = db.begin().await?;
    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
        .bind(order_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Pending order not found.".to_string()))?;

    order.status()?.transition_to(OrderStatus::Placed)?;
    let order = sqlx::query_as::<_, Order>(
        "UPDATE orders SET status = 'placed', payment_method = $2, updated_at = NOW()
         WHERE id = $1 RETURNING *",
    )
    .bind(order_id)
    .bind(payment_method)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(order)
}

/// Placed-but-undelivered orders, the pool for route batching.
pub async fn batching_candidates(db: &PgPool) -> Result<Vec<Order>> {
    Ok(sqlx::query_as::<_, Order>(
        "SELECT * FROM orders WHERE status IN ('placed', 'processing') ORDER BY created_at",
    )
    .fetch_all(db)
    .await?)
}
