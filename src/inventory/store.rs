//! Inventory persistence.
//!
//! `adjust_stock` keeps the ledger invariant
//! (`quantity == initial + Σ movement.quantity_change`) by performing the
//! quantity update and the movement append inside one transaction, with the
//! item row locked for the duration.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItem {
    pub id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub min_stock_level: i32,
    pub max_stock_level: i32,
    pub location: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StockMovement {
    pub id: Uuid,
    pub inventory_item_id: Uuid,
    pub quantity_change: i32,
    pub reason: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub async fn list_items(db: &PgPool) -> Result<Vec<InventoryItem>> {
    Ok(sqlx::query_as::<_, InventoryItem>("SELECT * FROM inventory_items ORDER BY created_at")
        .fetch_all(db)
        .await?)
}

pub async fn get_item(db: &PgPool, id: Uuid) -> Result<InventoryItem> {
    sqlx::query_as::<_, InventoryItem>("SELECT * FROM inventory_items WHERE id = $1")
        .bind(id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Inventory item not found.".to_string()))
}

pub async fn create_item(
    db: &PgPool,
    product_id: Uuid,
    quantity: i32,
    min_stock_level: i32,
    max_stock_level: i32,
    location: Option<&str>,
) -> Result<InventoryItem> {
    sqlx::query_as::<_, InventoryItem>(
        "INSERT INTO inventory_items (id, product_id, quantity, min_stock_level, max_stock_level, location)
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING *",
    )
    .bind(Uuid::now_v7())
    .bind(product_id)
    .bind(quantity)
    .bind(min_stock_level)
    .bind(max_stock_level)
    .bind(location)
    .fetch_one(db)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            AppError::Validation("Inventory item for this product already exists.".to_string())
        }
        _ => e.into(),
    })
}

pub async fn update_item(
    db: &PgPool,
    id: Uuid,
    quantity: i32,
    min_stock_level: i32,
    max_stock_level: i32,
    location: Option<&str>,
) -> Result<InventoryItem> {
    sqlx::query_as::<_, InventoryItem>(
        "UPDATE inventory_items
         SET quantity = $2, min_stock_level = $3, max_stock_level = $4, location = $5, updated_at = NOW()
         WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(quantity)
    .bind(min_stock_level)
    .bind(max_stock_level)
    .bind(location)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| AppError::NotFound("Inventory item not found.".to_string()))
}

/// Checks a proposed adjustment, rejecting any that would take the running
/// quantity negative.
pub fn checked_new_quantity(current: i32, change: i32) -> Option<i32> {
    let next = current + change;
    (next >= 0).then_some(next)
}

pub async fn adjust_stock(
    db: &PgPool,
    item_id: Uuid,
    quantity_change: i32,
    reason: &str,
    notes: Option<&str>,
) -> Result<InventoryItem> {
    let mut tx = db.begin().await?;

    let item = sqlx::query_as::<_, InventoryItem>("SELECT * FROM inventory_items WHERE id = $1 FOR UPDATE")
        .bind(item_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Inventory item not found.".to_string()))?;

    let new_quantity = checked_new_quantity(item.quantity, quantity_change)
        .ok_or(AppError::InsufficientStock { out_of_stock: vec![item.product_id] })?;

    let updated = sqlx::query_as::<_, InventoryItem>(
        "UPDATE inventory_items SET quantity = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
    )
    .bind(item_id)
    .bind(new_quantity)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO stock_movements (id, inventory_item_id, quantity_change, reason, notes)
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(Uuid::now_v7())
    .bind(item_id)
    .bind(quantity_change)
    .bind(reason)
    .bind(notes)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(updated)
}

/// Deducts stock for every line of an order in one transaction. Either all
/// lines are applied (quantity updates plus ledger rows) or none are; any
/// shortfall aborts with the full list of out-of-stock product ids.
pub async fn deduct_for_order(db: &PgPool, lines: &[(Uuid, i32)]) -> Result<()> {
    let mut tx = db.begin().await?;
    let mut adjustments: Vec<(InventoryItem, i32)> = Vec::with_capacity(lines.len());
    let mut out_of_stock: Vec<Uuid> = Vec::new();

    for (product_id, quantity) in lines {
        let item = sqlx::query_as::<_, InventoryItem>(
            "SELECT * FROM inventory_items WHERE product_id = $1 FOR UPDATE",
        )
        .bind(product_id)
        .fetch_optional(&mut *tx)
        .await?;

        match item {
            Some(item) => match checked_new_quantity(item.quantity, -quantity) {
                Some(new_quantity) => adjustments.push((item, new_quantity)),
                None => out_of_stock.push(item.product_id),
            },
            None => out_of_stock.push(*product_id),
        }
    }

    if !out_of_stock.is_empty() {
        return Err(AppError::InsufficientStock { out_of_stock });
    }

    for (item, new_quantity) in adjustments {
        sqlx::query("UPDATE inventory_items SET quantity = $2, updated_at = NOW() WHERE id = $1")
            .bind(item.id)
            .bind(new_quantity)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO stock_movements (id, inventory_item_id, quantity_change, reason)
             VALUES ($1, $2, $3, 'order_placed')",
        )
        .bind(Uuid::now_v7())
        .bind(item.id)
        .bind(new_quantity - item.quantity)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

pub async fn movements_for_item(db: &PgPool, item_id: Uuid) -> Result<Vec<StockMovement>> {
    Ok(sqlx::query_as::<_, StockMovement>(
        "SELECT * FROM stock_movements WHERE inventory_item_id = $1 ORDER BY created_at DESC",
    )
    .bind(item_id)
    .fetch_all(db)
    .await?)
}

pub async fn low_stock_items(db: &PgPool) -> Result<Vec<InventoryItem>> {
    Ok(sqlx::query_as::<_, InventoryItem>(
        "SELECT * FROM inventory_items WHERE quantity <= min_stock_level ORDER BY quantity",
    )
    .fetch_all(db)
    .await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_new_quantity() {
        assert_eq!(checked_new_quantity(10, -4), Some(6));
        assert_eq!(checked_new_quantity(3, -3), Some(0));
        assert_eq!(checked_new_quantity(3, -5), None);
        assert_eq!(checked_new_quantity(0, 7), Some(7));
    }
}
