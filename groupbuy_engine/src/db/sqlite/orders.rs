use log::{debug, trace};
use sqlx::SqliteConnection;

use crate::{
    db::{
        sqlite::SqliteDatabaseError,
        traits::{InsertOrderResult, OrderSyncUpdate},
    },
    db_types::{GroupBuyId, NewOrder, NewProgressEntry, Order, OrderId, OrderItem, OrderStatusType, ProgressEntry},
};

const ORDER_COLUMNS: &str =
    "id, order_id, owner_id, current_status, all_groups_secured, priority_score, version, created_at, updated_at";

/// Inserts the order unless one with the same order id exists. The insert is attempted first, so that inside a
/// transaction the write lock is taken before anything is read.
pub async fn idempotent_insert(
    order: NewOrder,
    conn: &mut SqliteConnection,
) -> Result<InsertOrderResult, SqliteDatabaseError> {
    let inserted: Option<i64> = sqlx::query_scalar(
        r#"
            INSERT INTO orders (order_id, owner_id, created_at, updated_at)
            VALUES ($1, $2, $3, $3)
            ON CONFLICT (order_id) DO NOTHING
            RETURNING id;
        "#,
    )
    .bind(&order.order_id)
    .bind(&order.owner_id)
    .bind(order.created_at)
    .fetch_optional(&mut *conn)
    .await?;
    match inserted {
        Some(id) => {
            insert_order_children(id, &order, conn).await?;
            Ok(InsertOrderResult::Inserted(id))
        },
        None => {
            let id = order_exists(&order.order_id, conn).await?.ok_or_else(|| {
                SqliteDatabaseError::QueryError(format!("Order {} was neither inserted nor found", order.order_id))
            })?;
            Ok(InsertOrderResult::AlreadyExists(id))
        },
    }
}

/// Inserts the items and the initial progress entry of a freshly inserted order.
async fn insert_order_children(
    id: i64,
    order: &NewOrder,
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    for item in &order.items {
        sqlx::query(
            r#"
                INSERT INTO order_items (order_ref, product_ref, quantity, price, group_buy_id)
                VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(id)
        .bind(&item.product_ref)
        .bind(item.quantity)
        .bind(item.price)
        .bind(item.group_buy_id)
        .execute(&mut *conn)
        .await?;
    }
    let entry = NewProgressEntry::new(
        OrderStatusType::Placed.as_str(),
        format!("Order placed with {} item(s)", order.items.len()),
        order.created_at,
    );
    insert_progress_entry(id, &entry, conn).await?;
    debug!("🗃️ Order {} saved with id {id} and {} items", order.order_id, order.items.len());
    Ok(())
}

/// Checks whether the order with the given `OrderId` already exists in the database. If it does exist, the `id` of the
/// order is returned. If it does not exist, `None` is returned.
pub async fn order_exists(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<Option<i64>, SqliteDatabaseError> {
    let id = sqlx::query_scalar("SELECT id FROM orders WHERE order_id = $1").bind(order_id).fetch_optional(conn).await?;
    Ok(id)
}

pub async fn fetch_order_by_order_id(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, SqliteDatabaseError> {
    let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE order_id = $1");
    let order = sqlx::query_as::<_, Order>(&sql).bind(order_id).fetch_optional(&mut *conn).await?;
    match order {
        Some(o) => Ok(Some(load_children(o, conn).await?)),
        None => Ok(None),
    }
}

/// Fetches every order that has at least one line item in the given group buy, oldest first.
pub async fn fetch_orders_for_group_buy(
    id: GroupBuyId,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, SqliteDatabaseError> {
    let sql = format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE id IN (SELECT order_ref FROM order_items WHERE group_buy_id = $1) \
         ORDER BY created_at ASC"
    );
    let orders = sqlx::query_as::<_, Order>(&sql).bind(id).fetch_all(&mut *conn).await?;
    trace!("🗃️ {} orders reference group buy {id}", orders.len());
    let mut result = Vec::with_capacity(orders.len());
    for order in orders {
        result.push(load_children(order, conn).await?);
    }
    Ok(result)
}

async fn load_children(mut order: Order, conn: &mut SqliteConnection) -> Result<Order, SqliteDatabaseError> {
    order.items = sqlx::query_as::<_, OrderItem>(
        r#"
            SELECT id, product_ref, quantity, price, group_buy_id, group_status, group_buy_status
            FROM order_items
            WHERE order_ref = $1
            ORDER BY id ASC
        "#,
    )
    .bind(order.id)
    .fetch_all(&mut *conn)
    .await?;
    order.progress = sqlx::query_as::<_, ProgressEntry>(
        "SELECT id, status, message, timestamp FROM order_progress WHERE order_ref = $1 ORDER BY id ASC",
    )
    .bind(order.id)
    .fetch_all(conn)
    .await?;
    Ok(order)
}

pub async fn insert_progress_entry(
    order_id: i64,
    entry: &NewProgressEntry,
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    sqlx::query("INSERT INTO order_progress (order_ref, status, message, timestamp) VALUES ($1, $2, $3, $4)")
        .bind(order_id)
        .bind(&entry.status)
        .bind(&entry.message)
        .bind(entry.timestamp)
        .execute(conn)
        .await?;
    Ok(())
}

/// Applies a cross-sync update. The order row is written first, and only if its version still matches the one the
/// update was planned from, so two steps for different group buys of the same order cannot both commit against the
/// same snapshot. Item writes are still conditional on the mirrored status.
/// If any write misses, `false` is returned and the caller must roll back the transaction.
pub async fn apply_order_sync(
    update: &OrderSyncUpdate,
    conn: &mut SqliteConnection,
) -> Result<bool, SqliteDatabaseError> {
    let result = sqlx::query(
        r#"
            UPDATE orders SET
                current_status = COALESCE($1, current_status),
                all_groups_secured = $2,
                priority_score = $3,
                updated_at = $4,
                version = version + 1
            WHERE id = $5 AND version = $6
        "#,
    )
    .bind(update.status_change.map(|(_, to)| to))
    .bind(update.all_groups_secured)
    .bind(update.priority_score)
    .bind(update.timestamp)
    .bind(update.order_id)
    .bind(update.expected_version)
    .execute(&mut *conn)
    .await?;
    if result.rows_affected() != 1 {
        debug!(
            "🗃️ Order {} moved past version {} under us. Sync step abandoned.",
            update.order_id, update.expected_version
        );
        return Ok(false);
    }
    for item in &update.items {
        let result = sqlx::query(
            r#"
                UPDATE order_items SET group_buy_status = $1, group_status = $2
                WHERE id = $3 AND order_ref = $4 AND group_buy_status = $5
            "#,
        )
        .bind(item.group_buy_status)
        .bind(item.group_status)
        .bind(item.item_id)
        .bind(update.order_id)
        .bind(item.expected)
        .execute(&mut *conn)
        .await?;
        if result.rows_affected() != 1 {
            debug!("🗃️ Item {} of order {} changed under us. Sync step abandoned.", item.item_id, update.order_id);
            return Ok(false);
        }
    }
    for entry in &update.progress {
        insert_progress_entry(update.order_id, entry, &mut *conn).await?;
    }
    Ok(true)
}

pub async fn update_order_status(
    order_id: i64,
    from: OrderStatusType,
    to: OrderStatusType,
    entry: &NewProgressEntry,
    conn: &mut SqliteConnection,
) -> Result<bool, SqliteDatabaseError> {
    let result = sqlx::query(
        "UPDATE orders SET current_status = $1, updated_at = $2, version = version + 1 WHERE id = $3 AND current_status \
         = $4",
    )
    .bind(to)
    .bind(entry.timestamp)
    .bind(order_id)
    .bind(from)
    .execute(&mut *conn)
    .await?;
    if result.rows_affected() != 1 {
        return Ok(false);
    }
    insert_progress_entry(order_id, entry, conn).await?;
    Ok(true)
}
