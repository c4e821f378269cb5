use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::{types::Json, SqliteConnection};

use crate::{
    db::{
        sqlite::SqliteDatabaseError,
        traits::{JoinResult, JoinedGroupBuy, StatusChange, TransitionResult},
    },
    db_types::{
        AdminStatusEntry,
        ExpiryThreshold,
        GroupBuy,
        GroupBuyId,
        GroupBuyStatus,
        Money,
        NewGroupBuy,
        NewParticipant,
        Participant,
        SYSTEM_ACTOR,
    },
};

const GROUP_BUY_COLUMNS: &str = r#"
    id, product_ref, unit_price, units_sold, minimum_viable_units, status, expires_at,
    delivery_method, pickup_location, delivery_address, tracking_number, finalized_at,
    notified_6h, notified_2h, notified_1h, created_at, updated_at
"#;

/// Inserts a new active group buy. If the product already has an active group buy, nothing is inserted and `None` is
/// returned.
pub async fn insert_group_buy(
    group: &NewGroupBuy,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<GroupBuyId>, SqliteDatabaseError> {
    let id: Option<i64> = sqlx::query_scalar(
        r#"
            INSERT OR IGNORE INTO group_buys (
                product_ref,
                unit_price,
                minimum_viable_units,
                expires_at,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $5)
            RETURNING id;
        "#,
    )
    .bind(&group.product_ref)
    .bind(group.unit_price)
    .bind(group.minimum_viable_units)
    .bind(group.expires_at)
    .bind(now)
    .fetch_optional(conn)
    .await?;
    Ok(id.map(GroupBuyId))
}

pub async fn fetch_active_group_buy_for_product(
    product_ref: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<GroupBuy>, SqliteDatabaseError> {
    let sql =
        format!("SELECT {GROUP_BUY_COLUMNS} FROM group_buys WHERE product_ref = $1 AND status = 'active' LIMIT 1");
    let group = sqlx::query_as::<_, GroupBuy>(&sql).bind(product_ref).fetch_optional(&mut *conn).await?;
    match group {
        Some(g) => Ok(Some(load_children(g, conn).await?)),
        None => Ok(None),
    }
}

/// Fetches the group buy row along with its participants and status history.
pub async fn fetch_group_buy(
    id: GroupBuyId,
    conn: &mut SqliteConnection,
) -> Result<Option<GroupBuy>, SqliteDatabaseError> {
    let sql = format!("SELECT {GROUP_BUY_COLUMNS} FROM group_buys WHERE id = $1");
    let group = sqlx::query_as::<_, GroupBuy>(&sql).bind(id).fetch_optional(&mut *conn).await?;
    match group {
        Some(g) => Ok(Some(load_children(g, conn).await?)),
        None => Ok(None),
    }
}

pub async fn fetch_group_buys_with_status(
    status: GroupBuyStatus,
    conn: &mut SqliteConnection,
) -> Result<Vec<GroupBuy>, SqliteDatabaseError> {
    let sql = format!("SELECT {GROUP_BUY_COLUMNS} FROM group_buys WHERE status = $1 ORDER BY expires_at ASC");
    let groups = sqlx::query_as::<_, GroupBuy>(&sql).bind(status).fetch_all(&mut *conn).await?;
    trace!("🗃️ {} group buys with status {status}", groups.len());
    let mut result = Vec::with_capacity(groups.len());
    for group in groups {
        result.push(load_children(group, conn).await?);
    }
    Ok(result)
}

async fn load_children(mut group: GroupBuy, conn: &mut SqliteConnection) -> Result<GroupBuy, SqliteDatabaseError> {
    group.participants = fetch_participants(group.id, conn).await?;
    group.admin_status_history = fetch_history(group.id, conn).await?;
    Ok(group)
}

pub async fn fetch_participants(
    id: GroupBuyId,
    conn: &mut SqliteConnection,
) -> Result<Vec<Participant>, SqliteDatabaseError> {
    let participants = sqlx::query_as::<_, Participant>(
        r#"
            SELECT id, group_buy_id, user_id, quantity, amount, joined_at, payment_refs
            FROM participants
            WHERE group_buy_id = $1
            ORDER BY id ASC
        "#,
    )
    .bind(id)
    .fetch_all(conn)
    .await?;
    Ok(participants)
}

pub async fn fetch_history(
    id: GroupBuyId,
    conn: &mut SqliteConnection,
) -> Result<Vec<AdminStatusEntry>, SqliteDatabaseError> {
    let history = sqlx::query_as::<_, AdminStatusEntry>(
        r#"
            SELECT id, group_buy_id, status, changed_by, notes, timestamp, notification_sent
            FROM admin_status_history
            WHERE group_buy_id = $1
            ORDER BY id ASC
        "#,
    )
    .bind(id)
    .fetch_all(conn)
    .await?;
    Ok(history)
}

pub async fn insert_history_entry(
    id: GroupBuyId,
    status: GroupBuyStatus,
    changed_by: &str,
    notes: &str,
    timestamp: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<AdminStatusEntry, SqliteDatabaseError> {
    let entry = sqlx::query_as::<_, AdminStatusEntry>(
        r#"
            INSERT INTO admin_status_history (group_buy_id, status, changed_by, notes, timestamp)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, group_buy_id, status, changed_by, notes, timestamp, notification_sent;
        "#,
    )
    .bind(id)
    .bind(status)
    .bind(changed_by)
    .bind(notes)
    .bind(timestamp)
    .fetch_one(conn)
    .await?;
    Ok(entry)
}

/// Adds a participant to the group buy. This is not atomic on its own: call it inside a transaction and pass
/// `&mut *tx` as the connection argument.
///
/// The unit counter is bumped by a single conditional `UPDATE` that re-checks status, deadline and capacity against
/// the current row, and flips the status to `successful` in the same statement when the threshold is crossed. It is
/// the first statement of the transaction, so the write lock is taken before anything is read.
pub async fn join_group_buy(
    id: GroupBuyId,
    participant: NewParticipant,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<JoinResult, SqliteDatabaseError> {
    let quantity = participant.quantity;
    let updated: Option<(i64, i64, GroupBuyStatus, Money)> = sqlx::query_as(
        r#"
            UPDATE group_buys SET
                units_sold = units_sold + $1,
                status = CASE WHEN units_sold + $1 >= minimum_viable_units THEN 'successful' ELSE status END,
                updated_at = $2
            WHERE id = $3
              AND status = 'active'
              AND julianday(expires_at) >= julianday($2)
              AND units_sold + $1 <= minimum_viable_units
            RETURNING units_sold, minimum_viable_units, status, unit_price;
        "#,
    )
    .bind(quantity)
    .bind(now)
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some((units_sold, mvu, status, unit_price)) = updated else {
        return explain_rejected_join(id, now, conn).await;
    };
    trace!("🗃️ Group buy {id} now has {units_sold}/{mvu} units");
    let amount = unit_price.checked_mul(quantity).ok_or_else(|| {
        SqliteDatabaseError::QueryError(format!("{quantity} units at {unit_price} do not fit in a participant amount"))
    })?;

    let participant = sqlx::query_as::<_, Participant>(
        r#"
            INSERT INTO participants (group_buy_id, user_id, quantity, amount, payment_refs, joined_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, group_buy_id, user_id, quantity, amount, joined_at, payment_refs;
        "#,
    )
    .bind(id)
    .bind(&participant.user_id)
    .bind(quantity)
    .bind(amount)
    .bind(Json(participant.payment_refs.clone()))
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;

    let threshold_entry = if status == GroupBuyStatus::Successful {
        let notes = format!("Minimum viable units reached ({units_sold}/{mvu})");
        let entry = insert_history_entry(id, status, SYSTEM_ACTOR, &notes, now, conn).await?;
        debug!("🗃️ Group buy {id} crossed its threshold on join by {}", participant.user_id);
        Some(entry)
    } else {
        None
    };
    Ok(JoinResult::Joined(JoinedGroupBuy { participant, threshold_entry }))
}

async fn explain_rejected_join(
    id: GroupBuyId,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<JoinResult, SqliteDatabaseError> {
    let row: Option<(GroupBuyStatus, i64, i64, DateTime<Utc>)> = sqlx::query_as(
        "SELECT status, units_sold, minimum_viable_units, expires_at FROM group_buys WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(conn)
    .await?;
    let result = match row {
        None => JoinResult::NotFound,
        Some((status, _, _, expires_at)) if status != GroupBuyStatus::Active || now > expires_at => JoinResult::Closed,
        Some((_, units_sold, mvu, _)) => JoinResult::CapacityExceeded { remaining_capacity: (mvu - units_sold).max(0) },
    };
    Ok(result)
}

/// Applies the status change if the group buy still has status `change.from`, and appends the history entry.
/// Call inside a transaction.
pub async fn transition_group_buy(
    id: GroupBuyId,
    change: StatusChange,
    conn: &mut SqliteConnection,
) -> Result<TransitionResult, SqliteDatabaseError> {
    let fulfillment = &change.fulfillment;
    let result = sqlx::query(
        r#"
            UPDATE group_buys SET
                status = $1,
                delivery_method = COALESCE($2, delivery_method),
                pickup_location = COALESCE($3, pickup_location),
                delivery_address = COALESCE($4, delivery_address),
                tracking_number = COALESCE($5, tracking_number),
                finalized_at = CASE WHEN $6 THEN COALESCE(finalized_at, $7) ELSE finalized_at END,
                updated_at = $7
            WHERE id = $8 AND status = $9
        "#,
    )
    .bind(change.to)
    .bind(&fulfillment.delivery_method)
    .bind(&fulfillment.pickup_location)
    .bind(&fulfillment.delivery_address)
    .bind(&fulfillment.tracking_number)
    .bind(change.finalize)
    .bind(change.timestamp)
    .bind(id)
    .bind(change.from)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        let current: Option<GroupBuyStatus> =
            sqlx::query_scalar("SELECT status FROM group_buys WHERE id = $1").bind(id).fetch_optional(conn).await?;
        return Ok(match current {
            Some(status) => {
                debug!("🗃️ Group buy {id} is {status}, not {}. Transition to {} skipped", change.from, change.to);
                TransitionResult::Stale(status)
            },
            None => TransitionResult::NotFound,
        });
    }
    let entry =
        insert_history_entry(id, change.to, &change.changed_by, &change.notes, change.timestamp, conn).await?;
    debug!("🗃️ Group buy {id} moved from {} to {} by {}", change.from, change.to, change.changed_by);
    Ok(TransitionResult::Applied(entry))
}

/// Finalizes an expired, still-active group buy. The outcome is decided from the row as it is at write time, so a
/// group buy that reached its threshold can never land in `manual_review`. Call inside a transaction.
pub async fn finalize_expired_group_buy(
    id: GroupBuyId,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<AdminStatusEntry>, SqliteDatabaseError> {
    let updated: Option<(GroupBuyStatus, i64, i64)> = sqlx::query_as(
        r#"
            UPDATE group_buys SET
                status = CASE WHEN units_sold >= minimum_viable_units THEN 'successful' ELSE 'manual_review' END,
                finalized_at = COALESCE(finalized_at, $1),
                updated_at = $1
            WHERE id = $2 AND status = 'active' AND julianday(expires_at) < julianday($1)
            RETURNING status, units_sold, minimum_viable_units;
        "#,
    )
    .bind(now)
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    let Some((status, units_sold, mvu)) = updated else {
        trace!("🗃️ Group buy {id} was not finalized. It is either not active or not expired.");
        return Ok(None);
    };
    let notes = format!("Expired with {units_sold}/{mvu} units");
    let entry = insert_history_entry(id, status, SYSTEM_ACTOR, &notes, now, conn).await?;
    Ok(Some(entry))
}

pub async fn claim_expiry_notice(
    id: GroupBuyId,
    threshold: ExpiryThreshold,
    conn: &mut SqliteConnection,
) -> Result<bool, SqliteDatabaseError> {
    let column = threshold.column();
    let sql = format!("UPDATE group_buys SET {column} = 1 WHERE id = $1 AND {column} = 0 AND status = 'active'");
    let result = sqlx::query(&sql).bind(id).execute(conn).await?;
    Ok(result.rows_affected() == 1)
}

pub async fn claim_notification(entry_id: i64, conn: &mut SqliteConnection) -> Result<bool, SqliteDatabaseError> {
    let result =
        sqlx::query("UPDATE admin_status_history SET notification_sent = 1 WHERE id = $1 AND notification_sent = 0")
            .bind(entry_id)
            .execute(conn)
            .await?;
    Ok(result.rows_affected() == 1)
}
