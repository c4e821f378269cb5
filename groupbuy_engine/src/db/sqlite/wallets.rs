use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::SqliteConnection;

use crate::{
    db::{sqlite::SqliteDatabaseError, traits::RefundResult},
    db_types::{NewRefund, Wallet, WalletTransaction, WalletTransactionType},
};

const TRANSACTION_COLUMNS: &str =
    "id, wallet_id, kind, amount, group_buy_id, participant_id, quantity, description, created_at";

/// Fetches the wallet for the user, creating it if it does not exist yet. The insert is the first statement so that
/// inside a transaction the write lock is taken before the read.
pub async fn fetch_or_create_wallet(
    user_id: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Wallet, SqliteDatabaseError> {
    let inserted = sqlx::query(
        r#"
            INSERT INTO wallets (user_id, balance, created_at, updated_at)
            VALUES ($1, 0, $2, $2)
            ON CONFLICT (user_id) DO NOTHING
        "#,
    )
    .bind(user_id)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    if inserted.rows_affected() == 1 {
        debug!("🗃️ Created a new wallet for {user_id}");
    }
    fetch_wallet(user_id, conn).await?.ok_or_else(|| SqliteDatabaseError::WalletCreationError(user_id.to_string()))
}

pub async fn fetch_wallet(user_id: &str, conn: &mut SqliteConnection) -> Result<Option<Wallet>, SqliteDatabaseError> {
    let wallet = sqlx::query_as::<_, Wallet>(
        "SELECT id, user_id, balance, created_at, updated_at FROM wallets WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_optional(conn)
    .await?;
    Ok(wallet)
}

/// Credits a refund to the participant's wallet. Call inside a transaction so that the ledger line and the balance
/// change land together.
pub async fn credit_refund(
    refund: &NewRefund,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<RefundResult, SqliteDatabaseError> {
    let wallet = fetch_or_create_wallet(&refund.user_id, now, conn).await?;
    let existing: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM wallet_transactions WHERE kind = $1 AND group_buy_id = $2 AND participant_id = $3",
    )
    .bind(WalletTransactionType::Refund)
    .bind(refund.group_buy_id)
    .bind(refund.participant_id)
    .fetch_optional(&mut *conn)
    .await?;
    if let Some(tx_id) = existing {
        debug!(
            "🗃️ Participant {} of {} was already refunded in ledger line {tx_id}",
            refund.participant_id, refund.group_buy_id
        );
        return Ok(RefundResult::AlreadyRefunded);
    }
    let sql = format!(
        r#"
            INSERT INTO wallet_transactions (
                wallet_id, kind, amount, group_buy_id, participant_id, quantity, description, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {TRANSACTION_COLUMNS};
        "#
    );
    let tx = sqlx::query_as::<_, WalletTransaction>(&sql)
        .bind(wallet.id)
        .bind(WalletTransactionType::Refund)
        .bind(refund.amount)
        .bind(refund.group_buy_id)
        .bind(refund.participant_id)
        .bind(refund.quantity)
        .bind(&refund.description)
        .bind(now)
        .fetch_one(&mut *conn)
        .await?;
    sqlx::query("UPDATE wallets SET balance = balance + $1, updated_at = $2 WHERE id = $3")
        .bind(refund.amount)
        .bind(now)
        .bind(wallet.id)
        .execute(conn)
        .await?;
    trace!("🗃️ Wallet {} of {} credited with {}", wallet.id, refund.user_id, refund.amount);
    Ok(RefundResult::Credited(tx))
}

pub async fn fetch_wallet_transactions(
    user_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Vec<WalletTransaction>, SqliteDatabaseError> {
    let sql = format!(
        "SELECT {TRANSACTION_COLUMNS} FROM wallet_transactions WHERE wallet_id = (SELECT id FROM wallets WHERE user_id \
         = $1) ORDER BY id ASC"
    );
    let txs = sqlx::query_as::<_, WalletTransaction>(&sql).bind(user_id).fetch_all(conn).await?;
    Ok(txs)
}
