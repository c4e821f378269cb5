use chrono::{DateTime, Utc};

use crate::{
    db::traits::RefundResult,
    db_types::{NewRefund, Wallet, WalletTransaction},
};

/// The `WalletManagement` trait is the wallet ledger used by the refund orchestrator.
#[allow(async_fn_in_trait)]
pub trait WalletManagement {
    type Error: std::error::Error;

    /// Fetches the wallet for the user, creating an empty one if necessary.
    async fn fetch_or_create_wallet(&self, user_id: &str) -> Result<Wallet, Self::Error>;

    async fn fetch_wallet(&self, user_id: &str) -> Result<Option<Wallet>, Self::Error>;

    /// In a single atomic transaction,
    /// * locates or creates the user's wallet,
    /// * appends a `REFUND` ledger line for the participant,
    /// * credits the wallet balance.
    ///
    /// A participant is refunded at most once per group buy. If a refund line already exists, nothing is written and
    /// [`RefundResult::AlreadyRefunded`] is returned.
    async fn credit_refund(&self, refund: NewRefund, now: DateTime<Utc>) -> Result<RefundResult, Self::Error>;

    /// The ledger lines for the user's wallet, oldest first.
    async fn fetch_wallet_transactions(&self, user_id: &str) -> Result<Vec<WalletTransaction>, Self::Error>;
}
