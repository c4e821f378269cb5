use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use sqlx::SqlitePool;

use super::{group_buys, new_pool, orders, wallets, SqliteDatabaseError};
use crate::{
    db::traits::{
        GroupBuyManagement,
        InsertOrderResult,
        JoinResult,
        OrderManagement,
        OrderSyncUpdate,
        RefundResult,
        StatusChange,
        TransitionResult,
        WalletManagement,
    },
    db_types::{
        AdminStatusEntry,
        ExpiryThreshold,
        GroupBuy,
        GroupBuyId,
        GroupBuyStatus,
        NewGroupBuy,
        NewOrder,
        NewParticipant,
        NewProgressEntry,
        NewRefund,
        Order,
        OrderId,
        OrderStatusType,
        Wallet,
        WalletTransaction,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl GroupBuyManagement for SqliteDatabase {
    type Error = SqliteDatabaseError;

    async fn insert_or_fetch_active_group_buy(&self, group: NewGroupBuy) -> Result<GroupBuy, Self::Error> {
        let mut tx = self.pool.begin().await?;
        let id = match group_buys::insert_group_buy(&group, Utc::now(), &mut tx).await? {
            Some(id) => {
                debug!("🗃️ Group buy {id} opened for product {}", group.product_ref);
                group_buys::fetch_group_buy(id, &mut tx).await?
            },
            None => {
                trace!("🗃️ Product {} already has an active group buy", group.product_ref);
                group_buys::fetch_active_group_buy_for_product(&group.product_ref, &mut tx).await?
            },
        };
        let result = id.ok_or_else(|| {
            SqliteDatabaseError::QueryError(format!("No active group buy for {} after insert", group.product_ref))
        })?;
        tx.commit().await?;
        Ok(result)
    }

    async fn fetch_group_buy(&self, id: GroupBuyId) -> Result<Option<GroupBuy>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        group_buys::fetch_group_buy(id, &mut conn).await
    }

    async fn fetch_group_buys_with_status(&self, status: GroupBuyStatus) -> Result<Vec<GroupBuy>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        group_buys::fetch_group_buys_with_status(status, &mut conn).await
    }

    async fn join_group_buy(
        &self,
        id: GroupBuyId,
        participant: NewParticipant,
        now: DateTime<Utc>,
    ) -> Result<JoinResult, Self::Error> {
        let mut tx = self.pool.begin().await?;
        let result = group_buys::join_group_buy(id, participant, now, &mut tx).await?;
        match &result {
            JoinResult::Joined(_) => tx.commit().await?,
            _ => tx.rollback().await?,
        }
        Ok(result)
    }

    async fn transition_group_buy(
        &self,
        id: GroupBuyId,
        change: StatusChange,
    ) -> Result<TransitionResult, Self::Error> {
        let mut tx = self.pool.begin().await?;
        let result = group_buys::transition_group_buy(id, change, &mut tx).await?;
        match &result {
            TransitionResult::Applied(_) => tx.commit().await?,
            _ => tx.rollback().await?,
        }
        Ok(result)
    }

    async fn finalize_expired_group_buy(
        &self,
        id: GroupBuyId,
        now: DateTime<Utc>,
    ) -> Result<Option<AdminStatusEntry>, Self::Error> {
        let mut tx = self.pool.begin().await?;
        let result = group_buys::finalize_expired_group_buy(id, now, &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn claim_expiry_notice(&self, id: GroupBuyId, threshold: ExpiryThreshold) -> Result<bool, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        group_buys::claim_expiry_notice(id, threshold, &mut conn).await
    }

    async fn claim_notification(&self, entry_id: i64) -> Result<bool, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        group_buys::claim_notification(entry_id, &mut conn).await
    }
}

impl OrderManagement for SqliteDatabase {
    type Error = SqliteDatabaseError;

    async fn insert_order(&self, order: NewOrder) -> Result<InsertOrderResult, Self::Error> {
        let mut tx = self.pool.begin().await?;
        let result = orders::idempotent_insert(order, &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order_by_order_id(order_id, &mut conn).await
    }

    async fn fetch_orders_for_group_buy(&self, id: GroupBuyId) -> Result<Vec<Order>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_orders_for_group_buy(id, &mut conn).await
    }

    async fn apply_order_sync(&self, update: OrderSyncUpdate) -> Result<bool, Self::Error> {
        let mut tx = self.pool.begin().await?;
        trace!("🗃️ Applying sync update to order {}: {update:?}", update.order_id);
        if orders::apply_order_sync(&update, &mut tx).await? {
            tx.commit().await?;
            Ok(true)
        } else {
            tx.rollback().await?;
            Ok(false)
        }
    }

    async fn update_order_status(
        &self,
        order_id: i64,
        from: OrderStatusType,
        to: OrderStatusType,
        entry: NewProgressEntry,
    ) -> Result<bool, Self::Error> {
        let mut tx = self.pool.begin().await?;
        if orders::update_order_status(order_id, from, to, &entry, &mut tx).await? {
            tx.commit().await?;
            Ok(true)
        } else {
            tx.rollback().await?;
            Ok(false)
        }
    }
}

impl WalletManagement for SqliteDatabase {
    type Error = SqliteDatabaseError;

    async fn fetch_or_create_wallet(&self, user_id: &str) -> Result<Wallet, Self::Error> {
        let mut tx = self.pool.begin().await?;
        let wallet = wallets::fetch_or_create_wallet(user_id, Utc::now(), &mut tx).await?;
        tx.commit().await?;
        Ok(wallet)
    }

    async fn fetch_wallet(&self, user_id: &str) -> Result<Option<Wallet>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        wallets::fetch_wallet(user_id, &mut conn).await
    }

    async fn credit_refund(&self, refund: NewRefund, now: DateTime<Utc>) -> Result<RefundResult, Self::Error> {
        let mut tx = self.pool.begin().await?;
        let result = wallets::credit_refund(&refund, now, &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn fetch_wallet_transactions(&self, user_id: &str) -> Result<Vec<WalletTransaction>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        wallets::fetch_wallet_transactions(user_id, &mut conn).await
    }
}

impl SqliteDatabase {
    /// Creates a new database API object
    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, SqliteDatabaseError> {
        trace!("Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Brings the schema up to date using the migrations embedded in the binary.
    pub async fn run_migrations(&self) -> Result<(), SqliteDatabaseError> {
        sqlx::migrate!("./src/db/sqlite/migrations").run(&self.pool).await?;
        info!("🗃️ Database migrations complete");
        Ok(())
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
