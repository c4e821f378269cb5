use std::time::Duration;

use chrono::{DateTime, Utc};
use groupbuy_engine::{
    db_types::{GroupBuy, GroupBuyId, Money, NewGroupBuy, NewParticipant},
    AdminApi,
    GroupBuyApi,
    Notifier,
    OrderSyncApi,
    RefundApi,
    SqliteDatabase,
    SweepApi,
};

use super::{prepare_env::new_test_database, recording_hooks::RecordingHooks};

pub const ADMIN: &str = "ops@example.com";

/// Every API wired against one throw-away database, with hooks that record what was sent.
pub struct Engine {
    pub db: SqliteDatabase,
    pub group_buys: GroupBuyApi<SqliteDatabase>,
    pub orders: OrderSyncApi<SqliteDatabase>,
    pub admin: AdminApi<SqliteDatabase>,
    pub sweep: SweepApi<SqliteDatabase>,
    pub hooks: RecordingHooks,
}

pub async fn setup() -> Engine {
    let db = new_test_database().await;
    let hooks = RecordingHooks::default();
    let producers = hooks.start().await;
    let notifier = Notifier::new(producers, Duration::from_secs(2));
    let refunds = RefundApi::new(db.clone(), Duration::from_secs(2));
    Engine {
        group_buys: GroupBuyApi::new(db.clone(), notifier.clone()),
        orders: OrderSyncApi::new(db.clone()),
        admin: AdminApi::new(db.clone(), notifier.clone(), refunds),
        sweep: SweepApi::new(db.clone(), notifier),
        db,
        hooks,
    }
}

impl Engine {
    /// Opens a group buy for `product` at 5.00 per unit that closes in `hours`.
    pub async fn open(&self, product: &str, mvu: i64, hours: i64) -> GroupBuy {
        let expires_at = Utc::now() + chrono::Duration::hours(hours);
        let group = NewGroupBuy::new(product, Money::from(500), mvu, expires_at);
        self.group_buys.open_group_buy(group).await.expect("Error opening group buy")
    }

    pub async fn join(&self, id: GroupBuyId, user: &str, quantity: i64) {
        let participant = NewParticipant::new(user, quantity).with_payment_ref(format!("pay-{user}"));
        self.group_buys.join(id, participant).await.expect("Error joining group buy");
    }

    pub async fn fetch(&self, id: GroupBuyId) -> GroupBuy {
        self.group_buys.group_buy(id).await.expect("Error fetching group buy")
    }

    /// Sweeps as if the clock read `expires_at + 1 minute`.
    pub fn just_after(group: &GroupBuy) -> DateTime<Utc> {
        group.expires_at + chrono::Duration::minutes(1)
    }

    /// Bypasses the engine to put a group buy into a state that the public API cannot reach directly.
    pub async fn force_status(&self, id: GroupBuyId, status: &str) {
        sqlx::query("UPDATE group_buys SET status = $1 WHERE id = $2")
            .bind(status)
            .bind(id.value())
            .execute(self.db.pool())
            .await
            .expect("Error forcing status");
    }
}
