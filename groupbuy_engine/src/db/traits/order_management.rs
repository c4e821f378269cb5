use crate::{
    db::traits::{InsertOrderResult, OrderSyncUpdate},
    db_types::{GroupBuyId, NewOrder, NewProgressEntry, Order, OrderId, OrderStatusType},
};

/// The `OrderManagement` trait defines the behaviour for storing orders and mirroring group buy progress into them.
#[allow(async_fn_in_trait)]
pub trait OrderManagement {
    type Error: std::error::Error;

    /// Stores a new order with all of its items in `forming` state and a `placed` progress entry. If an order with the
    /// same order id exists, nothing is written.
    async fn insert_order(&self, order: NewOrder) -> Result<InsertOrderResult, Self::Error>;

    /// Fetches the order with its items and progress log.
    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, Self::Error>;

    /// Fetches every order with at least one item referencing the group buy.
    async fn fetch_orders_for_group_buy(&self, id: GroupBuyId) -> Result<Vec<Order>, Self::Error>;

    /// Applies a cross-sync update in one transaction. Returns `false` and writes nothing if any item no longer holds
    /// its expected mirrored status, or the order status no longer matches.
    async fn apply_order_sync(&self, update: OrderSyncUpdate) -> Result<bool, Self::Error>;

    /// Changes the order status if it is still `from`, appending `entry` to the progress log.
    async fn update_order_status(
        &self,
        order_id: i64,
        from: OrderStatusType,
        to: OrderStatusType,
        entry: NewProgressEntry,
    ) -> Result<bool, Self::Error>;
}
