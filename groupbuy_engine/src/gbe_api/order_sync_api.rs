//! Mirrors group buy progress into the orders that depend on it.
//!
//! Each order is synced on its own. A sync step reads the order, plans the change with [`plan_order_sync`] and applies
//! it with a write that is conditional on the order version it read. If another step wrote to the order in between,
//! even for a different group buy, the write is abandoned and the step is re-planned from a fresh read.
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use serde::Serialize;

use crate::{
    db::traits::{GroupBuyManagement, InsertOrderResult, ItemSync, OrderManagement, OrderSyncUpdate},
    db_types::{
        GroupBuy,
        GroupBuyId,
        GroupBuyStatus,
        ItemGroupStatus,
        Money,
        NewOrder,
        NewProgressEntry,
        Order,
        OrderId,
        OrderStatusType,
    },
    gbe_api::errors::GroupBuyError,
};

const MAX_SYNC_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub orders_checked: usize,
    pub orders_updated: usize,
    pub progress_entries: usize,
}

/// The `OrderSyncApi` creates orders at checkout and keeps their line items in step with the group buys they
/// reference. Updates only ever flow from group buys to orders.
pub struct OrderSyncApi<B> {
    db: B,
}

impl<B: Debug> Debug for OrderSyncApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderSyncApi ({:?})", self.db)
    }
}

impl<B> OrderSyncApi<B>
where B: GroupBuyManagement + OrderManagement
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    /// Stores a new order. Every referenced group buy must exist and still be open or on its way to fulfillment.
    /// Items referencing a group buy that is already past its threshold are brought up to date straight away.
    ///
    /// Placing the same order id twice is harmless: the stored order is returned.
    pub async fn place_order(&self, order: NewOrder) -> Result<Order, GroupBuyError> {
        if order.items.is_empty() {
            return Err(GroupBuyError::ValidationError("An order must contain at least one item".into()));
        }
        if order.items.iter().any(|i| i.quantity <= 0 || i.price.is_negative()) {
            return Err(GroupBuyError::ValidationError(
                "Item quantities must be positive and prices non-negative".into(),
            ));
        }
        let total = order.items.iter().try_fold(Money::ZERO, |total, i| {
            i.price.checked_mul(i.quantity).and_then(|line| total.value().checked_add(line.value())).map(Money::from)
        });
        if total.is_none() {
            return Err(GroupBuyError::ValidationError("The order total is too large".into()));
        }
        let mut groups = Vec::new();
        for item in &order.items {
            if groups.iter().any(|g: &GroupBuy| g.id == item.group_buy_id) {
                continue;
            }
            let group = self.fetch_group(item.group_buy_id).await?;
            if group.status != GroupBuyStatus::Active && !group.status.is_fulfillment_chain() {
                return Err(GroupBuyError::GroupClosed(group.id));
            }
            groups.push(group);
        }
        let order_id = order.order_id.clone();
        match self.db.insert_order(order).await.map_err(GroupBuyError::database)? {
            InsertOrderResult::Inserted(id) => info!("📦️ Order {order_id} placed (id {id})"),
            InsertOrderResult::AlreadyExists(id) => {
                debug!("📦️ Order {order_id} already exists with id {id}. Nothing was written.");
            },
        }
        for group in groups.iter().filter(|g| g.status.is_fulfillment_chain()) {
            self.sync_order(&order_id, group).await?;
        }
        self.order(&order_id).await
    }

    pub async fn order(&self, order_id: &OrderId) -> Result<Order, GroupBuyError> {
        self.db
            .fetch_order(order_id)
            .await
            .map_err(GroupBuyError::database)?
            .ok_or_else(|| GroupBuyError::OrderNotFound(order_id.clone()))
    }

    /// Moves an order into one of its terminal states. Closing an order twice with the same status is a no-op.
    pub async fn close_order(&self, order_id: &OrderId, status: OrderStatusType) -> Result<Order, GroupBuyError> {
        if !status.is_terminal() {
            return Err(GroupBuyError::ValidationError(format!("{status} is not a terminal order status")));
        }
        for _ in 0..MAX_SYNC_ATTEMPTS {
            let order = self.order(order_id).await?;
            if order.current_status == status {
                return Ok(order);
            }
            if order.current_status.is_terminal() {
                return Err(GroupBuyError::ValidationError(format!(
                    "Order {order_id} is already {}",
                    order.current_status
                )));
            }
            let entry = NewProgressEntry::new(status.as_str(), format!("Order {status}"), Utc::now());
            let updated = self
                .db
                .update_order_status(order.id, order.current_status, status, entry)
                .await
                .map_err(GroupBuyError::database)?;
            if updated {
                info!("📦️ Order {order_id} closed as {status}");
                return self.order(order_id).await;
            }
        }
        Err(GroupBuyError::SyncConflict(order_id.clone()))
    }

    /// Brings every order that references the group buy in line with its current status.
    pub async fn sync_group_buy(&self, id: GroupBuyId) -> Result<SyncReport, GroupBuyError> {
        let group = self.fetch_group(id).await?;
        self.sync_orders_for(&group).await
    }

    /// As [`Self::sync_group_buy`], for a group buy that has just been read.
    pub async fn sync_orders_for(&self, group: &GroupBuy) -> Result<SyncReport, GroupBuyError> {
        let mut report = SyncReport::default();
        if group.status.item_status().is_none() {
            trace!("📦️ Group buy {} is {}. Orders are not synced for this status.", group.id, group.status);
            return Ok(report);
        }
        let orders = self.db.fetch_orders_for_group_buy(group.id).await.map_err(GroupBuyError::database)?;
        for order in orders {
            report.orders_checked += 1;
            let appended = self.sync_order(&order.order_id, group).await?;
            if appended > 0 {
                report.orders_updated += 1;
                report.progress_entries += appended;
            }
        }
        debug!(
            "📦️ Synced {} orders with group buy {} ({}). {} updated.",
            report.orders_checked, group.id, group.status, report.orders_updated
        );
        Ok(report)
    }

    /// Runs one sync step for a single order, re-planning if a concurrent step got there first. Returns the number of
    /// progress entries appended.
    async fn sync_order(&self, order_id: &OrderId, group: &GroupBuy) -> Result<usize, GroupBuyError> {
        for attempt in 1..=MAX_SYNC_ATTEMPTS {
            let order = self.order(order_id).await?;
            let Some(update) = plan_order_sync(&order, group, Utc::now()) else {
                return Ok(0);
            };
            let appended = update.progress.len();
            if self.db.apply_order_sync(update).await.map_err(GroupBuyError::database)? {
                return Ok(appended);
            }
            debug!("📦️ Order {order_id} changed during sync (attempt {attempt}). Re-planning.");
        }
        warn!("📦️ Gave up syncing order {order_id} with group buy {} after {MAX_SYNC_ATTEMPTS} attempts", group.id);
        Err(GroupBuyError::SyncConflict(order_id.clone()))
    }

    async fn fetch_group(&self, id: GroupBuyId) -> Result<GroupBuy, GroupBuyError> {
        self.db
            .fetch_group_buy(id)
            .await
            .map_err(GroupBuyError::database)?
            .ok_or(GroupBuyError::GroupBuyNotFound(id))
    }
}

/// Works out what has to change on `order` to reflect the current status of `group`. Returns `None` if the order
/// already reflects it.
///
/// Items are compared against the group buy status they last mirrored, so replaying a transition changes nothing and a
/// status that is earlier in the fulfillment chain than the mirrored one is ignored.
pub fn plan_order_sync(order: &Order, group: &GroupBuy, now: DateTime<Utc>) -> Option<OrderSyncUpdate> {
    if order.current_status.is_terminal() {
        return None;
    }
    let target = group.status;
    let item_status = target.item_status()?;
    let target_rank = target.chain_rank();
    let items = order
        .items_for_group(group.id)
        .filter(|item| item.group_buy_status.chain_rank() < target_rank)
        .map(|item| ItemSync {
            item_id: item.id,
            expected: item.group_buy_status,
            group_buy_status: target,
            group_status: item_status,
        })
        .collect::<Vec<_>>();
    if items.is_empty() {
        return None;
    }

    let statuses = order
        .items
        .iter()
        .map(|item| items.iter().find(|s| s.item_id == item.id).map(|s| s.group_status).unwrap_or(item.group_status))
        .collect::<Vec<_>>();
    let secured = statuses.iter().filter(|s| **s >= ItemGroupStatus::Secured).count();
    let all_secured = secured == statuses.len();
    let all_dispatched = statuses.iter().all(|s| *s == ItemGroupStatus::Dispatched);
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    let priority_score = (secured as f64 / statuses.len() as f64 * 100.0).round() as i64;

    let mut progress = vec![NewProgressEntry::new(
        target.as_str(),
        format!("{} group buy {} is now {target}", group.product_ref, group.id),
        now,
    )];
    let mut status = order.current_status;
    if all_secured && status == OrderStatusType::Placed {
        progress.push(NewProgressEntry::new(
            OrderStatusType::AllSecured.as_str(),
            "Every group buy in this order is secured",
            now,
        ));
        status = OrderStatusType::AllSecured;
    }
    if all_dispatched && status == OrderStatusType::AllSecured {
        progress.push(NewProgressEntry::new(
            OrderStatusType::Dispatched.as_str(),
            "Every item in this order has been dispatched",
            now,
        ));
        status = OrderStatusType::Dispatched;
    }
    let status_change = (status != order.current_status).then_some((order.current_status, status));

    Some(OrderSyncUpdate {
        order_id: order.id,
        expected_version: order.version,
        items,
        progress,
        status_change,
        all_groups_secured: all_secured,
        priority_score,
        timestamp: now,
    })
}
