use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;

use crate::{
    db::traits::{GroupBuyDatabase, JoinResult},
    db_types::{GroupBuy, GroupBuyId, GroupBuyStatus, GroupBuyStatusReport, NewGroupBuy, NewParticipant, Participant},
    gbe_api::{errors::GroupBuyError, notifier::Notifier, order_sync_api::OrderSyncApi, transitions},
};

/// `GroupBuyApi` is the customer-facing side of the engine: opening group buys, joining them and reporting progress.
pub struct GroupBuyApi<B> {
    db: B,
    notifier: Notifier,
    orders: OrderSyncApi<B>,
}

impl<B: Debug> Debug for GroupBuyApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "GroupBuyApi ({:?})", self.db)
    }
}

impl<B> GroupBuyApi<B>
where B: GroupBuyDatabase
{
    pub fn new(db: B, notifier: Notifier) -> Self {
        let orders = OrderSyncApi::new(db.clone());
        Self { db, notifier, orders }
    }

    /// Returns the active group buy for the product, opening a new one if there is none.
    pub async fn open_group_buy(&self, group: NewGroupBuy) -> Result<GroupBuy, GroupBuyError> {
        if group.product_ref.trim().is_empty() {
            return Err(GroupBuyError::ValidationError("A group buy needs a product reference".into()));
        }
        if group.minimum_viable_units <= 0 {
            return Err(GroupBuyError::ValidationError("Minimum viable units must be positive".into()));
        }
        if group.unit_price.is_negative() {
            return Err(GroupBuyError::ValidationError("Unit price cannot be negative".into()));
        }
        // No join can buy more than the minimum viable units, so this bounds every participant amount
        if group.unit_price.checked_mul(group.minimum_viable_units).is_none() {
            return Err(GroupBuyError::ValidationError(format!(
                "A unit price of {} for {} units is too large",
                group.unit_price, group.minimum_viable_units
            )));
        }
        if group.expires_at <= Utc::now() {
            return Err(GroupBuyError::ValidationError("The deadline must be in the future".into()));
        }
        let result = self.db.insert_or_fetch_active_group_buy(group).await.map_err(GroupBuyError::database)?;
        debug!("🧺️ Group buy {} for {} is open until {}", result.id, result.product_ref, result.expires_at);
        Ok(result)
    }

    pub async fn group_buy(&self, id: GroupBuyId) -> Result<GroupBuy, GroupBuyError> {
        self.db.fetch_group_buy(id).await.map_err(GroupBuyError::database)?.ok_or(GroupBuyError::GroupBuyNotFound(id))
    }

    pub async fn status(&self, id: GroupBuyId) -> Result<GroupBuyStatusReport, GroupBuyError> {
        let group = self.group_buy(id).await?;
        Ok(group.status_report_at(Utc::now()))
    }

    /// Adds the participant to the group buy.
    pub async fn join(&self, id: GroupBuyId, participant: NewParticipant) -> Result<Participant, GroupBuyError> {
        self.join_at(id, participant, Utc::now()).await
    }

    /// Adds the participant to the group buy, judging the deadline against `now`.
    ///
    /// If this join takes the group buy to its minimum viable units, it becomes `successful` in the same write. Orders
    /// that reference it are then synced and the participants are told, once. A join that finds the group buy already
    /// successful is rejected as closed and triggers nothing.
    pub async fn join_at(
        &self,
        id: GroupBuyId,
        participant: NewParticipant,
        now: DateTime<Utc>,
    ) -> Result<Participant, GroupBuyError> {
        if participant.quantity <= 0 {
            return Err(GroupBuyError::ValidationError(format!(
                "Quantity must be positive, got {}",
                participant.quantity
            )));
        }
        if participant.user_id.trim().is_empty() {
            return Err(GroupBuyError::ValidationError("A participant needs a user id".into()));
        }
        let user_id = participant.user_id.clone();
        let joined = match self.db.join_group_buy(id, participant, now).await.map_err(GroupBuyError::database)? {
            JoinResult::Joined(joined) => joined,
            JoinResult::NotFound => return Err(GroupBuyError::GroupBuyNotFound(id)),
            JoinResult::Closed => {
                debug!("🧺️ {user_id} tried to join group buy {id}, but it is closed");
                return Err(GroupBuyError::GroupClosed(id));
            },
            JoinResult::CapacityExceeded { remaining_capacity } => {
                debug!("🧺️ {user_id} asked for more than the {remaining_capacity} units left in group buy {id}");
                return Err(GroupBuyError::CapacityExceeded { remaining_capacity });
            },
        };
        info!("🧺️ {user_id} joined group buy {id} with {} units", joined.participant.quantity);
        if let Some(entry) = joined.threshold_entry {
            info!("🧺️ Group buy {id} reached its minimum viable units");
            match self.group_buy(id).await {
                Ok(group) => {
                    self.notifier.status_changed(&group, GroupBuyStatus::Active, &entry).await;
                    if let Err(e) = self.orders.sync_orders_for(&group).await {
                        error!("🧺️ Orders for group buy {id} could not be synced after it succeeded: {e}");
                    }
                    self.notifier.announce(&self.db, &group, &entry, &[transitions::TEMPLATE_GROUP_SECURED]).await;
                },
                Err(e) => error!("🧺️ Could not reload group buy {id} after it succeeded: {e}"),
            }
        }
        Ok(joined.participant)
    }
}
