use std::{fmt::Debug, str::FromStr};

use log::*;
use serde::{Deserialize, Serialize};

use crate::{
    db::traits::{GroupBuyDatabase, StatusChange, TransitionResult},
    db_types::{AdminStatusEntry, FulfillmentData, GroupBuy, GroupBuyId, GroupBuyStatus, SYSTEM_ACTOR},
    gbe_api::{
        errors::GroupBuyError,
        notifier::Notifier,
        order_sync_api::OrderSyncApi,
        refund_api::{RefundApi, RefundSummary},
        transitions::{allowed_transitions, notification_template, validate_transition},
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewAction {
    Approve,
    Reject,
}

impl ReviewAction {
    pub fn target(&self) -> GroupBuyStatus {
        match self {
            Self::Approve => GroupBuyStatus::Secured,
            Self::Reject => GroupBuyStatus::Failed,
        }
    }
}

impl FromStr for ReviewAction {
    type Err = GroupBuyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approve" => Ok(Self::Approve),
            "reject" => Ok(Self::Reject),
            _ => Err(GroupBuyError::ValidationError(format!("Unknown review action: {s}"))),
        }
    }
}

/// The result of an admin action. Actions that fail a group buy also carry the refund summary.
#[derive(Debug, Clone)]
pub struct AdminOutcome {
    pub group_buy: GroupBuy,
    pub refund_summary: Option<RefundSummary>,
}

/// `AdminApi` handles out-of-band status changes made by operators: moving a group buy along the fulfillment chain,
/// reviewing group buys that expired short of their threshold, and cancelling.
pub struct AdminApi<B> {
    db: B,
    notifier: Notifier,
    orders: OrderSyncApi<B>,
    refunds: RefundApi<B>,
}

impl<B: Debug> Debug for AdminApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AdminApi ({:?})", self.db)
    }
}

impl<B> AdminApi<B>
where B: GroupBuyDatabase
{
    pub fn new(db: B, notifier: Notifier, refunds: RefundApi<B>) -> Self {
        let orders = OrderSyncApi::new(db.clone());
        Self { db, notifier, orders, refunds }
    }

    /// Moves the group buy one hop to `target`.
    ///
    /// The current status is read immediately before it is checked against the adjacency map, and the write only
    /// lands if the status is still the one that was checked. If another change slipped in between, the request is
    /// rejected against the fresh status. On success, fulfillment fields are merged, orders are synced, participants
    /// are notified and, for `failed`, everyone is refunded.
    pub async fn transition(
        &self,
        id: GroupBuyId,
        target: GroupBuyStatus,
        admin: &str,
        notes: &str,
        fulfillment: FulfillmentData,
    ) -> Result<AdminOutcome, GroupBuyError> {
        let group = self.group_buy(id).await?;
        validate_transition(group.status, target)?;
        self.apply(group.status, target, id, admin, notes, fulfillment).await
    }

    /// Approves or rejects a group buy that expired below its threshold. Rejecting fails the group buy and refunds
    /// every participant.
    pub async fn review(
        &self,
        id: GroupBuyId,
        action: ReviewAction,
        admin: &str,
        notes: &str,
    ) -> Result<AdminOutcome, GroupBuyError> {
        let group = self.group_buy(id).await?;
        let target = action.target();
        if group.status != GroupBuyStatus::ManualReview {
            return Err(GroupBuyError::InvalidTransition {
                from: group.status,
                to: target,
                allowed: allowed_transitions(group.status).to_vec(),
            });
        }
        info!("🛡️ {admin} is reviewing group buy {id}: {action:?}");
        self.apply(group.status, target, id, admin, notes, FulfillmentData::default()).await
    }

    /// Fails a group buy that is still collecting participants, and refunds them.
    pub async fn cancel(&self, id: GroupBuyId, admin: &str, notes: &str) -> Result<AdminOutcome, GroupBuyError> {
        let group = self.group_buy(id).await?;
        if group.status != GroupBuyStatus::Active {
            return Err(GroupBuyError::InvalidTransition {
                from: group.status,
                to: GroupBuyStatus::Failed,
                allowed: allowed_transitions(group.status).to_vec(),
            });
        }
        warn!("🛡️ {admin} is cancelling group buy {id}");
        self.apply(GroupBuyStatus::Active, GroupBuyStatus::Failed, id, admin, notes, FulfillmentData::default()).await
    }

    /// Runs the refund orchestrator again for a failed group buy. Only participants without a refund are credited.
    pub async fn retry_refunds(&self, id: GroupBuyId) -> Result<AdminOutcome, GroupBuyError> {
        let group = self.group_buy(id).await?;
        let summary = self.settle_refunds(&group).await?;
        let group_buy = self.group_buy(id).await?;
        Ok(AdminOutcome { group_buy, refund_summary: Some(summary) })
    }

    async fn apply(
        &self,
        from: GroupBuyStatus,
        target: GroupBuyStatus,
        id: GroupBuyId,
        admin: &str,
        notes: &str,
        fulfillment: FulfillmentData,
    ) -> Result<AdminOutcome, GroupBuyError> {
        let change = StatusChange::new(from, target, admin, notes).with_fulfillment(fulfillment).finalizing();
        let entry = match self.db.transition_group_buy(id, change).await.map_err(GroupBuyError::database)? {
            TransitionResult::Applied(entry) => entry,
            TransitionResult::Stale(current) => {
                info!("🛡️ Group buy {id} moved to {current} while {admin} was moving it to {target}");
                return Err(GroupBuyError::InvalidTransition {
                    from: current,
                    to: target,
                    allowed: allowed_transitions(current).to_vec(),
                });
            },
            TransitionResult::NotFound => return Err(GroupBuyError::GroupBuyNotFound(id)),
        };
        info!("🛡️ {admin} moved group buy {id} from {from} to {target}");
        let group = self.group_buy(id).await?;
        self.after_transition(&group, from, &entry).await;
        let refund_summary = match target {
            GroupBuyStatus::Failed => Some(self.settle_refunds(&group).await?),
            _ => None,
        };
        let group_buy = match refund_summary {
            Some(_) => self.group_buy(id).await?,
            None => group,
        };
        Ok(AdminOutcome { group_buy, refund_summary })
    }

    async fn after_transition(&self, group: &GroupBuy, from: GroupBuyStatus, entry: &AdminStatusEntry) {
        self.notifier.status_changed(group, from, entry).await;
        if group.status.is_fulfillment_chain() {
            if let Err(e) = self.orders.sync_orders_for(group).await {
                error!("🛡️ Orders for group buy {} could not be synced: {e}. Run the sync again to catch up", group.id);
            }
        }
        if let Some(template) = notification_template(group.status) {
            self.notifier.announce(&self.db, group, entry, &[template]).await;
        }
    }

    /// Refunds the participants of a failed group buy. When nobody is left unrefunded, the group buy is marked as
    /// refunded.
    async fn settle_refunds(&self, group: &GroupBuy) -> Result<RefundSummary, GroupBuyError> {
        let summary = self.refunds.refund_group_buy(group).await?;
        if !summary.is_clean() {
            warn!(
                "💸️ {} refunds for group buy {} failed. It stays failed until the refunds are retried.",
                summary.errors.len(),
                group.id
            );
            return Ok(summary);
        }
        let notes = format!("{} participants refunded", group.participant_count());
        let change = StatusChange::new(GroupBuyStatus::Failed, GroupBuyStatus::Refunded, SYSTEM_ACTOR, notes);
        match self.db.transition_group_buy(group.id, change).await.map_err(GroupBuyError::database)? {
            TransitionResult::Applied(entry) => {
                info!("💸️ Group buy {} is fully refunded", group.id);
                self.notifier.status_changed(group, GroupBuyStatus::Failed, &entry).await;
            },
            TransitionResult::Stale(status) => {
                debug!("💸️ Group buy {} was already moved to {status} by another refund run", group.id);
            },
            TransitionResult::NotFound => return Err(GroupBuyError::GroupBuyNotFound(group.id)),
        }
        Ok(summary)
    }

    async fn group_buy(&self, id: GroupBuyId) -> Result<GroupBuy, GroupBuyError> {
        self.db.fetch_group_buy(id).await.map_err(GroupBuyError::database)?.ok_or(GroupBuyError::GroupBuyNotFound(id))
    }
}
