use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use serde::Serialize;
use serde_json::json;

use crate::{
    db::traits::GroupBuyDatabase,
    db_types::{ExpiryThreshold, GroupBuy, GroupBuyId, GroupBuyStatus},
    gbe_api::{
        errors::GroupBuyError,
        notifier::Notifier,
        order_sync_api::OrderSyncApi,
        transitions::{
            TEMPLATE_EXPIRED_FAILED,
            TEMPLATE_EXPIRED_SUCCESSFUL,
            TEMPLATE_EXPIRING_SOON,
            TEMPLATE_NEEDS_MANUAL_REVIEW,
        },
    },
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepError {
    pub group_buy_id: GroupBuyId,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// The number of active group buys looked at.
    pub processed: usize,
    pub finalized: Vec<GroupBuyId>,
    pub expiring_notified: Vec<GroupBuyId>,
    pub errors: Vec<SweepError>,
}

enum SweepAction {
    Nothing,
    /// Carries the reason if the group buy was finalized but its orders could not be synced.
    Finalized(Option<String>),
    ExpiryNotified(ExpiryThreshold),
}

/// `SweepApi` performs one pass of the monitoring sweep: reminders for group buys that are about to close, and
/// finalization for the ones whose deadline has passed.
///
/// Every write is conditional on the group buy still being active, so two overlapping ticks cannot both finalize or
/// both remind.
pub struct SweepApi<B> {
    db: B,
    notifier: Notifier,
    orders: OrderSyncApi<B>,
}

impl<B: Debug> Debug for SweepApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SweepApi ({:?})", self.db)
    }
}

impl<B> SweepApi<B>
where B: GroupBuyDatabase
{
    pub fn new(db: B, notifier: Notifier) -> Self {
        let orders = OrderSyncApi::new(db.clone());
        Self { db, notifier, orders }
    }

    pub async fn sweep_tick(&self) -> Result<SweepReport, GroupBuyError> {
        self.sweep_tick_at(Utc::now()).await
    }

    /// Runs one sweep as if the time were `now`. Only failing to list the active group buys fails the tick. Errors on
    /// individual group buys are collected in the report and the rest of the batch carries on.
    pub async fn sweep_tick_at(&self, now: DateTime<Utc>) -> Result<SweepReport, GroupBuyError> {
        let active =
            self.db.fetch_group_buys_with_status(GroupBuyStatus::Active).await.map_err(GroupBuyError::database)?;
        trace!("🧹️ Sweeping {} active group buys", active.len());
        let mut report = SweepReport::default();
        for group in active {
            report.processed += 1;
            match self.sweep_group_buy(&group, now).await {
                Ok(SweepAction::Nothing) => {},
                Ok(SweepAction::Finalized(sync_error)) => {
                    report.finalized.push(group.id);
                    if let Some(reason) = sync_error {
                        report.errors.push(SweepError { group_buy_id: group.id, reason });
                    }
                },
                Ok(SweepAction::ExpiryNotified(threshold)) => {
                    debug!("🧹️ Sent the {threshold} reminder for group buy {}", group.id);
                    report.expiring_notified.push(group.id);
                },
                Err(e) => {
                    error!("🧹️ Error sweeping group buy {}: {e}", group.id);
                    report.errors.push(SweepError { group_buy_id: group.id, reason: e.to_string() });
                },
            }
        }
        if !report.finalized.is_empty() || !report.expiring_notified.is_empty() || !report.errors.is_empty() {
            info!(
                "🧹️ Sweep done. {} processed, {} finalized, {} reminded, {} errors",
                report.processed,
                report.finalized.len(),
                report.expiring_notified.len(),
                report.errors.len()
            );
        }
        Ok(report)
    }

    async fn sweep_group_buy(&self, group: &GroupBuy, now: DateTime<Utc>) -> Result<SweepAction, GroupBuyError> {
        if group.is_expired_at(now) {
            self.finalize(group, now).await
        } else {
            self.remind(group, now).await
        }
    }

    async fn finalize(&self, group: &GroupBuy, now: DateTime<Utc>) -> Result<SweepAction, GroupBuyError> {
        let Some(entry) =
            self.db.finalize_expired_group_buy(group.id, now).await.map_err(GroupBuyError::database)?
        else {
            debug!("🧹️ Group buy {} was finalized by someone else", group.id);
            return Ok(SweepAction::Nothing);
        };
        let group = self
            .db
            .fetch_group_buy(group.id)
            .await
            .map_err(GroupBuyError::database)?
            .ok_or(GroupBuyError::GroupBuyNotFound(group.id))?;
        info!(
            "🧹️ Group buy {} expired with {}/{} units. It is now {}.",
            group.id, group.units_sold, group.minimum_viable_units, entry.status
        );
        self.notifier.status_changed(&group, GroupBuyStatus::Active, &entry).await;
        let succeeded = entry.status == GroupBuyStatus::Successful;
        let templates: &[&str] = if succeeded {
            &[TEMPLATE_EXPIRED_SUCCESSFUL]
        } else {
            &[TEMPLATE_EXPIRED_FAILED, TEMPLATE_NEEDS_MANUAL_REVIEW]
        };
        self.notifier.announce(&self.db, &group, &entry, templates).await;
        let mut sync_error = None;
        if succeeded {
            if let Err(e) = self.orders.sync_orders_for(&group).await {
                error!("🧹️ Group buy {} was finalized but its orders could not be synced: {e}", group.id);
                sync_error = Some(format!("Order sync failed after finalizing: {e}"));
            }
        }
        Ok(SweepAction::Finalized(sync_error))
    }

    /// Sends the reminder for the tightest window the group buy has entered. Looser windows that were skipped over
    /// are marked as done without a message.
    async fn remind(&self, group: &GroupBuy, now: DateTime<Utc>) -> Result<SweepAction, GroupBuyError> {
        let remaining = group.expires_at - now;
        let entered =
            ExpiryThreshold::ALL.iter().copied().filter(|t| remaining <= t.window()).collect::<Vec<ExpiryThreshold>>();
        let Some(&tightest) = entered.last() else {
            return Ok(SweepAction::Nothing);
        };
        if tightest.is_flagged(group) {
            return Ok(SweepAction::Nothing);
        }
        for threshold in entered.iter().filter(|t| **t != tightest && !t.is_flagged(group)) {
            self.db.claim_expiry_notice(group.id, *threshold).await.map_err(GroupBuyError::database)?;
        }
        if !self.db.claim_expiry_notice(group.id, tightest).await.map_err(GroupBuyError::database)? {
            return Ok(SweepAction::Nothing);
        }
        let extra = json!({ "threshold": tightest.label(), "minutes_remaining": remaining.num_minutes() });
        self.notifier.notify_participants(group, &[TEMPLATE_EXPIRING_SOON], Some(&extra)).await;
        Ok(SweepAction::ExpiryNotified(tightest))
    }
}
