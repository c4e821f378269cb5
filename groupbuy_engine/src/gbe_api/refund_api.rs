use std::{fmt::Debug, time::Duration};

use chrono::Utc;
use log::*;
use serde::Serialize;

use crate::{
    db::traits::{RefundResult, WalletManagement},
    db_types::{GroupBuy, GroupBuyStatus, Money, NewRefund},
    gbe_api::errors::GroupBuyError,
};

pub const DEFAULT_REFUND_TIMEOUT: Duration = Duration::from_secs(10);

/// A participant that could not be refunded on this run. Feeding the group buy back into the orchestrator retries
/// exactly these participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefundError {
    pub participant_id: i64,
    pub user_id: String,
    pub amount: Money,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefundSummary {
    pub refunds_processed: usize,
    pub total_refunded: Money,
    /// The sum of refunds that were credited on an earlier run and skipped on this one.
    pub already_refunded: Money,
    pub errors: Vec<RefundError>,
}

impl RefundSummary {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn failed_amount(&self) -> Money {
        self.errors.iter().map(|e| e.amount).sum()
    }
}

/// The `RefundApi` returns every participant's payment to their wallet when a group buy fails.
pub struct RefundApi<B> {
    db: B,
    timeout: Duration,
}

impl<B: Debug> Debug for RefundApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RefundApi ({:?})", self.db)
    }
}

impl<B> RefundApi<B>
where B: WalletManagement
{
    pub fn new(db: B, timeout: Duration) -> Self {
        Self { db, timeout }
    }

    /// Credits each participant of a failed group buy with what they paid.
    ///
    /// A failure on one participant is recorded in the summary and does not stop the rest from being refunded.
    /// Participants that already hold a refund for this group buy are skipped, so running this again only touches the
    /// ones that failed before.
    pub async fn refund_group_buy(&self, group: &GroupBuy) -> Result<RefundSummary, GroupBuyError> {
        match group.status {
            GroupBuyStatus::Failed => {},
            GroupBuyStatus::Refunded => return Err(GroupBuyError::AlreadyRefunded(group.id)),
            other => {
                return Err(GroupBuyError::ValidationError(format!(
                    "Group buy {} is {other}. Only failed group buys can be refunded.",
                    group.id
                )))
            },
        }
        info!("💸️ Refunding {} participants of group buy {}", group.participant_count(), group.id);
        let mut summary = RefundSummary::default();
        for participant in &group.participants {
            let refund = NewRefund::for_participant(group, participant);
            let call = self.db.credit_refund(refund, Utc::now());
            let reason = match tokio::time::timeout(self.timeout, call).await {
                Ok(Ok(RefundResult::Credited(tx))) => {
                    trace!("💸️ {} credited to {} in ledger line {}", tx.amount, participant.user_id, tx.id);
                    summary.refunds_processed += 1;
                    summary.total_refunded += participant.amount;
                    continue;
                },
                Ok(Ok(RefundResult::AlreadyRefunded)) => {
                    debug!("💸️ {} was already refunded for group buy {}", participant.user_id, group.id);
                    summary.already_refunded += participant.amount;
                    continue;
                },
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!("Wallet did not respond within {}ms", self.timeout.as_millis()),
            };
            warn!("💸️ Could not refund {} to {}: {reason}", participant.amount, participant.user_id);
            summary.errors.push(RefundError {
                participant_id: participant.id,
                user_id: participant.user_id.clone(),
                amount: participant.amount,
                reason,
            });
        }
        info!(
            "💸️ Group buy {}: {} refunds for {} processed, {} already refunded, {} failed",
            group.id,
            summary.refunds_processed,
            summary.total_refunded,
            summary.already_refunded,
            summary.errors.len()
        );
        Ok(summary)
    }
}
