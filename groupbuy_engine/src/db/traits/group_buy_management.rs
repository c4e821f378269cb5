use chrono::{DateTime, Utc};

use crate::{
    db::traits::{JoinResult, StatusChange, TransitionResult},
    db_types::{AdminStatusEntry, ExpiryThreshold, GroupBuy, GroupBuyId, GroupBuyStatus, NewGroupBuy, NewParticipant},
};

/// The `GroupBuyManagement` trait defines the behaviour for storing and mutating group buys.
///
/// Implementations must make every mutating method atomic. In particular:
/// * [`Self::join_group_buy`] increments the unit counter, appends the participant and (if the threshold is crossed)
///   flips the status to `successful` in one conditional write. Two joins racing for the last units cannot both pass
///   the capacity check.
/// * [`Self::transition_group_buy`] and [`Self::finalize_expired_group_buy`] only write if the status has not changed
///   since the caller read it.
/// * The `claim_*` methods are test-and-set operations: they return `true` for exactly one caller.
#[allow(async_fn_in_trait)]
pub trait GroupBuyManagement {
    type Error: std::error::Error;

    /// Returns the active group buy for the product if there is one, otherwise creates it.
    async fn insert_or_fetch_active_group_buy(&self, group: NewGroupBuy) -> Result<GroupBuy, Self::Error>;

    /// Fetches the group buy, its participants and its status history.
    async fn fetch_group_buy(&self, id: GroupBuyId) -> Result<Option<GroupBuy>, Self::Error>;

    async fn fetch_group_buys_with_status(&self, status: GroupBuyStatus) -> Result<Vec<GroupBuy>, Self::Error>;

    /// Adds a participant to an active, unexpired group buy if the quantity fits in the remaining capacity.
    async fn join_group_buy(
        &self,
        id: GroupBuyId,
        participant: NewParticipant,
        now: DateTime<Utc>,
    ) -> Result<JoinResult, Self::Error>;

    /// Applies `change` and appends the matching history entry, provided the status is still `change.from`.
    async fn transition_group_buy(&self, id: GroupBuyId, change: StatusChange) -> Result<TransitionResult, Self::Error>;

    /// Moves an active group buy to `successful` if it reached its threshold, or to `manual_review` otherwise, and
    /// stamps `finalized_at`. Returns `None` if the group buy was no longer active.
    async fn finalize_expired_group_buy(
        &self,
        id: GroupBuyId,
        now: DateTime<Utc>,
    ) -> Result<Option<AdminStatusEntry>, Self::Error>;

    /// Sets the persisted "expiring soon" flag for the threshold. Returns `true` only for the caller that set it.
    async fn claim_expiry_notice(&self, id: GroupBuyId, threshold: ExpiryThreshold) -> Result<bool, Self::Error>;

    /// Marks the history entry as notified. Returns `true` only for the caller that set it.
    async fn claim_notification(&self, entry_id: i64) -> Result<bool, Self::Error>;
}
