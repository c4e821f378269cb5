use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
pub use gb_common::Money;
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid value: {0}")]
pub struct ConversionError(String);

//--------------------------------------      GroupBuyId       ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct GroupBuyId(pub i64);

impl From<i64> for GroupBuyId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl Display for GroupBuyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "GB#{}", self.0)
    }
}

impl GroupBuyId {
    pub fn value(&self) -> i64 {
        self.0
    }
}

//--------------------------------------        OrderId        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct OrderId(pub String);

impl FromStr for OrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OrderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl OrderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------    GroupBuyStatus     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum GroupBuyStatus {
    /// Accepting participants until the deadline.
    Active,
    /// The minimum viable units were reached.
    Successful,
    /// Confirmed for fulfillment by an admin.
    Secured,
    Processing,
    Packaging,
    ReadyForPickup,
    Delivered,
    /// Expired below the threshold. Waiting for an admin to approve or reject.
    ManualReview,
    Failed,
    /// Every participant has been refunded.
    Refunded,
}

impl GroupBuyStatus {
    pub const ALL: [GroupBuyStatus; 10] = [
        Self::Active,
        Self::Successful,
        Self::Secured,
        Self::Processing,
        Self::Packaging,
        Self::ReadyForPickup,
        Self::Delivered,
        Self::ManualReview,
        Self::Failed,
        Self::Refunded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Successful => "successful",
            Self::Secured => "secured",
            Self::Processing => "processing",
            Self::Packaging => "packaging",
            Self::ReadyForPickup => "ready_for_pickup",
            Self::Delivered => "delivered",
            Self::ManualReview => "manual_review",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
        }
    }

    /// Position in the fulfillment chain `successful → … → delivered`, or `None` outside of it.
    pub fn chain_rank(&self) -> Option<u8> {
        match self {
            Self::Successful => Some(0),
            Self::Secured => Some(1),
            Self::Processing => Some(2),
            Self::Packaging => Some(3),
            Self::ReadyForPickup => Some(4),
            Self::Delivered => Some(5),
            _ => None,
        }
    }

    pub fn is_fulfillment_chain(&self) -> bool {
        self.chain_rank().is_some()
    }

    /// The order line-item status that mirrors this group buy status.
    pub fn item_status(&self) -> Option<ItemGroupStatus> {
        match self {
            Self::Successful | Self::Secured | Self::Processing | Self::Packaging => Some(ItemGroupStatus::Secured),
            Self::ReadyForPickup | Self::Delivered => Some(ItemGroupStatus::Dispatched),
            _ => None,
        }
    }
}

impl Display for GroupBuyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for GroupBuyStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ConversionError(format!("Invalid group buy status: {s}")))
    }
}

//--------------------------------------      Participant      ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct Participant {
    pub id: i64,
    pub group_buy_id: GroupBuyId,
    pub user_id: String,
    pub quantity: i64,
    /// What the participant paid, and what is returned on a refund.
    pub amount: Money,
    pub joined_at: DateTime<Utc>,
    pub payment_refs: Json<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct NewParticipant {
    pub user_id: String,
    pub quantity: i64,
    pub payment_refs: Vec<String>,
}

impl NewParticipant {
    pub fn new<S: Into<String>>(user_id: S, quantity: i64) -> Self {
        Self { user_id: user_id.into(), quantity, payment_refs: Vec::new() }
    }

    pub fn with_payment_ref<S: Into<String>>(mut self, payment_ref: S) -> Self {
        self.payment_refs.push(payment_ref.into());
        self
    }
}

//--------------------------------------   AdminStatusEntry    ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct AdminStatusEntry {
    pub id: i64,
    pub group_buy_id: GroupBuyId,
    pub status: GroupBuyStatus,
    pub changed_by: String,
    pub notes: String,
    pub timestamp: DateTime<Utc>,
    pub notification_sent: bool,
}

/// The author recorded in the status history for automatic transitions.
pub const SYSTEM_ACTOR: &str = "system";

//--------------------------------------    FulfillmentData    ---------------------------------------------------------
#[derive(Debug, Clone, Default, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct FulfillmentData {
    pub delivery_method: Option<String>,
    pub pickup_location: Option<String>,
    pub delivery_address: Option<String>,
    pub tracking_number: Option<String>,
}

impl FulfillmentData {
    pub fn is_empty(&self) -> bool {
        self.delivery_method.is_none() &&
            self.pickup_location.is_none() &&
            self.delivery_address.is_none() &&
            self.tracking_number.is_none()
    }
}

//--------------------------------------       GroupBuy        ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct GroupBuy {
    pub id: GroupBuyId,
    pub product_ref: String,
    pub unit_price: Money,
    pub units_sold: i64,
    pub minimum_viable_units: i64,
    pub status: GroupBuyStatus,
    pub expires_at: DateTime<Utc>,
    #[sqlx(flatten)]
    pub fulfillment: FulfillmentData,
    pub finalized_at: Option<DateTime<Utc>>,
    pub notified_6h: bool,
    pub notified_2h: bool,
    pub notified_1h: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(skip)]
    pub participants: Vec<Participant>,
    #[sqlx(skip)]
    pub admin_status_history: Vec<AdminStatusEntry>,
}

impl GroupBuy {
    /// Display-only progress towards the threshold. Never gate control flow on this value.
    pub fn progress_percentage(&self) -> i64 {
        if self.minimum_viable_units <= 0 {
            return 100;
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
        let pct = (self.units_sold as f64 / self.minimum_viable_units as f64 * 100.0).round() as i64;
        pct
    }

    pub fn units_remaining(&self) -> i64 {
        (self.minimum_viable_units - self.units_sold).max(0)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    pub fn total_paid(&self) -> Money {
        self.participants.iter().map(|p| p.amount).sum()
    }

    pub fn status_report_at(&self, now: DateTime<Utc>) -> GroupBuyStatusReport {
        GroupBuyStatusReport {
            id: self.id,
            status: self.status,
            progress_percentage: self.progress_percentage(),
            participant_count: self.participant_count(),
            units_remaining: self.units_remaining(),
            is_expired: self.is_expired_at(now),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewGroupBuy {
    pub product_ref: String,
    pub unit_price: Money,
    pub minimum_viable_units: i64,
    pub expires_at: DateTime<Utc>,
}

impl NewGroupBuy {
    pub fn new<S: Into<String>>(
        product_ref: S,
        unit_price: Money,
        minimum_viable_units: i64,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self { product_ref: product_ref.into(), unit_price, minimum_viable_units, expires_at }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupBuyStatusReport {
    pub id: GroupBuyId,
    pub status: GroupBuyStatus,
    pub progress_percentage: i64,
    pub participant_count: usize,
    pub units_remaining: i64,
    pub is_expired: bool,
}

//--------------------------------------    ExpiryThreshold    ---------------------------------------------------------
/// The "expiring soon" reminder windows. Each one is sent at most once per group buy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ExpiryThreshold {
    SixHours,
    TwoHours,
    OneHour,
}

impl ExpiryThreshold {
    /// Loosest first.
    pub const ALL: [ExpiryThreshold; 3] = [Self::SixHours, Self::TwoHours, Self::OneHour];

    pub fn window(&self) -> chrono::Duration {
        match self {
            Self::SixHours => chrono::Duration::hours(6),
            Self::TwoHours => chrono::Duration::hours(2),
            Self::OneHour => chrono::Duration::hours(1),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::SixHours => "6h",
            Self::TwoHours => "2h",
            Self::OneHour => "1h",
        }
    }

    /// The persisted flag column for this threshold.
    pub fn column(&self) -> &'static str {
        match self {
            Self::SixHours => "notified_6h",
            Self::TwoHours => "notified_2h",
            Self::OneHour => "notified_1h",
        }
    }

    pub fn is_flagged(&self, group: &GroupBuy) -> bool {
        match self {
            Self::SixHours => group.notified_6h,
            Self::TwoHours => group.notified_2h,
            Self::OneHour => group.notified_1h,
        }
    }
}

impl Display for ExpiryThreshold {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

//--------------------------------------    ItemGroupStatus    ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ItemGroupStatus {
    Forming,
    Secured,
    Dispatched,
}

impl Display for ItemGroupStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Forming => write!(f, "forming"),
            Self::Secured => write!(f, "secured"),
            Self::Dispatched => write!(f, "dispatched"),
        }
    }
}

//--------------------------------------    OrderStatusType    ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatusType {
    /// Checked out, waiting for its groups to reach their thresholds.
    Placed,
    /// Every group the order depends on is secured.
    AllSecured,
    /// Every group the order depends on has been dispatched.
    Dispatched,
    Delivered,
    PickedUp,
    Cancelled,
}

impl OrderStatusType {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::PickedUp | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Placed => "placed",
            Self::AllSecured => "all_secured",
            Self::Dispatched => "dispatched",
            Self::Delivered => "delivered",
            Self::PickedUp => "picked_up",
            Self::Cancelled => "cancelled",
        }
    }
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

//--------------------------------------       OrderItem       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct OrderItem {
    pub id: i64,
    pub product_ref: String,
    pub quantity: i64,
    pub price: Money,
    pub group_buy_id: GroupBuyId,
    pub group_status: ItemGroupStatus,
    /// The last group buy status mirrored into this item. Used to make the cross-sync idempotent.
    pub group_buy_status: GroupBuyStatus,
}

#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub product_ref: String,
    pub quantity: i64,
    pub price: Money,
    pub group_buy_id: GroupBuyId,
}

impl NewOrderItem {
    pub fn new<S: Into<String>>(product_ref: S, quantity: i64, price: Money, group_buy_id: GroupBuyId) -> Self {
        Self { product_ref: product_ref.into(), quantity, price, group_buy_id }
    }
}

//--------------------------------------     ProgressEntry     ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct ProgressEntry {
    pub id: i64,
    pub status: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProgressEntry {
    pub status: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl NewProgressEntry {
    pub fn new<S: Into<String>, M: Into<String>>(status: S, message: M, timestamp: DateTime<Utc>) -> Self {
        Self { status: status.into(), message: message.into(), timestamp }
    }
}

//--------------------------------------         Order         ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Order {
    pub id: i64,
    pub order_id: OrderId,
    pub owner_id: String,
    pub current_status: OrderStatusType,
    pub all_groups_secured: bool,
    pub priority_score: i64,
    /// Write counter. Sync steps are applied only against the version they were planned from.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(skip)]
    pub items: Vec<OrderItem>,
    #[sqlx(skip)]
    pub progress: Vec<ProgressEntry>,
}

impl Order {
    pub fn items_for_group(&self, group_buy_id: GroupBuyId) -> impl Iterator<Item = &OrderItem> {
        self.items.iter().filter(move |i| i.group_buy_id == group_buy_id)
    }

    pub fn total_price(&self) -> Money {
        self.items.iter().map(|i| i.price * i.quantity).sum()
    }
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    /// The order id as assigned at checkout
    pub order_id: OrderId,
    pub owner_id: String,
    pub items: Vec<NewOrderItem>,
    pub created_at: DateTime<Utc>,
}

impl NewOrder {
    pub fn new<S: Into<String>>(order_id: OrderId, owner_id: S) -> Self {
        Self { order_id, owner_id: owner_id.into(), items: Vec::new(), created_at: Utc::now() }
    }

    pub fn with_item(mut self, item: NewOrderItem) -> Self {
        self.items.push(item);
        self
    }
}

//--------------------------------------        Wallet         ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct Wallet {
    pub id: i64,
    pub user_id: String,
    pub balance: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum WalletTransactionType {
    Refund,
}

impl Display for WalletTransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Refund => write!(f, "REFUND"),
        }
    }
}

/// An immutable ledger line.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct WalletTransaction {
    pub id: i64,
    pub wallet_id: i64,
    pub kind: WalletTransactionType,
    pub amount: Money,
    pub group_buy_id: Option<GroupBuyId>,
    pub participant_id: Option<i64>,
    pub quantity: Option<i64>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewRefund {
    pub user_id: String,
    pub amount: Money,
    pub group_buy_id: GroupBuyId,
    pub participant_id: i64,
    pub quantity: i64,
    pub description: String,
}

impl NewRefund {
    pub fn for_participant(group: &GroupBuy, participant: &Participant) -> Self {
        Self {
            user_id: participant.user_id.clone(),
            amount: participant.amount,
            group_buy_id: group.id,
            participant_id: participant.id,
            quantity: participant.quantity,
            description: format!(
                "Refund for {} x {} in group buy {}",
                participant.quantity, group.product_ref, group.id
            ),
        }
    }
}
