use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
pub use mse_common::Money;
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow, Type};
use thiserror::Error;

//--------------------------------------     InvoiceCode     ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct InvoiceCode(pub String);

impl From<String> for InvoiceCode {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for InvoiceCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl InvoiceCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------   AccountSelector   ---------------------------------------------------------
/// Names exactly one balance-bearing account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountSelector {
    /// A wallet addressed by its own id. The platform and promotion wallets are addressed this way.
    ByWalletId(i64),
    /// The wallet owned by the given user.
    ByUserId(i64),
    /// The holding account of the given merchant.
    ByMerchantId(i64),
}

impl Display for AccountSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccountSelector::ByWalletId(id) => write!(f, "wallet #{id}"),
            AccountSelector::ByUserId(id) => write!(f, "wallet of user #{id}"),
            AccountSelector::ByMerchantId(id) => write!(f, "holding account of merchant #{id}"),
        }
    }
}

/// The two platform-owned ledger accounts. Both are ordinary wallets whose ids come from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformAccounts {
    pub platform_wallet_id: i64,
    pub promotion_wallet_id: i64,
}

impl PlatformAccounts {
    pub fn platform(&self) -> AccountSelector {
        AccountSelector::ByWalletId(self.platform_wallet_id)
    }

    pub fn promotion(&self) -> AccountSelector {
        AccountSelector::ByWalletId(self.promotion_wallet_id)
    }
}

//--------------------------------------   Ledger accounts   ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Wallet {
    pub id: i64,
    pub user_id: i64,
    pub balance: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct MerchantHoldingAccount {
    pub id: i64,
    pub merchant_id: i64,
    pub balance: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Why money moved. Stored alongside every history row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
pub enum MovementReason {
    TopUp,
    Payment,
    Promotion,
    Settlement,
    Refund,
    Withdrawal,
}

impl Display for MovementReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MovementReason::TopUp => "top_up",
            MovementReason::Payment => "payment",
            MovementReason::Promotion => "promotion",
            MovementReason::Settlement => "settlement",
            MovementReason::Refund => "refund",
            MovementReason::Withdrawal => "withdrawal",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct MerchantHoldingAccountHistory {
    pub id: i64,
    pub merchant_id: i64,
    pub transaction_id: Option<i64>,
    pub amount: Money,
    pub reason: MovementReason,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct WalletHistory {
    pub id: i64,
    pub wallet_id: i64,
    pub transaction_id: Option<i64>,
    pub payment_id: Option<String>,
    pub amount: Money,
    pub reason: MovementReason,
    pub created_at: DateTime<Utc>,
}

/// A single signed adjustment to one account, plus what to write in its history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerMove {
    pub account: AccountSelector,
    pub delta: Money,
    pub reason: MovementReason,
    pub transaction_id: Option<i64>,
    pub payment_id: Option<String>,
}

impl LedgerMove {
    pub fn new(account: AccountSelector, delta: Money, reason: MovementReason) -> Self {
        Self { account, delta, reason, transaction_id: None, payment_id: None }
    }

    pub fn for_transaction(mut self, transaction_id: i64) -> Self {
        self.transaction_id = Some(transaction_id);
        self
    }

    pub fn for_payment<S: Into<String>>(mut self, payment_id: S) -> Self {
        self.payment_id = Some(payment_id.into());
        self
    }
}

//--------------------------------------    PaymentRecord    ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Paid through the external card/bank gateway. Confirmed asynchronously by callback.
    Gateway,
    /// Paid from the buyer's own wallet. Confirmed inside the checkout.
    Wallet,
}

impl Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentMethod::Gateway => write!(f, "gateway"),
            PaymentMethod::Wallet => write!(f, "wallet"),
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: String,
    pub buyer_id: i64,
    pub amount: Money,
    pub method: PaymentMethod,
    pub paid_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl PaymentRecord {
    pub fn is_pending(&self) -> bool {
        self.paid_at.is_none() && self.canceled_at.is_none()
    }
}

//--------------------------------------      Snapshots      ---------------------------------------------------------
/// A cart line frozen at the moment of purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: i64,
    pub variant_id: i64,
    pub promotion_id: Option<i64>,
    pub product_name: String,
    pub unit_price: Money,
    /// Per-unit promotion discount, already clamped to the unit price.
    pub discount: Money,
    pub quantity: i64,
}

impl CartItem {
    pub fn line_total(&self) -> Money {
        (self.unit_price - self.discount) * self.quantity
    }
}

/// The money side of a transaction, frozen at the moment of purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PaymentDetails {
    pub subtotal: Money,
    pub delivery_fee: Money,
    pub merchant_voucher_nominal: Money,
    pub marketplace_voucher_nominal: Money,
    /// What the buyer actually paid.
    pub total: Money,
}

impl PaymentDetails {
    /// Prices a merchant cart. Voucher deductions are clamped so that the total is never negative: the merchant voucher
    /// applies to the subtotal, the marketplace voucher to whatever remains after it (delivery fee included).
    pub fn compute(
        items: &[CartItem],
        delivery_fee: Money,
        merchant_voucher: Money,
        marketplace_voucher: Money,
    ) -> Self {
        let subtotal: Money = items.iter().map(CartItem::line_total).sum();
        let merchant_voucher_nominal = merchant_voucher.min(subtotal).max(Money::ZERO);
        let remaining = subtotal + delivery_fee - merchant_voucher_nominal;
        let marketplace_voucher_nominal = marketplace_voucher.min(remaining).max(Money::ZERO);
        Self {
            subtotal,
            delivery_fee,
            merchant_voucher_nominal,
            marketplace_voucher_nominal,
            total: remaining - marketplace_voucher_nominal,
        }
    }

    /// The amount owed to the merchant: `subtotal + delivery fee − merchant voucher`.
    pub fn settlement_amount(&self) -> Money {
        self.subtotal + self.delivery_fee - self.merchant_voucher_nominal
    }

    /// The part of the settlement amount subsidised by the marketplace's promotion account.
    pub fn promotion_amount(&self) -> Money {
        self.marketplace_voucher_nominal
    }
}

//--------------------------------------     Transaction     ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub invoice_code: InvoiceCode,
    pub buyer_id: i64,
    pub merchant_id: i64,
    pub merchant_domain: String,
    pub payment_id: String,
    pub marketplace_voucher_id: Option<i64>,
    pub merchant_voucher_id: Option<i64>,
    pub cart_items: Json<Vec<CartItem>>,
    pub payment_details: Json<PaymentDetails>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    pub fn settlement_amount(&self) -> Money {
        self.payment_details.settlement_amount()
    }

    pub fn promotion_amount(&self) -> Money {
        self.payment_details.promotion_amount()
    }

    pub fn total_paid(&self) -> Money {
        self.payment_details.total
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TransactionDeliveryStatus {
    pub transaction_id: i64,
    pub receipt_number: Option<String>,
    pub on_delivery_at: Option<DateTime<Utc>>,
    pub on_delivered_at: Option<DateTime<Utc>>,
}

impl TransactionDeliveryStatus {
    pub fn has_receipt(&self) -> bool {
        self.receipt_number.as_deref().map(|r| !r.trim().is_empty()).unwrap_or(false)
    }
}

/// The result of taking a transaction to a terminal state.
#[derive(Debug, Clone)]
pub struct SettledTransaction {
    pub transaction: Transaction,
    pub status: TransactionStatus,
    pub outcome: SettlementOutcome,
}

/// A transaction together with its two owned sub-entities.
#[derive(Debug, Clone)]
pub struct TransactionRecord {
    pub transaction: Transaction,
    pub status: TransactionStatus,
    pub delivery: TransactionDeliveryStatus,
}

//--------------------------------------      Milestone      ---------------------------------------------------------
/// The non-terminal lifecycle milestones, in the only order they may be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Milestone {
    Waited,
    Processed,
    OnDelivery,
    Delivered,
}

impl Milestone {
    pub const ALL: [Milestone; 4] =
        [Milestone::Waited, Milestone::Processed, Milestone::OnDelivery, Milestone::Delivered];

    /// The milestone that must be reached immediately after `current` (`None` means "just created").
    pub fn successor_of(current: Option<Milestone>) -> Option<Milestone> {
        match current {
            None => Some(Milestone::Waited),
            Some(Milestone::Waited) => Some(Milestone::Processed),
            Some(Milestone::Processed) => Some(Milestone::OnDelivery),
            Some(Milestone::OnDelivery) => Some(Milestone::Delivered),
            Some(Milestone::Delivered) => None,
        }
    }

    pub fn predecessor(&self) -> Option<Milestone> {
        match self {
            Milestone::Waited => None,
            Milestone::Processed => Some(Milestone::Waited),
            Milestone::OnDelivery => Some(Milestone::Processed),
            Milestone::Delivered => Some(Milestone::OnDelivery),
        }
    }

    /// The `transaction_statuses` column recording this milestone.
    pub fn column(&self) -> &'static str {
        match self {
            Milestone::Waited => "waited_at",
            Milestone::Processed => "processed_at",
            Milestone::OnDelivery => "on_delivery_at",
            Milestone::Delivered => "delivered_at",
        }
    }
}

impl Display for Milestone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Milestone::Waited => write!(f, "waited"),
            Milestone::Processed => write!(f, "processed"),
            Milestone::OnDelivery => write!(f, "on_delivery"),
            Milestone::Delivered => write!(f, "delivered"),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid milestone: {0}")]
pub struct ConversionError(String);

impl FromStr for Milestone {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waited" => Ok(Self::Waited),
            "processed" => Ok(Self::Processed),
            "on_delivery" => Ok(Self::OnDelivery),
            "delivered" => Ok(Self::Delivered),
            s => Err(ConversionError(s.to_string())),
        }
    }
}

//--------------------------------------  SettlementOutcome  ---------------------------------------------------------
/// The three mutually exclusive terminal states of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SettlementOutcome {
    Completed,
    Canceled,
    Refunded,
}

impl SettlementOutcome {
    pub fn column(&self) -> &'static str {
        match self {
            SettlementOutcome::Completed => "completed_at",
            SettlementOutcome::Canceled => "canceled_at",
            SettlementOutcome::Refunded => "refunded_at",
        }
    }
}

impl Display for SettlementOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettlementOutcome::Completed => write!(f, "completed"),
            SettlementOutcome::Canceled => write!(f, "canceled"),
            SettlementOutcome::Refunded => write!(f, "refunded"),
        }
    }
}

/// Who is driving a settlement. Only the refund negotiation may settle a transaction that has a refund in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementTrigger {
    /// A buyer, seller, admin or scheduler acting on the transaction itself.
    Direct,
    /// The refund negotiation resolving its request.
    RefundResolution,
}

//--------------------------------------  TransactionStatus  ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Cannot skip from {from:?} to {to}")]
    CannotSkip { from: Option<Milestone>, to: Milestone },
    #[error("Cannot move back from {current} to {to}")]
    CannotReverse { current: Milestone, to: Milestone },
    #[error("The transaction is already {0}")]
    AlreadyTerminal(SettlementOutcome),
    #[error("A receipt number must be recorded before the transaction goes on delivery")]
    ReceiptNumberRequired,
    #[error("The waited milestone is only reached through payment confirmation")]
    WaitedRequiresPayment,
    #[error("The transaction has not been paid for")]
    NotPaid,
    #[error("The transaction has not been delivered yet")]
    NotDelivered,
    #[error("The transaction has already been handed to the carrier")]
    AlreadyShipped,
    #[error("A refund request is in progress for this transaction")]
    RefundInProgress,
    #[error("No refund has been requested for this transaction")]
    RefundNotRequested,
    #[error("A receipt number can only be recorded while the transaction is being processed")]
    ReceiptNotAllowed,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TransactionStatus {
    pub transaction_id: i64,
    pub waited_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub on_delivery_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub request_refund_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

impl TransactionStatus {
    pub fn new(transaction_id: i64) -> Self {
        Self {
            transaction_id,
            waited_at: None,
            processed_at: None,
            on_delivery_at: None,
            delivered_at: None,
            completed_at: None,
            canceled_at: None,
            refunded_at: None,
            request_refund_at: None,
            notes: None,
        }
    }

    pub fn milestone_at(&self, milestone: Milestone) -> Option<DateTime<Utc>> {
        match milestone {
            Milestone::Waited => self.waited_at,
            Milestone::Processed => self.processed_at,
            Milestone::OnDelivery => self.on_delivery_at,
            Milestone::Delivered => self.delivered_at,
        }
    }

    /// The furthest milestone reached, or `None` for a freshly created (unpaid) transaction.
    pub fn last_milestone(&self) -> Option<Milestone> {
        Milestone::ALL.into_iter().rev().find(|m| self.milestone_at(*m).is_some())
    }

    pub fn terminal(&self) -> Option<SettlementOutcome> {
        match (self.completed_at, self.canceled_at, self.refunded_at) {
            (Some(_), _, _) => Some(SettlementOutcome::Completed),
            (_, Some(_), _) => Some(SettlementOutcome::Canceled),
            (_, _, Some(_)) => Some(SettlementOutcome::Refunded),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal().is_some()
    }

    /// The refund flag only means something while the transaction is still open.
    pub fn is_refund_in_flight(&self) -> bool {
        self.request_refund_at.is_some() && !self.is_terminal()
    }

    /// Checks that `target` may be recorded now. `has_receipt` reports whether the delivery status carries a receipt.
    pub fn validate_advance(&self, target: Milestone, has_receipt: bool) -> Result<(), TransitionError> {
        if let Some(outcome) = self.terminal() {
            return Err(TransitionError::AlreadyTerminal(outcome));
        }
        let current = self.last_milestone();
        if let Some(current) = current {
            if target <= current {
                return Err(TransitionError::CannotReverse { current, to: target });
            }
        }
        if Milestone::successor_of(current) != Some(target) {
            return Err(TransitionError::CannotSkip { from: current, to: target });
        }
        if target == Milestone::OnDelivery && !has_receipt {
            return Err(TransitionError::ReceiptNumberRequired);
        }
        Ok(())
    }

    /// Checks that the transaction may reach `outcome` now.
    pub fn validate_settlement(
        &self,
        outcome: SettlementOutcome,
        trigger: SettlementTrigger,
    ) -> Result<(), TransitionError> {
        if let Some(done) = self.terminal() {
            return Err(TransitionError::AlreadyTerminal(done));
        }
        let refund_pending = self.request_refund_at.is_some();
        match outcome {
            SettlementOutcome::Canceled => {
                if self.waited_at.is_none() {
                    return Err(TransitionError::NotPaid);
                }
                if self.on_delivery_at.is_some() {
                    return Err(TransitionError::AlreadyShipped);
                }
                if refund_pending {
                    return Err(TransitionError::RefundInProgress);
                }
            },
            SettlementOutcome::Completed => {
                if self.delivered_at.is_none() {
                    return Err(TransitionError::NotDelivered);
                }
                if refund_pending && trigger != SettlementTrigger::RefundResolution {
                    return Err(TransitionError::RefundInProgress);
                }
            },
            SettlementOutcome::Refunded => {
                if self.delivered_at.is_none() {
                    return Err(TransitionError::NotDelivered);
                }
                if !refund_pending || trigger != SettlementTrigger::RefundResolution {
                    return Err(TransitionError::RefundNotRequested);
                }
            },
        }
        Ok(())
    }

    /// A refund may only be requested on a delivered transaction that has not reached a terminal state.
    pub fn validate_refund_request(&self) -> Result<(), TransitionError> {
        if let Some(done) = self.terminal() {
            return Err(TransitionError::AlreadyTerminal(done));
        }
        if self.delivered_at.is_none() {
            return Err(TransitionError::NotDelivered);
        }
        if self.request_refund_at.is_some() {
            return Err(TransitionError::RefundInProgress);
        }
        Ok(())
    }

    pub fn validate_receipt_update(&self) -> Result<(), TransitionError> {
        if let Some(done) = self.terminal() {
            return Err(TransitionError::AlreadyTerminal(done));
        }
        match self.last_milestone() {
            Some(Milestone::Processed) => Ok(()),
            Some(Milestone::OnDelivery | Milestone::Delivered) => Err(TransitionError::AlreadyShipped),
            _ => Err(TransitionError::ReceiptNotAllowed),
        }
    }
}

//--------------------------------------    Refund request    --------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct RefundRequest {
    pub id: i64,
    pub transaction_id: i64,
    pub buyer_id: i64,
    pub reason: String,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewRefundRequest {
    pub transaction_id: i64,
    pub buyer_id: i64,
    pub reason: String,
    pub image_url: Option<String>,
}

impl NewRefundRequest {
    pub fn new<S: Into<String>>(transaction_id: i64, buyer_id: i64, reason: S) -> Self {
        Self { transaction_id, buyer_id, reason: reason.into(), image_url: None }
    }

    pub fn with_image_url<S: Into<String>>(mut self, url: S) -> Self {
        self.image_url = Some(url.into());
        self
    }
}

/// One row of a refund request's decision history.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct RefundRequestStatus {
    pub id: i64,
    pub refund_request_id: i64,
    pub canceled_by_buyer_at: Option<DateTime<Utc>>,
    pub accepted_by_buyer_at: Option<DateTime<Utc>>,
    pub rejected_by_buyer_at: Option<DateTime<Utc>>,
    pub accepted_by_seller_at: Option<DateTime<Utc>>,
    pub rejected_by_seller_at: Option<DateTime<Utc>>,
    pub accepted_by_admin_at: Option<DateTime<Utc>>,
    pub rejected_by_admin_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// How a refund request (or one of its superseded rows) ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RefundResolution {
    /// Admin approved. Money went back to the buyer.
    Refunded,
    /// The buyer accepted the admin's rejection. Money went to the merchant.
    Withdrawn,
    /// The buyer cancelled before anyone decided. Money went to the merchant.
    CanceledByBuyer,
    /// The buyer exhausted their rejections. Money went to the merchant.
    Dismissed,
    /// Not a resolution of the request: this row was closed and a newer row took over.
    Superseded,
}

/// The actor whose decision an open refund request is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RefundStage {
    AwaitingSeller,
    AwaitingAdmin,
    AwaitingBuyer,
    Closed(RefundResolution),
}

impl Display for RefundStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefundStage::AwaitingSeller => write!(f, "awaiting seller"),
            RefundStage::AwaitingAdmin => write!(f, "awaiting admin"),
            RefundStage::AwaitingBuyer => write!(f, "awaiting buyer"),
            RefundStage::Closed(r) => write!(f, "closed ({r:?})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RefundDecision {
    SellerAccept,
    SellerReject,
    AdminAccept,
    AdminReject,
    BuyerAccept,
    BuyerReject,
    BuyerCancel,
}

impl Display for RefundDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RefundDecision::SellerAccept => "seller accept",
            RefundDecision::SellerReject => "seller reject",
            RefundDecision::AdminAccept => "admin accept",
            RefundDecision::AdminReject => "admin reject",
            RefundDecision::BuyerAccept => "buyer accept",
            RefundDecision::BuyerReject => "buyer reject",
            RefundDecision::BuyerCancel => "buyer cancel",
        };
        f.write_str(s)
    }
}

/// The `refund_request_statuses` columns a decision can stamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefundStatusField {
    CanceledByBuyer,
    AcceptedByBuyer,
    RejectedByBuyer,
    AcceptedBySeller,
    RejectedBySeller,
    AcceptedByAdmin,
    RejectedByAdmin,
}

impl RefundStatusField {
    pub fn column(&self) -> &'static str {
        match self {
            RefundStatusField::CanceledByBuyer => "canceled_by_buyer_at",
            RefundStatusField::AcceptedByBuyer => "accepted_by_buyer_at",
            RefundStatusField::RejectedByBuyer => "rejected_by_buyer_at",
            RefundStatusField::AcceptedBySeller => "accepted_by_seller_at",
            RefundStatusField::RejectedBySeller => "rejected_by_seller_at",
            RefundStatusField::AcceptedByAdmin => "accepted_by_admin_at",
            RefundStatusField::RejectedByAdmin => "rejected_by_admin_at",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RefundStageError {
    #[error("Cannot apply '{decision}' while the request is {stage}")]
    WrongStage { stage: RefundStage, decision: RefundDecision },
    #[error("The refund request is already closed ({0:?})")]
    RequestClosed(RefundResolution),
}

/// Everything a decision does to the history and the transaction. Computed without touching the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefundTransition {
    pub stamp: RefundStatusField,
    pub close_row: bool,
    /// `Some(carry_seller_acceptance)` when a fresh open row must be appended.
    pub append_row: Option<bool>,
    pub settlement: Option<SettlementOutcome>,
    pub next_stage: RefundStage,
}

impl RefundRequestStatus {
    /// The stage this row represents. Only meaningful for the latest row of a request; see [`Self::stages`].
    pub fn stage(&self) -> RefundStage {
        if self.closed_at.is_some() {
            let resolution = if self.accepted_by_admin_at.is_some() {
                RefundResolution::Refunded
            } else if self.canceled_by_buyer_at.is_some() {
                RefundResolution::CanceledByBuyer
            } else if self.accepted_by_buyer_at.is_some() {
                RefundResolution::Withdrawn
            } else if self.rejected_by_buyer_at.is_some() {
                RefundResolution::Dismissed
            } else {
                RefundResolution::Superseded
            };
            return RefundStage::Closed(resolution);
        }
        if self.rejected_by_admin_at.is_some() {
            RefundStage::AwaitingBuyer
        } else if self.accepted_by_seller_at.is_some() {
            RefundStage::AwaitingAdmin
        } else {
            RefundStage::AwaitingSeller
        }
    }

    pub fn is_open(&self) -> bool {
        self.closed_at.is_none()
    }

    /// The stage of every row in `history` (oldest first). A closed row that a newer row followed is `Superseded`,
    /// whatever closed it.
    pub fn stages(history: &[RefundRequestStatus]) -> Vec<RefundStage> {
        let last = history.len().saturating_sub(1);
        history
            .iter()
            .enumerate()
            .map(|(i, row)| match row.closed_at {
                Some(_) if i < last => RefundStage::Closed(RefundResolution::Superseded),
                _ => row.stage(),
            })
            .collect()
    }
}

impl RefundStage {
    /// Works out what `decision` does from this stage. `prior_buyer_rejections` is the number of rejections the buyer
    /// has already made on this request; reaching `max_buyer_rejections` dismisses the request.
    pub fn apply(
        &self,
        decision: RefundDecision,
        prior_buyer_rejections: u32,
        max_buyer_rejections: u32,
    ) -> Result<RefundTransition, RefundStageError> {
        use RefundDecision::*;
        use RefundStage::*;
        let transition = match (*self, decision) {
            (Closed(resolution), _) => return Err(RefundStageError::RequestClosed(resolution)),
            (AwaitingSeller, SellerAccept) => RefundTransition {
                stamp: RefundStatusField::AcceptedBySeller,
                close_row: false,
                append_row: None,
                settlement: None,
                next_stage: AwaitingAdmin,
            },
            (AwaitingSeller, SellerReject) => RefundTransition {
                stamp: RefundStatusField::RejectedBySeller,
                close_row: true,
                append_row: Some(false),
                settlement: None,
                next_stage: AwaitingSeller,
            },
            (AwaitingSeller, BuyerCancel) => RefundTransition {
                stamp: RefundStatusField::CanceledByBuyer,
                close_row: true,
                append_row: None,
                settlement: Some(SettlementOutcome::Completed),
                next_stage: Closed(RefundResolution::CanceledByBuyer),
            },
            (AwaitingAdmin, AdminAccept) => RefundTransition {
                stamp: RefundStatusField::AcceptedByAdmin,
                close_row: true,
                append_row: None,
                settlement: Some(SettlementOutcome::Refunded),
                next_stage: Closed(RefundResolution::Refunded),
            },
            (AwaitingAdmin, AdminReject) => RefundTransition {
                stamp: RefundStatusField::RejectedByAdmin,
                close_row: false,
                append_row: None,
                settlement: None,
                next_stage: AwaitingBuyer,
            },
            (AwaitingBuyer, BuyerAccept) => RefundTransition {
                stamp: RefundStatusField::AcceptedByBuyer,
                close_row: true,
                append_row: None,
                settlement: Some(SettlementOutcome::Completed),
                next_stage: Closed(RefundResolution::Withdrawn),
            },
            (AwaitingBuyer, BuyerReject) if prior_buyer_rejections + 1 >= max_buyer_rejections => RefundTransition {
                stamp: RefundStatusField::RejectedByBuyer,
                close_row: true,
                append_row: None,
                settlement: Some(SettlementOutcome::Completed),
                next_stage: Closed(RefundResolution::Dismissed),
            },
            (AwaitingBuyer, BuyerReject) => RefundTransition {
                stamp: RefundStatusField::RejectedByBuyer,
                close_row: true,
                append_row: Some(true),
                settlement: None,
                next_stage: AwaitingAdmin,
            },
            (stage, decision) => return Err(RefundStageError::WrongStage { stage, decision }),
        };
        Ok(transition)
    }
}

/// What a refund decision did.
#[derive(Debug, Clone)]
pub struct AppliedRefundDecision {
    pub request: RefundRequest,
    pub transition: RefundTransition,
    /// Set when the decision resolved the request and settled the transaction.
    pub settled: Option<SettledTransaction>,
}

//--------------------------------------       Checkout      ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutLine {
    pub product_id: i64,
    pub variant_id: i64,
    pub promotion_id: Option<i64>,
    pub quantity: i64,
}

impl CheckoutLine {
    pub fn new(product_id: i64, variant_id: i64, quantity: i64) -> Self {
        Self { product_id, variant_id, promotion_id: None, quantity }
    }

    pub fn with_promotion(mut self, promotion_id: i64) -> Self {
        self.promotion_id = Some(promotion_id);
        self
    }
}

/// The part of a checkout bought from one merchant. Becomes one transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerchantCart {
    pub merchant_id: i64,
    pub lines: Vec<CheckoutLine>,
    pub delivery_fee: Money,
    pub merchant_voucher_id: Option<i64>,
    pub marketplace_voucher_id: Option<i64>,
}

impl MerchantCart {
    pub fn new(merchant_id: i64, delivery_fee: Money) -> Self {
        Self { merchant_id, lines: vec![], delivery_fee, merchant_voucher_id: None, marketplace_voucher_id: None }
    }

    pub fn with_line(mut self, line: CheckoutLine) -> Self {
        self.lines.push(line);
        self
    }

    pub fn with_merchant_voucher(mut self, voucher_id: i64) -> Self {
        self.merchant_voucher_id = Some(voucher_id);
        self
    }

    pub fn with_marketplace_voucher(mut self, voucher_id: i64) -> Self {
        self.marketplace_voucher_id = Some(voucher_id);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCheckout {
    pub buyer_id: i64,
    pub method: PaymentMethod,
    pub carts: Vec<MerchantCart>,
}

impl NewCheckout {
    pub fn new(buyer_id: i64, method: PaymentMethod) -> Self {
        Self { buyer_id, method, carts: vec![] }
    }

    pub fn with_cart(mut self, cart: MerchantCart) -> Self {
        self.carts.push(cart);
        self
    }
}

/// A priced merchant cart, ready to become a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotedCart {
    pub merchant_id: i64,
    pub merchant_domain: String,
    pub items: Vec<CartItem>,
    pub details: PaymentDetails,
    pub merchant_voucher_id: Option<i64>,
    pub marketplace_voucher_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutQuote {
    pub carts: Vec<QuotedCart>,
}

impl CheckoutQuote {
    pub fn total(&self) -> Money {
        self.carts.iter().map(|c| c.details.total).sum()
    }
}
