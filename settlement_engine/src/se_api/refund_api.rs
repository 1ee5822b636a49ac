use std::fmt::Debug;

use log::*;

use crate::{
    config::EngineConfig,
    db_types::{
        AppliedRefundDecision,
        NewRefundRequest,
        RefundDecision,
        RefundRequest,
        RefundRequestStatus,
        RefundStage,
        Transaction,
    },
    events::{EventProducers, RefundUpdatedEvent, TransactionSettledEvent},
    external::{KeyValueCache, MemoryCache},
    se_api::errors::{RefundFlowError, TransactionFlowError},
    traits::{RefundManagement, TransactionManagement},
};

fn cooldown_key(buyer_id: i64) -> String {
    format!("refund-request:{buyer_id}")
}

/// `RefundApi` runs the refund negotiation between a buyer, the seller and a marketplace admin.
///
/// ```text
///                 seller reject (new row)
///                 ┌──────────┐
///                 ▼          │
///  open ──► AwaitingSeller ──┘ ── seller accept ──► AwaitingAdmin ── admin accept ──► Refunded
///                 │                                    ▲      │
///           buyer cancel                  buyer reject │      │ admin reject
///                 ▼                        (new row)   │      ▼
///             Completed            ◄── buyer accept ── AwaitingBuyer
///                                  ◄── last buyer reject ──┘
/// ```
///
/// Ownership is checked here: sellers may only decide on their own transactions and buyers on their own requests.
/// The escalation scheduler decides for late parties through [`Self::decide_on_behalf`], which skips those checks.
pub struct RefundApi<B, C = MemoryCache> {
    db: B,
    cache: Option<C>,
    config: EngineConfig,
    producers: EventProducers,
}

impl<B, C> Debug for RefundApi<B, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RefundApi")
    }
}

impl<B> RefundApi<B, MemoryCache> {
    pub fn new(db: B, config: EngineConfig, producers: EventProducers) -> Self {
        Self { db, cache: None, config, producers }
    }
}

impl<B, C> RefundApi<B, C> {
    /// Throttles refund requests through `cache`, if the configuration sets a cooldown.
    pub fn with_cache<C2: KeyValueCache>(self, cache: C2) -> RefundApi<B, C2> {
        RefundApi { db: self.db, cache: Some(cache), config: self.config, producers: self.producers }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl<B, C> RefundApi<B, C>
where
    B: RefundManagement + TransactionManagement,
    C: KeyValueCache,
{
    async fn fetch_transaction(&self, id: i64) -> Result<Transaction, RefundFlowError> {
        let record = self.db.fetch_transaction(id).await?.ok_or(TransactionFlowError::TransactionNotFound(id))?;
        Ok(record.transaction)
    }

    pub async fn fetch_request(&self, request_id: i64) -> Result<RefundRequest, RefundFlowError> {
        self.db.fetch_refund_request(request_id).await?.ok_or(RefundFlowError::RefundRequestNotFound(request_id))
    }

    pub async fn fetch_request_for_transaction(
        &self,
        transaction_id: i64,
    ) -> Result<Option<RefundRequest>, RefundFlowError> {
        self.db.fetch_refund_request_for_transaction(transaction_id).await
    }

    async fn check_cooldown(&self, buyer_id: i64) -> Result<(), RefundFlowError> {
        let (Some(cache), Some(_)) = (&self.cache, self.config.refund_request_cooldown) else {
            return Ok(());
        };
        let key = cooldown_key(buyer_id);
        if cache.get::<i64>(&key).await?.is_some() {
            let retry_after_secs = cache.ttl(&key).await?.map(|t| t.num_seconds().max(1)).unwrap_or(1);
            debug!("🔄️↩️ Buyer #{buyer_id} is opening refund requests too quickly");
            return Err(RefundFlowError::TooManyRequests { retry_after_secs });
        }
        Ok(())
    }

    async fn start_cooldown(&self, buyer_id: i64, request_id: i64) {
        let (Some(cache), Some(cooldown)) = (&self.cache, self.config.refund_request_cooldown) else {
            return;
        };
        let minutes = u32::try_from(cooldown.num_minutes()).unwrap_or(u32::MAX).max(1);
        // The request is already committed. A cache failure only loses the throttle.
        if let Err(e) = cache.set(&cooldown_key(buyer_id), &request_id, minutes).await {
            warn!("🔄️↩️ Could not record the refund cooldown for buyer #{buyer_id}: {e}");
        }
    }

    /// The buyer asks for their money back on a delivered transaction. The seller decides first.
    pub async fn open(&self, request: NewRefundRequest) -> Result<RefundRequest, RefundFlowError> {
        if request.reason.trim().is_empty() {
            return Err(RefundFlowError::ReasonRequired);
        }
        let tx = self.fetch_transaction(request.transaction_id).await?;
        if tx.buyer_id != request.buyer_id {
            return Err(RefundFlowError::NotAParty);
        }
        self.check_cooldown(request.buyer_id).await?;
        let refund = self.db.open_refund_request(&request).await?;
        self.start_cooldown(request.buyer_id, refund.id).await;
        info!("🔄️↩️ Buyer #{} opened refund request #{} on transaction #{}", refund.buyer_id, refund.id, tx.id);
        let event = RefundUpdatedEvent::new(refund.id, refund.transaction_id, RefundStage::AwaitingSeller);
        self.producers.publish_refund_updated(event).await;
        Ok(refund)
    }

    /// The seller accepts (the request goes to an admin) or rejects (the request waits for the seller again).
    pub async fn seller_decide(
        &self,
        request_id: i64,
        merchant_id: i64,
        accept: bool,
    ) -> Result<AppliedRefundDecision, RefundFlowError> {
        let request = self.fetch_request(request_id).await?;
        let tx = self.fetch_transaction(request.transaction_id).await?;
        if tx.merchant_id != merchant_id {
            return Err(RefundFlowError::NotAParty);
        }
        let decision = if accept { RefundDecision::SellerAccept } else { RefundDecision::SellerReject };
        self.apply(request_id, decision).await
    }

    /// An admin reviews a request the seller accepted. Accepting refunds the buyer.
    pub async fn admin_decide(&self, request_id: i64, accept: bool) -> Result<AppliedRefundDecision, RefundFlowError> {
        let decision = if accept { RefundDecision::AdminAccept } else { RefundDecision::AdminReject };
        self.apply(request_id, decision).await
    }

    /// The buyer answers an admin rejection. Accepting it completes the transaction; rejecting it sends the request
    /// back to an admin, until the buyer runs out of rejections.
    pub async fn buyer_decide(
        &self,
        request_id: i64,
        buyer_id: i64,
        accept: bool,
    ) -> Result<AppliedRefundDecision, RefundFlowError> {
        self.check_buyer(request_id, buyer_id).await?;
        let decision = if accept { RefundDecision::BuyerAccept } else { RefundDecision::BuyerReject };
        self.apply(request_id, decision).await
    }

    /// The buyer withdraws the request before the seller has decided. The transaction completes.
    pub async fn buyer_cancel(&self, request_id: i64, buyer_id: i64) -> Result<AppliedRefundDecision, RefundFlowError> {
        self.check_buyer(request_id, buyer_id).await?;
        self.apply(request_id, RefundDecision::BuyerCancel).await
    }

    /// Applies `decision` without checking who is asking. Used when a party has missed their deadline.
    pub async fn decide_on_behalf(
        &self,
        request_id: i64,
        decision: RefundDecision,
    ) -> Result<AppliedRefundDecision, RefundFlowError> {
        self.apply(request_id, decision).await
    }

    pub async fn current_stage(&self, request_id: i64) -> Result<RefundStage, RefundFlowError> {
        let history = self.history(request_id).await?;
        history.last().map(RefundRequestStatus::stage).ok_or(RefundFlowError::MissingOpenStatus(request_id))
    }

    /// Every status row of the request, oldest first. Use [`RefundRequestStatus::stages`] to read their stages; only
    /// the last row's [`RefundRequestStatus::stage`] is the request's.
    pub async fn history(&self, request_id: i64) -> Result<Vec<RefundRequestStatus>, RefundFlowError> {
        let history = self.db.fetch_refund_history(request_id).await?;
        if history.is_empty() && self.db.fetch_refund_request(request_id).await?.is_none() {
            return Err(RefundFlowError::RefundRequestNotFound(request_id));
        }
        Ok(history)
    }

    async fn check_buyer(&self, request_id: i64, buyer_id: i64) -> Result<(), RefundFlowError> {
        let request = self.fetch_request(request_id).await?;
        if request.buyer_id != buyer_id {
            return Err(RefundFlowError::NotAParty);
        }
        Ok(())
    }

    async fn apply(&self, request_id: i64, decision: RefundDecision) -> Result<AppliedRefundDecision, RefundFlowError> {
        let applied = self
            .db
            .apply_refund_decision(request_id, decision, self.config.max_buyer_rejections, &self.config.accounts)
            .await?;
        let stage = applied.transition.next_stage;
        info!("🔄️↩️ Refund request #{request_id}: {decision}. Now {stage}");
        let event = RefundUpdatedEvent::new(request_id, applied.request.transaction_id, stage);
        self.producers.publish_refund_updated(event).await;
        if let Some(settled) = &applied.settled {
            info!("🔄️💰️ Transaction #{} {} by refund request #{request_id}", settled.transaction.id, settled.outcome);
            self.producers.publish_transaction_settled(TransactionSettledEvent::from(settled)).await;
        }
        Ok(applied)
    }
}
