use crate::{
    db_types::{
        AppliedRefundDecision,
        NewRefundRequest,
        PlatformAccounts,
        RefundDecision,
        RefundRequest,
        RefundRequestStatus,
    },
    se_api::errors::RefundFlowError,
};

#[allow(async_fn_in_trait)]
pub trait RefundManagement: Clone {
    /// Creates the request with its first (open) status row and flags the transaction. Fails if the transaction
    /// already has a request or is not delivered.
    async fn open_refund_request(&self, request: &NewRefundRequest) -> Result<RefundRequest, RefundFlowError>;

    /// Applies `decision` to the current stage of the request. When the decision resolves the request, the
    /// transaction is settled in the same database transaction.
    async fn apply_refund_decision(
        &self,
        request_id: i64,
        decision: RefundDecision,
        max_buyer_rejections: u32,
        accounts: &PlatformAccounts,
    ) -> Result<AppliedRefundDecision, RefundFlowError>;

    async fn fetch_refund_request(&self, id: i64) -> Result<Option<RefundRequest>, RefundFlowError>;

    async fn fetch_refund_request_for_transaction(
        &self,
        transaction_id: i64,
    ) -> Result<Option<RefundRequest>, RefundFlowError>;

    /// All status rows of the request, oldest first.
    async fn fetch_refund_history(&self, id: i64) -> Result<Vec<RefundRequestStatus>, RefundFlowError>;
}
