use mse_common::Money;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRedirect {
    pub redirect_url: String,
    /// The gateway's reference. Becomes the id of the payment record.
    pub payment_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("The source account has insufficient funds")]
    InsufficientFunds,
    #[error("The source account does not exist")]
    AccountNotFound,
    #[error("The gateway rejected the request signature")]
    InvalidSignature,
    #[error("The payment gateway is unavailable: {0}")]
    Unavailable(String),
}

/// Opens payments with the external gateway.
#[allow(async_fn_in_trait)]
pub trait PaymentGateway {
    /// Asks the gateway to collect `amount` from `source_account`. The buyer completes the payment at
    /// `redirect_url`; the gateway reports the outcome asynchronously.
    async fn request_payment(&self, source_account: &str, amount: Money) -> Result<PaymentRedirect, GatewayError>;
}
