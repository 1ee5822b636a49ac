//! Narrow contracts for the collaborators the engine talks to but does not own.
//!
//! * [`PaymentGateway`] is the card/bank gateway. The engine only asks it to open a payment and hands the redirect
//!   back to the caller; the result arrives later through `CheckoutApi::confirm_payment` or `fail_payment`.
//! * [`KeyValueCache`] is the shared key-value cache. [`MemoryCache`] is an in-process implementation, good enough
//!   for a single worker and for tests.
mod cache;
mod payment_gateway;

pub use cache::{CacheError, KeyValueCache, MemoryCache};
pub use payment_gateway::{GatewayError, PaymentGateway, PaymentRedirect};
