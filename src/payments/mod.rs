//! KopoKopo payment gateway integration.
//!
//! The adapter in [`kopokopo`] owns OAuth token handling, STK push initiation
//! and status polling; [`utils`] provides the retrying HTTP client and webhook
//! signature helpers shared by the adapter and the webhook route.

pub mod error;
pub mod kopokopo;
pub mod types;
pub mod utils;

use async_trait::async_trait;

pub use error::{PaymentError, PaymentResult};
pub use kopokopo::{KopoKopoClient, KopoKopoConfig};
pub use types::{PaymentState, PaymentStatus, StkPushData, StkPushOutcome, PROVIDER_KOPOKOPO};

/// Source of payment status reports. The gateway client is the production
/// implementation; polling workers depend on this seam instead of the
/// concrete client.
#[async_trait]
pub trait PaymentStatusSource: Send + Sync {
    async fn payment_status(&self, payment_request_id: &str) -> PaymentResult<PaymentStatus>;
}

#[async_trait]
impl PaymentStatusSource for KopoKopoClient {
    async fn payment_status(&self, payment_request_id: &str) -> PaymentResult<PaymentStatus> {
        self.get_payment_status(payment_request_id).await
    }
}
