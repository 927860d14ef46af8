//! Services module for business logic and integrations

pub mod payment;
pub mod reconciliation;
pub mod subscription;
pub mod wallet;

pub use payment::PaymentService;
pub use reconciliation::{ReconcileOutcome, ReconciliationService};
pub use subscription::SubscriptionService;
pub use wallet::{OwnerType, WalletService, CLIENT_BALANCE_CAP};
