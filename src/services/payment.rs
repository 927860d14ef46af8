//! Gateway payment orchestration: STK push initiation with its PENDING
//! payment log, and status polls that feed the reconciliation path.

use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::database::payment_log_repository::PaymentLogRepository;
use crate::error::{AppError, AppResult};
use crate::money::Money;
use crate::payments::kopokopo::KopoKopoClient;
use crate::payments::types::{PaymentState, StkPushData, PROVIDER_KOPOKOPO};
use crate::services::reconciliation::{ReconcileOutcome, ReconciliationService};
use crate::services::wallet::{generate_reference, OwnerType, WalletService};

#[derive(Debug, Clone, Serialize)]
pub struct PaymentInitiatedView {
    pub payment_log_id: Uuid,
    pub payment_request_id: String,
    pub status: String,
    pub amount: Money,
    pub reference: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentStatusView {
    pub payment_request_id: String,
    pub state: PaymentState,
    pub log_status: String,
    pub amount: Money,
    pub wallet_credited: bool,
}

pub struct PaymentService {
    gateway: Arc<KopoKopoClient>,
    logs: Arc<PaymentLogRepository>,
    wallets: Arc<WalletService>,
    reconciliation: Arc<ReconciliationService>,
}

impl PaymentService {
    pub fn new(
        gateway: Arc<KopoKopoClient>,
        logs: Arc<PaymentLogRepository>,
        wallets: Arc<WalletService>,
        reconciliation: Arc<ReconciliationService>,
    ) -> Self {
        Self {
            gateway,
            logs,
            wallets,
            reconciliation,
        }
    }

    /// Push an M-PESA payment prompt to the owner's phone and record the
    /// attempt as a PENDING payment log. A top-up that could never be
    /// credited (client cap) is rejected before touching the gateway.
    pub async fn initiate_stk_push(
        &self,
        owner_id: Uuid,
        owner_type: OwnerType,
        data: StkPushData,
    ) -> AppResult<PaymentInitiatedView> {
        self.wallets
            .check_deposit_allowed(owner_id, owner_type, data.amount)
            .await?;

        let reference = generate_reference();
        let outcome = self.gateway.initiate_stk_push(&data, &reference).await?;

        let log = self
            .logs
            .create_pending(
                PROVIDER_KOPOKOPO,
                &outcome.payment_request_id,
                Some(&outcome.payment_request_url),
                owner_id,
                owner_type.as_str(),
                data.amount.minor(),
                &data.phone_number,
                &reference,
                Some(self.gateway.callback_url()),
            )
            .await?;

        info!(
            payment_log_id = %log.id,
            payment_request_id = %outcome.payment_request_id,
            owner_id = %owner_id,
            amount = %data.amount,
            "STK push recorded as pending"
        );

        Ok(PaymentInitiatedView {
            payment_log_id: log.id,
            payment_request_id: outcome.payment_request_id,
            status: log.status,
            amount: Money::from_minor(log.amount),
            reference: log.reference,
        })
    }

    /// Poll the gateway for a payment request and run the result through the
    /// same reconciliation path the webhook uses, so a poll can settle a
    /// payment whose callback never arrived.
    pub async fn payment_status(&self, payment_request_id: &str) -> AppResult<PaymentStatusView> {
        let log = self
            .logs
            .find_by_request_id(PROVIDER_KOPOKOPO, payment_request_id)
            .await?
            .ok_or_else(|| AppError::not_found("PaymentLog", payment_request_id.to_string()))?;

        let status = self.gateway.get_payment_status(payment_request_id).await?;
        let outcome = self.reconciliation.reconcile_log(&log, &status).await?;

        let refreshed = self
            .logs
            .find_by_id(log.id)
            .await?
            .ok_or_else(|| AppError::not_found("PaymentLog", log.id.to_string()))?;

        Ok(PaymentStatusView {
            payment_request_id: payment_request_id.to_string(),
            state: status.state,
            log_status: refreshed.status,
            amount: Money::from_minor(refreshed.amount),
            wallet_credited: outcome == ReconcileOutcome::Credited,
        })
    }
}
