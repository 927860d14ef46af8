//! Reconciliation of pending gateway payments against provider status
//! reports, whether those arrive as webhooks or as poll responses.
//!
//! The at-most-once guarantee for wallet credits rests on the payment log's
//! conditional PENDING -> SUCCESS UPDATE: the status flip and the wallet
//! credit commit in one SQL transaction, so two racing reconciliations
//! cannot both credit and a blocked credit leaves the log PENDING.

use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{info, warn};

use crate::database::payment_log_repository::{
    PaymentLog, PaymentLogRepository, SettlementOutcome,
};
use crate::error::{AppError, AppErrorKind, AppResult, DomainError};
use crate::money::Money;
use crate::payments::types::{PaymentState, PaymentStatus, PROVIDER_KOPOKOPO};
use crate::services::wallet::{OwnerType, WalletService};

/// What a reconciliation attempt did to the payment log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Log moved to SUCCESS and the wallet was credited.
    Credited,
    /// Log moved to FAILED; no wallet mutation.
    MarkedFailed,
    /// The log was already terminal; nothing changed.
    AlreadyProcessed,
    /// The provider still reports the payment as pending.
    StillPending,
}

pub struct ReconciliationService {
    logs: Arc<PaymentLogRepository>,
    wallets: Arc<WalletService>,
}

impl ReconciliationService {
    pub fn new(logs: Arc<PaymentLogRepository>, wallets: Arc<WalletService>) -> Self {
        Self { logs, wallets }
    }

    /// Apply one provider status report to its payment log.
    pub async fn reconcile(&self, status: &PaymentStatus) -> AppResult<ReconcileOutcome> {
        let log = self
            .logs
            .find_by_request_id(PROVIDER_KOPOKOPO, &status.payment_request_id)
            .await?
            .ok_or_else(|| {
                AppError::not_found("PaymentLog", status.payment_request_id.clone())
            })?;

        self.reconcile_log(&log, status).await
    }

    pub async fn reconcile_log(
        &self,
        log: &PaymentLog,
        status: &PaymentStatus,
    ) -> AppResult<ReconcileOutcome> {
        match status.state {
            PaymentState::Pending => Ok(ReconcileOutcome::StillPending),
            PaymentState::Success => self.settle_success(log, status).await,
            PaymentState::Failed => self.settle_failure(log, status).await,
        }
    }

    async fn settle_success(
        &self,
        log: &PaymentLog,
        status: &PaymentStatus,
    ) -> AppResult<ReconcileOutcome> {
        // Absent resource amount means the provider has not attached the
        // settled figure yet; fall back to the amount we initiated with.
        let amount = status.amount_minor.unwrap_or(log.amount);
        let owner_type = OwnerType::from_db(&log.owner_type).unwrap_or(OwnerType::Client);

        // The settle transaction updates the wallet row, so it must exist.
        self.wallets
            .get_or_create_wallet(log.owner_id, owner_type)
            .await?;

        let cap = owner_type.balance_cap();
        let outcome = self
            .logs
            .settle_and_credit(
                PROVIDER_KOPOKOPO,
                &log.payment_request_id,
                amount,
                &status.raw,
                cap.map(|c| c.minor()),
            )
            .await?;

        match outcome {
            SettlementOutcome::Credited { wallet, .. } => {
                info!(
                    payment_log_id = %log.id,
                    owner_id = %log.owner_id,
                    amount = %Money::from_minor(amount),
                    balance = %Money::from_minor(wallet.balance),
                    "payment settled, wallet credited"
                );
                Ok(ReconcileOutcome::Credited)
            }
            SettlementOutcome::AlreadyFinalized => {
                info!(
                    payment_log_id = %log.id,
                    payment_request_id = %log.payment_request_id,
                    "payment already finalized, skipping credit"
                );
                Ok(ReconcileOutcome::AlreadyProcessed)
            }
            SettlementOutcome::CapExceeded { balance } => {
                // Log stays PENDING; the sweeper retries once the wallet has
                // headroom again.
                let cap = cap.unwrap_or(Money::ZERO);
                let balance = Money::from_minor(balance);
                warn!(
                    payment_log_id = %log.id,
                    balance = %balance,
                    "credit would pass the balance cap, leaving payment pending"
                );
                Err(AppError::new(AppErrorKind::Domain(
                    DomainError::BalanceCapExceeded {
                        balance,
                        cap,
                        max_deposit: cap.checked_sub(balance).unwrap_or(Money::ZERO),
                    },
                ))
                .with_context(format!(
                    "settling payment {}",
                    log.payment_request_id
                )))
            }
        }
    }

    async fn settle_failure(
        &self,
        log: &PaymentLog,
        status: &PaymentStatus,
    ) -> AppResult<ReconcileOutcome> {
        let updated = self
            .logs
            .mark_failed(PROVIDER_KOPOKOPO, &log.payment_request_id, &status.raw)
            .await?;

        match updated {
            Some(updated) => {
                warn!(
                    payment_log_id = %updated.id,
                    payment_request_id = %updated.payment_request_id,
                    "payment failed at the provider"
                );
                Ok(ReconcileOutcome::MarkedFailed)
            }
            None => Ok(ReconcileOutcome::AlreadyProcessed),
        }
    }
}

/// Pull the payment request id out of a KopoKopo webhook payload. Callbacks
/// mirror the resource shape, so the id sits at `data.id` (with a top-level
/// `id` fallback seen in sandbox payloads).
pub fn extract_payment_request_id(payload: &JsonValue) -> Option<String> {
    payload["data"]["id"]
        .as_str()
        .or_else(|| payload["id"].as_str())
        .map(|id| id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_request_id_from_webhook_payload() {
        let payload = serde_json::json!({
            "data": {
                "id": "d76265cd-0951-e511-80da-0aa34a9b2388",
                "attributes": {"status": "Success"}
            }
        });
        assert_eq!(
            extract_payment_request_id(&payload),
            Some("d76265cd-0951-e511-80da-0aa34a9b2388".to_string())
        );
    }

    #[test]
    fn falls_back_to_top_level_id() {
        let payload = serde_json::json!({"id": "abc-123", "status": "Failed"});
        assert_eq!(
            extract_payment_request_id(&payload),
            Some("abc-123".to_string())
        );
    }

    #[test]
    fn missing_id_yields_none() {
        let payload = serde_json::json!({"topic": "buygoods_transaction_received"});
        assert_eq!(extract_payment_request_id(&payload), None);
    }
}
