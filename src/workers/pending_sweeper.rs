//! Periodic sweep of stuck PENDING gateway payments.
//!
//! Webhooks are the primary settlement path; this worker is the fallback for
//! callbacks that never arrive. Each cycle it loads a batch of PENDING
//! payment logs, polls the gateway for each and feeds the result through the
//! same reconciliation path the webhook uses.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

use crate::database::payment_log_repository::PaymentLogRepository;
use crate::error::{AppError, AppResult};
use crate::payments::types::PROVIDER_KOPOKOPO;
use crate::payments::PaymentStatusSource;
use crate::services::reconciliation::{ReconcileOutcome, ReconciliationService};

#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// How often the worker wakes up to re-poll the gateway.
    pub poll_interval: Duration,
    /// Maximum number of PENDING payment logs fetched per cycle.
    pub batch_size: i64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(300),
            batch_size: 50,
        }
    }
}

impl SweeperConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.poll_interval = Duration::from_secs(
            std::env::var("SWEEPER_POLL_INTERVAL_SECONDS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(cfg.poll_interval.as_secs()),
        );
        cfg.batch_size = std::env::var("SWEEPER_BATCH_SIZE")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(cfg.batch_size);
        cfg
    }
}

/// Per-sweep tally. `updated` counts logs that reached a settled SUCCESS
/// (including ones another path settled first), `failed` counts FAILED
/// transitions and per-row errors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub checked: u32,
    pub updated: u32,
    pub failed: u32,
    pub still_pending: u32,
}

impl SweepReport {
    pub fn record(&mut self, result: Result<ReconcileOutcome, &AppError>) {
        self.checked += 1;
        match result {
            Ok(ReconcileOutcome::Credited) | Ok(ReconcileOutcome::AlreadyProcessed) => {
                self.updated += 1
            }
            Ok(ReconcileOutcome::MarkedFailed) | Err(_) => self.failed += 1,
            Ok(ReconcileOutcome::StillPending) => self.still_pending += 1,
        }
    }
}

pub struct PendingPaymentSweeper {
    config: SweeperConfig,
    gateway: Arc<dyn PaymentStatusSource>,
    logs: Arc<PaymentLogRepository>,
    reconciliation: Arc<ReconciliationService>,
}

impl PendingPaymentSweeper {
    pub fn new(
        config: SweeperConfig,
        gateway: Arc<dyn PaymentStatusSource>,
        logs: Arc<PaymentLogRepository>,
        reconciliation: Arc<ReconciliationService>,
    ) -> Self {
        Self {
            config,
            gateway,
            logs,
            reconciliation,
        }
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            batch_size = self.config.batch_size,
            "pending payment sweeper started"
        );

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("pending payment sweeper stopping");
                        break;
                    }
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {
                    match self.sweep(None).await {
                        Ok(report) if report.checked > 0 => {
                            info!(
                                checked = report.checked,
                                updated = report.updated,
                                failed = report.failed,
                                still_pending = report.still_pending,
                                "sweep cycle finished"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "sweep cycle failed"),
                    }
                }
            }
        }

        info!("pending payment sweeper stopped");
    }

    /// Re-poll up to `batch_size` PENDING payments, newest first, optionally
    /// scoped to one owner. Per-row failures are tallied, never propagated, so
    /// one bad payment cannot starve the rest of the batch.
    pub async fn sweep(&self, owner_id: Option<Uuid>) -> AppResult<SweepReport> {
        let pending = self
            .logs
            .find_pending(PROVIDER_KOPOKOPO, owner_id, self.config.batch_size)
            .await?;

        let mut report = SweepReport::default();
        for log in pending {
            let result = match self.gateway.payment_status(&log.payment_request_id).await {
                Ok(status) => self.reconciliation.reconcile_log(&log, &status).await,
                Err(e) => Err(e.into()),
            };

            if let Err(e) = &result {
                warn!(
                    payment_log_id = %log.id,
                    payment_request_id = %log.payment_request_id,
                    error = %e,
                    "failed to reconcile pending payment"
                );
            }
            report.record(result.as_ref().map(|o| *o));
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppErrorKind, ExternalError};

    fn network_error() -> AppError {
        AppError::new(AppErrorKind::External(ExternalError::PaymentProvider {
            provider: "KopoKopo".to_string(),
            message: "timeout".to_string(),
            is_retryable: true,
        }))
    }

    #[test]
    fn tally_over_mixed_outcomes() {
        // One settles, one fails at the provider, one is still pending.
        let mut report = SweepReport::default();
        report.record(Ok(ReconcileOutcome::Credited));
        report.record(Ok(ReconcileOutcome::MarkedFailed));
        report.record(Ok(ReconcileOutcome::StillPending));

        assert_eq!(
            report,
            SweepReport {
                checked: 3,
                updated: 1,
                failed: 1,
                still_pending: 1,
            }
        );
    }

    #[test]
    fn already_processed_counts_as_updated() {
        let mut report = SweepReport::default();
        report.record(Ok(ReconcileOutcome::AlreadyProcessed));
        assert_eq!(report.updated, 1);
    }

    #[test]
    fn errors_count_as_failed() {
        let err = network_error();
        let mut report = SweepReport::default();
        report.record(Err(&err));
        assert_eq!(report.failed, 1);
        assert_eq!(report.checked, 1);
    }

    #[test]
    fn config_defaults() {
        let cfg = SweeperConfig::default();
        assert_eq!(cfg.poll_interval, Duration::from_secs(300));
        assert_eq!(cfg.batch_size, 50);
    }
}
