//! Premium subscription debit. Reuses the wallet withdrawal contract; no
//! separate mutation primitive.

use chrono::{DateTime, Months, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::database::subscription_repository::SubscriptionRepository;
use crate::error::{AppError, AppErrorKind, AppResult, DomainError};
use crate::money::Money;
use crate::services::wallet::{generate_reference, OwnerType, WalletService};

/// Premium plan price in minor units (KES 200.00).
pub const PREMIUM_PRICE: Money = Money::from_minor(20_000);
pub const PLAN_PREMIUM: &str = "premium";

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionView {
    pub subscription_id: Uuid,
    pub plan: String,
    pub status: String,
    pub amount: Money,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub wallet_balance: Money,
}

pub struct SubscriptionService {
    subscriptions: Arc<SubscriptionRepository>,
    wallets: Arc<WalletService>,
}

impl SubscriptionService {
    pub fn new(subscriptions: Arc<SubscriptionRepository>, wallets: Arc<WalletService>) -> Self {
        Self {
            subscriptions,
            wallets,
        }
    }

    /// Debit the premium price from the fundi's wallet and extend their plan
    /// window by one calendar month. An active window is continued from its
    /// end date; a lapsed or absent one starts now. The debit, its ledger
    /// row and the subscription record commit in one transaction, so a
    /// charged fundi always has the matching subscription row.
    pub async fn subscribe_to_premium(&self, fundi_id: Uuid) -> AppResult<SubscriptionView> {
        self.wallets
            .get_or_create_wallet(fundi_id, OwnerType::Fundi)
            .await?;

        let now = Utc::now();
        let latest = self.subscriptions.latest_for_fundi(fundi_id).await?;
        let (starts_at, ends_at) = next_plan_window(now, latest.as_ref().map(|s| s.ends_at));

        let purchase = self
            .subscriptions
            .create_paid(
                fundi_id,
                PLAN_PREMIUM,
                PREMIUM_PRICE.minor(),
                starts_at,
                ends_at,
                &generate_reference(),
            )
            .await?;

        let (subscription, wallet, _entry) = match purchase {
            Some(purchase) => purchase,
            None => {
                let balance = self.wallets.get_balance(fundi_id, OwnerType::Fundi).await?;
                return Err(AppError::new(AppErrorKind::Domain(
                    DomainError::InsufficientBalance {
                        available: balance.balance,
                        required: PREMIUM_PRICE,
                    },
                )));
            }
        };

        info!(
            fundi_id = %fundi_id,
            subscription_id = %subscription.id,
            ends_at = %subscription.ends_at,
            "premium subscription recorded"
        );

        Ok(SubscriptionView {
            subscription_id: subscription.id,
            plan: subscription.plan,
            status: subscription.status,
            amount: Money::from_minor(subscription.amount),
            starts_at: subscription.starts_at,
            ends_at: subscription.ends_at,
            wallet_balance: Money::from_minor(wallet.balance),
        })
    }
}

/// Compute the next plan window: continue from a still-future end date,
/// otherwise start now; always one calendar month long.
pub fn next_plan_window(
    now: DateTime<Utc>,
    current_end: Option<DateTime<Utc>>,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let starts_at = match current_end {
        Some(end) if end > now => end,
        _ => now,
    };
    (starts_at, starts_at + Months::new(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn lapsed_subscription_starts_now() {
        let now = Utc.with_ymd_and_hms(2025, 3, 15, 12, 0, 0).unwrap();
        let old_end = Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap();

        let (start, end) = next_plan_window(now, Some(old_end));
        assert_eq!(start, now);
        assert_eq!(end, Utc.with_ymd_and_hms(2025, 4, 15, 12, 0, 0).unwrap());
    }

    #[test]
    fn active_subscription_extends_from_its_end() {
        let now = Utc.with_ymd_and_hms(2025, 3, 15, 12, 0, 0).unwrap();
        let future_end = Utc.with_ymd_and_hms(2025, 3, 20, 0, 0, 0).unwrap();

        let (start, end) = next_plan_window(now, Some(future_end));
        assert_eq!(start, future_end);
        assert_eq!(end, Utc.with_ymd_and_hms(2025, 4, 20, 0, 0, 0).unwrap());
    }

    #[test]
    fn first_subscription_starts_now() {
        let now = Utc.with_ymd_and_hms(2025, 1, 31, 8, 0, 0).unwrap();
        let (start, end) = next_plan_window(now, None);
        assert_eq!(start, now);
        // Calendar-month arithmetic clamps to the last day of February.
        assert_eq!(end, Utc.with_ymd_and_hms(2025, 2, 28, 8, 0, 0).unwrap());
    }
}
