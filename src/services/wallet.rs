//! Wallet business logic: balance views, guarded deposits and withdrawals,
//! ledger pagination and the details/statistics view.

use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::database::wallet_repository::{
    TransactionSums, Wallet, WalletRepository, WalletTransaction,
};
use crate::error::{AppError, AppErrorKind, AppResult, DomainError, ValidationError};
use crate::money::{Money, CURRENCY};

/// Hard ceiling on client wallet balances, in minor units (KES 5,000.00).
/// Fundi wallets are deliberately uncapped.
pub const CLIENT_BALANCE_CAP: Money = Money::from_minor(500_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerType {
    Client,
    Fundi,
}

impl OwnerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OwnerType::Client => "client",
            OwnerType::Fundi => "fundi",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "client" => Some(OwnerType::Client),
            "fundi" => Some(OwnerType::Fundi),
            _ => None,
        }
    }

    /// The hard balance ceiling for this owner type, if any. Every credit
    /// path goes through this, including gateway reconciliation.
    pub fn balance_cap(&self) -> Option<Money> {
        match self {
            OwnerType::Client => Some(CLIENT_BALANCE_CAP),
            OwnerType::Fundi => None,
        }
    }
}

impl FromStr for OwnerType {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        OwnerType::from_db(value.trim().to_lowercase().as_str()).ok_or_else(|| {
            AppError::new(AppErrorKind::Validation(ValidationError::InvalidOwnerType {
                value: value.to_string(),
                expected: "'client' or 'fundi'".to_string(),
            }))
        })
    }
}

impl std::fmt::Display for OwnerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BalanceView {
    pub wallet_id: Uuid,
    pub owner_id: Uuid,
    pub owner_type: String,
    pub balance: Money,
    pub currency: String,
}

impl From<&Wallet> for BalanceView {
    fn from(wallet: &Wallet) -> Self {
        Self {
            wallet_id: wallet.id,
            owner_id: wallet.owner_id,
            owner_type: wallet.owner_type.clone(),
            balance: Money::from_minor(wallet.balance),
            currency: wallet.currency.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TransactionView {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub tx_type: String,
    pub amount: Money,
    pub status: String,
    pub reference: String,
    pub payment_log_id: Option<Uuid>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<&WalletTransaction> for TransactionView {
    fn from(entry: &WalletTransaction) -> Self {
        Self {
            id: entry.id,
            tx_type: entry.r#type.clone(),
            amount: Money::from_minor(entry.amount),
            status: entry.status.clone(),
            reference: entry.reference.clone(),
            payment_log_id: entry.payment_log_id,
            created_at: entry.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Pagination {
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransactionPage {
    pub transactions: Vec<TransactionView>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize)]
pub struct WalletStatistics {
    pub total_deposits: Money,
    pub total_withdrawals: Money,
    pub transaction_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct WalletDetails {
    pub wallet: BalanceView,
    pub statistics: WalletStatistics,
    pub recent_transactions: Vec<TransactionView>,
}

const MAX_PAGE_SIZE: i64 = 100;
const DEFAULT_PAGE_SIZE: i64 = 20;
const RECENT_TRANSACTIONS: i64 = 10;

pub struct WalletService {
    wallets: Arc<WalletRepository>,
}

impl WalletService {
    pub fn new(wallets: Arc<WalletRepository>) -> Self {
        Self { wallets }
    }

    pub async fn get_or_create_wallet(
        &self,
        owner_id: Uuid,
        owner_type: OwnerType,
    ) -> AppResult<Wallet> {
        Ok(self
            .wallets
            .get_or_create(owner_id, owner_type.as_str())
            .await?)
    }

    pub async fn get_balance(
        &self,
        owner_id: Uuid,
        owner_type: OwnerType,
    ) -> AppResult<BalanceView> {
        let wallet = self.get_or_create_wallet(owner_id, owner_type).await?;
        Ok(BalanceView::from(&wallet))
    }

    /// Credit the wallet. Client wallets are subject to the balance cap; the
    /// guard lives inside the repository's conditional UPDATE, so a rejection
    /// here means no mutation happened at all.
    pub async fn deposit(
        &self,
        owner_id: Uuid,
        owner_type: OwnerType,
        amount: Money,
        reference: Option<String>,
        payment_log_id: Option<Uuid>,
    ) -> AppResult<(Wallet, WalletTransaction)> {
        Self::require_positive(amount)?;
        self.get_or_create_wallet(owner_id, owner_type).await?;

        let cap = owner_type.balance_cap().map(|c| c.minor());
        let reference = reference.unwrap_or_else(generate_reference);

        match self
            .wallets
            .deposit(owner_id, amount.minor(), cap, &reference, payment_log_id)
            .await?
        {
            Some((wallet, entry)) => {
                info!(
                    owner_id = %owner_id,
                    amount = %amount,
                    balance = %Money::from_minor(wallet.balance),
                    "wallet credited"
                );
                Ok((wallet, entry))
            }
            None => Err(self.cap_exceeded_error(owner_id).await?),
        }
    }

    /// Debit the wallet. The sufficient-balance guard lives inside the
    /// UPDATE; a rejection means nothing changed.
    pub async fn withdraw(
        &self,
        owner_id: Uuid,
        owner_type: OwnerType,
        amount: Money,
        reference: Option<String>,
    ) -> AppResult<(Wallet, WalletTransaction)> {
        Self::require_positive(amount)?;
        self.get_or_create_wallet(owner_id, owner_type).await?;

        let reference = reference.unwrap_or_else(generate_reference);

        match self
            .wallets
            .withdraw(owner_id, amount.minor(), &reference)
            .await?
        {
            Some((wallet, entry)) => {
                info!(
                    owner_id = %owner_id,
                    amount = %amount,
                    balance = %Money::from_minor(wallet.balance),
                    "wallet debited"
                );
                Ok((wallet, entry))
            }
            None => {
                let wallet = self
                    .wallets
                    .find_by_owner(owner_id)
                    .await?
                    .ok_or_else(|| AppError::not_found("Wallet", owner_id.to_string()))?;
                Err(AppError::new(AppErrorKind::Domain(
                    DomainError::InsufficientBalance {
                        available: Money::from_minor(wallet.balance),
                        required: amount,
                    },
                )))
            }
        }
    }

    pub async fn list_transactions(
        &self,
        owner_id: Uuid,
        owner_type: OwnerType,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> AppResult<TransactionPage> {
        let wallet = self.get_or_create_wallet(owner_id, owner_type).await?;
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let offset = offset.unwrap_or(0).max(0);

        let entries = self
            .wallets
            .list_transactions(wallet.id, limit, offset)
            .await?;
        let total = self.wallets.count_transactions(wallet.id).await?;

        Ok(TransactionPage {
            transactions: entries.iter().map(TransactionView::from).collect(),
            pagination: Pagination {
                total,
                limit,
                offset,
            },
        })
    }

    pub async fn get_details(
        &self,
        owner_id: Uuid,
        owner_type: OwnerType,
    ) -> AppResult<WalletDetails> {
        let wallet = self.get_or_create_wallet(owner_id, owner_type).await?;
        let sums: TransactionSums = self.wallets.transaction_sums(wallet.id).await?;
        let count = self.wallets.count_transactions(wallet.id).await?;
        let recent = self
            .wallets
            .list_transactions(wallet.id, RECENT_TRANSACTIONS, 0)
            .await?;

        Ok(WalletDetails {
            wallet: BalanceView::from(&wallet),
            statistics: WalletStatistics {
                total_deposits: Money::from_minor(sums.total_deposits),
                total_withdrawals: Money::from_minor(sums.total_withdrawals),
                transaction_count: count,
            },
            recent_transactions: recent.iter().map(TransactionView::from).collect(),
        })
    }

    /// Read-only cap pre-check used before initiating a gateway payment so a
    /// top-up that could never be credited is rejected up front.
    pub async fn check_deposit_allowed(
        &self,
        owner_id: Uuid,
        owner_type: OwnerType,
        amount: Money,
    ) -> AppResult<()> {
        Self::require_positive(amount)?;
        let Some(cap) = owner_type.balance_cap() else {
            return Ok(());
        };

        let wallet = self.get_or_create_wallet(owner_id, owner_type).await?;
        let balance = Money::from_minor(wallet.balance);
        let headroom = cap.checked_sub(balance).unwrap_or(Money::ZERO);
        if amount > headroom {
            return Err(AppError::new(AppErrorKind::Domain(
                DomainError::BalanceCapExceeded {
                    balance,
                    cap,
                    max_deposit: headroom,
                },
            )));
        }
        Ok(())
    }

    async fn cap_exceeded_error(&self, owner_id: Uuid) -> AppResult<AppError> {
        let wallet = self
            .wallets
            .find_by_owner(owner_id)
            .await?
            .ok_or_else(|| AppError::not_found("Wallet", owner_id.to_string()))?;
        let balance = Money::from_minor(wallet.balance);
        let headroom = CLIENT_BALANCE_CAP
            .checked_sub(balance)
            .unwrap_or(Money::ZERO);

        Ok(AppError::new(AppErrorKind::Domain(
            DomainError::BalanceCapExceeded {
                balance,
                cap: CLIENT_BALANCE_CAP,
                max_deposit: headroom,
            },
        )))
    }

    fn require_positive(amount: Money) -> AppResult<()> {
        if !amount.is_positive() {
            return Err(AppError::new(AppErrorKind::Validation(
                ValidationError::InvalidAmount {
                    amount: amount.to_string(),
                    reason: "amount must be greater than zero".to_string(),
                },
            )));
        }
        Ok(())
    }
}

/// Ledger references are provider-agnostic and unique per mutation.
pub fn generate_reference() -> String {
    format!("mjc-{}", Uuid::new_v4())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_type_parses_case_insensitively() {
        assert_eq!("client".parse::<OwnerType>().unwrap(), OwnerType::Client);
        assert_eq!("Fundi".parse::<OwnerType>().unwrap(), OwnerType::Fundi);
        assert!("admin".parse::<OwnerType>().is_err());
    }

    #[test]
    fn only_client_wallets_are_capped() {
        assert_eq!(OwnerType::Client.balance_cap(), Some(CLIENT_BALANCE_CAP));
        assert_eq!(OwnerType::Fundi.balance_cap(), None);
    }

    #[test]
    fn generated_references_are_unique_and_prefixed() {
        let a = generate_reference();
        let b = generate_reference();
        assert!(a.starts_with("mjc-"));
        assert_ne!(a, b);
    }

    #[test]
    fn balance_view_serializes_display_units() {
        let wallet = Wallet {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            owner_type: "client".to_string(),
            balance: 15_050,
            currency: CURRENCY.to_string(),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };

        let json = serde_json::to_value(BalanceView::from(&wallet)).unwrap();
        assert_eq!(json["balance"], "150.50");
        assert_eq!(json["currency"], "KES");
    }
}
