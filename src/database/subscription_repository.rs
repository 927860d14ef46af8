use crate::database::error::DatabaseError;
use crate::database::wallet_repository::{
    Wallet, WalletTransaction, TX_STATUS_SUCCESS, TX_TYPE_WITHDRAWAL,
};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

pub const SUBSCRIPTION_STATUS_ACTIVE: &str = "active";

/// Premium plan purchase record for a fundi. A fundi accumulates rows over
/// time; the newest `ends_at` defines the active window.
#[derive(Debug, Clone, FromRow)]
pub struct Subscription {
    pub id: Uuid,
    pub fundi_id: Uuid,
    pub plan: String,
    pub status: String,
    pub amount: i64,
    pub starts_at: chrono::DateTime<chrono::Utc>,
    pub ends_at: chrono::DateTime<chrono::Utc>,
    pub wallet_transaction_id: Option<Uuid>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

pub struct SubscriptionRepository {
    pool: PgPool,
}

impl SubscriptionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Latest subscription by end date, used to extend an active window
    /// instead of overlapping it.
    pub async fn latest_for_fundi(
        &self,
        fundi_id: Uuid,
    ) -> Result<Option<Subscription>, DatabaseError> {
        sqlx::query_as::<_, Subscription>(
            "SELECT id, fundi_id, plan, status, amount, starts_at, ends_at,
                    wallet_transaction_id, created_at
             FROM subscriptions
             WHERE fundi_id = $1
             ORDER BY ends_at DESC
             LIMIT 1",
        )
        .bind(fundi_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Debit the fundi's wallet, append the WITHDRAWAL ledger row and record
    /// the subscription, all in one SQL transaction. A failure anywhere rolls
    /// the whole purchase back, so a debit can never exist without its
    /// subscription row. Returns `None` when the balance guard misses.
    pub async fn create_paid(
        &self,
        fundi_id: Uuid,
        plan: &str,
        amount: i64,
        starts_at: chrono::DateTime<chrono::Utc>,
        ends_at: chrono::DateTime<chrono::Utc>,
        reference: &str,
    ) -> Result<Option<(Subscription, Wallet, WalletTransaction)>, DatabaseError> {
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;

        let wallet = sqlx::query_as::<_, Wallet>(
            "UPDATE wallets
             SET balance = balance - $2, updated_at = NOW()
             WHERE owner_id = $1 AND balance >= $2
             RETURNING id, owner_id, owner_type, balance, currency, created_at, updated_at",
        )
        .bind(fundi_id)
        .bind(amount)
        .fetch_optional(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        let wallet = match wallet {
            Some(wallet) => wallet,
            None => {
                tx.rollback().await.map_err(DatabaseError::from_sqlx)?;
                return Ok(None);
            }
        };

        let entry = sqlx::query_as::<_, WalletTransaction>(
            "INSERT INTO wallet_transactions (wallet_id, type, amount, status, reference, payment_log_id)
             VALUES ($1, $2, $3, $4, $5, NULL)
             RETURNING id, wallet_id, type, amount, status, reference, payment_log_id, created_at",
        )
        .bind(wallet.id)
        .bind(TX_TYPE_WITHDRAWAL)
        .bind(amount)
        .bind(TX_STATUS_SUCCESS)
        .bind(reference)
        .fetch_one(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        let subscription = sqlx::query_as::<_, Subscription>(
            "INSERT INTO subscriptions (fundi_id, plan, status, amount, starts_at, ends_at, wallet_transaction_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING id, fundi_id, plan, status, amount, starts_at, ends_at,
                       wallet_transaction_id, created_at",
        )
        .bind(fundi_id)
        .bind(plan)
        .bind(SUBSCRIPTION_STATUS_ACTIVE)
        .bind(amount)
        .bind(starts_at)
        .bind(ends_at)
        .bind(entry.id)
        .fetch_one(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        tx.commit().await.map_err(DatabaseError::from_sqlx)?;
        Ok(Some((subscription, wallet, entry)))
    }
}
