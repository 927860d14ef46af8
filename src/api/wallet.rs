use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::api::owner_from_headers;
use crate::error::AppError;
use crate::middleware::error::{get_request_id_from_headers, success_response};
use crate::money::Money;
use crate::services::wallet::{BalanceView, TransactionView, WalletService};

#[derive(Clone)]
pub struct WalletApiState {
    pub wallet: Arc<WalletService>,
}

#[derive(Debug, Deserialize)]
pub struct DepositRequest {
    pub amount: Money,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub payment_log_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct WithdrawRequest {
    pub amount: Money,
    #[serde(default)]
    pub reference: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TransactionsQuery {
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

/// POST /wallet/deposit
pub async fn deposit(
    State(state): State<WalletApiState>,
    headers: HeaderMap,
    Json(request): Json<DepositRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (owner_id, owner_type) = owner_from_headers(&headers)?;
    let request_id = get_request_id_from_headers(&headers);

    let (wallet, entry) = state
        .wallet
        .deposit(
            owner_id,
            owner_type,
            request.amount,
            request.reference,
            request.payment_log_id,
        )
        .await
        .map_err(|e| attach_request_id(e, request_id))?;

    Ok(success_response(serde_json::json!({
        "wallet": BalanceView::from(&wallet),
        "transaction": TransactionView::from(&entry),
    })))
}

/// POST /wallet/withdraw
pub async fn withdraw(
    State(state): State<WalletApiState>,
    headers: HeaderMap,
    Json(request): Json<WithdrawRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (owner_id, owner_type) = owner_from_headers(&headers)?;
    let request_id = get_request_id_from_headers(&headers);

    let (wallet, entry) = state
        .wallet
        .withdraw(owner_id, owner_type, request.amount, request.reference)
        .await
        .map_err(|e| attach_request_id(e, request_id))?;

    Ok(success_response(serde_json::json!({
        "wallet": BalanceView::from(&wallet),
        "transaction": TransactionView::from(&entry),
    })))
}

/// GET /wallet/balance
pub async fn balance(
    State(state): State<WalletApiState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let (owner_id, owner_type) = owner_from_headers(&headers)?;
    let view = state.wallet.get_balance(owner_id, owner_type).await?;
    Ok(success_response(view))
}

/// GET /wallet/transactions
pub async fn transactions(
    State(state): State<WalletApiState>,
    headers: HeaderMap,
    Query(query): Query<TransactionsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let (owner_id, owner_type) = owner_from_headers(&headers)?;
    let page = state
        .wallet
        .list_transactions(owner_id, owner_type, query.limit, query.offset)
        .await?;
    Ok(success_response(page))
}

/// GET /wallet/details
pub async fn details(
    State(state): State<WalletApiState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let (owner_id, owner_type) = owner_from_headers(&headers)?;
    let details = state.wallet.get_details(owner_id, owner_type).await?;
    Ok(success_response(details))
}

fn attach_request_id(error: AppError, request_id: Option<String>) -> AppError {
    match request_id {
        Some(id) => error.with_request_id(id),
        None => error,
    }
}
