use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::info;

use crate::api::owner_from_headers;
use crate::error::AppError;
use crate::middleware::error::success_response;
use crate::payments::types::StkPushData;
use crate::services::payment::PaymentService;

#[derive(Clone)]
pub struct PaymentApiState {
    pub payments: Arc<PaymentService>,
}

/// POST /wallet/add-funds/kopokopo
pub async fn add_funds(
    State(state): State<PaymentApiState>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<StkPushData>,
) -> Result<impl IntoResponse, AppError> {
    let (owner_id, owner_type) = owner_from_headers(&headers)?;
    info!(owner_id = %owner_id, amount = %request.amount, "wallet top-up requested");

    let view = state
        .payments
        .initiate_stk_push(owner_id, owner_type, request)
        .await?;

    Ok(success_response(view))
}

/// GET /wallet/payment-status/{payment_request_id}
pub async fn payment_status(
    State(state): State<PaymentApiState>,
    Path(payment_request_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let view = state.payments.payment_status(&payment_request_id).await?;
    Ok(success_response(view))
}
