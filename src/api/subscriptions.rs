use axum::{extract::State, http::HeaderMap, response::IntoResponse};
use std::sync::Arc;

use crate::api::owner_from_headers;
use crate::error::{AppError, AppErrorKind, ValidationError};
use crate::middleware::error::success_response;
use crate::services::subscription::SubscriptionService;
use crate::services::wallet::OwnerType;

#[derive(Clone)]
pub struct SubscriptionApiState {
    pub subscriptions: Arc<SubscriptionService>,
}

/// POST /subscriptions/premium
pub async fn subscribe_premium(
    State(state): State<SubscriptionApiState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let (owner_id, owner_type) = owner_from_headers(&headers)?;
    if owner_type != OwnerType::Fundi {
        return Err(AppError::new(AppErrorKind::Validation(
            ValidationError::InvalidOwnerType {
                value: owner_type.to_string(),
                expected: "'fundi' (premium subscriptions are fundi-only)".to_string(),
            },
        )));
    }

    let view = state.subscriptions.subscribe_to_premium(owner_id).await?;
    Ok(success_response(view))
}
