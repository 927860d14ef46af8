use axum::{body::Bytes, extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::payments::error::PaymentError;
use crate::payments::kopokopo::parse_payment_resource;
use crate::payments::utils::verify_hmac_sha256_hex;
use crate::services::reconciliation::{extract_payment_request_id, ReconciliationService};

#[derive(Clone)]
pub struct WebhookState {
    pub reconciliation: Arc<ReconciliationService>,
    /// When set, `X-KopoKopo-Signature` is verified over the raw body.
    pub api_key: Option<String>,
}

const SIGNATURE_HEADER: &str = "x-kopokopo-signature";

/// POST /wallet/kopokopo/webhook
///
/// Always answers 200: the provider retries non-200 responses and a
/// processing failure on our side must never turn into a retry storm.
/// Reconciliation itself runs in a spawned task after the response.
pub async fn kopokopo_webhook(
    State(state): State<WebhookState>,
    headers: axum::http::HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    info!("Received KopoKopo webhook");

    if let Some(api_key) = &state.api_key {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !verify_hmac_sha256_hex(&body, api_key, signature) {
            let err = PaymentError::WebhookVerificationError {
                message: "signature does not match the request body".to_string(),
            };
            warn!(error = %err, "dropping webhook payload");
            return acknowledge();
        }
    }

    let payload: JsonValue = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "Webhook body is not valid JSON, dropping payload");
            return acknowledge();
        }
    };

    let payment_request_id = match extract_payment_request_id(&payload) {
        Some(id) => id,
        None => {
            warn!("Webhook payload carries no payment request id, dropping payload");
            return acknowledge();
        }
    };

    let status = match parse_payment_resource(&payment_request_id, payload) {
        Ok(status) => status,
        Err(e) => {
            warn!(
                payment_request_id = %payment_request_id,
                error = %e,
                "Webhook payload is not a recognizable payment resource"
            );
            return acknowledge();
        }
    };

    let reconciliation = state.reconciliation.clone();
    tokio::spawn(async move {
        match reconciliation.reconcile(&status).await {
            Ok(outcome) => {
                info!(
                    payment_request_id = %status.payment_request_id,
                    outcome = ?outcome,
                    "webhook reconciliation finished"
                );
            }
            Err(e) => {
                error!(
                    payment_request_id = %status.payment_request_id,
                    error = %e,
                    "webhook reconciliation failed"
                );
            }
        }
    });

    acknowledge()
}

fn acknowledge() -> (StatusCode, Json<JsonValue>) {
    (
        StatusCode::OK,
        Json(serde_json::json!({"status": "received"})),
    )
}
