//! KopoKopo gateway adapter: OAuth client-credentials auth, STK push
//! initiation against the incoming_payments API, and payment request polling.

use crate::money::{Money, CURRENCY};
use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::types::{PaymentState, PaymentStatus, StkPushData, StkPushOutcome};
use crate::payments::utils::GatewayHttpClient;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use std::sync::RwLock;
use std::time::Duration;
use tracing::{info, warn};

const DEFAULT_BASE_URL: &str = "https://sandbox.kopokopo.com";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_RETRIES: u32 = 2;

#[derive(Debug, Clone)]
pub struct KopoKopoConfig {
    pub client_id: String,
    pub client_secret: String,
    pub till_number: String,
    pub base_url: String,
    pub callback_url: String,
    /// API key used to verify webhook signatures. Optional; when unset,
    /// webhook signatures are not checked.
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub max_retries: u32,
}

impl KopoKopoConfig {
    pub fn from_env() -> PaymentResult<Self> {
        let required = |name: &str| {
            std::env::var(name)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| PaymentError::MissingField {
                    field: name.to_string(),
                })
        };

        Ok(Self {
            client_id: required("K2_CLIENT_ID")?,
            client_secret: required("K2_CLIENT_SECRET")?,
            till_number: required("K2_TILL_NUMBER")?,
            base_url: std::env::var("K2_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            callback_url: required("K2_CALLBACK_URL")?,
            api_key: std::env::var("K2_API_KEY")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
        })
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

pub struct KopoKopoClient {
    config: KopoKopoConfig,
    http: GatewayHttpClient,
    cached_token: RwLock<Option<(String, DateTime<Utc>)>>,
}

impl KopoKopoClient {
    pub fn new(config: KopoKopoConfig) -> PaymentResult<Self> {
        let http = GatewayHttpClient::new(config.timeout, config.max_retries)?;
        Ok(Self {
            config,
            http,
            cached_token: RwLock::new(None),
        })
    }

    pub fn callback_url(&self) -> &str {
        &self.config.callback_url
    }

    pub fn webhook_api_key(&self) -> Option<&str> {
        self.config.api_key.as_deref()
    }

    /// OAuth client-credentials token, cached until shortly before expiry.
    pub async fn get_access_token(&self) -> PaymentResult<String> {
        {
            let cached = self
                .cached_token
                .read()
                .map_err(|_| PaymentError::AuthenticationError {
                    message: "token cache poisoned".to_string(),
                })?;
            if let Some((token, expiry)) = cached.as_ref() {
                if *expiry > Utc::now() + chrono::Duration::minutes(5) {
                    return Ok(token.clone());
                }
            }
        }

        info!("Requesting new KopoKopo access token");
        let url = format!("{}/oauth/token", self.config.base_url);
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];

        let token: TokenResponse =
            self.http
                .post_form_json(&url, &form)
                .await
                .map_err(|e| match e {
                    PaymentError::ProviderError {
                        provider_code: Some(code),
                        message,
                        ..
                    } if code == "401" => PaymentError::AuthenticationError { message },
                    other => other,
                })?;

        let ttl_secs = token.expires_in.unwrap_or(3600);
        let expiry = Utc::now() + chrono::Duration::seconds(ttl_secs as i64);
        {
            let mut cached =
                self.cached_token
                    .write()
                    .map_err(|_| PaymentError::AuthenticationError {
                        message: "token cache poisoned".to_string(),
                    })?;
            *cached = Some((token.access_token.clone(), expiry));
        }

        Ok(token.access_token)
    }

    /// Trigger an M-PESA STK push to the subscriber's phone. KopoKopo answers
    /// 201 with an empty body and the created resource URL in `Location`; the
    /// trailing path segment is the payment request id we track. Some sandbox
    /// responses carry the id in the body instead, so that is the fallback.
    pub async fn initiate_stk_push(
        &self,
        data: &StkPushData,
        reference: &str,
    ) -> PaymentResult<StkPushOutcome> {
        if !data.amount.is_positive() {
            return Err(PaymentError::InvalidAmount {
                amount: data.amount.to_string(),
                reason: "amount must be greater than zero".to_string(),
            });
        }
        for (field, value) in [
            ("first_name", &data.first_name),
            ("last_name", &data.last_name),
        ] {
            if value.trim().is_empty() {
                return Err(PaymentError::MissingField {
                    field: field.to_string(),
                });
            }
        }

        let phone = format_phone_number(&data.phone_number)?;
        let token = self.get_access_token().await?;

        let body = json!({
            "payment_channel": "M-PESA STK Push",
            "till_number": self.config.till_number,
            "subscriber": {
                "first_name": data.first_name,
                "last_name": data.last_name,
                "phone_number": phone,
                "email": data.email,
            },
            "amount": {
                "currency": CURRENCY,
                "value": data.amount.display_value(),
            },
            "metadata": {
                "reference": reference,
            },
            "_links": {
                "callback_url": self.config.callback_url,
            },
        });

        let url = format!("{}/api/v1/incoming_payments", self.config.base_url);
        let response = self
            .http
            .request_raw(reqwest::Method::POST, &url, Some(&token), Some(&body), &[])
            .await
            .map_err(|e| self.humanize_initiation_error(e))?;

        let payment_request_id = match response.location.as_deref() {
            Some(location) => extract_request_id(location)?,
            None => extract_body_id(&response.body).ok_or_else(|| PaymentError::ProviderError {
                provider: "kopokopo".to_string(),
                message: format!(
                    "incoming_payments response carried neither Location header nor body id (HTTP {})",
                    response.status
                ),
                provider_code: None,
                retryable: false,
            })?,
        };

        let payment_request_url = response
            .location
            .unwrap_or_else(|| format!("{}/{}", url, payment_request_id));

        info!(%payment_request_id, "STK push initiated");

        Ok(StkPushOutcome {
            payment_request_id,
            payment_request_url,
        })
    }

    /// Poll a payment request. Status lives at `data.attributes.status`; once
    /// the payment settles the amount is under
    /// `data.attributes.event.resource.amount`.
    pub async fn get_payment_status(
        &self,
        payment_request_id: &str,
    ) -> PaymentResult<PaymentStatus> {
        let token = self.get_access_token().await?;
        let url = format!(
            "{}/api/v1/incoming_payments/{}",
            self.config.base_url, payment_request_id
        );

        let raw: serde_json::Value = self
            .http
            .request_json(reqwest::Method::GET, &url, Some(&token), None, &[])
            .await?;

        parse_payment_resource(payment_request_id, raw)
    }

    // KopoKopo answers 403 when it refuses the callback URL, which in
    // practice means a non-HTTPS or localhost callback in a live till.
    fn humanize_initiation_error(&self, err: PaymentError) -> PaymentError {
        match err {
            PaymentError::ProviderError {
                provider_code: Some(code),
                message,
                ..
            } if code == "403" => {
                let hint = if !self.config.callback_url.starts_with("https://")
                    || self.config.callback_url.contains("localhost")
                {
                    format!(
                        " (callback_url '{}' must be a publicly reachable HTTPS URL)",
                        self.config.callback_url
                    )
                } else {
                    String::new()
                };
                PaymentError::CallbackRejected {
                    message: format!("{}{}", message, hint),
                }
            }
            other => other,
        }
    }
}

/// Build a [`PaymentStatus`] out of a KopoKopo incoming_payments resource.
pub fn parse_payment_resource(
    payment_request_id: &str,
    raw: serde_json::Value,
) -> PaymentResult<PaymentStatus> {
    let attributes = &raw["data"]["attributes"];
    let status_str =
        attributes["status"]
            .as_str()
            .ok_or_else(|| PaymentError::ProviderError {
                provider: "kopokopo".to_string(),
                message: "payment resource missing data.attributes.status".to_string(),
                provider_code: None,
                retryable: false,
            })?;

    let state = match PaymentState::from_provider(status_str) {
        Some(state) => state,
        None => {
            warn!(status = status_str, "unrecognized provider status, treating as pending");
            PaymentState::Pending
        }
    };

    let amount_minor = parse_resource_amount(&attributes["event"]["resource"]["amount"]);

    Ok(PaymentStatus {
        payment_request_id: payment_request_id.to_string(),
        state,
        amount_minor,
        raw,
    })
}

/// The provider reports amounts in display units, sometimes as a JSON number
/// and sometimes as a decimal string.
fn parse_resource_amount(value: &serde_json::Value) -> Option<i64> {
    let text = match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        _ => return None,
    };
    Money::parse_display(&text).ok().map(|m| m.minor())
}

/// Normalize Kenyan MSISDNs to the 254XXXXXXXXX form the gateway expects.
pub fn format_phone_number(phone: &str) -> PaymentResult<String> {
    let phone = phone.trim().trim_start_matches('+');
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();

    let normalized = if digits.starts_with("254") && digits.len() == 12 {
        digits
    } else if digits.starts_with('0') && digits.len() == 10 {
        format!("254{}", &digits[1..])
    } else if (digits.starts_with('7') || digits.starts_with('1')) && digits.len() == 9 {
        format!("254{}", digits)
    } else {
        return Err(PaymentError::InvalidPhoneNumber {
            phone: phone.to_string(),
            reason: "not a recognized Kenyan MSISDN".to_string(),
        });
    };

    Ok(normalized)
}

/// The payment request id is the last path segment of the resource URL
/// KopoKopo returns in `Location`.
pub fn extract_request_id(location: &str) -> PaymentResult<String> {
    location
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|id| !id.is_empty())
        .map(|id| id.to_string())
        .ok_or_else(|| PaymentError::ProviderError {
            provider: "kopokopo".to_string(),
            message: format!("could not extract payment request id from '{}'", location),
            provider_code: None,
            retryable: false,
        })
}

fn extract_body_id(body: &str) -> Option<String> {
    let parsed: serde_json::Value = serde_json::from_str(body).ok()?;
    parsed["data"]["id"]
        .as_str()
        .or_else(|| parsed["id"].as_str())
        .map(|id| id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_kenyan_phone_numbers() {
        assert_eq!(format_phone_number("0712345678").unwrap(), "254712345678");
        assert_eq!(format_phone_number("712345678").unwrap(), "254712345678");
        assert_eq!(format_phone_number("254712345678").unwrap(), "254712345678");
        assert_eq!(format_phone_number("+254712345678").unwrap(), "254712345678");
        assert_eq!(format_phone_number("0112345678").unwrap(), "254112345678");
    }

    #[test]
    fn rejects_malformed_phone_numbers() {
        assert!(format_phone_number("12345").is_err());
        assert!(format_phone_number("").is_err());
        assert!(format_phone_number("0812345678901").is_err());
    }

    #[test]
    fn extracts_request_id_from_location_url() {
        let location =
            "https://sandbox.kopokopo.com/api/v1/incoming_payments/d76265cd-0951-e511-80da-0aa34a9b2388";
        assert_eq!(
            extract_request_id(location).unwrap(),
            "d76265cd-0951-e511-80da-0aa34a9b2388"
        );
        assert!(extract_request_id("").is_err());
    }

    #[test]
    fn falls_back_to_body_id_when_location_is_missing() {
        let body = r#"{"data":{"id":"abc-123","type":"incoming_payment"}}"#;
        assert_eq!(extract_body_id(body), Some("abc-123".to_string()));
        assert_eq!(extract_body_id("not json"), None);
        assert_eq!(extract_body_id("{}"), None);
    }

    #[test]
    fn parses_settled_payment_resource() {
        let raw = serde_json::json!({
            "data": {
                "id": "d76265cd-0951-e511-80da-0aa34a9b2388",
                "type": "incoming_payment",
                "attributes": {
                    "status": "Success",
                    "event": {
                        "type": "Incoming Payment Request",
                        "resource": {
                            "amount": "150.00",
                            "status": "Received"
                        }
                    }
                }
            }
        });

        let status = parse_payment_resource("d76265cd-0951-e511-80da-0aa34a9b2388", raw).unwrap();
        assert_eq!(status.state, PaymentState::Success);
        assert_eq!(status.amount_minor, Some(15_000));
    }

    #[test]
    fn parses_pending_resource_without_amount() {
        let raw = serde_json::json!({
            "data": {
                "attributes": {
                    "status": "Pending",
                    "event": {}
                }
            }
        });

        let status = parse_payment_resource("abc", raw).unwrap();
        assert_eq!(status.state, PaymentState::Pending);
        assert_eq!(status.amount_minor, None);
    }

    #[test]
    fn resource_without_status_is_an_error() {
        let raw = serde_json::json!({"data": {"attributes": {}}});
        assert!(parse_payment_resource("abc", raw).is_err());
    }

    #[test]
    fn numeric_amounts_are_accepted() {
        assert_eq!(
            parse_resource_amount(&serde_json::json!(150.5)),
            Some(15_050)
        );
        assert_eq!(parse_resource_amount(&serde_json::json!("200")), Some(20_000));
        assert_eq!(parse_resource_amount(&serde_json::json!(null)), None);
    }
}
