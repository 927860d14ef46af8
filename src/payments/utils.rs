use crate::payments::error::{PaymentError, PaymentResult};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::warn;

/// Raw gateway response for endpoints where the interesting part is not a
/// JSON body, e.g. KopoKopo's 201 with the resource URL in `Location`.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub location: Option<String>,
    pub body: String,
}

enum RequestBody<'a> {
    Json(&'a JsonValue),
    Form(&'a [(&'a str, &'a str)]),
}

#[derive(Clone)]
pub struct GatewayHttpClient {
    client: Client,
    timeout: Duration,
    max_retries: u32,
}

impl GatewayHttpClient {
    pub fn new(timeout: Duration, max_retries: u32) -> PaymentResult<Self> {
        let client =
            Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| PaymentError::NetworkError {
                    message: format!("failed to initialize HTTP client: {}", e),
                })?;

        Ok(Self {
            client,
            timeout,
            max_retries,
        })
    }

    pub async fn request_json<T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        url: &str,
        bearer_token: Option<&str>,
        body: Option<&JsonValue>,
        additional_headers: &[(&str, &str)],
    ) -> PaymentResult<T> {
        let raw = self
            .send_with_retries(
                method,
                url,
                bearer_token,
                body.map(RequestBody::Json),
                additional_headers,
            )
            .await?;
        parse_json_body(&raw.body)
    }

    /// Form-encoded POST (KopoKopo's oauth/token endpoint) with a JSON
    /// response.
    pub async fn post_form_json<T: DeserializeOwned>(
        &self,
        url: &str,
        form: &[(&str, &str)],
    ) -> PaymentResult<T> {
        let raw = self
            .send_with_retries(
                reqwest::Method::POST,
                url,
                None,
                Some(RequestBody::Form(form)),
                &[],
            )
            .await?;
        parse_json_body(&raw.body)
    }

    /// Send the request and hand any 2xx back as a [`RawResponse`] for the
    /// caller to interpret.
    pub async fn request_raw(
        &self,
        method: reqwest::Method,
        url: &str,
        bearer_token: Option<&str>,
        body: Option<&JsonValue>,
        additional_headers: &[(&str, &str)],
    ) -> PaymentResult<RawResponse> {
        self.send_with_retries(
            method,
            url,
            bearer_token,
            body.map(RequestBody::Json),
            additional_headers,
        )
        .await
    }

    // Exponential backoff on 429, 5xx and network failures, up to
    // max_retries.
    async fn send_with_retries(
        &self,
        method: reqwest::Method,
        url: &str,
        bearer_token: Option<&str>,
        body: Option<RequestBody<'_>>,
        additional_headers: &[(&str, &str)],
    ) -> PaymentResult<RawResponse> {
        let mut last_error = None;
        for attempt in 0..=self.max_retries {
            let mut request = self.client.request(method.clone(), url);
            request = request.timeout(self.timeout);

            if let Some(token) = bearer_token {
                request = request.bearer_auth(token);
            }
            for (k, v) in additional_headers {
                request = request.header(*k, *v);
            }
            match &body {
                Some(RequestBody::Json(payload)) => request = request.json(payload),
                Some(RequestBody::Form(fields)) => request = request.form(fields),
                None => {}
            }

            let response = request.send().await.map_err(|e| {
                if e.is_timeout() {
                    PaymentError::TimeoutError {
                        timeout_secs: self.timeout.as_secs(),
                    }
                } else {
                    PaymentError::NetworkError {
                        message: format!("provider request failed: {}", e),
                    }
                }
            });

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    let location = resp
                        .headers()
                        .get(reqwest::header::LOCATION)
                        .and_then(|v| v.to_str().ok())
                        .map(|v| v.to_string());
                    let text = resp.text().await.unwrap_or_default();

                    if status.is_success() {
                        return Ok(RawResponse {
                            status: status.as_u16(),
                            location,
                            body: text,
                        });
                    }

                    if status.as_u16() == 429 {
                        if attempt < self.max_retries {
                            tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
                            continue;
                        }
                        return Err(PaymentError::RateLimitError {
                            message: "provider rate limit exceeded".to_string(),
                            retry_after_seconds: None,
                        });
                    }

                    if status.is_server_error() && attempt < self.max_retries {
                        warn!(
                            status = %status,
                            attempt = attempt + 1,
                            "provider server error, retrying"
                        );
                        tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
                        continue;
                    }

                    return Err(PaymentError::ProviderError {
                        provider: "http".to_string(),
                        message: format!("HTTP {}: {}", status, text),
                        provider_code: Some(status.as_u16().to_string()),
                        retryable: status.is_server_error(),
                    });
                }
                Err(e) => {
                    last_error = Some(e);
                    if attempt < self.max_retries {
                        tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
                        continue;
                    }
                }
            }
        }

        Err(last_error.unwrap_or(PaymentError::NetworkError {
            message: "provider request failed".to_string(),
        }))
    }
}

fn parse_json_body<T: DeserializeOwned>(body: &str) -> PaymentResult<T> {
    serde_json::from_str::<T>(body).map_err(|e| PaymentError::ProviderError {
        provider: "http".to_string(),
        message: format!("invalid provider JSON response: {}", e),
        provider_code: None,
        retryable: false,
    })
}

pub fn verify_hmac_sha256_hex(payload: &[u8], secret: &str, signature: &str) -> bool {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    type HmacSha256 = Hmac<Sha256>;
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(v) => v,
        Err(_) => return false,
    };
    mac.update(payload);
    let computed = hex::encode(mac.finalize().into_bytes());
    secure_eq(computed.as_bytes(), signature.trim().as_bytes())
}

pub fn secure_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter()
        .zip(b.iter())
        .fold(0_u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secure_eq_behaves_correctly() {
        assert!(secure_eq(b"abc", b"abc"));
        assert!(!secure_eq(b"abc", b"abd"));
        assert!(!secure_eq(b"abc", b"ab"));
    }

    #[test]
    fn webhook_hmac_verification_detects_invalid_signature() {
        let payload = br#"{"topic":"buygoods_transaction_received"}"#;
        let valid = verify_hmac_sha256_hex(payload, "secret", "not-a-valid-signature");
        assert!(!valid);
    }

    #[test]
    fn webhook_hmac_verification_accepts_valid_signature() {
        use hmac::{Hmac, Mac};
        use sha2::Sha256;

        let payload = br#"{"topic":"buygoods_transaction_received"}"#;
        let mut mac = Hmac::<Sha256>::new_from_slice(b"secret").unwrap();
        mac.update(payload);
        let signature = hex::encode(mac.finalize().into_bytes());

        assert!(verify_hmac_sha256_hex(payload, "secret", &signature));
    }
}
