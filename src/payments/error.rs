use thiserror::Error;

pub type PaymentResult<T> = Result<T, PaymentError>;

#[derive(Debug, Clone, Error)]
pub enum PaymentError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid amount '{amount}': {reason}")]
    InvalidAmount { amount: String, reason: String },

    #[error("Invalid phone number '{phone}': {reason}")]
    InvalidPhoneNumber { phone: String, reason: String },

    #[error("Authentication with provider failed: {message}")]
    AuthenticationError { message: String },

    #[error("Network error: {message}")]
    NetworkError { message: String },

    #[error("Provider request timed out after {timeout_secs}s")]
    TimeoutError { timeout_secs: u64 },

    #[error("Rate limit exceeded: {message}")]
    RateLimitError {
        message: String,
        retry_after_seconds: Option<u64>,
    },

    #[error("Webhook verification failed: {message}")]
    WebhookVerificationError { message: String },

    #[error("Callback URL rejected by provider: {message}")]
    CallbackRejected { message: String },

    #[error("Provider error: provider={provider}, message={message}")]
    ProviderError {
        provider: String,
        message: String,
        provider_code: Option<String>,
        retryable: bool,
    },
}

impl PaymentError {
    pub fn is_retryable(&self) -> bool {
        match self {
            PaymentError::MissingField { .. } => false,
            PaymentError::InvalidAmount { .. } => false,
            PaymentError::InvalidPhoneNumber { .. } => false,
            PaymentError::AuthenticationError { .. } => false,
            PaymentError::NetworkError { .. } => true,
            PaymentError::TimeoutError { .. } => true,
            PaymentError::RateLimitError { .. } => true,
            PaymentError::WebhookVerificationError { .. } => false,
            PaymentError::CallbackRejected { .. } => false,
            PaymentError::ProviderError { retryable, .. } => *retryable,
        }
    }

    pub fn http_status_code(&self) -> u16 {
        match self {
            PaymentError::MissingField { .. }
            | PaymentError::InvalidAmount { .. }
            | PaymentError::InvalidPhoneNumber { .. } => 400,
            PaymentError::AuthenticationError { .. } => 502,
            PaymentError::NetworkError { .. } => 503,
            PaymentError::TimeoutError { .. } => 504,
            PaymentError::RateLimitError { .. } => 429,
            PaymentError::WebhookVerificationError { .. } => 401,
            PaymentError::CallbackRejected { .. } => 502,
            PaymentError::ProviderError { .. } => 502,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            PaymentError::MissingField { .. }
            | PaymentError::InvalidAmount { .. }
            | PaymentError::InvalidPhoneNumber { .. } => self.to_string(),
            PaymentError::AuthenticationError { .. } => {
                "Could not authenticate with the payment provider".to_string()
            }
            PaymentError::NetworkError { .. } => {
                "Payment provider is temporarily unavailable".to_string()
            }
            PaymentError::TimeoutError { .. } => {
                "Payment provider did not respond in time. Please retry".to_string()
            }
            PaymentError::RateLimitError { .. } => {
                "Too many requests to payment provider. Please retry shortly".to_string()
            }
            PaymentError::WebhookVerificationError { .. } => {
                "Invalid webhook signature".to_string()
            }
            PaymentError::CallbackRejected { .. } => {
                "Payment provider rejected the callback configuration".to_string()
            }
            PaymentError::ProviderError { .. } => "Payment provider returned an error".to_string(),
        }
    }
}

impl From<PaymentError> for crate::error::AppError {
    fn from(err: PaymentError) -> Self {
        use crate::error::{AppError, AppErrorKind, ExternalError, ValidationError};

        let kind = match &err {
            PaymentError::MissingField { field } => {
                AppErrorKind::Validation(ValidationError::MissingField {
                    field: field.clone(),
                })
            }
            PaymentError::InvalidAmount { amount, reason } => {
                AppErrorKind::Validation(ValidationError::InvalidAmount {
                    amount: amount.clone(),
                    reason: reason.clone(),
                })
            }
            PaymentError::InvalidPhoneNumber { phone, reason } => {
                AppErrorKind::Validation(ValidationError::InvalidPhoneNumber {
                    phone: phone.clone(),
                    reason: reason.clone(),
                })
            }
            PaymentError::TimeoutError { timeout_secs } => {
                AppErrorKind::External(ExternalError::Timeout {
                    service: "KopoKopo".to_string(),
                    timeout_secs: *timeout_secs,
                })
            }
            PaymentError::RateLimitError {
                retry_after_seconds,
                ..
            } => AppErrorKind::External(ExternalError::RateLimit {
                service: "KopoKopo".to_string(),
                retry_after: *retry_after_seconds,
            }),
            _ => AppErrorKind::External(ExternalError::PaymentProvider {
                provider: "KopoKopo".to_string(),
                message: err.to_string(),
                is_retryable: err.is_retryable(),
            }),
        };

        AppError::new(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_http_status_mapping_is_correct() {
        assert_eq!(
            PaymentError::InvalidAmount {
                amount: "-5".to_string(),
                reason: "must be positive".to_string()
            }
            .http_status_code(),
            400
        );
        assert_eq!(
            PaymentError::RateLimitError {
                message: "limited".to_string(),
                retry_after_seconds: Some(30)
            }
            .http_status_code(),
            429
        );
        assert_eq!(
            PaymentError::TimeoutError { timeout_secs: 30 }.http_status_code(),
            504
        );
        assert_eq!(
            PaymentError::CallbackRejected {
                message: "invalid callback_url".to_string()
            }
            .http_status_code(),
            502
        );
    }

    #[test]
    fn retryable_flags_are_set() {
        assert!(PaymentError::NetworkError {
            message: "connection reset".to_string()
        }
        .is_retryable());
        assert!(PaymentError::TimeoutError { timeout_secs: 30 }.is_retryable());
        assert!(!PaymentError::AuthenticationError {
            message: "bad credentials".to_string()
        }
        .is_retryable());
        assert!(!PaymentError::CallbackRejected {
            message: "rejected".to_string()
        }
        .is_retryable());
    }

    #[test]
    fn rate_limit_converts_to_429_app_error() {
        let err = PaymentError::RateLimitError {
            message: "slow down".to_string(),
            retry_after_seconds: Some(15),
        };
        let app_err: crate::error::AppError = err.into();
        assert_eq!(app_err.status_code(), 429);
        assert!(app_err.is_retryable());
    }

    #[test]
    fn invalid_phone_converts_to_tagged_validation_error() {
        use crate::error::{AppErrorKind, ValidationError};

        let err = PaymentError::InvalidPhoneNumber {
            phone: "12345".to_string(),
            reason: "not a Kenyan MSISDN".to_string(),
        };
        let app_err: crate::error::AppError = err.into();
        assert_eq!(app_err.status_code(), 400);
        assert!(matches!(
            app_err.kind,
            AppErrorKind::Validation(ValidationError::InvalidPhoneNumber { .. })
        ));
    }

    #[test]
    fn timeout_converts_to_504_app_error() {
        let err = PaymentError::TimeoutError { timeout_secs: 30 };
        let app_err: crate::error::AppError = err.into();
        assert_eq!(app_err.status_code(), 504);
        assert!(app_err.is_retryable());
    }
}
