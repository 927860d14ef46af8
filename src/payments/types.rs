use serde::{Deserialize, Serialize};

/// Provider discriminator stored on payment logs.
pub const PROVIDER_KOPOKOPO: &str = "KOPOKOPO";

/// Gateway-side state of a payment request as KopoKopo reports it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentState {
    Pending,
    Success,
    Failed,
}

impl PaymentState {
    /// Map the provider's status strings ("Pending", "Success", "Failed",
    /// case-insensitive) onto our state. Unknown strings come back as `None`
    /// so callers can leave the log untouched.
    pub fn from_provider(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(PaymentState::Pending),
            "success" | "received" => Some(PaymentState::Success),
            "failed" => Some(PaymentState::Failed),
            _ => None,
        }
    }
}

/// Input for an STK push top-up. Amount arrives in display units from the
/// API layer and is converted once, here, by the `Money` deserializer.
#[derive(Debug, Clone, Deserialize)]
pub struct StkPushData {
    pub amount: crate::money::Money,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Result of initiating an STK push: the provider-assigned payment request id
/// we later reconcile webhooks and polls against.
#[derive(Debug, Clone)]
pub struct StkPushOutcome {
    pub payment_request_id: String,
    pub payment_request_url: String,
}

/// A polled payment request status. `amount_minor` is present only once the
/// provider attaches the settled amount to the resource.
#[derive(Debug, Clone)]
pub struct PaymentStatus {
    pub payment_request_id: String,
    pub state: PaymentState,
    pub amount_minor: Option<i64>,
    pub raw: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_status_strings_parse_case_insensitively() {
        assert_eq!(
            PaymentState::from_provider("Success"),
            Some(PaymentState::Success)
        );
        assert_eq!(
            PaymentState::from_provider("FAILED"),
            Some(PaymentState::Failed)
        );
        assert_eq!(
            PaymentState::from_provider("pending"),
            Some(PaymentState::Pending)
        );
        assert_eq!(PaymentState::from_provider("Reversed"), None);
    }
}
