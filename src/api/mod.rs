//! HTTP route handlers.
//!
//! The wallet owner is identified by the `x-owner-id` and `x-owner-type`
//! headers; real authentication lives in front of this service.

pub mod payments;
pub mod subscriptions;
pub mod wallet;
pub mod webhooks;

use axum::http::HeaderMap;
use uuid::Uuid;

use crate::error::{AppError, AppErrorKind, AppResult, ValidationError};
use crate::services::wallet::OwnerType;

pub const OWNER_ID_HEADER: &str = "x-owner-id";
pub const OWNER_TYPE_HEADER: &str = "x-owner-type";

pub fn owner_from_headers(headers: &HeaderMap) -> AppResult<(Uuid, OwnerType)> {
    let raw_id = headers
        .get(OWNER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| missing_header(OWNER_ID_HEADER))?;
    let owner_id = Uuid::parse_str(raw_id).map_err(|_| {
        AppError::new(AppErrorKind::Validation(ValidationError::MissingField {
            field: format!("{} must be a UUID", OWNER_ID_HEADER),
        }))
    })?;

    let owner_type = headers
        .get(OWNER_TYPE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| missing_header(OWNER_TYPE_HEADER))?
        .parse::<OwnerType>()?;

    Ok((owner_id, owner_type))
}

fn missing_header(name: &str) -> AppError {
    AppError::new(AppErrorKind::Validation(ValidationError::MissingField {
        field: name.to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn parses_owner_headers() {
        let mut headers = HeaderMap::new();
        let id = Uuid::new_v4();
        headers.insert(
            OWNER_ID_HEADER,
            HeaderValue::from_str(&id.to_string()).unwrap(),
        );
        headers.insert(OWNER_TYPE_HEADER, HeaderValue::from_static("client"));

        let (owner_id, owner_type) = owner_from_headers(&headers).unwrap();
        assert_eq!(owner_id, id);
        assert_eq!(owner_type, OwnerType::Client);
    }

    #[test]
    fn rejects_missing_or_malformed_headers() {
        let headers = HeaderMap::new();
        assert!(owner_from_headers(&headers).is_err());

        let mut headers = HeaderMap::new();
        headers.insert(OWNER_ID_HEADER, HeaderValue::from_static("not-a-uuid"));
        headers.insert(OWNER_TYPE_HEADER, HeaderValue::from_static("client"));
        assert!(owner_from_headers(&headers).is_err());
    }
}
