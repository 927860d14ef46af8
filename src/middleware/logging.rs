//! Request-id generation for the tower-http request-id layers.

use axum::http::{HeaderValue, Request};
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Assigns a fresh UUID to every request that arrives without an
/// `x-request-id` header; the propagate layer echoes it on the response.
#[derive(Clone, Copy, Default)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = Uuid::new_v4().to_string();
        HeaderValue::from_str(&id).ok().map(RequestId::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_valid_header_values() {
        let mut maker = UuidRequestId;
        let request = Request::builder().body(()).unwrap();
        let id = maker.make_request_id(&request);
        assert!(id.is_some());
    }
}
