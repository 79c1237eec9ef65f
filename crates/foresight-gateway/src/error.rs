//! HTTP surface for [`ForesightError`].
//!
//! Every error leaves as `{ "error": <wire code>, "message": <display> }`
//! with a status keyed off the error taxonomy, so clients can branch on
//! the stable wire code instead of parsing messages.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use foresight_types::ForesightError;
use serde_json::json;
use tracing::{error, warn};

/// Wrapper turning engine errors into JSON responses.
#[derive(Debug)]
pub struct ApiError(pub ForesightError);

impl From<ForesightError> for ApiError {
    fn from(err: ForesightError) -> Self {
        Self(err)
    }
}

impl ApiError {
    /// Status and wire body, for handlers that cache or relay responses
    /// instead of returning them directly.
    #[must_use]
    pub fn parts(&self) -> (StatusCode, serde_json::Value) {
        (
            self.status(),
            json!({ "error": self.0.wire_code(), "message": self.0.to_string() }),
        )
    }

    /// 400 wire shape for body-parse failures that never reach validation.
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> (StatusCode, serde_json::Value) {
        (
            StatusCode::BAD_REQUEST,
            json!({ "error": "MALFORMED_REQUEST", "message": message.into() }),
        )
    }

    fn status(&self) -> StatusCode {
        match &self.0 {
            ForesightError::DuplicateOrder { .. } | ForesightError::DuplicateOrderId(_) => {
                StatusCode::CONFLICT
            }
            ForesightError::GaslessQuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            ForesightError::OrderNotFound(_) => StatusCode::NOT_FOUND,
            ForesightError::NotOrderMaker(_) => StatusCode::FORBIDDEN,
            err if err.is_validation() => StatusCode::BAD_REQUEST,
            err if err.is_unavailable() => StatusCode::SERVICE_UNAVAILABLE,
            ForesightError::Store { .. }
            | ForesightError::Redis { .. }
            | ForesightError::Rpc { .. } => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = self.parts();
        if status.is_server_error() {
            error!(code = self.0.error_code(), err = %self.0, "request failed");
        } else {
            warn!(code = self.0.error_code(), err = %self.0, "request refused");
        }
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use foresight_types::{OrderId, Usdc};

    use super::*;

    fn status_of(err: ForesightError) -> StatusCode {
        ApiError(err).status()
    }

    #[test]
    fn validation_errors_are_400() {
        assert_eq!(
            status_of(ForesightError::InvalidMarketKey),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(ForesightError::InvalidSignature),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn special_cases_override_the_taxonomy() {
        assert_eq!(
            status_of(ForesightError::DuplicateOrder { salt: "1".into() }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(ForesightError::GaslessQuotaExceeded {
                used: Usdc(1),
                cap: Usdc(1)
            }),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            status_of(ForesightError::OrderNotFound(OrderId::new())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(ForesightError::NotOrderMaker(OrderId::new())),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn cluster_and_infra_errors_are_503() {
        assert_eq!(
            status_of(ForesightError::ProxyLoop),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(ForesightError::NoLeader),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(ForesightError::Store {
                reason: "down".into()
            }),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn internal_errors_are_500() {
        assert_eq!(
            status_of(ForesightError::Internal("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
