//! HTTP error responses
//!
//! Every failure leaves the server as `{"error": code, "error_description": message}`
//! with the RFC 6749 error code and a matching status.

use std::time::Duration;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Engine(#[from] openauth_core::Error),

    /// Malformed HTTP input rejected before reaching the engine
    #[error("{0}")]
    BadRequest(String),

    #[error("request did not complete within {}s", .0.as_secs())]
    Timeout(Duration),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Engine(e) => e.oauth_code(),
            ApiError::BadRequest(_) => "invalid_request",
            ApiError::Timeout(_) => "temporarily_unavailable",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.code() {
            "invalid_client" | "invalid_token" => StatusCode::UNAUTHORIZED,
            "not_found" => StatusCode::NOT_FOUND,
            "server_error" => StatusCode::INTERNAL_SERVER_ERROR,
            "temporarily_unavailable" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    fn description(&self) -> String {
        match self {
            ApiError::Engine(e) => e.description(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Engine(e @ openauth_core::Error::Internal { .. }) = &self {
            error!(error = %e, "request failed on an internal error");
        }
        let body = serde_json::json!({
            "error": self.code(),
            "error_description": self.description(),
        });
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openauth_core::{Error, StoreError};

    #[test]
    fn statuses_follow_oauth_codes() {
        let cases = [
            (Error::InvalidRequest("x".into()), StatusCode::BAD_REQUEST),
            (Error::UnsupportedGrantType("x".into()), StatusCode::BAD_REQUEST),
            (Error::InvalidGrant("x".into()), StatusCode::BAD_REQUEST),
            (Error::InvalidCredentials("x".into()), StatusCode::BAD_REQUEST),
            (Error::InvalidClient("x".into()), StatusCode::UNAUTHORIZED),
            (Error::InvalidToken("x".into()), StatusCode::UNAUTHORIZED),
            (Error::NotFound("x".into()), StatusCode::NOT_FOUND),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
        assert_eq!(
            ApiError::Timeout(Duration::from_secs(3)).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn business_messages_pass_through_verbatim() {
        let message = "the department has 1 sub departments, your should delete them first!";
        let response = ApiError::from(Error::Rejected(message.into())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "invalid_request");
        assert_eq!(json["error_description"], message);
    }

    #[tokio::test]
    async fn internal_errors_hide_their_source() {
        let err = Error::Internal {
            context: "persisting token".into(),
            source: StoreError::Unavailable("db down".into()),
        };
        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "server_error");
        assert_eq!(json["error_description"], "internal server error");
    }
}
