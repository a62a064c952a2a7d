//! Request-path errors rendered as OpenAI-style JSON
//!
//! Only caller mistakes (unknown model, unparseable body) get a 4xx status.
//! Pool exhaustion and upstream failures answer 200 with an error body.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use freeplay_client::InvalidModel;
use serde_json::{Value, json};
use thiserror::Error;

/// Errors surfaced to API callers.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    InvalidModel(#[from] InvalidModel),

    #[error("invalid request body: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Pool(#[from] freeplay_pool::Error),

    /// Upstream reported an error record inside a 200 stream
    #[error("{0}")]
    Upstream(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidModel(_) | ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Pool(freeplay_pool::Error::Store(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::OK,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            ApiError::InvalidModel(_) | ApiError::InvalidRequest(_) => "invalid_request_error",
            ApiError::Pool(freeplay_pool::Error::Store(_)) => "internal_error",
            ApiError::Pool(_) => "pool_exhausted",
            ApiError::Upstream(_) => "api_error",
            ApiError::Internal(_) => "internal_error",
        }
    }

    fn param(&self) -> Option<&'static str> {
        match self {
            ApiError::InvalidModel(_) => Some("model"),
            _ => None,
        }
    }

    fn code(&self) -> Option<&'static str> {
        match self {
            ApiError::InvalidModel(_) => Some("model_not_found"),
            ApiError::Pool(e) => Some(e.code()),
            _ => None,
        }
    }

    /// `{"error":{"message","type","param"?,"code"?}}`
    pub fn body(&self) -> Value {
        let mut error = json!({
            "message": self.to_string(),
            "type": self.error_type(),
        });
        if let Some(param) = self.param() {
            error["param"] = json!(param);
        }
        if let Some(code) = self.code() {
            error["code"] = json!(code);
        }
        json!({ "error": error })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_model_is_400_with_param_and_code() {
        let err: ApiError = freeplay_client::models::lookup("gpt-unknown")
            .unwrap_err()
            .into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let body = err.body();
        assert_eq!(body["error"]["type"], "invalid_request_error");
        assert_eq!(body["error"]["param"], "model");
        assert_eq!(body["error"]["code"], "model_not_found");
        let message = body["error"]["message"].as_str().unwrap();
        assert!(message.contains("gpt-unknown"));
        assert!(message.contains("claude-4-sonnet"));
    }

    #[test]
    fn pool_exhaustion_is_200_with_distinct_codes() {
        let none: ApiError = freeplay_pool::Error::NoUsableAccount.into();
        let attempts: ApiError = freeplay_pool::Error::AttemptsExhausted { attempts: 2 }.into();

        assert_eq!(none.status(), StatusCode::OK);
        assert_eq!(attempts.status(), StatusCode::OK);
        assert_eq!(none.body()["error"]["type"], "pool_exhausted");
        assert_eq!(attempts.body()["error"]["type"], "pool_exhausted");
        assert_eq!(none.body()["error"]["code"], "no_usable_account");
        assert_eq!(attempts.body()["error"]["code"], "attempts_exhausted");
    }

    #[test]
    fn upstream_error_has_no_param_or_code() {
        let body = ApiError::Upstream("boom".into()).body();
        assert_eq!(body["error"]["message"], "boom");
        assert_eq!(body["error"]["type"], "api_error");
        assert!(body["error"].get("param").is_none());
        assert!(body["error"].get("code").is_none());
    }

    #[test]
    fn store_error_is_500() {
        let err: ApiError = freeplay_pool::Error::Store("disk".into()).into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
