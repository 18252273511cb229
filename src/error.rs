use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::ratelimit::RateLimitDecision;
use crate::store::StoreError;

/// Errors surfaced by the HTTP layer. Everything unexpected collapses into `Internal`,
/// whose detail is logged but never sent to the client.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid domain format")]
    InvalidDomain,

    #[error("Invalid scan options: {0}")]
    InvalidOptions(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Unsupported export format: {0}")]
    UnsupportedFormat(String),

    #[error("Too many requests. Please try again later.")]
    RateLimited {
        limit: u32,
        decision: RateLimitDecision,
    },

    #[error("Scan not found")]
    NotFound,

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => ApiError::NotFound,
            other => ApiError::Internal(other.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::InvalidDomain
            | ApiError::InvalidOptions(_)
            | ApiError::BadRequest(_)
            | ApiError::UnsupportedFormat(_) => StatusCode::BAD_REQUEST,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = match &self {
            ApiError::Internal(err) => {
                tracing::error!(error = %err, "request failed");
                String::from("Internal server error")
            }
            other => {
                tracing::debug!(status = %status, error = %other, "request rejected");
                other.to_string()
            }
        };

        let mut response = (status, Json(json!({ "error": message }))).into_response();

        if let ApiError::RateLimited { limit, decision } = &self {
            let headers = response.headers_mut();
            for (name, value) in decision.headers(*limit) {
                headers.insert(name, value);
            }
            headers.insert(
                header::RETRY_AFTER,
                HeaderValue::from(decision.retry_after_secs()),
            );
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(ApiError::InvalidDomain.into_response().status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::InvalidOptions("x".into()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::NotFound.into_response().status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::Internal(anyhow::anyhow!("boom")).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn rate_limited_carries_retry_after() {
        let err = ApiError::RateLimited {
            limit: 10,
            decision: RateLimitDecision {
                remaining: -1,
                ms_before_next: 30_500,
                reset_at: OffsetDateTime::UNIX_EPOCH,
            },
        };
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(resp.headers()[header::RETRY_AFTER], "31");
        assert_eq!(resp.headers()["x-ratelimit-remaining"], "0");
        assert_eq!(resp.headers()["x-ratelimit-limit"], "10");
    }

    #[test]
    fn store_not_found_maps_to_not_found() {
        let err: ApiError = StoreError::NotFound("scan_1_x".into()).into();
        assert!(matches!(err, ApiError::NotFound));
        let err: ApiError = StoreError::Duplicate("scan_1_x".into()).into();
        assert!(matches!(err, ApiError::Internal(_)));
    }
}
