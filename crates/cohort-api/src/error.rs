//! API error responses
//!
//! Every handler returns `Result<_, ApiError>`. The response body is always
//! `{"text": "<message>"}`.
//!
//! | Error kind | Status |
//! |------------|--------|
//! | `InvalidArgument`, malformed request | 400 |
//! | `NotFound` | 404 |
//! | `AlreadyExists` | 400 |
//! | `Transient` | 503 |
//! | `StoreFailure` | 500 |
//!
//! Server-side failures are logged here and replaced with a fixed message, so
//! database text never reaches the client.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use cohort_membership::{ErrorKind, MembershipError};
use thiserror::Error;

use crate::models::MessageResponse;

#[derive(Debug, Error)]
pub enum ApiError {
    /// The request could not be decoded or a parameter is malformed.
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Membership(#[from] MembershipError),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Membership(e) => match e.kind() {
                ErrorKind::InvalidArgument | ErrorKind::AlreadyExists => StatusCode::BAD_REQUEST,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Transient => StatusCode::SERVICE_UNAVAILABLE,
                ErrorKind::StoreFailure => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let text = match status {
            StatusCode::SERVICE_UNAVAILABLE => {
                tracing::warn!(error = %self, "Store temporarily unavailable");
                "service temporarily unavailable, retry later".to_string()
            }
            StatusCode::INTERNAL_SERVER_ERROR => {
                tracing::error!(error = %self, "Store operation failed");
                "internal store error".to_string()
            }
            _ => {
                tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
                self.to_string()
            }
        };

        (status, Json(MessageResponse { text })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                MembershipError::InvalidArgument("x".into()),
                StatusCode::BAD_REQUEST,
            ),
            (MembershipError::UserNotFound(1), StatusCode::NOT_FOUND),
            (
                MembershipError::SegmentsNotFound(vec!["a".into()]),
                StatusCode::NOT_FOUND,
            ),
            (MembershipError::UserAlreadyExists(1), StatusCode::BAD_REQUEST),
            (
                MembershipError::Timeout(Duration::from_secs(1)),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                MembershipError::MigrationError("boom".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status(), expected);
        }
    }

    #[test]
    fn test_store_failure_hides_details() {
        let resp = ApiError::from(MembershipError::MigrationError(
            "relation \"users\" does not exist".into(),
        ))
        .into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
