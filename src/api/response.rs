use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::{codes, AuthError};

// ============================================================================
// Success envelope
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct Success<T: Serialize> {
    pub data: T,
    pub errcode: u32,
}

impl<T: Serialize> Success<T> {
    pub fn ok(data: T) -> Json<Success<T>> {
        Json(Success {
            data,
            errcode: codes::OK,
        })
    }
}

// ============================================================================
// Error envelope
// ============================================================================

/// `{"errcode", "errmsg"}` payload; the HTTP status is `errcode / 100`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    pub errcode: u32,
    pub errmsg: String,
}

impl ApiError {
    pub fn new(errcode: u32, errmsg: impl Into<String>) -> Self {
        Self {
            errcode,
            errmsg: errmsg.into(),
        }
    }

    /// Internal details only survive in dev mode.
    pub fn from_auth(err: &AuthError, dev_mode: bool) -> Self {
        if let AuthError::Internal(detail) = err {
            tracing::error!(error = %detail, "Internal error");
        }
        Self::new(err.code(), err.public_message(dev_mode))
    }

    pub fn status(&self) -> StatusCode {
        u16::try_from(self.errcode / 100)
            .ok()
            .and_then(|s| StatusCode::from_u16(s).ok())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_follows_errcode() {
        assert_eq!(ApiError::from_auth(&AuthError::BadCode, false).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::from_auth(&AuthError::ThirdPartyAuthFailed("x".into()), false).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(ApiError::new(7, "odd").status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_internal_detail_hidden_outside_dev_mode() {
        let err = AuthError::internal("disk full");
        assert_eq!(ApiError::from_auth(&err, false).errmsg, "Internal error");
        assert!(ApiError::from_auth(&err, true).errmsg.contains("disk full"));
    }
}
