use thiserror::Error;

/// Numeric error codes carried in every error payload.
///
/// The leading digits mirror the HTTP status class (`errcode / 100` is the
/// HTTP status); trailing digits tell apart conditions sharing a class.
pub mod codes {
    pub const OK: u32 = 20000;
    pub const BAD_REQUEST: u32 = 40000;
    pub const BAD_CODE: u32 = 40001;
    pub const BAD_TOKEN: u32 = 40002;
    pub const PASSWORD_NOT_SET: u32 = 40003;
    pub const UNAUTHORIZED: u32 = 40100;
    pub const INVALID_PASSWORD: u32 = 40101;
    pub const FORBIDDEN: u32 = 40300;
    pub const NOT_FOUND: u32 = 40400;
    pub const ALREADY_EXISTS: u32 = 40900;
    pub const INTERNAL: u32 = 50000;
    pub const THIRD_PARTY_AUTH_FAILED: u32 = 50300;
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Already exists: {0}")]
    AlreadyExists(String),
    #[error("Bad verification code")]
    BadCode,
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Bad binding token")]
    BadToken,
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Internal error: {0}")]
    Internal(String),
    #[error("Invalid password")]
    InvalidPassword,
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Password not set")]
    PasswordNotSet,
    #[error("Third-party authentication failed: {0}")]
    ThirdPartyAuthFailed(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

impl AuthError {
    pub fn code(&self) -> u32 {
        match self {
            AuthError::AlreadyExists(_) => codes::ALREADY_EXISTS,
            AuthError::BadCode => codes::BAD_CODE,
            AuthError::BadRequest(_) => codes::BAD_REQUEST,
            AuthError::BadToken => codes::BAD_TOKEN,
            AuthError::Forbidden(_) => codes::FORBIDDEN,
            AuthError::Internal(_) => codes::INTERNAL,
            AuthError::InvalidPassword => codes::INVALID_PASSWORD,
            AuthError::NotFound(_) => codes::NOT_FOUND,
            AuthError::PasswordNotSet => codes::PASSWORD_NOT_SET,
            AuthError::ThirdPartyAuthFailed(_) => codes::THIRD_PARTY_AUTH_FAILED,
            AuthError::Unauthorized(_) => codes::UNAUTHORIZED,
        }
    }

    /// Client-facing message. Internal details are hidden unless `dev_mode` is set.
    pub fn public_message(&self, dev_mode: bool) -> String {
        match self {
            AuthError::Internal(_) if !dev_mode => "Internal error".to_string(),
            _ => self.to_string(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        AuthError::BadRequest(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        AuthError::Forbidden(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        AuthError::Internal(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        AuthError::NotFound(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        AuthError::Unauthorized(message.into())
    }
}

impl From<crate::storage::DatabaseError> for AuthError {
    fn from(e: crate::storage::DatabaseError) -> Self {
        AuthError::Internal(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_mirror_http_status_class() {
        let cases = [
            (AuthError::BadCode, 400),
            (AuthError::BadToken, 400),
            (AuthError::PasswordNotSet, 400),
            (AuthError::InvalidPassword, 401),
            (AuthError::unauthorized("x"), 401),
            (AuthError::forbidden("x"), 403),
            (AuthError::not_found("x"), 404),
            (AuthError::AlreadyExists("x".into()), 409),
            (AuthError::internal("x"), 500),
            (AuthError::ThirdPartyAuthFailed("x".into()), 503),
        ];
        for (err, status) in cases {
            assert_eq!(err.code() / 100, status, "{err}");
        }
    }

    #[test]
    fn test_internal_message_is_opaque_outside_dev_mode() {
        let err = AuthError::internal("redb commit failed");
        assert_eq!(err.public_message(false), "Internal error");
        assert!(err.public_message(true).contains("redb commit failed"));

        let err = AuthError::not_found("user");
        assert_eq!(err.public_message(false), err.public_message(true));
    }
}
