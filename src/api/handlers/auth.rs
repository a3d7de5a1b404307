use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::binder::RequestAuth;
use crate::error::AuthError;
use crate::identity::{OAuthGrant, Provider};
use crate::login::LoginResult;
use crate::subject::{Role, SubjectId};
use crate::AppState;

use super::default_role;

// ============================================================================
// Password and OAuth login
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct PasswordLogin {
    pub identifier: String,
    /// `username`, `email` or `mobile`.
    pub kind: String,
    pub password: String,
    #[serde(default = "default_role")]
    pub role: Role,
}

pub async fn login_by_password(
    state: Arc<AppState>,
    _auth: RequestAuth,
    body: PasswordLogin,
) -> Result<LoginResult, AuthError> {
    let kind: Provider = body.kind.parse()?;
    state
        .orchestrator
        .login_by_password(&kind, &body.identifier, &body.password, body.role)
        .await
}

#[derive(Debug, Deserialize)]
pub struct OAuthLogin {
    #[serde(flatten)]
    pub grant: OAuthGrant,
    #[serde(default = "default_role")]
    pub role: Role,
}

pub async fn login_by_oauth(
    state: Arc<AppState>,
    auth: RequestAuth,
    body: OAuthLogin,
) -> Result<LoginResult, AuthError> {
    let provider: Provider = auth.path_param("provider")?.parse()?;
    if provider.supports_password() {
        return Err(AuthError::not_found(format!("{provider} is not an OAuth provider")));
    }
    state
        .orchestrator
        .login_by_oauth(&provider, &body.grant, body.role)
        .await
}

// ============================================================================
// Token inspection
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct InspectRequest {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct InspectResponse {
    pub expired: bool,
    pub expires_at: DateTime<Utc>,
    pub role: Role,
    pub subject_id: SubjectId,
}

/// Decode without authorizing: expired tokens are reported, not rejected.
pub async fn inspect_token(
    state: Arc<AppState>,
    _auth: RequestAuth,
    body: InspectRequest,
) -> Result<InspectResponse, AuthError> {
    let claims = state
        .sessions
        .codec()
        .parse(&body.token)
        .map_err(|_| AuthError::bad_request("token is not valid"))?;
    Ok(InspectResponse {
        expired: claims.is_expired(),
        expires_at: claims.expires_at,
        role: claims.role,
        subject_id: claims.subject,
    })
}
