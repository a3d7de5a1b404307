use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::binder::RequestAuth;
use crate::error::AuthError;
use crate::login::{LoginResult, MobileRegistration};
use crate::sms::CodePurpose;
use crate::subject::Role;
use crate::AppState;

use super::default_role;

#[derive(Debug, Deserialize)]
pub struct CodeRequest {
    pub mobile: String,
    pub purpose: CodePurpose,
}

#[derive(Debug, Serialize)]
pub struct CodeSent {
    /// Only echoed in dev mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub sent: bool,
}

/// Bind codes are tied to the calling subject; every other purpose may be
/// requested anonymously.
pub async fn request_code(
    state: Arc<AppState>,
    auth: RequestAuth,
    body: CodeRequest,
) -> Result<CodeSent, AuthError> {
    let bound = auth.caller()?.known();
    let bound = (body.purpose == CodePurpose::Bind).then_some(bound).flatten();
    if body.purpose == CodePurpose::Bind && bound.is_none() {
        return Err(AuthError::unauthorized("binding a mobile requires a signed-in caller"));
    }

    let code = state
        .orchestrator
        .sms()
        .request_code(&body.mobile, body.purpose, bound)
        .await?;
    Ok(CodeSent {
        code: state.config.dev_mode.then_some(code),
        sent: true,
    })
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub code: String,
    pub mobile: String,
}

#[derive(Debug, Serialize)]
pub struct BindingIssued {
    pub binding_token: String,
}

pub async fn verify_code(
    state: Arc<AppState>,
    auth: RequestAuth,
    body: VerifyRequest,
) -> Result<BindingIssued, AuthError> {
    let bound = auth.caller()?.known();
    let sms = state.orchestrator.sms();

    // A signed-in caller may be verifying either a bind code (keyed by
    // subject) or an unbound one.
    let token = match bound {
        Some(subject) => match sms.issue_binding_token(&body.mobile, &body.code, Some(subject)).await {
            Err(AuthError::BadCode) => sms.issue_binding_token(&body.mobile, &body.code, None).await?,
            other => other?,
        },
        None => sms.issue_binding_token(&body.mobile, &body.code, None).await?,
    };
    Ok(BindingIssued {
        binding_token: token,
    })
}

#[derive(Debug, Deserialize)]
pub struct SmsLogin {
    pub code: String,
    pub mobile: String,
    #[serde(default = "default_role")]
    pub role: Role,
}

pub async fn login(
    state: Arc<AppState>,
    _auth: RequestAuth,
    body: SmsLogin,
) -> Result<LoginResult, AuthError> {
    state
        .orchestrator
        .login_by_sms(&body.mobile, &body.code, body.role)
        .await
}

#[derive(Debug, Deserialize)]
pub struct SmsRegister {
    #[serde(flatten)]
    pub registration: MobileRegistration,
    #[serde(default = "default_role")]
    pub role: Role,
}

pub async fn register(
    state: Arc<AppState>,
    _auth: RequestAuth,
    body: SmsRegister,
) -> Result<LoginResult, AuthError> {
    state
        .orchestrator
        .register_by_mobile(body.registration, body.role)
        .await
}

#[derive(Debug, Deserialize)]
pub struct ResetPassword {
    pub binding_token: String,
    pub mobile: String,
    pub password: String,
}

pub async fn reset_password(
    state: Arc<AppState>,
    _auth: RequestAuth,
    body: ResetPassword,
) -> Result<serde_json::Value, AuthError> {
    state
        .orchestrator
        .reset_password_by_mobile(&body.mobile, &body.binding_token, &body.password)
        .await?;
    Ok(serde_json::json!({ "reset": true }))
}

#[derive(Debug, Deserialize)]
pub struct BindMobile {
    pub binding_token: String,
    pub mobile: String,
}

pub async fn bind(
    state: Arc<AppState>,
    auth: RequestAuth,
    body: BindMobile,
) -> Result<serde_json::Value, AuthError> {
    let subject = auth.caller()?.subject;
    state
        .orchestrator
        .bind_mobile(subject, &body.mobile, &body.binding_token)
        .await?;
    Ok(serde_json::json!({ "bound": true, "subject_id": subject }))
}
