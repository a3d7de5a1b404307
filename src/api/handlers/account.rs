use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::binder::RequestAuth;
use crate::api::headers::ClientMeta;
use crate::error::AuthError;
use crate::identity::providers::jssdk::JsSdkConfig;
use crate::subject::{Role, SubjectId};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct Me {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<ClientMeta>,
    pub profile: Option<serde_json::Value>,
    pub role: Role,
    pub subject_id: SubjectId,
}

async fn load_me(state: &AppState, auth: &RequestAuth) -> Result<Me, AuthError> {
    let caller = auth.caller()?;
    let role = caller
        .role
        .ok_or_else(|| AuthError::unauthorized("anonymous caller"))?;
    let status = state
        .orchestrator
        .users()
        .get_role_and_ban_status(caller.subject)
        .await?;
    Ok(Me {
        client: None,
        profile: status.profile,
        role,
        subject_id: caller.subject,
    })
}

pub async fn me(state: Arc<AppState>, auth: RequestAuth) -> Result<Me, AuthError> {
    load_me(&state, &auth).await
}

/// v2 also echoes what the client reported about itself.
pub async fn me_v2(state: Arc<AppState>, auth: RequestAuth) -> Result<Me, AuthError> {
    let mut me = load_me(&state, &auth).await?;
    me.client = auth.client.clone();
    Ok(me)
}

#[derive(Debug, Deserialize)]
struct JsSdkQuery {
    url: Option<String>,
}

/// Sign the page URL from `?url=`, falling back to the Referer header.
pub async fn weixin_jssdk(state: Arc<AppState>, auth: RequestAuth) -> Result<JsSdkConfig, AuthError> {
    let jssdk = state
        .jssdk
        .as_ref()
        .ok_or_else(|| AuthError::not_found("weixin is not configured"))?;
    let raw = auth.raw()?;

    let from_query = axum::extract::Query::<JsSdkQuery>::try_from_uri(&raw.uri)
        .ok()
        .and_then(|axum::extract::Query(q)| q.url)
        .filter(|u| !u.is_empty());
    let url = from_query
        .or_else(|| {
            raw.headers
                .get(axum::http::header::REFERER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })
        .ok_or_else(|| AuthError::bad_request("page url is required"))?;
    let url = url.split('#').next().unwrap_or_default().to_string();

    jssdk.config_for(&url).await
}
