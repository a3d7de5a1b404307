use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::api::binder::RequestAuth;
use crate::error::AuthError;
use crate::storage::models::UserRecord;
use crate::subject::{Role, SubjectId};
use crate::AppState;

/// Admin view of a stored subject.
#[derive(Debug, Serialize)]
pub struct SubjectView {
    pub ban_info: Option<serde_json::Value>,
    pub banned: bool,
    pub created_at: DateTime<Utc>,
    pub last_active_at: Option<DateTime<Utc>>,
    pub profile: serde_json::Value,
    pub provider_ids: BTreeMap<String, String>,
    pub role: Role,
}

impl From<UserRecord> for SubjectView {
    fn from(record: UserRecord) -> Self {
        let banned = record.is_banned_at(Utc::now());
        Self {
            ban_info: banned.then(|| record.ban_info()),
            banned,
            created_at: record.created_at,
            last_active_at: record.last_active_at,
            profile: record.profile(),
            provider_ids: record.provider_ids.clone(),
            role: record.role,
        }
    }
}

pub async fn get_subject(state: Arc<AppState>, auth: RequestAuth) -> Result<SubjectView, AuthError> {
    let id = SubjectId(auth.resource_id()?);
    let record = state
        .db
        .get_user(id)?
        .ok_or_else(|| AuthError::not_found(format!("subject {id}")))?;
    Ok(record.into())
}

#[derive(Debug, Deserialize)]
pub struct BanRequest {
    /// Omit (or pass `null`) to lift the ban.
    #[serde(default)]
    pub banned_until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reason: Option<String>,
}

pub async fn ban_subject(
    state: Arc<AppState>,
    auth: RequestAuth,
    body: BanRequest,
) -> Result<SubjectView, AuthError> {
    let id = SubjectId(auth.resource_id()?);
    let admin = auth.admin()?;
    let record = state.db.set_ban(id, body.banned_until, body.reason)?;

    match record.banned_until {
        Some(until) => tracing::info!(subject_id = %id, admin_id = %admin.subject, %until, "Subject banned"),
        None => tracing::info!(subject_id = %id, admin_id = %admin.subject, "Subject unbanned"),
    }
    Ok(record.into())
}
