use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::identity::Sex;
use crate::subject::{Role, SubjectId};
use crate::traits::PasswordHash;

/// A stored account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Last token issued to this subject as an app user
    pub app_token: Option<String>,
    /// Reason shown alongside an active ban
    pub ban_reason: Option<String>,
    /// Banned while this lies in the future
    pub banned_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub id: SubjectId,
    pub last_active_at: Option<DateTime<Utc>>,
    pub nickname: Option<String>,
    pub password: Option<PasswordHash>,
    pub portrait: Option<String>,
    /// Provider key ("mobile", "weixin", ...) -> external id
    pub provider_ids: BTreeMap<String, String>,
    pub role: Role,
    pub sex: Sex,
}

impl UserRecord {
    pub fn is_banned_at(&self, now: DateTime<Utc>) -> bool {
        self.banned_until.is_some_and(|until| until > now)
    }

    pub fn ban_info(&self) -> serde_json::Value {
        serde_json::json!({
            "banned_until": self.banned_until.map(|t| t.to_rfc3339()),
            "reason": self.ban_reason,
        })
    }

    pub fn profile(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "nickname": self.nickname,
            "portrait": self.portrait,
            "role": self.role,
            "sex": self.sex,
        })
    }
}

/// A value in the short-lived key-value table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KvEntry {
    /// `None` never expires
    pub expires_at: Option<DateTime<Utc>>,
    pub value: String,
}

impl KvEntry {
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |t| t > now)
    }
}
