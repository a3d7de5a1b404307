use async_trait::async_trait;
use serde::Deserialize;

use super::{fetch_json, non_empty, ProviderStatus};
use crate::config::QqConfig;
use crate::error::AuthError;
use crate::identity::{OAuthGrant, OAuthProvider, Provider, ProviderProfile, ProviderSession, Sex};

const ME_URL: &str = "https://graph.qq.com/oauth2.0/me";
const USER_INFO_URL: &str = "https://graph.qq.com/user/get_user_info";

#[derive(Debug, Deserialize)]
struct MeResponse {
    #[serde(default)]
    client_id: String,
    #[serde(default)]
    error: i64,
    #[serde(default)]
    error_description: String,
    #[serde(default)]
    openid: String,
}

impl ProviderStatus for MeResponse {
    fn failure(&self) -> Option<String> {
        (self.error != 0).then(|| format!("{} ({})", self.error_description, self.error))
    }
}

#[derive(Debug, Deserialize)]
struct UserInfoResponse {
    #[serde(default)]
    figureurl_qq_2: String,
    #[serde(default)]
    gender: String,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    nickname: String,
    #[serde(default)]
    ret: i64,
}

impl ProviderStatus for UserInfoResponse {
    fn failure(&self) -> Option<String> {
        (self.ret != 0).then(|| format!("{} ({})", self.msg, self.ret))
    }
}

/// The token must belong to this app and to the open id the client claims.
fn confirm_owner(me: &MeResponse, app_id: &str, claimed_open_id: &str) -> Result<(), AuthError> {
    if me.client_id != app_id || me.openid.is_empty() || me.openid != claimed_open_id {
        tracing::warn!(claimed_open_id, "QQ token does not belong to claimed open id");
        return Err(AuthError::ThirdPartyAuthFailed("qq: token owner mismatch".into()));
    }
    Ok(())
}

fn sex_from_qq(gender: &str) -> Sex {
    match gender {
        "男" => Sex::Male,
        "女" => Sex::Female,
        _ => Sex::Unknown,
    }
}

/// QQ Connect. Clients complete OAuth themselves and present `open_id` +
/// `access_token`; the token's owner is confirmed before it is trusted.
pub struct QqClient {
    app_id: String,
    http: reqwest::Client,
}

impl QqClient {
    pub fn new(config: &QqConfig, http: reqwest::Client) -> Self {
        Self {
            app_id: config.app_id.clone(),
            http,
        }
    }

    async fn me(&self, token: &str) -> Result<MeResponse, AuthError> {
        let request = self
            .http
            .get(ME_URL)
            .query(&[("access_token", token), ("fmt", "json")]);
        fetch_json(request, "qq").await
    }

    async fn user_info(&self, open_id: &str, token: &str) -> Result<UserInfoResponse, AuthError> {
        let request = self.http.get(USER_INFO_URL).query(&[
            ("oauth_consumer_key", self.app_id.as_str()),
            ("access_token", token),
            ("openid", open_id),
            ("format", "json"),
        ]);
        fetch_json(request, "qq").await
    }
}

#[async_trait]
impl OAuthProvider for QqClient {
    fn provider(&self) -> Provider {
        Provider::Qq
    }

    async fn exchange(&self, grant: &OAuthGrant) -> Result<ProviderSession, AuthError> {
        let (open_id, token) = grant.require_token()?;
        let me = self.me(token).await?;
        confirm_owner(&me, &self.app_id, open_id)?;
        Ok(ProviderSession {
            access_token: token.to_string(),
            open_id: open_id.to_string(),
            provider_id: open_id.to_string(),
        })
    }

    async fn profile(&self, session: &ProviderSession) -> Result<ProviderProfile, AuthError> {
        let info = self
            .user_info(&session.open_id, &session.access_token)
            .await?;
        Ok(ProviderProfile {
            nickname: non_empty(info.nickname),
            portrait: non_empty(info.figureurl_qq_2),
            sex: sex_from_qq(&info.gender),
        })
    }
}
