use async_trait::async_trait;
use serde::Deserialize;

use super::{fetch_json, non_empty, ProviderStatus};
use crate::config::WeixinConfig;
use crate::error::AuthError;
use crate::identity::{OAuthGrant, OAuthProvider, Provider, ProviderProfile, ProviderSession, Sex};

pub(crate) const API_BASE: &str = "https://api.weixin.qq.com";

#[derive(Debug, Default, Deserialize)]
pub(crate) struct WeixinStatus {
    #[serde(default)]
    pub errcode: i64,
    #[serde(default)]
    pub errmsg: String,
}

impl WeixinStatus {
    pub(crate) fn failure(&self) -> Option<String> {
        (self.errcode != 0).then(|| format!("{} ({})", self.errmsg, self.errcode))
    }
}

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    openid: String,
    #[serde(flatten)]
    status: WeixinStatus,
    #[serde(default)]
    unionid: String,
}

impl ProviderStatus for AccessTokenResponse {
    fn failure(&self) -> Option<String> {
        self.status.failure()
    }
}

#[derive(Debug, Deserialize)]
struct UserInfoResponse {
    #[serde(default)]
    headimgurl: String,
    #[serde(default)]
    nickname: String,
    #[serde(default)]
    sex: i64,
    #[serde(flatten)]
    status: WeixinStatus,
    #[serde(default)]
    unionid: String,
}

impl ProviderStatus for UserInfoResponse {
    fn failure(&self) -> Option<String> {
        self.status.failure()
    }
}

pub(crate) fn sex_from_weixin(sex: i64) -> Sex {
    match sex {
        1 => Sex::Male,
        2 => Sex::Female,
        _ => Sex::Unknown,
    }
}

/// Weixin web/app OAuth. Accounts are keyed by union id so the same person
/// maps to one subject across official accounts and apps.
pub struct WeixinClient {
    app_id: String,
    http: reqwest::Client,
    secret: String,
}

impl WeixinClient {
    pub fn new(config: &WeixinConfig, http: reqwest::Client) -> Self {
        Self {
            app_id: config.app_id.clone(),
            http,
            secret: config.secret.clone(),
        }
    }

    async fn access_token(&self, code: &str) -> Result<AccessTokenResponse, AuthError> {
        let request = self
            .http
            .get(format!("{API_BASE}/sns/oauth2/access_token"))
            .query(&[
                ("appid", self.app_id.as_str()),
                ("secret", self.secret.as_str()),
                ("code", code),
                ("grant_type", "authorization_code"),
            ]);
        fetch_json(request, "weixin").await
    }

    async fn user_info(&self, open_id: &str, token: &str) -> Result<UserInfoResponse, AuthError> {
        let request = self
            .http
            .get(format!("{API_BASE}/sns/userinfo"))
            .query(&[("access_token", token), ("openid", open_id)]);
        fetch_json(request, "weixin").await
    }
}

#[async_trait]
impl OAuthProvider for WeixinClient {
    fn provider(&self) -> Provider {
        Provider::Weixin
    }

    async fn exchange(&self, grant: &OAuthGrant) -> Result<ProviderSession, AuthError> {
        let (open_id, access_token, union_id) = match grant.require_code() {
            Ok(code) => {
                let token = self.access_token(code).await?;
                (token.openid, token.access_token, token.unionid)
            }
            Err(_) => {
                let (open_id, token) = grant.require_token()?;
                (open_id.to_string(), token.to_string(), String::new())
            }
        };

        // The code exchange only reports the union id for some app types.
        let union_id = match non_empty(union_id) {
            Some(id) => id,
            None => self.user_info(&open_id, &access_token).await?.unionid,
        };

        Ok(ProviderSession {
            access_token,
            open_id,
            provider_id: union_id,
        })
    }

    async fn profile(&self, session: &ProviderSession) -> Result<ProviderProfile, AuthError> {
        let info = self
            .user_info(&session.open_id, &session.access_token)
            .await?;
        Ok(ProviderProfile {
            nickname: non_empty(info.nickname),
            portrait: non_empty(info.headimgurl),
            sex: sex_from_weixin(info.sex),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sex_mapping() {
        assert_eq!(sex_from_weixin(1), Sex::Male);
        assert_eq!(sex_from_weixin(2), Sex::Female);
        assert_eq!(sex_from_weixin(0), Sex::Unknown);
    }

    #[test]
    fn test_error_payload_is_a_failure() {
        let parsed: UserInfoResponse =
            serde_json::from_str(r#"{"errcode":40003,"errmsg":"invalid openid"}"#).unwrap();
        assert_eq!(parsed.failure().unwrap(), "invalid openid (40003)");

        let parsed: UserInfoResponse = serde_json::from_str(
            r#"{"openid":"o1","unionid":"u1","nickname":"n","sex":2,"headimgurl":"http://x"}"#,
        )
        .unwrap();
        assert!(parsed.failure().is_none());
        assert_eq!(parsed.unionid, "u1");
    }
}
