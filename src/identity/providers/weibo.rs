use async_trait::async_trait;
use serde::Deserialize;

use super::{fetch_json, non_empty, ProviderStatus};
use crate::config::WeiboConfig;
use crate::error::AuthError;
use crate::identity::{OAuthGrant, OAuthProvider, Provider, ProviderProfile, ProviderSession, Sex};

const API_BASE: &str = "https://api.weibo.com";

#[derive(Debug, Default, Deserialize)]
struct WeiboStatus {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_code: i64,
}

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    #[serde(default)]
    access_token: String,
    #[serde(flatten)]
    status: WeiboStatus,
    #[serde(default)]
    uid: String,
}

#[derive(Debug, Deserialize)]
struct TokenInfoResponse {
    #[serde(flatten)]
    status: WeiboStatus,
    #[serde(default)]
    uid: i64,
}

#[derive(Debug, Deserialize)]
struct UserShowResponse {
    #[serde(default)]
    gender: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    profile_image_url: String,
    #[serde(flatten)]
    status: WeiboStatus,
}

impl ProviderStatus for AccessTokenResponse {
    fn failure(&self) -> Option<String> {
        (self.status.error_code != 0).then(|| self.status.error.clone())
    }
}

impl ProviderStatus for TokenInfoResponse {
    fn failure(&self) -> Option<String> {
        (self.status.error_code != 0).then(|| self.status.error.clone())
    }
}

impl ProviderStatus for UserShowResponse {
    fn failure(&self) -> Option<String> {
        (self.status.error_code != 0).then(|| self.status.error.clone())
    }
}

/// The token must have been issued to the uid the client claims.
fn confirm_owner(info: &TokenInfoResponse, claimed_uid: &str) -> Result<String, AuthError> {
    let owner = info.uid.to_string();
    if info.uid == 0 || owner != claimed_uid {
        tracing::warn!(claimed_uid, token_uid = info.uid, "Weibo token does not belong to claimed uid");
        return Err(AuthError::ThirdPartyAuthFailed("weibo: token owner mismatch".into()));
    }
    Ok(owner)
}

fn sex_from_weibo(gender: &str) -> Sex {
    match gender {
        "m" => Sex::Male,
        "f" => Sex::Female,
        _ => Sex::Unknown,
    }
}

pub struct WeiboClient {
    app_id: String,
    http: reqwest::Client,
    redirect_url: String,
    secret: String,
}

impl WeiboClient {
    pub fn new(config: &WeiboConfig, http: reqwest::Client) -> Self {
        Self {
            app_id: config.app_id.clone(),
            http,
            redirect_url: config.redirect_url.clone(),
            secret: config.secret.clone(),
        }
    }

    async fn token_info(&self, token: &str) -> Result<TokenInfoResponse, AuthError> {
        let request = self
            .http
            .post(format!("{API_BASE}/oauth2/get_token_info"))
            .query(&[("access_token", token)]);
        fetch_json(request, "weibo").await
    }

    async fn show(&self, uid: &str, token: &str) -> Result<UserShowResponse, AuthError> {
        let request = self
            .http
            .get(format!("{API_BASE}/2/users/show.json"))
            .query(&[("access_token", token), ("uid", uid)]);
        fetch_json(request, "weibo").await
    }
}

#[async_trait]
impl OAuthProvider for WeiboClient {
    fn provider(&self) -> Provider {
        Provider::Weibo
    }

    async fn exchange(&self, grant: &OAuthGrant) -> Result<ProviderSession, AuthError> {
        if let Ok(code) = grant.require_code() {
            let request = self
                .http
                .post(format!("{API_BASE}/oauth2/access_token"))
                .query(&[
                    ("client_id", self.app_id.as_str()),
                    ("client_secret", self.secret.as_str()),
                    ("grant_type", "authorization_code"),
                    ("code", code),
                    ("redirect_uri", self.redirect_url.as_str()),
                ]);
            let token: AccessTokenResponse = fetch_json(request, "weibo").await?;
            return Ok(ProviderSession {
                access_token: token.access_token,
                open_id: token.uid.clone(),
                provider_id: token.uid,
            });
        }

        let (uid, token) = grant.require_token()?;
        let info = self.token_info(token).await?;
        let owner = confirm_owner(&info, uid)?;
        Ok(ProviderSession {
            access_token: token.to_string(),
            open_id: owner.clone(),
            provider_id: owner,
        })
    }

    async fn profile(&self, session: &ProviderSession) -> Result<ProviderProfile, AuthError> {
        let shown = self.show(&session.open_id, &session.access_token).await?;
        Ok(ProviderProfile {
            nickname: non_empty(shown.name),
            portrait: non_empty(shown.profile_image_url),
            sex: sex_from_weibo(&shown.gender),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sex_mapping() {
        assert_eq!(sex_from_weibo("m"), Sex::Male);
        assert_eq!(sex_from_weibo("f"), Sex::Female);
        assert_eq!(sex_from_weibo("n"), Sex::Unknown);
    }

    #[test]
    fn test_error_payload_is_a_failure() {
        let parsed: AccessTokenResponse =
            serde_json::from_str(r#"{"error":"invalid_grant","error_code":21325}"#).unwrap();
        assert_eq!(parsed.failure().as_deref(), Some("invalid_grant"));
    }

    #[test]
    fn test_token_owner_must_match_claimed_uid() {
        let info: TokenInfoResponse =
            serde_json::from_str(r#"{"uid":1073880650,"appkey":"1352222456","expire_in":157679471}"#)
                .unwrap();
        assert_eq!(confirm_owner(&info, "1073880650").unwrap(), "1073880650");
        assert!(matches!(
            confirm_owner(&info, "2000000001"),
            Err(AuthError::ThirdPartyAuthFailed(_))
        ));

        let empty: TokenInfoResponse = serde_json::from_str("{}").unwrap();
        assert!(matches!(
            confirm_owner(&empty, "0"),
            Err(AuthError::ThirdPartyAuthFailed(_))
        ));
    }
}
