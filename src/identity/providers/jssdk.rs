//! Weixin JS-SDK page signatures. The app access token and the jsapi ticket
//! are both short-lived and shared by every request, so each sits behind a
//! [`CredentialCache`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::sync::Arc;

use super::weixin::{WeixinStatus, API_BASE};
use super::{fetch_json, ProviderStatus};
use crate::config::WeixinConfig;
use crate::error::AuthError;
use crate::identity::refresh::{CredentialCache, CredentialFetcher, FetchedCredential};
use crate::tokens::generate_numeric;

#[derive(Debug, Deserialize)]
struct AppTokenResponse {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    expires_in: u64,
    #[serde(flatten)]
    status: WeixinStatus,
}

impl ProviderStatus for AppTokenResponse {
    fn failure(&self) -> Option<String> {
        self.status.failure()
    }
}

#[derive(Debug, Deserialize)]
struct TicketResponse {
    #[serde(default)]
    expires_in: u64,
    #[serde(flatten)]
    status: WeixinStatus,
    #[serde(default)]
    ticket: String,
}

impl ProviderStatus for TicketResponse {
    fn failure(&self) -> Option<String> {
        self.status.failure()
    }
}

struct AppTokenFetcher {
    app_id: String,
    http: reqwest::Client,
    secret: String,
}

#[async_trait]
impl CredentialFetcher for AppTokenFetcher {
    async fn fetch(&self) -> Result<FetchedCredential, AuthError> {
        let request = self.http.get(format!("{API_BASE}/cgi-bin/token")).query(&[
            ("grant_type", "client_credential"),
            ("appid", self.app_id.as_str()),
            ("secret", self.secret.as_str()),
        ]);
        let response: AppTokenResponse = fetch_json(request, "weixin").await?;
        Ok(FetchedCredential {
            expires_in_seconds: response.expires_in,
            value: response.access_token,
        })
    }
}

struct TicketFetcher {
    http: reqwest::Client,
    token: CredentialCache,
}

#[async_trait]
impl CredentialFetcher for TicketFetcher {
    async fn fetch(&self) -> Result<FetchedCredential, AuthError> {
        let token = self.token.get().await?;
        let request = self
            .http
            .get(format!("{API_BASE}/cgi-bin/ticket/getticket"))
            .query(&[("type", "jsapi"), ("access_token", token.as_str())]);
        let response: TicketResponse = fetch_json(request, "weixin").await?;
        Ok(FetchedCredential {
            expires_in_seconds: response.expires_in,
            value: response.ticket,
        })
    }
}

/// Parameters a page passes to `wx.config`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JsSdkConfig {
    pub app_id: String,
    pub nonce_str: String,
    pub signature: String,
    pub timestamp: i64,
}

pub struct WeixinJsSdk {
    app_id: String,
    ticket: CredentialCache,
}

impl WeixinJsSdk {
    pub fn new(config: &WeixinConfig, http: reqwest::Client) -> Self {
        let token = CredentialCache::new(
            "weixin_app_token",
            Arc::new(AppTokenFetcher {
                app_id: config.app_id.clone(),
                http: http.clone(),
                secret: config.secret.clone(),
            }),
        );
        let ticket = CredentialCache::new("weixin_jsapi_ticket", Arc::new(TicketFetcher { http, token }));
        Self {
            app_id: config.app_id.clone(),
            ticket,
        }
    }

    /// Sign `url` (the page URL without its fragment) for the JS-SDK.
    pub async fn config_for(&self, url: &str) -> Result<JsSdkConfig, AuthError> {
        let ticket = self.ticket.get().await?;
        let nonce_str = generate_numeric(15);
        let timestamp = chrono::Utc::now().timestamp();
        Ok(JsSdkConfig {
            app_id: self.app_id.clone(),
            signature: sign(&ticket, &nonce_str, timestamp, url),
            nonce_str,
            timestamp,
        })
    }
}

fn sign(ticket: &str, nonce_str: &str, timestamp: i64, url: &str) -> String {
    let plain = format!("jsapi_ticket={ticket}&noncestr={nonce_str}&timestamp={timestamp}&url={url}");
    hex::encode(Sha1::digest(plain.as_bytes()))
}
