//! appgate - session and identity orchestration for multi-client APIs
//!
//! This crate provides:
//! - Self-contained encrypted session tokens carrying subject, role and expiry
//! - Login by password, SMS code and OAuth providers (Weixin, Weibo, QQ, generic)
//! - An SMS verification state machine with single-use binding tokens
//! - Declarative per-endpoint request authentication with API version dispatch
//! - redb embedded storage for subjects and short-lived key-value entries

pub mod api;
pub mod config;
pub mod error;
pub mod expiration;
pub mod identity;
pub mod login;
pub mod session;
pub mod sms;
pub mod storage;
pub mod subject;
#[cfg(test)]
pub mod testutil;
pub mod tokens;
pub mod traits;

use std::sync::Arc;

use config::Config;
use identity::providers::{QqClient, WeiboClient, WeixinClient, WeixinJsSdk};
use login::Orchestrator;
use session::{SessionCache, SessionValidator};
use sms::SmsVerifier;
use storage::Database;
use tokens::{CodecError, TokenCodec};
use traits::{AdminAuthority, KvStore, MessageSender, SubjectCreatedHook, UserStore};

/// Shared application state
pub struct AppState {
    pub admin_authority: Option<Arc<dyn AdminAuthority>>,
    pub config: Config,
    pub db: Database,
    pub http_client: reqwest::Client,
    pub jssdk: Option<WeixinJsSdk>,
    pub orchestrator: Orchestrator,
    pub sessions: SessionValidator,
}

impl AppState {
    /// Wire the redb-backed stores, the token codec and every provider
    /// enabled in `config`.
    pub fn build(
        config: Config,
        db: Database,
        http_client: reqwest::Client,
        sender: Arc<dyn MessageSender>,
    ) -> Result<Self, CodecError> {
        let codec = TokenCodec::from_key_str(&config.root_key)?;
        let users: Arc<dyn UserStore> = Arc::new(db.clone());
        let kv: Arc<dyn KvStore> = Arc::new(db.clone());
        let cache = SessionCache::new(Arc::clone(&kv));

        let sessions = SessionValidator::new(codec.clone(), Arc::clone(&users))
            .with_cache(cache.clone(), config.sessions.policy);
        let sms = SmsVerifier::new(config.sms.clone(), kv, Arc::clone(&users), sender);

        let mut orchestrator = Orchestrator::new(users, codec, config.tokens.clone(), sms)
            .with_session_cache(cache);

        let mut jssdk = None;
        if let Some(weixin) = &config.providers.weixin {
            orchestrator = orchestrator
                .with_oauth_provider(Arc::new(WeixinClient::new(weixin, http_client.clone())));
            jssdk = Some(WeixinJsSdk::new(weixin, http_client.clone()));
        }
        if let Some(weibo) = &config.providers.weibo {
            orchestrator = orchestrator
                .with_oauth_provider(Arc::new(WeiboClient::new(weibo, http_client.clone())));
        }
        if let Some(qq) = &config.providers.qq {
            orchestrator =
                orchestrator.with_oauth_provider(Arc::new(QqClient::new(qq, http_client.clone())));
        }

        Ok(Self {
            admin_authority: None,
            config,
            db,
            http_client,
            jssdk,
            orchestrator,
            sessions,
        })
    }

    pub fn with_admin_authority(mut self, authority: Arc<dyn AdminAuthority>) -> Self {
        self.admin_authority = Some(authority);
        self
    }

    pub fn with_creation_hook(mut self, hook: Arc<dyn SubjectCreatedHook>) -> Self {
        self.orchestrator = self.orchestrator.with_creation_hook(hook);
        self
    }

    pub fn with_oauth_provider(mut self, provider: Arc<dyn identity::OAuthProvider>) -> Self {
        self.orchestrator = self.orchestrator.with_oauth_provider(provider);
        self
    }
}
