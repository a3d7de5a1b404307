//! Shared test helpers, available to all `#[cfg(test)]` modules in the crate.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use crate::config::{
    AdminConfig, Config, MaintenanceConfig, NodeConfig, ProviderConfig, SessionConfig, SmsConfig,
    TokenLifetimes,
};
use crate::error::AuthError;
use crate::identity::{
    OAuthGrant, OAuthProvider, Provider, ProviderProfile, ProviderSession, Sex,
};
use crate::login::Orchestrator;
use crate::sms::{CodePurpose, SmsVerifier};
use crate::storage::Database;
use crate::subject::SubjectId;
use crate::tokens::TokenCodec;
use crate::traits::{MessageSender, SubjectCreatedHook};
use crate::AppState;

pub const TEST_ROOT_KEY: &str = "0123456789abcdef";

/// Open a fresh database in a temporary directory.
///
/// Returns both the `Database` and the `TempDir` guard; the caller must
/// keep the `TempDir` alive for the duration of the test.
pub fn setup_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::open(temp_dir.path()).unwrap();
    (db, temp_dir)
}

/// A `Config` with default lifetimes, no providers and dev mode on.
pub fn test_config() -> Config {
    Config {
        admin: AdminConfig::default(),
        dev_mode: true,
        maintenance: MaintenanceConfig::default(),
        node: NodeConfig {
            bind_address: "127.0.0.1:8080".to_string(),
            data_dir: "/tmp/test".to_string(),
        },
        providers: ProviderConfig::default(),
        root_key: TEST_ROOT_KEY.to_string(),
        sessions: SessionConfig::default(),
        sms: SmsConfig::default(),
        tokens: TokenLifetimes::default(),
    }
}

pub fn test_codec() -> TokenCodec {
    TokenCodec::from_key_str(TEST_ROOT_KEY).unwrap()
}

/// Keeps the last code sent to each mobile number.
#[derive(Debug, Default)]
pub struct RecordingSender {
    sent: Mutex<HashMap<String, String>>,
}

impl RecordingSender {
    pub fn last_code(&self, mobile: &str) -> Option<String> {
        self.sent.lock().unwrap().get(mobile).cloned()
    }
}

#[async_trait]
impl MessageSender for RecordingSender {
    async fn send_code(
        &self,
        mobile: &str,
        _purpose: CodePurpose,
        code: &str,
    ) -> Result<(), AuthError> {
        self.sent
            .lock()
            .unwrap()
            .insert(mobile.to_string(), code.to_string());
        Ok(())
    }
}

/// Creation hook that always fails.
pub struct FailingHook;

#[async_trait]
impl SubjectCreatedHook for FailingHook {
    async fn on_created(&self, _subject: SubjectId, _origin: &Provider) -> Result<(), AuthError> {
        Err(AuthError::internal("profile service unavailable"))
    }
}

/// OAuth provider that accepts any grant and always reports the same user.
pub struct StaticProvider {
    id: String,
    provider: Provider,
}

impl StaticProvider {
    pub fn new(provider: Provider, id: &str) -> Self {
        Self {
            id: id.to_string(),
            provider,
        }
    }
}

#[async_trait]
impl OAuthProvider for StaticProvider {
    fn provider(&self) -> Provider {
        self.provider.clone()
    }

    async fn exchange(&self, _grant: &OAuthGrant) -> Result<ProviderSession, AuthError> {
        Ok(ProviderSession {
            access_token: "static-token".to_string(),
            open_id: self.id.clone(),
            provider_id: self.id.clone(),
        })
    }

    async fn profile(&self, session: &ProviderSession) -> Result<ProviderProfile, AuthError> {
        Ok(ProviderProfile {
            nickname: Some(format!("static-{}", session.provider_id)),
            portrait: None,
            sex: Sex::Female,
        })
    }
}

pub fn test_orchestrator_with_sender(db: &Database) -> (Orchestrator, Arc<RecordingSender>) {
    let sender = Arc::new(RecordingSender::default());
    let sms = SmsVerifier::new(
        SmsConfig::default(),
        Arc::new(db.clone()),
        Arc::new(db.clone()),
        sender.clone(),
    );
    let orchestrator = Orchestrator::new(
        Arc::new(db.clone()),
        test_codec(),
        TokenLifetimes::default(),
        sms,
    );
    (orchestrator, sender)
}

pub fn test_orchestrator(db: &Database) -> Orchestrator {
    test_orchestrator_with_sender(db).0
}

/// Build an `AppState` around the given database.
///
/// Uses [`test_config`] and a `reqwest::Client` with proxy disabled
/// (avoids macOS system-configuration panics in sandboxed tests).
pub fn test_state_with(db: Database, config: Config) -> (AppState, Arc<RecordingSender>) {
    let sender = Arc::new(RecordingSender::default());
    let http_client = reqwest::Client::builder().no_proxy().build().unwrap();
    let state = AppState::build(config, db, http_client, sender.clone()).unwrap();
    (state, sender)
}

pub fn test_state(db: Database) -> Arc<AppState> {
    Arc::new(test_state_with(db, test_config()).0)
}
