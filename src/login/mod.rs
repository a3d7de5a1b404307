//! Login orchestration: every provider-specific entry point resolves a
//! subject, then funnels through [`Orchestrator::check_in`].

mod mobile;

use serde::Serialize;
use std::sync::Arc;

use crate::config::TokenLifetimes;
use crate::error::AuthError;
use crate::identity::{
    MobileResolver, OAuthGrant, OAuthProvider, OAuthResolver, PasswordResolver, Provider,
    Registrar,
};
use crate::session::SessionCache;
use crate::sms::SmsVerifier;
use crate::subject::{Role, SubjectId};
use crate::tokens::TokenCodec;
use crate::traits::{SubjectCreatedHook, UserStore};

pub use mobile::MobileRegistration;

/// Uniform outcome of every login flow.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoginResult {
    pub banned: bool,
    /// Ban details when banned, the stored profile otherwise.
    pub extra_info: Option<serde_json::Value>,
    pub is_new_account: bool,
    pub subject_id: SubjectId,
    /// Absent for banned subjects.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

pub struct Orchestrator {
    cache: Option<SessionCache>,
    codec: TokenCodec,
    lifetimes: TokenLifetimes,
    mobile: MobileResolver,
    oauth: OAuthResolver,
    password: PasswordResolver,
    registrar: Registrar,
    sms: SmsVerifier,
    users: Arc<dyn UserStore>,
}

impl Orchestrator {
    pub fn new(
        users: Arc<dyn UserStore>,
        codec: TokenCodec,
        lifetimes: TokenLifetimes,
        sms: SmsVerifier,
    ) -> Self {
        let registrar = Registrar::new(users.clone());
        Self {
            cache: None,
            codec,
            lifetimes,
            mobile: MobileResolver::new(users.clone(), registrar.clone()),
            oauth: OAuthResolver::new(users.clone(), registrar.clone()),
            password: PasswordResolver::new(users.clone()),
            registrar,
            sms,
            users,
        }
    }

    pub fn with_session_cache(mut self, cache: SessionCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_creation_hook(mut self, hook: Arc<dyn SubjectCreatedHook>) -> Self {
        self.registrar = self.registrar.with_hook(hook);
        self.mobile = MobileResolver::new(self.users.clone(), self.registrar.clone());
        self.oauth = self.oauth.with_registrar(self.registrar.clone());
        self
    }

    pub fn with_oauth_provider(mut self, provider: Arc<dyn OAuthProvider>) -> Self {
        self.oauth.register(provider);
        self
    }

    pub fn sms(&self) -> &SmsVerifier {
        &self.sms
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn users(&self) -> &Arc<dyn UserStore> {
        &self.users
    }

    pub async fn has_mobile_user(&self, mobile: &str) -> Result<bool, AuthError> {
        self.mobile.has_mobile_user(mobile).await
    }

    // ========================================================================
    // Check-in
    // ========================================================================

    /// Issue a session for an already resolved subject.
    pub async fn check_in(
        &self,
        subject: SubjectId,
        requested_role: Role,
    ) -> Result<LoginResult, AuthError> {
        self.check_in_as(subject, requested_role, false).await
    }

    async fn check_in_as(
        &self,
        subject: SubjectId,
        requested_role: Role,
        is_new_account: bool,
    ) -> Result<LoginResult, AuthError> {
        let status = self.users.get_role_and_ban_status(subject).await?;

        if status.banned {
            tracing::info!(subject_id = %subject, "Check-in refused for banned subject");
            return Ok(LoginResult {
                banned: true,
                extra_info: status.ban_info,
                is_new_account,
                subject_id: subject,
                token: None,
            });
        }

        if requested_role > status.role {
            tracing::warn!(
                subject_id = %subject,
                requested = %requested_role,
                stored = %status.role,
                "Check-in above stored role refused"
            );
            return Err(AuthError::forbidden(format!(
                "role {requested_role} exceeds granted role"
            )));
        }

        let lifetime = self.lifetimes.for_role(requested_role);
        let token = self
            .codec
            .mint(subject, requested_role, lifetime)
            .map_err(|e| AuthError::internal(format!("failed to mint token: {e}")))?;

        if let Some(cache) = &self.cache {
            cache.store(subject, &token).await?;
        }
        if requested_role == Role::AppUser {
            self.users.update_stored_token(subject, &token).await?;
        }

        let users = Arc::clone(&self.users);
        tokio::spawn(async move {
            if let Err(e) = users.update_last_active(subject).await {
                tracing::warn!(subject_id = %subject, error = %e, "Failed to record last activity");
            }
        });

        tracing::info!(subject_id = %subject, role = %requested_role, is_new_account, "Checked in");
        Ok(LoginResult {
            banned: false,
            extra_info: status.profile,
            is_new_account,
            subject_id: subject,
            token: Some(token),
        })
    }

    // ========================================================================
    // Password and OAuth entry points
    // ========================================================================

    pub async fn login_by_password(
        &self,
        kind: &Provider,
        identifier: &str,
        password: &str,
        role: Role,
    ) -> Result<LoginResult, AuthError> {
        let subject = self.password.resolve(kind, identifier, password).await?;
        self.check_in(subject, role).await
    }

    pub async fn login_by_oauth(
        &self,
        provider: &Provider,
        grant: &OAuthGrant,
        role: Role,
    ) -> Result<LoginResult, AuthError> {
        let (subject, created) = self.oauth.resolve(provider, grant, role).await?;
        self.check_in_as(subject, role, created).await
    }

    pub async fn login_by_weixin(&self, code: &str, role: Role) -> Result<LoginResult, AuthError> {
        self.login_by_oauth(&Provider::Weixin, &OAuthGrant::code(code), role)
            .await
    }

    pub async fn login_by_weibo(&self, code: &str, role: Role) -> Result<LoginResult, AuthError> {
        self.login_by_oauth(&Provider::Weibo, &OAuthGrant::code(code), role)
            .await
    }

    pub async fn login_by_qq(
        &self,
        open_id: &str,
        access_token: &str,
        role: Role,
    ) -> Result<LoginResult, AuthError> {
        self.login_by_oauth(&Provider::Qq, &OAuthGrant::token(open_id, access_token), role)
            .await
    }
}
