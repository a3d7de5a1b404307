use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

use super::{self_service_role, NewSubject, Provider, ProviderProfile, Registrar};
use crate::error::AuthError;
use crate::subject::{Role, SubjectId};
use crate::traits::UserStore;

/// What the client hands over after authorizing with a provider: either a
/// one-time `code`, or an already issued `open_id` + `access_token` pair.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OAuthGrant {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub open_id: Option<String>,
}

impl OAuthGrant {
    pub fn code(code: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            ..Default::default()
        }
    }

    pub fn token(open_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            access_token: Some(access_token.into()),
            code: None,
            open_id: Some(open_id.into()),
        }
    }

    pub(crate) fn require_code(&self) -> Result<&str, AuthError> {
        self.code
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AuthError::bad_request("authorization code is required"))
    }

    pub(crate) fn require_token(&self) -> Result<(&str, &str), AuthError> {
        match (self.open_id.as_deref(), self.access_token.as_deref()) {
            (Some(id), Some(token)) if !id.is_empty() && !token.is_empty() => Ok((id, token)),
            _ => Err(AuthError::bad_request("open_id and access_token are required")),
        }
    }
}

/// Result of exchanging a grant with the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSession {
    pub access_token: String,
    /// Per-app id at the provider, used for profile calls.
    pub open_id: String,
    /// Stable identity used to key the account.
    pub provider_id: String,
}

#[async_trait]
pub trait OAuthProvider: Send + Sync {
    fn provider(&self) -> Provider;

    async fn exchange(&self, grant: &OAuthGrant) -> Result<ProviderSession, AuthError>;

    async fn profile(&self, session: &ProviderSession) -> Result<ProviderProfile, AuthError>;
}

/// Resolves OAuth grants against registered providers.
#[derive(Clone)]
pub struct OAuthResolver {
    providers: HashMap<Provider, Arc<dyn OAuthProvider>>,
    registrar: Registrar,
    users: Arc<dyn UserStore>,
}

impl OAuthResolver {
    pub fn new(users: Arc<dyn UserStore>, registrar: Registrar) -> Self {
        Self {
            providers: HashMap::new(),
            registrar,
            users,
        }
    }

    pub fn with_registrar(mut self, registrar: Registrar) -> Self {
        self.registrar = registrar;
        self
    }

    pub fn register(&mut self, provider: Arc<dyn OAuthProvider>) {
        tracing::debug!(provider = %provider.provider(), "Registered OAuth provider");
        self.providers.insert(provider.provider(), provider);
    }

    pub fn is_registered(&self, provider: &Provider) -> bool {
        self.providers.contains_key(provider)
    }

    /// Returns the subject and whether it was created by this call. New
    /// subjects get `role` capped at the self-service ceiling.
    pub async fn resolve(
        &self,
        provider: &Provider,
        grant: &OAuthGrant,
        role: Role,
    ) -> Result<(SubjectId, bool), AuthError> {
        let client = self
            .providers
            .get(provider)
            .ok_or_else(|| AuthError::not_found(format!("provider {provider} is not enabled")))?;

        let session = client.exchange(grant).await?;
        if session.provider_id.is_empty() {
            return Err(AuthError::ThirdPartyAuthFailed(format!(
                "{provider} returned no user id"
            )));
        }

        if let Some(id) = self
            .users
            .resolve_by_provider_id(provider, &session.provider_id)
            .await?
        {
            return Ok((id, false));
        }

        let profile = client.profile(&session).await?;
        let subject = NewSubject::new(provider.clone(), session.provider_id, self_service_role(role))
            .with_profile(profile);
        let id = self.registrar.create(subject).await?;
        Ok((id, true))
    }
}
