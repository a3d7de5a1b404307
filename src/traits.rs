//! Seams to the collaborators the orchestration core depends on.
//!
//! The crate ships redb-backed implementations of [`UserStore`] and
//! [`KvStore`] and a logging [`MessageSender`]; hosts can swap in their own.

use async_trait::async_trait;
use axum::http::request::Parts;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::AuthError;
use crate::identity::{NewSubject, Provider};
use crate::sms::CodePurpose;
use crate::subject::{Role, SubjectId};

// ============================================================================
// User store
// ============================================================================

/// Role and ban state of a stored subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectStatus {
    pub ban_info: Option<serde_json::Value>,
    pub banned: bool,
    pub profile: Option<serde_json::Value>,
    pub role: Role,
}

/// Salt and keyed digest of a password.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PasswordHash {
    pub hash: Vec<u8>,
    pub salt: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PasswordCredentials {
    /// `None` when the subject exists but never set a password.
    pub password: Option<PasswordHash>,
    pub subject: SubjectId,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn resolve_by_provider_id(
        &self,
        provider: &Provider,
        id: &str,
    ) -> Result<Option<SubjectId>, AuthError>;

    /// Fails with `AlreadyExists` if any of the provider ids is already bound.
    async fn create_subject(&self, subject: NewSubject) -> Result<SubjectId, AuthError>;

    async fn delete_subject(&self, subject: SubjectId) -> Result<(), AuthError>;

    /// Fails with `NotFound` for an unknown subject.
    async fn get_role_and_ban_status(&self, subject: SubjectId)
        -> Result<SubjectStatus, AuthError>;

    async fn update_last_active(&self, subject: SubjectId) -> Result<(), AuthError>;

    async fn update_stored_token(&self, subject: SubjectId, token: &str)
        -> Result<(), AuthError>;

    async fn password_credentials(
        &self,
        provider: &Provider,
        id: &str,
    ) -> Result<Option<PasswordCredentials>, AuthError>;

    async fn set_password(
        &self,
        subject: SubjectId,
        password: PasswordHash,
    ) -> Result<(), AuthError>;

    async fn bind_provider_id(
        &self,
        subject: SubjectId,
        provider: &Provider,
        id: &str,
    ) -> Result<(), AuthError>;
}

// ============================================================================
// Short-lived key-value store
// ============================================================================

#[async_trait]
pub trait KvStore: Send + Sync {
    /// `ttl` of `None` keeps the entry until overwritten or deleted.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), AuthError>;

    /// Expired entries read as absent.
    async fn get(&self, key: &str) -> Result<Option<String>, AuthError>;

    async fn delete(&self, key: &str) -> Result<(), AuthError>;
}

// ============================================================================
// Messaging, admin authority, creation hook
// ============================================================================

#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send_code(
        &self,
        mobile: &str,
        purpose: CodePurpose,
        code: &str,
    ) -> Result<(), AuthError>;
}

/// Identity and permission set granted by an external admin authority.
#[derive(Debug, Clone, PartialEq)]
pub struct AdminGrant {
    pub permissions: Vec<String>,
    pub role: Role,
    pub subject: SubjectId,
}

#[async_trait]
pub trait AdminAuthority: Send + Sync {
    async fn authorize(
        &self,
        request: &Parts,
        permission_group: Option<&str>,
    ) -> Result<AdminGrant, AuthError>;
}

/// Runs synchronously inside account creation; an error rolls the account back.
#[async_trait]
pub trait SubjectCreatedHook: Send + Sync {
    async fn on_created(&self, subject: SubjectId, provider: &Provider) -> Result<(), AuthError>;
}
