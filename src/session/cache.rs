use std::sync::Arc;

use crate::error::AuthError;
use crate::subject::SubjectId;
use crate::traits::KvStore;

const KEY_PREFIX: &str = "session:";

/// Latest issued token per subject.
#[derive(Clone)]
pub struct SessionCache {
    kv: Arc<dyn KvStore>,
}

impl SessionCache {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    fn key(subject: SubjectId) -> String {
        format!("{KEY_PREFIX}{subject}")
    }

    /// Record `token` as the subject's latest; the previous entry is replaced.
    pub async fn store(&self, subject: SubjectId, token: &str) -> Result<(), AuthError> {
        self.kv.set(&Self::key(subject), token, None).await
    }

    pub async fn latest(&self, subject: SubjectId) -> Result<Option<String>, AuthError> {
        self.kv.get(&Self::key(subject)).await
    }

    pub async fn is_latest(&self, subject: SubjectId, token: &str) -> Result<bool, AuthError> {
        Ok(self.latest(subject).await?.as_deref() == Some(token))
    }

    pub async fn evict(&self, subject: SubjectId) -> Result<(), AuthError> {
        self.kv.delete(&Self::key(subject)).await
    }
}
