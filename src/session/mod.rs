//! Token validation against live subject state.

pub mod cache;

use std::sync::Arc;

use crate::config::SessionPolicy;
use crate::tokens::{Claims, TokenCodec};
use crate::traits::UserStore;

pub use cache::SessionCache;

/// Validates presented tokens: authentic and unexpired, subject known and
/// not banned, and under [`SessionPolicy::LatestOnly`] the latest one issued.
#[derive(Clone)]
pub struct SessionValidator {
    cache: Option<SessionCache>,
    codec: TokenCodec,
    policy: SessionPolicy,
    users: Arc<dyn UserStore>,
}

impl SessionValidator {
    pub fn new(codec: TokenCodec, users: Arc<dyn UserStore>) -> Self {
        Self {
            cache: None,
            codec,
            policy: SessionPolicy::AnyValid,
            users,
        }
    }

    pub fn with_cache(mut self, cache: SessionCache, policy: SessionPolicy) -> Self {
        self.cache = Some(cache);
        self.policy = policy;
        self
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Returns `None` for any rejected token; storage failures are logged and
    /// also reject.
    pub async fn validate(&self, token: &str) -> Option<Claims> {
        let claims = self.codec.validate(token)?;

        match self.users.get_role_and_ban_status(claims.subject).await {
            Ok(status) if status.banned => {
                tracing::debug!(subject_id = %claims.subject, "Token of banned subject rejected");
                return None;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(subject_id = %claims.subject, error = %e, "Token subject unavailable");
                return None;
            }
        }

        if self.policy == SessionPolicy::LatestOnly {
            let cache = self.cache.as_ref()?;
            match cache.is_latest(claims.subject, token).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!(subject_id = %claims.subject, "Superseded token rejected");
                    return None;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Session cache lookup failed");
                    return None;
                }
            }
        }

        Some(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{NewSubject, Provider};
    use crate::subject::{Role, SubjectId};
    use crate::testutil::{setup_db, test_codec};
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn test_banned_subject_token_rejected() {
        let (db, _temp) = setup_db();
        let record = db
            .create_user(&NewSubject::new(Provider::Mobile, "13800000001", Role::AppUser))
            .unwrap();
        let validator = SessionValidator::new(test_codec(), Arc::new(db.clone()));
        let token = test_codec().mint(record.id, Role::AppUser, 3600).unwrap();

        assert_eq!(validator.validate(&token).await.unwrap().subject, record.id);

        db.set_ban(record.id, Some(Utc::now() + Duration::hours(1)), None)
            .unwrap();
        assert!(validator.validate(&token).await.is_none());
    }

    #[tokio::test]
    async fn test_unknown_subject_rejected() {
        let (db, _temp) = setup_db();
        let validator = SessionValidator::new(test_codec(), Arc::new(db));
        let token = test_codec().mint(SubjectId(424242), Role::AppUser, 3600).unwrap();
        assert!(validator.validate(&token).await.is_none());
    }

    #[tokio::test]
    async fn test_latest_only_policy() {
        let (db, _temp) = setup_db();
        let record = db
            .create_user(&NewSubject::new(Provider::Mobile, "13800000001", Role::AppUser))
            .unwrap();
        let cache = SessionCache::new(Arc::new(db.clone()));
        let validator = SessionValidator::new(test_codec(), Arc::new(db))
            .with_cache(cache.clone(), SessionPolicy::LatestOnly);

        let first = test_codec().mint(record.id, Role::AppUser, 3600).unwrap();
        let second = test_codec().mint(record.id, Role::AppUser, 3600).unwrap();
        cache.store(record.id, &first).await.unwrap();
        assert!(validator.validate(&first).await.is_some());

        cache.store(record.id, &second).await.unwrap();
        assert!(validator.validate(&first).await.is_none());
        assert!(validator.validate(&second).await.is_some());
    }
}
