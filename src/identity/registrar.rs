use std::sync::Arc;

use super::NewSubject;
use crate::error::AuthError;
use crate::subject::SubjectId;
use crate::traits::{SubjectCreatedHook, UserStore};

/// Creates subjects and runs the host's creation hook as part of creation.
#[derive(Clone)]
pub struct Registrar {
    hook: Option<Arc<dyn SubjectCreatedHook>>,
    users: Arc<dyn UserStore>,
}

impl Registrar {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { hook: None, users }
    }

    pub fn with_hook(mut self, hook: Arc<dyn SubjectCreatedHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Create the subject; if the hook fails the subject is deleted again and
    /// the hook's error is returned.
    pub async fn create(&self, subject: NewSubject) -> Result<SubjectId, AuthError> {
        let origin = subject
            .origin()
            .cloned()
            .ok_or_else(|| AuthError::internal("new subject has no provider id"))?;
        let id = self.users.create_subject(subject).await?;

        if let Some(hook) = &self.hook {
            if let Err(e) = hook.on_created(id, &origin).await {
                tracing::warn!(subject_id = %id, error = %e, "Creation hook failed, rolling back");
                if let Err(rollback) = self.users.delete_subject(id).await {
                    tracing::error!(subject_id = %id, error = %rollback, "Rollback of new subject failed");
                }
                return Err(e);
            }
        }

        tracing::info!(subject_id = %id, provider = %origin, "Registered new subject");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Provider;
    use crate::subject::Role;
    use crate::testutil::{setup_db, FailingHook};

    #[tokio::test]
    async fn test_create_without_hook() {
        let (db, _temp) = setup_db();
        let registrar = Registrar::new(Arc::new(db.clone()));
        let id = registrar
            .create(NewSubject::new(Provider::Weibo, "wb-1", Role::AppUser))
            .await
            .unwrap();
        assert_eq!(db.find_by_provider(&Provider::Weibo, "wb-1").unwrap(), Some(id));
    }

    #[tokio::test]
    async fn test_hook_failure_rolls_back() {
        let (db, _temp) = setup_db();
        let registrar = Registrar::new(Arc::new(db.clone())).with_hook(Arc::new(FailingHook));

        let err = registrar
            .create(NewSubject::new(Provider::Weibo, "wb-1", Role::AppUser))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Internal(_)));
        assert_eq!(db.find_by_provider(&Provider::Weibo, "wb-1").unwrap(), None);
    }
}
