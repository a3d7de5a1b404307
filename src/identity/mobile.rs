use std::sync::Arc;

use super::{self_service_role, NewSubject, Provider, Registrar};
use crate::error::AuthError;
use crate::subject::{Role, SubjectId};
use crate::traits::UserStore;

/// Resolves verified mobile numbers, provisioning accounts on first use.
#[derive(Clone)]
pub struct MobileResolver {
    registrar: Registrar,
    users: Arc<dyn UserStore>,
}

impl MobileResolver {
    pub fn new(users: Arc<dyn UserStore>, registrar: Registrar) -> Self {
        Self { registrar, users }
    }

    pub async fn has_mobile_user(&self, mobile: &str) -> Result<bool, AuthError> {
        Ok(self.find(mobile).await?.is_some())
    }

    pub async fn find(&self, mobile: &str) -> Result<Option<SubjectId>, AuthError> {
        self.users
            .resolve_by_provider_id(&Provider::Mobile, mobile)
            .await
    }

    /// Returns the subject and whether it was created by this call.
    pub async fn resolve_or_provision(
        &self,
        mobile: &str,
        role: Role,
    ) -> Result<(SubjectId, bool), AuthError> {
        if let Some(id) = self.find(mobile).await? {
            return Ok((id, false));
        }
        let id = self
            .registrar
            .create(NewSubject::new(Provider::Mobile, mobile, self_service_role(role)))
            .await?;
        Ok((id, true))
    }
}
