use serde::Deserialize;

use super::{LoginResult, Orchestrator};
use crate::error::AuthError;
use crate::identity::password::hash_password;
use crate::identity::{self_service_role, NewSubject, Provider, ProviderProfile, Sex};
use crate::sms::CodePurpose;
use crate::subject::{Role, SubjectId};

/// Registration form completed after the mobile number was verified.
#[derive(Debug, Clone, Deserialize)]
pub struct MobileRegistration {
    pub binding_token: String,
    pub mobile: String,
    #[serde(default)]
    pub nickname: Option<String>,
    pub password: String,
    #[serde(default)]
    pub portrait: Option<String>,
    #[serde(default)]
    pub sex: Sex,
}

impl Orchestrator {
    /// Passwordless login. Unknown numbers get an account on the spot.
    pub async fn login_by_sms(
        &self,
        mobile: &str,
        code: &str,
        role: Role,
    ) -> Result<LoginResult, AuthError> {
        self.sms.verify_login_code(mobile, code).await?;
        let (subject, created) = self.mobile.resolve_or_provision(mobile, role).await?;
        self.check_in_as(subject, role, created).await
    }

    pub async fn register_by_mobile(
        &self,
        registration: MobileRegistration,
        role: Role,
    ) -> Result<LoginResult, AuthError> {
        if registration.password.is_empty() {
            return Err(AuthError::bad_request("password is required"));
        }
        self.sms
            .complete_with_binding_token(
                &registration.mobile,
                &registration.binding_token,
                CodePurpose::Register,
                None,
            )
            .await?;
        if self.mobile.has_mobile_user(&registration.mobile).await? {
            return Err(AuthError::AlreadyExists(format!(
                "mobile {}",
                registration.mobile
            )));
        }

        let profile = ProviderProfile {
            nickname: registration.nickname,
            portrait: registration.portrait,
            sex: registration.sex,
        };
        let subject = NewSubject::new(Provider::Mobile, registration.mobile, self_service_role(role))
            .with_profile(profile)
            .with_password(hash_password(&registration.password)?);
        let id = self.registrar.create(subject).await?;

        tracing::info!(subject_id = %id, "Registered by mobile");
        self.check_in_as(id, role, true).await
    }

    pub async fn reset_password_by_mobile(
        &self,
        mobile: &str,
        binding_token: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        if new_password.is_empty() {
            return Err(AuthError::bad_request("password is required"));
        }
        self.sms
            .complete_with_binding_token(mobile, binding_token, CodePurpose::ResetPassword, None)
            .await?;
        let subject = self
            .mobile
            .find(mobile)
            .await?
            .ok_or_else(|| AuthError::not_found(format!("mobile {mobile}")))?;

        self.users
            .set_password(subject, hash_password(new_password)?)
            .await?;
        if let Some(cache) = &self.cache {
            cache.evict(subject).await?;
        }
        tracing::info!(subject_id = %subject, "Password reset by mobile");
        Ok(())
    }

    /// Attach a verified mobile number to an existing subject.
    pub async fn bind_mobile(
        &self,
        subject: SubjectId,
        mobile: &str,
        binding_token: &str,
    ) -> Result<(), AuthError> {
        self.sms
            .complete_with_binding_token(mobile, binding_token, CodePurpose::Bind, Some(subject))
            .await?;
        self.users
            .bind_provider_id(subject, &Provider::Mobile, mobile)
            .await?;
        tracing::info!(subject_id = %subject, "Mobile bound");
        Ok(())
    }
}
