//! SMS verification: one-time codes and the binding tokens that gate
//! registration, password reset and mobile binding.
//!
//! ```text
//! NoCodeSent --request_code--> CodeSent --verify--> CodeVerified --complete--> Consumed
//!                                  |                     |
//!                              ttl lapses            ttl lapses
//!                                  v                     v
//!                              NoCodeSent            NoCodeSent
//! ```
//!
//! Login codes end at `CodeVerified`: the orchestrator checks the caller in
//! directly. Every other purpose mints a binding token the client presents
//! to finish the flow.

mod sender;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::SmsConfig;
use crate::error::AuthError;
use crate::identity::Provider;
use crate::subject::SubjectId;
use crate::tokens::{generate_hex, generate_numeric};
use crate::traits::{KvStore, MessageSender, UserStore};

pub use sender::LogSender;

const CODE_PREFIX: &str = "mobilecode:";
const BINDING_PREFIX: &str = "mobiletoken:";
const BINDING_TOKEN_BYTES: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodePurpose {
    Bind,
    Login,
    Register,
    ResetPassword,
}

impl fmt::Display for CodePurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CodePurpose::Bind => "bind",
            CodePurpose::Login => "login",
            CodePurpose::Register => "register",
            CodePurpose::ResetPassword => "reset_password",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CodeRecord {
    code: String,
    purpose: CodePurpose,
}

#[derive(Debug, Serialize, Deserialize)]
struct BindingRecord {
    purpose: CodePurpose,
    /// Subject the verified code was bound to, if any.
    #[serde(default)]
    subject: Option<SubjectId>,
    token: String,
}

fn code_key(mobile: &str, bound: Option<SubjectId>) -> String {
    match bound {
        Some(subject) => format!("{CODE_PREFIX}{mobile}:{subject}"),
        None => format!("{CODE_PREFIX}{mobile}"),
    }
}

fn binding_key(mobile: &str) -> String {
    format!("{BINDING_PREFIX}{mobile}")
}

fn check_mobile(mobile: &str) -> Result<(), AuthError> {
    let digits = mobile.strip_prefix('+').unwrap_or(mobile);
    if digits.len() < 5 || digits.len() > 20 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(AuthError::bad_request("invalid mobile number"));
    }
    Ok(())
}

#[derive(Clone)]
pub struct SmsVerifier {
    config: SmsConfig,
    kv: Arc<dyn KvStore>,
    sender: Arc<dyn MessageSender>,
    users: Arc<dyn UserStore>,
}

impl SmsVerifier {
    pub fn new(
        config: SmsConfig,
        kv: Arc<dyn KvStore>,
        users: Arc<dyn UserStore>,
        sender: Arc<dyn MessageSender>,
    ) -> Self {
        Self {
            config,
            kv,
            sender,
            users,
        }
    }

    /// Issue a code for `purpose` and send it. The code is returned for
    /// observability; callers must not hand it to the client outside
    /// development mode.
    pub async fn request_code(
        &self,
        mobile: &str,
        purpose: CodePurpose,
        bound: Option<SubjectId>,
    ) -> Result<String, AuthError> {
        check_mobile(mobile)?;

        let existing = self
            .users
            .resolve_by_provider_id(&Provider::Mobile, mobile)
            .await?;
        match purpose {
            CodePurpose::Register if existing.is_some() => {
                return Err(AuthError::AlreadyExists(format!("mobile {mobile}")));
            }
            CodePurpose::ResetPassword if existing.is_none() => {
                return Err(AuthError::not_found(format!("mobile {mobile}")));
            }
            CodePurpose::Bind => {
                if bound.is_none() {
                    return Err(AuthError::unauthorized("binding requires a signed-in caller"));
                }
                if existing.is_some() {
                    return Err(AuthError::AlreadyExists(format!("mobile {mobile}")));
                }
            }
            _ => {}
        }

        let code = generate_numeric(self.config.code_length);
        let record = serde_json::to_string(&CodeRecord {
            code: code.clone(),
            purpose,
        })
        .map_err(|e| AuthError::internal(e.to_string()))?;

        let key = code_key(mobile, bound);
        let ttl = Duration::from_secs(self.config.code_ttl_seconds);
        self.kv.set(&key, &record, Some(ttl)).await?;

        if let Err(e) = self.sender.send_code(mobile, purpose, &code).await {
            tracing::warn!(mobile = %mobile, error = %e, "Failed to send verification code");
            self.kv.delete(&key).await?;
            return Err(e);
        }

        tracing::info!(mobile = %mobile, purpose = %purpose, "Verification code issued");
        Ok(code)
    }

    /// Check a code and consume it. Wrong, missing and expired codes are
    /// indistinguishable to the caller.
    pub async fn verify_code(
        &self,
        mobile: &str,
        code: &str,
        bound: Option<SubjectId>,
    ) -> Result<CodePurpose, AuthError> {
        self.consume_code(mobile, code, bound, |_| true).await
    }

    /// The stored code is only deleted when both the code and its purpose
    /// are accepted; anything else leaves it usable for its own flow.
    async fn consume_code(
        &self,
        mobile: &str,
        code: &str,
        bound: Option<SubjectId>,
        accepts: impl Fn(CodePurpose) -> bool,
    ) -> Result<CodePurpose, AuthError> {
        let key = code_key(mobile, bound);
        let record: Option<CodeRecord> = self
            .kv
            .get(&key)
            .await?
            .and_then(|raw| serde_json::from_str(&raw).ok());

        match record {
            Some(record) if !code.is_empty() && record.code == code && accepts(record.purpose) => {
                self.kv.delete(&key).await?;
                Ok(record.purpose)
            }
            _ => {
                tracing::debug!(mobile = %mobile, "Verification code mismatch");
                Err(AuthError::BadCode)
            }
        }
    }

    /// Verify a code issued for passwordless login.
    pub async fn verify_login_code(&self, mobile: &str, code: &str) -> Result<(), AuthError> {
        self.consume_code(mobile, code, None, |purpose| purpose == CodePurpose::Login)
            .await
            .map(|_| ())
    }

    /// Verify a non-login code and mint the binding token that completes its flow.
    pub async fn issue_binding_token(
        &self,
        mobile: &str,
        code: &str,
        bound: Option<SubjectId>,
    ) -> Result<String, AuthError> {
        let purpose = self
            .consume_code(mobile, code, bound, |purpose| purpose != CodePurpose::Login)
            .await?;

        let token = generate_hex(BINDING_TOKEN_BYTES);
        let record = serde_json::to_string(&BindingRecord {
            purpose,
            subject: bound,
            token: token.clone(),
        })
        .map_err(|e| AuthError::internal(e.to_string()))?;

        let ttl = Duration::from_secs(self.config.binding_token_ttl_seconds);
        self.kv.set(&binding_key(mobile), &record, Some(ttl)).await?;

        tracing::debug!(mobile = %mobile, purpose = %purpose, "Binding token issued");
        Ok(token)
    }

    /// Accept a binding token for `purpose`. Fails with `BadToken` unless it
    /// matches the stored one exactly and was issued to the same `bound`
    /// subject.
    pub async fn complete_with_binding_token(
        &self,
        mobile: &str,
        presented: &str,
        purpose: CodePurpose,
        bound: Option<SubjectId>,
    ) -> Result<(), AuthError> {
        let key = binding_key(mobile);
        let record: Option<BindingRecord> = self
            .kv
            .get(&key)
            .await?
            .and_then(|raw| serde_json::from_str(&raw).ok());

        match record {
            Some(record)
                if !presented.is_empty()
                    && record.token == presented
                    && record.purpose == purpose
                    && record.subject == bound =>
            {
                if self.config.invalidate_binding_on_use {
                    self.kv.delete(&key).await?;
                }
                Ok(())
            }
            _ => {
                tracing::debug!(mobile = %mobile, purpose = %purpose, "Binding token rejected");
                Err(AuthError::BadToken)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::NewSubject;
    use crate::subject::Role;
    use crate::testutil::{setup_db, RecordingSender};

    const MOBILE: &str = "13800000001";

    fn verifier(db: &crate::storage::Database, config: SmsConfig) -> (SmsVerifier, Arc<RecordingSender>) {
        let sender = Arc::new(RecordingSender::default());
        let verifier = SmsVerifier::new(
            config,
            Arc::new(db.clone()),
            Arc::new(db.clone()),
            sender.clone(),
        );
        (verifier, sender)
    }

    #[tokio::test]
    async fn test_code_is_sent_and_single_use() {
        let (db, _temp) = setup_db();
        let (sms, sender) = verifier(&db, SmsConfig::default());

        let code = sms.request_code(MOBILE, CodePurpose::Login, None).await.unwrap();
        assert_eq!(code.len(), 6);
        assert_eq!(sender.last_code(MOBILE).as_deref(), Some(code.as_str()));

        sms.verify_login_code(MOBILE, &code).await.unwrap();
        assert!(matches!(
            sms.verify_login_code(MOBILE, &code).await,
            Err(AuthError::BadCode)
        ));
    }

    #[tokio::test]
    async fn test_wrong_and_expired_codes_are_both_bad_code() {
        let (db, _temp) = setup_db();
        let (sms, _) = verifier(&db, SmsConfig::default());
        let code = sms.request_code(MOBILE, CodePurpose::Login, None).await.unwrap();
        let wrong = if code == "000000" { "111111" } else { "000000" };
        assert!(matches!(
            sms.verify_code(MOBILE, wrong, None).await,
            Err(AuthError::BadCode)
        ));

        let expiring = SmsConfig {
            code_ttl_seconds: 0,
            ..SmsConfig::default()
        };
        let (sms, _) = verifier(&db, expiring);
        let code = sms.request_code(MOBILE, CodePurpose::Login, None).await.unwrap();
        assert!(matches!(
            sms.verify_code(MOBILE, &code, None).await,
            Err(AuthError::BadCode)
        ));
    }

    #[tokio::test]
    async fn test_purpose_guards() {
        let (db, _temp) = setup_db();
        let existing = db
            .create_user(&NewSubject::new(Provider::Mobile, MOBILE, Role::AppUser))
            .unwrap();
        let (sms, _) = verifier(&db, SmsConfig::default());

        assert!(matches!(
            sms.request_code(MOBILE, CodePurpose::Register, None).await,
            Err(AuthError::AlreadyExists(_))
        ));
        assert!(matches!(
            sms.request_code("13899999999", CodePurpose::ResetPassword, None).await,
            Err(AuthError::NotFound(_))
        ));
        assert!(matches!(
            sms.request_code("13899999999", CodePurpose::Bind, None).await,
            Err(AuthError::Unauthorized(_))
        ));
        assert!(matches!(
            sms.request_code(MOBILE, CodePurpose::Bind, Some(existing.id)).await,
            Err(AuthError::AlreadyExists(_))
        ));
        assert!(sms.request_code(MOBILE, CodePurpose::ResetPassword, None).await.is_ok());
        assert!(sms.request_code(MOBILE, CodePurpose::Login, None).await.is_ok());
        assert!(matches!(
            sms.request_code("12ab", CodePurpose::Login, None).await,
            Err(AuthError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_bound_code_only_verifies_for_same_subject() {
        let (db, _temp) = setup_db();
        let (sms, _) = verifier(&db, SmsConfig::default());
        let code = sms
            .request_code(MOBILE, CodePurpose::Bind, Some(SubjectId(10001)))
            .await
            .unwrap();

        assert!(matches!(
            sms.verify_code(MOBILE, &code, Some(SubjectId(10002))).await,
            Err(AuthError::BadCode)
        ));
        assert!(matches!(
            sms.verify_code(MOBILE, &code, None).await,
            Err(AuthError::BadCode)
        ));
        assert_eq!(
            sms.verify_code(MOBILE, &code, Some(SubjectId(10001))).await.unwrap(),
            CodePurpose::Bind
        );
    }

    #[tokio::test]
    async fn test_binding_token_flow() {
        let (db, _temp) = setup_db();
        let (sms, _) = verifier(&db, SmsConfig::default());
        let code = sms.request_code(MOBILE, CodePurpose::Register, None).await.unwrap();
        let token = sms.issue_binding_token(MOBILE, &code, None).await.unwrap();

        assert!(matches!(
            sms.complete_with_binding_token(MOBILE, "not-it", CodePurpose::Register, None).await,
            Err(AuthError::BadToken)
        ));
        assert!(matches!(
            sms.complete_with_binding_token(MOBILE, &token, CodePurpose::ResetPassword, None).await,
            Err(AuthError::BadToken)
        ));
        sms.complete_with_binding_token(MOBILE, &token, CodePurpose::Register, None)
            .await
            .unwrap();

        // Consumed on first use.
        assert!(matches!(
            sms.complete_with_binding_token(MOBILE, &token, CodePurpose::Register, None).await,
            Err(AuthError::BadToken)
        ));
    }

    #[tokio::test]
    async fn test_binding_token_reusable_when_not_invalidated() {
        let (db, _temp) = setup_db();
        let config = SmsConfig {
            invalidate_binding_on_use: false,
            ..SmsConfig::default()
        };
        let (sms, _) = verifier(&db, config);
        let code = sms.request_code(MOBILE, CodePurpose::Register, None).await.unwrap();
        let token = sms.issue_binding_token(MOBILE, &code, None).await.unwrap();

        for _ in 0..2 {
            sms.complete_with_binding_token(MOBILE, &token, CodePurpose::Register, None)
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_login_code_cannot_mint_binding_token() {
        let (db, _temp) = setup_db();
        let (sms, _) = verifier(&db, SmsConfig::default());
        let code = sms.request_code(MOBILE, CodePurpose::Login, None).await.unwrap();
        assert!(matches!(
            sms.issue_binding_token(MOBILE, &code, None).await,
            Err(AuthError::BadCode)
        ));
    }

    #[tokio::test]
    async fn test_misrouted_code_stays_usable_for_its_own_flow() {
        let (db, _temp) = setup_db();
        let (sms, _) = verifier(&db, SmsConfig::default());

        let code = sms.request_code(MOBILE, CodePurpose::Login, None).await.unwrap();
        assert!(matches!(
            sms.issue_binding_token(MOBILE, &code, None).await,
            Err(AuthError::BadCode)
        ));
        sms.verify_login_code(MOBILE, &code).await.unwrap();

        let code = sms.request_code(MOBILE, CodePurpose::Register, None).await.unwrap();
        assert!(matches!(
            sms.verify_login_code(MOBILE, &code).await,
            Err(AuthError::BadCode)
        ));
        assert!(sms.issue_binding_token(MOBILE, &code, None).await.is_ok());
    }

    #[tokio::test]
    async fn test_bind_token_only_completes_for_its_subject() {
        let (db, _temp) = setup_db();
        let (sms, _) = verifier(&db, SmsConfig::default());
        let owner = SubjectId(10001);
        let code = sms
            .request_code(MOBILE, CodePurpose::Bind, Some(owner))
            .await
            .unwrap();
        let token = sms.issue_binding_token(MOBILE, &code, Some(owner)).await.unwrap();

        assert!(matches!(
            sms.complete_with_binding_token(MOBILE, &token, CodePurpose::Bind, Some(SubjectId(10002)))
                .await,
            Err(AuthError::BadToken)
        ));
        assert!(matches!(
            sms.complete_with_binding_token(MOBILE, &token, CodePurpose::Bind, None).await,
            Err(AuthError::BadToken)
        ));
        sms.complete_with_binding_token(MOBILE, &token, CodePurpose::Bind, Some(owner))
            .await
            .unwrap();
    }
}
