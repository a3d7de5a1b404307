use hmac::{Hmac, Mac};
use sha2::Sha512;
use std::sync::Arc;

use super::Provider;
use crate::error::AuthError;
use crate::subject::SubjectId;
use crate::tokens::generate_salt;
use crate::traits::{PasswordHash, UserStore};

type HmacSha512 = Hmac<Sha512>;

fn keyed_digest(salt: &[u8]) -> Result<HmacSha512, AuthError> {
    <HmacSha512 as Mac>::new_from_slice(salt).map_err(|_| AuthError::internal("invalid salt"))
}

/// Hash a password under a fresh random salt.
pub fn hash_password(password: &str) -> Result<PasswordHash, AuthError> {
    let salt = generate_salt();
    let mut mac = keyed_digest(&salt)?;
    mac.update(password.as_bytes());
    Ok(PasswordHash {
        hash: mac.finalize().into_bytes().to_vec(),
        salt,
    })
}

/// Constant-time comparison of `password` against a stored hash.
pub fn verify_password(stored: &PasswordHash, password: &str) -> bool {
    match keyed_digest(&stored.salt) {
        Ok(mut mac) => {
            mac.update(password.as_bytes());
            mac.verify_slice(&stored.hash).is_ok()
        }
        Err(_) => false,
    }
}

/// Resolves `(identifier kind, identifier, password)` to a subject.
#[derive(Clone)]
pub struct PasswordResolver {
    users: Arc<dyn UserStore>,
}

impl PasswordResolver {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }

    pub async fn resolve(
        &self,
        kind: &Provider,
        identifier: &str,
        password: &str,
    ) -> Result<SubjectId, AuthError> {
        if !kind.supports_password() {
            return Err(AuthError::bad_request(format!(
                "{kind} cannot be used with a password"
            )));
        }

        let credentials = self
            .users
            .password_credentials(kind, identifier)
            .await?
            .ok_or_else(|| AuthError::not_found(format!("no account for {kind}")))?;

        let stored = credentials.password.ok_or(AuthError::PasswordNotSet)?;
        if !verify_password(&stored, password) {
            tracing::debug!(subject_id = %credentials.subject, "Password mismatch");
            return Err(AuthError::InvalidPassword);
        }
        Ok(credentials.subject)
    }
}
