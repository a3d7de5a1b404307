use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, Duration, TimeZone, Utc};
use thiserror::Error;

use super::cipher::{self, CipherError, KEY_LEN};
use crate::subject::{Role, SubjectId};

#[derive(Debug, Error, PartialEq)]
pub enum CodecError {
    #[error("Cipher error: {0}")]
    Cipher(#[from] CipherError),
    #[error("Token is empty")]
    Empty,
    #[error("Malformed token: {0}")]
    Malformed(&'static str),
    #[error("Root key must be exactly {KEY_LEN} bytes")]
    RootKey,
    #[error("Unknown role rank {0}")]
    UnknownRole(u64),
}

/// The contents of a token once decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Claims {
    pub expires_at: DateTime<Utc>,
    pub role: Role,
    pub subject: SubjectId,
}

impl Claims {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// Mints and checks stateless session tokens under a single root key.
///
/// Plaintext is three comma-separated fields, each an 8-byte big-endian
/// integer in unpadded URL-safe base64: subject id, role rank, and expiry in
/// unix nanoseconds. The sealed bytes are standard-base64 encoded so the
/// result travels in a header.
#[derive(Clone)]
pub struct TokenCodec {
    key: [u8; KEY_LEN],
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec").finish_non_exhaustive()
    }
}

impl TokenCodec {
    pub fn new(key: [u8; KEY_LEN]) -> Self {
        Self { key }
    }

    pub fn from_key_str(key: &str) -> Result<Self, CodecError> {
        let key: [u8; KEY_LEN] = key.as_bytes().try_into().map_err(|_| CodecError::RootKey)?;
        Ok(Self::new(key))
    }

    pub fn mint(
        &self,
        subject: SubjectId,
        role: Role,
        lifetime_seconds: u64,
    ) -> Result<String, CodecError> {
        self.mint_at(subject, role, lifetime_seconds, Utc::now())
    }

    pub fn mint_at(
        &self,
        subject: SubjectId,
        role: Role,
        lifetime_seconds: u64,
        now: DateTime<Utc>,
    ) -> Result<String, CodecError> {
        let lifetime = i64::try_from(lifetime_seconds)
            .ok()
            .and_then(Duration::try_seconds)
            .ok_or(CodecError::Malformed("lifetime overflows"))?;
        let expires_at = now
            .checked_add_signed(lifetime)
            .ok_or(CodecError::Malformed("lifetime overflows"))?;
        let expires_nanos = expires_at
            .timestamp_nanos_opt()
            .ok_or(CodecError::Malformed("expiry out of range"))?;

        let plaintext = [
            encode_field(subject.0 as u64),
            encode_field(u64::from(role.rank())),
            encode_field(expires_nanos as u64),
        ]
        .join(",");

        let sealed = cipher::seal(&self.key, plaintext.as_bytes())?;
        Ok(STANDARD.encode(sealed))
    }

    /// Authorizing check. Returns the claims only for an authentic, well-formed
    /// and unexpired token. Never fails loudly.
    pub fn validate(&self, token: &str) -> Option<Claims> {
        self.validate_at(token, Utc::now())
    }

    pub fn validate_at(&self, token: &str, now: DateTime<Utc>) -> Option<Claims> {
        match self.parse(token) {
            Ok(claims) if !claims.is_expired_at(now) => Some(claims),
            Ok(claims) => {
                tracing::debug!(subject_id = %claims.subject, "Token expired");
                None
            }
            Err(e) => {
                tracing::debug!(error = %e, "Token rejected");
                None
            }
        }
    }

    /// Non-authorizing decode: authenticity is checked but expiry is not.
    pub fn parse(&self, token: &str) -> Result<Claims, CodecError> {
        if token.is_empty() {
            return Err(CodecError::Empty);
        }
        let sealed = STANDARD
            .decode(token)
            .map_err(|_| CodecError::Malformed("not base64"))?;
        let plaintext = cipher::open(&self.key, &sealed)?;
        let plaintext =
            std::str::from_utf8(&plaintext).map_err(|_| CodecError::Malformed("not utf-8"))?;

        let mut fields = plaintext.split(',');
        let (Some(subject), Some(rank), Some(expiry), None) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Err(CodecError::Malformed("expected three fields"));
        };

        let subject = SubjectId(decode_field(subject)? as i64);
        if !subject.is_valid() {
            return Err(CodecError::Malformed("zero subject"));
        }
        let rank = decode_field(rank)?;
        let role = u16::try_from(rank)
            .ok()
            .and_then(Role::from_rank)
            .ok_or(CodecError::UnknownRole(rank))?;
        let expires_at = Utc.timestamp_nanos(decode_field(expiry)? as i64);

        Ok(Claims {
            expires_at,
            role,
            subject,
        })
    }
}

fn encode_field(value: u64) -> String {
    URL_SAFE_NO_PAD.encode(value.to_be_bytes())
}

fn decode_field(field: &str) -> Result<u64, CodecError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(field)
        .map_err(|_| CodecError::Malformed("field not base64"))?;
    let bytes: [u8; 8] = bytes
        .try_into()
        .map_err(|_| CodecError::Malformed("field not 8 bytes"))?;
    Ok(u64::from_be_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> TokenCodec {
        TokenCodec::from_key_str("0123456789abcdef").unwrap()
    }

    #[test]
    fn test_validate_within_lifetime() {
        let codec = codec();
        let t0 = Utc::now();
        let token = codec.mint_at(SubjectId(10001), Role::WebUser, 3600, t0).unwrap();

        let claims = codec.validate_at(&token, t0).unwrap();
        assert_eq!(claims.subject, SubjectId(10001));
        assert_eq!(claims.role, Role::WebUser);

        let almost = t0 + Duration::seconds(3599);
        assert!(codec.validate_at(&token, almost).is_some());
    }

    #[test]
    fn test_expired_at_exact_boundary() {
        let codec = codec();
        let t0 = Utc::now();
        let token = codec.mint_at(SubjectId(42), Role::AppUser, 60, t0).unwrap();

        assert!(codec.validate_at(&token, t0 + Duration::seconds(60)).is_none());
        assert!(codec.validate_at(&token, t0 + Duration::days(1)).is_none());
    }

    #[test]
    fn test_zero_lifetime_is_immediately_expired() {
        let codec = codec();
        let t0 = Utc::now();
        let token = codec.mint_at(SubjectId(42), Role::Author, 0, t0).unwrap();
        assert!(codec.validate_at(&token, t0).is_none());
    }

    #[test]
    fn test_parse_returns_expired_claims() {
        let codec = codec();
        let t0 = Utc::now() - Duration::hours(2);
        let token = codec.mint_at(SubjectId(7), Role::Author, 60, t0).unwrap();

        assert!(codec.validate(&token).is_none());
        let claims = codec.parse(&token).unwrap();
        assert_eq!(claims.subject, SubjectId(7));
        assert!(claims.is_expired());
    }

    #[test]
    fn test_any_tampered_byte_invalidates() {
        let codec = codec();
        let token = codec.mint(SubjectId(10001), Role::WebAdmin, 3600).unwrap();
        let raw = STANDARD.decode(&token).unwrap();

        for i in 0..raw.len() {
            let mut tampered = raw.clone();
            tampered[i] = tampered[i].wrapping_add(1);
            let tampered = STANDARD.encode(tampered);
            assert!(codec.validate(&tampered).is_none(), "byte {i}");
        }
    }

    #[test]
    fn test_garbage_never_validates() {
        let codec = codec();
        for input in ["", "not a token", "AAAA", "====", "\u{0}\u{1}"] {
            assert!(codec.validate(input).is_none(), "{input:?}");
        }
    }

    #[test]
    fn test_other_key_rejects() {
        let token = codec().mint(SubjectId(1), Role::AppUser, 3600).unwrap();
        let other = TokenCodec::from_key_str("fedcba9876543210").unwrap();
        assert!(other.validate(&token).is_none());
        assert!(matches!(
            other.parse(&token),
            Err(CodecError::Cipher(CipherError::BadMac))
        ));
    }

    #[test]
    fn test_root_key_length() {
        assert_eq!(
            TokenCodec::from_key_str("too short").unwrap_err(),
            CodecError::RootKey
        );
    }
}
