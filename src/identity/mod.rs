//! Identity resolvers: map external credentials to a subject id, registering
//! new subjects where the provider allows it.

pub mod mobile;
pub mod oauth;
pub mod password;
pub mod providers;
pub mod refresh;
pub mod registrar;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AuthError;
use crate::subject::Role;
use crate::traits::PasswordHash;

pub use mobile::MobileResolver;
pub use oauth::{OAuthGrant, OAuthProvider, OAuthResolver, ProviderSession};
pub use password::PasswordResolver;
pub use registrar::Registrar;

/// Highest role an account can obtain by registering itself.
pub const SELF_SERVICE_CEILING: Role = Role::WebUser;

/// Role given to a self-registered account that asked for `requested`.
pub fn self_service_role(requested: Role) -> Role {
    requested.min(SELF_SERVICE_CEILING)
}

/// Where an external identifier comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Provider {
    Email,
    Mobile,
    /// Host-registered generic OAuth provider, by index.
    OAuth(u8),
    Qq,
    Username,
    Weibo,
    Weixin,
}

impl Provider {
    pub fn key(&self) -> String {
        match self {
            Provider::Email => "email".to_string(),
            Provider::Mobile => "mobile".to_string(),
            Provider::OAuth(index) => format!("oauth{index}"),
            Provider::Qq => "qq".to_string(),
            Provider::Username => "username".to_string(),
            Provider::Weibo => "weibo".to_string(),
            Provider::Weixin => "weixin".to_string(),
        }
    }

    /// Providers whose identifiers can be paired with a password.
    pub fn supports_password(&self) -> bool {
        matches!(self, Provider::Email | Provider::Mobile | Provider::Username)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

impl FromStr for Provider {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(Provider::Email),
            "mobile" => Ok(Provider::Mobile),
            "qq" => Ok(Provider::Qq),
            "username" => Ok(Provider::Username),
            "weibo" => Ok(Provider::Weibo),
            "weixin" => Ok(Provider::Weixin),
            other => other
                .strip_prefix("oauth")
                .and_then(|n| n.parse::<u8>().ok())
                .map(Provider::OAuth)
                .ok_or_else(|| AuthError::not_found(format!("unknown provider {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Female,
    Male,
    #[default]
    Unknown,
}

/// Profile fields a provider offers for seeding a new account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderProfile {
    pub nickname: Option<String>,
    pub portrait: Option<String>,
    pub sex: Sex,
}

/// Everything needed to create a subject.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSubject {
    pub password: Option<PasswordHash>,
    pub profile: ProviderProfile,
    /// Identifiers bound to the new subject. The first one is the origin provider.
    pub provider_ids: Vec<(Provider, String)>,
    pub role: Role,
}

impl NewSubject {
    pub fn new(provider: Provider, id: impl Into<String>, role: Role) -> Self {
        Self {
            password: None,
            profile: ProviderProfile::default(),
            provider_ids: vec![(provider, id.into())],
            role,
        }
    }

    pub fn with_profile(mut self, profile: ProviderProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_password(mut self, password: PasswordHash) -> Self {
        self.password = Some(password);
        self
    }

    pub fn origin(&self) -> Option<&Provider> {
        self.provider_ids.first().map(|(p, _)| p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_self_service_role_is_capped() {
        assert_eq!(self_service_role(Role::AppUser), Role::AppUser);
        assert_eq!(self_service_role(Role::WebUser), Role::WebUser);
        assert_eq!(self_service_role(Role::Author), Role::WebUser);
        assert_eq!(self_service_role(Role::WebAdmin), Role::WebUser);
    }

    #[test]
    fn test_provider_keys_parse_back() {
        for provider in [
            Provider::Email,
            Provider::Mobile,
            Provider::OAuth(3),
            Provider::Qq,
            Provider::Username,
            Provider::Weibo,
            Provider::Weixin,
        ] {
            assert_eq!(provider.key().parse::<Provider>().unwrap(), provider);
        }
        assert!("github".parse::<Provider>().is_err());
        assert!("oauthX".parse::<Provider>().is_err());
    }
}
