use thiserror::Error;

use crate::subject::Role;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub admin: AdminConfig,
    /// Exposes internal error details and issued SMS codes. Must never be true in production.
    pub dev_mode: bool,
    pub maintenance: MaintenanceConfig,
    pub node: NodeConfig,
    pub providers: ProviderConfig,
    /// Shared 16-byte key for token encryption and authentication.
    pub root_key: String,
    pub sessions: SessionConfig,
    pub sms: SmsConfig,
    pub tokens: TokenLifetimes,
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub bind_address: String,
    pub data_dir: String,
}

/// Token lifetime per role, in seconds. A zero lifetime issues tokens that
/// are already expired.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenLifetimes {
    pub app_user_seconds: u64,
    pub author_seconds: u64,
    pub web_admin_seconds: u64,
    pub web_user_seconds: u64,
}

impl TokenLifetimes {
    pub fn for_role(&self, role: Role) -> u64 {
        match role {
            Role::AppUser => self.app_user_seconds,
            Role::Author => self.author_seconds,
            Role::WebAdmin => self.web_admin_seconds,
            Role::WebUser => self.web_user_seconds,
        }
    }
}

impl Default for TokenLifetimes {
    fn default() -> Self {
        Self {
            app_user_seconds: 30 * 86400,
            author_seconds: 86400,
            web_admin_seconds: 8 * 3600,
            web_user_seconds: 7 * 86400,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum SessionPolicy {
    /// Any token that decodes, is unexpired and belongs to an unbanned subject is accepted.
    #[default]
    AnyValid,
    /// Only the most recently issued token per subject is accepted.
    LatestOnly,
}

#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    pub policy: SessionPolicy,
}

#[derive(Debug, Clone)]
pub struct SmsConfig {
    pub binding_token_ttl_seconds: u64,
    pub code_length: usize,
    pub code_ttl_seconds: u64,
    /// Delete a binding token as soon as it completes a flow.
    pub invalidate_binding_on_use: bool,
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            binding_token_ttl_seconds: 600,
            code_length: 6,
            code_ttl_seconds: 120,
            invalidate_binding_on_use: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProviderConfig {
    pub qq: Option<QqConfig>,
    pub weibo: Option<WeiboConfig>,
    pub weixin: Option<WeixinConfig>,
}

#[derive(Debug, Clone)]
pub struct WeixinConfig {
    pub app_id: String,
    pub secret: String,
}

#[derive(Debug, Clone)]
pub struct WeiboConfig {
    pub app_id: String,
    pub redirect_url: String,
    pub secret: String,
}

#[derive(Debug, Clone)]
pub struct QqConfig {
    pub app_id: String,
}

#[derive(Debug, Clone)]
pub struct AdminConfig {
    /// Permission label granted to web admins authenticated by an ordinary token.
    pub default_permission: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            default_permission: "admin".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MaintenanceConfig {
    pub cleanup_interval_seconds: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            cleanup_interval_seconds: 60,
        }
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_bool(name: &str, default: bool) -> bool {
    std::env::var(name)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(default)
}

fn env_nonempty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.trim().is_empty())
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let bind_address =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string());

        let root_key = std::env::var("ROOT_KEY").unwrap_or_default();

        let defaults = TokenLifetimes::default();
        let tokens = TokenLifetimes {
            app_user_seconds: env_u64("TOKEN_LIFETIME_APP_USER", defaults.app_user_seconds),
            author_seconds: env_u64("TOKEN_LIFETIME_AUTHOR", defaults.author_seconds),
            web_admin_seconds: env_u64("TOKEN_LIFETIME_WEB_ADMIN", defaults.web_admin_seconds),
            web_user_seconds: env_u64("TOKEN_LIFETIME_WEB_USER", defaults.web_user_seconds),
        };

        let policy = match std::env::var("SESSION_POLICY")
            .unwrap_or_default()
            .to_lowercase()
            .as_str()
        {
            "latest" => SessionPolicy::LatestOnly,
            _ => SessionPolicy::AnyValid,
        };

        let sms_defaults = SmsConfig::default();
        let sms = SmsConfig {
            binding_token_ttl_seconds: env_u64(
                "SMS_BINDING_TTL",
                sms_defaults.binding_token_ttl_seconds,
            ),
            code_length: sms_defaults.code_length,
            code_ttl_seconds: env_u64("SMS_CODE_TTL", sms_defaults.code_ttl_seconds),
            invalidate_binding_on_use: env_bool(
                "SMS_INVALIDATE_BINDING",
                sms_defaults.invalidate_binding_on_use,
            ),
        };

        let providers = load_providers()?;

        let admin = AdminConfig {
            default_permission: env_nonempty("ADMIN_DEFAULT_PERMISSION")
                .unwrap_or_else(|| AdminConfig::default().default_permission),
        };

        let config = Config {
            admin,
            dev_mode: env_bool("DEV_MODE", false),
            maintenance: MaintenanceConfig {
                cleanup_interval_seconds: env_u64("CLEANUP_INTERVAL_SECONDS", 60),
            },
            node: NodeConfig {
                bind_address,
                data_dir,
            },
            providers,
            root_key,
            sessions: SessionConfig { policy },
            sms,
            tokens,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.root_key.len() != 16 {
            return Err(ConfigError::ValidationError(format!(
                "ROOT_KEY must be exactly 16 bytes, got {}",
                self.root_key.len()
            )));
        }

        if self.sms.code_length == 0 {
            return Err(ConfigError::ValidationError(
                "SMS code length cannot be zero".to_string(),
            ));
        }

        if self.maintenance.cleanup_interval_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "CLEANUP_INTERVAL_SECONDS must be greater than 0".to_string(),
            ));
        }

        if self.dev_mode {
            tracing::warn!("DEV_MODE is enabled: internal errors and SMS codes are exposed");
        }

        Ok(())
    }
}

fn load_providers() -> Result<ProviderConfig, ConfigError> {
    let weixin = match (env_nonempty("WEIXIN_APP_ID"), env_nonempty("WEIXIN_SECRET")) {
        (Some(app_id), Some(secret)) => Some(WeixinConfig { app_id, secret }),
        (None, None) => None,
        _ => {
            return Err(ConfigError::ValidationError(
                "WEIXIN_APP_ID and WEIXIN_SECRET must be set together".to_string(),
            ))
        }
    };

    let weibo = match (
        env_nonempty("WEIBO_APP_ID"),
        env_nonempty("WEIBO_SECRET"),
        env_nonempty("WEIBO_REDIRECT_URL"),
    ) {
        (Some(app_id), Some(secret), Some(redirect_url)) => Some(WeiboConfig {
            app_id,
            redirect_url,
            secret,
        }),
        (None, None, None) => None,
        _ => {
            return Err(ConfigError::ValidationError(
                "WEIBO_APP_ID, WEIBO_SECRET and WEIBO_REDIRECT_URL must be set together"
                    .to_string(),
            ))
        }
    };

    let qq = env_nonempty("QQ_APP_ID").map(|app_id| QqConfig { app_id });

    Ok(ProviderConfig { qq, weibo, weixin })
}
