//! HTTP clients for the built-in third-party providers.

pub mod jssdk;
pub mod qq;
pub mod weibo;
pub mod weixin;

use serde::de::DeserializeOwned;

use crate::error::AuthError;

pub use jssdk::WeixinJsSdk;
pub use qq::QqClient;
pub use weibo::WeiboClient;
pub use weixin::WeixinClient;

/// Provider APIs report failures in-band with a non-zero status field.
pub(crate) trait ProviderStatus {
    fn failure(&self) -> Option<String>;
}

pub(crate) async fn fetch_json<T>(
    request: reqwest::RequestBuilder,
    provider: &'static str,
) -> Result<T, AuthError>
where
    T: DeserializeOwned + ProviderStatus,
{
    let response = request.send().await.map_err(|e| {
        tracing::error!(provider, error = %e, "Provider request failed");
        AuthError::ThirdPartyAuthFailed(format!("{provider} unreachable"))
    })?;

    let body = response.text().await.map_err(|e| {
        tracing::error!(provider, error = %e, "Failed to read provider response");
        AuthError::ThirdPartyAuthFailed(format!("{provider} response unreadable"))
    })?;

    let parsed: T = serde_json::from_str(&body).map_err(|e| {
        tracing::error!(provider, error = %e, body = %body, "Failed to decode provider response");
        AuthError::ThirdPartyAuthFailed(format!("{provider} response malformed"))
    })?;

    if let Some(message) = parsed.failure() {
        tracing::error!(provider, message = %message, "Provider API returned an error");
        return Err(AuthError::ThirdPartyAuthFailed(format!("{provider}: {message}")));
    }
    Ok(parsed)
}

pub(crate) fn non_empty(value: String) -> Option<String> {
    Some(value).filter(|v| !v.is_empty())
}
