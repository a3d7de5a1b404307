//! Header contract shared by every client.

use axum::http::HeaderMap;
use serde::Serialize;

pub const APP_TOKEN: &str = "x-app-token";
pub const ADMIN_TOKEN: &str = "x-admin-token";
pub const AUTHOR_TOKEN: &str = "x-author-token";
pub const API_VERSION: &str = "x-api-version";
pub const APP_VERSION: &str = "x-app-version";
pub const APP_PLATFORM: &str = "x-app-platform";
pub const CONF_VERSION: &str = "x-conf-version";

/// Highest API version a client can select.
pub const MAX_API_VERSION: u32 = 99;

/// Non-empty header value as text.
pub fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Version selected by `X-Api-Version`: 2 through 99 select that variant,
/// anything else selects 1.
pub fn api_version(headers: &HeaderMap) -> u32 {
    match header_str(headers, API_VERSION)
        .map(|v| v.trim_start_matches(['v', 'V']))
        .and_then(|v| v.parse::<u32>().ok())
    {
        Some(v) if (2..=MAX_API_VERSION).contains(&v) => v,
        _ => 1,
    }
}

/// What the client says about itself. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClientMeta {
    pub api_version: u32,
    pub app_platform: Option<String>,
    pub app_version: Option<String>,
    pub conf_version: Option<i64>,
}

impl ClientMeta {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            api_version: api_version(headers),
            app_platform: header_str(headers, APP_PLATFORM).map(str::to_lowercase),
            app_version: header_str(headers, APP_VERSION).map(str::to_string),
            conf_version: header_str(headers, CONF_VERSION).and_then(|v| v.parse().ok()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_api_version_selection() {
        assert_eq!(api_version(&HeaderMap::new()), 1);
        assert_eq!(api_version(&headers(&[(API_VERSION, "2")])), 2);
        assert_eq!(api_version(&headers(&[(API_VERSION, "v7")])), 7);
        assert_eq!(api_version(&headers(&[(API_VERSION, "99")])), 99);
        assert_eq!(api_version(&headers(&[(API_VERSION, "100")])), 1);
        assert_eq!(api_version(&headers(&[(API_VERSION, "1")])), 1);
        assert_eq!(api_version(&headers(&[(API_VERSION, "latest")])), 1);
    }

    #[test]
    fn test_client_meta_never_fails() {
        let meta = ClientMeta::from_headers(&headers(&[
            (APP_PLATFORM, "iOS"),
            (APP_VERSION, "3.2.1"),
            (CONF_VERSION, "not-a-number"),
        ]));
        assert_eq!(meta.app_platform.as_deref(), Some("ios"));
        assert_eq!(meta.app_version.as_deref(), Some("3.2.1"));
        assert_eq!(meta.conf_version, None);
        assert_eq!(ClientMeta::from_headers(&HeaderMap::new()), ClientMeta { api_version: 1, ..Default::default() });
    }
}
