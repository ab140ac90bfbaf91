//! Client configuration.
//!
//! Loaded from JSON (file or string) and optionally overridden from the
//! environment. Every field has a default so an empty object is a valid
//! configuration.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::auth::{AuthRegistry, AuthSetting, Credentials};
use crate::error::ApiError;

pub const ENV_LOG_REQUESTS: &str = "API_CLIENT_LOG_REQUESTS";
pub const ENV_TIMEOUT_MS: &str = "API_CLIENT_TIMEOUT_MS";
pub const ENV_ACCESS_TOKEN: &str = "API_CLIENT_ACCESS_TOKEN";
pub const ENV_USERNAME: &str = "API_CLIENT_USERNAME";
pub const ENV_PASSWORD: &str = "API_CLIENT_PASSWORD";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Initial value of the request/response log toggle.
    pub log_requests: bool,
    /// Transport-level timeout for a whole request. `None` means no limit.
    pub timeout_ms: Option<u64>,
    /// Headers sent with every request unless the caller sets them.
    pub default_headers: BTreeMap<String, String>,
    pub auth_settings: Vec<AuthSetting>,
    pub credentials: Credentials,
}

impl ClientConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ApiError> {
        serde_json::from_str(raw).map_err(|e| ApiError::Config(e.to_string()))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ApiError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ApiError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&raw)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(self) -> Result<Self, ApiError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn apply_env_from<F>(mut self, lookup: F) -> Result<Self, ApiError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_LOG_REQUESTS) {
            self.log_requests = parse_bool(&raw)
                .ok_or_else(|| ApiError::Config(format!("{ENV_LOG_REQUESTS}: expected a boolean, got {raw:?}")))?;
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_MS) {
            let ms = raw
                .trim()
                .parse::<u64>()
                .map_err(|e| ApiError::Config(format!("{ENV_TIMEOUT_MS}: {e}")))?;
            self.timeout_ms = Some(ms);
        }
        if let Some(token) = lookup(ENV_ACCESS_TOKEN) {
            self.credentials.access_token = Some(token);
        }
        if let Some(username) = lookup(ENV_USERNAME) {
            self.credentials.username = Some(username);
        }
        if let Some(password) = lookup(ENV_PASSWORD) {
            self.credentials.password = Some(password);
        }
        Ok(self)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    pub fn auth_registry(&self) -> AuthRegistry {
        AuthRegistry::new(self.auth_settings.clone(), self.credentials.clone())
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::auth::AuthScheme;

    #[test]
    fn empty_object_is_default() {
        assert_eq!(ClientConfig::from_json_str("{}").unwrap(), ClientConfig::default());
    }

    #[test]
    fn full_config_parses() {
        let config = ClientConfig::from_json_str(
            r#"{
                "log_requests": true,
                "timeout_ms": 2500,
                "default_headers": {"User-Agent": "petstore/1.0"},
                "auth_settings": [{"name": "basic", "type": "basic"}],
                "credentials": {"username": "u", "password": "p"}
            }"#,
        )
        .unwrap();
        assert!(config.log_requests);
        assert_eq!(config.timeout(), Some(Duration::from_millis(2500)));
        assert_eq!(config.default_headers["User-Agent"], "petstore/1.0");
        assert_eq!(config.auth_registry().scheme("basic"), Some(&AuthScheme::Basic));
    }

    #[test]
    fn bad_json_is_config_error() {
        let err = ClientConfig::from_json_str(r#"{"timeout_ms": "soon"}"#).unwrap_err();
        assert!(matches!(err, ApiError::Config(_)));
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_LOG_REQUESTS, "yes"),
            (ENV_TIMEOUT_MS, "100"),
            (ENV_ACCESS_TOKEN, "tok"),
        ]);
        let config = ClientConfig::default()
            .apply_env_from(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert!(config.log_requests);
        assert_eq!(config.timeout_ms, Some(100));
        assert_eq!(config.credentials.access_token.as_deref(), Some("tok"));
        assert!(config.credentials.username.is_none());
    }

    #[test]
    fn invalid_env_values_are_rejected() {
        let err = ClientConfig::default()
            .apply_env_from(|k| (k == ENV_LOG_REQUESTS).then(|| "maybe".to_string()))
            .unwrap_err();
        assert!(matches!(err, ApiError::Config(_)));

        let err = ClientConfig::default()
            .apply_env_from(|k| (k == ENV_TIMEOUT_MS).then(|| "-1".to_string()))
            .unwrap_err();
        assert!(matches!(err, ApiError::Config(_)));
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = ClientConfig::from_path("/nonexistent/api-client.json").unwrap_err();
        assert!(matches!(err, ApiError::Config(_)));
    }
}
