//! Named authentication settings.
//!
//! # Design
//! Each operation lists the auth settings it accepts by name. At request time
//! the registry resolves every name to a scheme, looks up the matching
//! credential and injects it into the request headers or query parameters.
//! Injection is additive: a header or query parameter the caller already set
//! is never replaced.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::encoding::QueryValue;
use crate::http::find_header;

/// Where an API key is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyLocation {
    Header,
    Query,
}

/// How a credential is injected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthScheme {
    /// `key` names both the header/query parameter and the credential entry.
    ApiKey { location: KeyLocation, key: String },
    Basic,
    /// OAuth2 access token sent as `Authorization: Bearer <token>`.
    Bearer,
}

/// A named auth rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSetting {
    pub name: String,
    #[serde(flatten)]
    pub scheme: AuthScheme,
}

/// Secrets referenced by auth settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub api_key: BTreeMap<String, String>,
    pub api_key_prefix: BTreeMap<String, String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub access_token: Option<String>,
}

impl Credentials {
    /// API key for `key`, prefixed (e.g. `Token abc`) when a prefix is set.
    pub fn api_key_with_prefix(&self, key: &str) -> Option<String> {
        let value = self.api_key.get(key)?;
        Some(match self.api_key_prefix.get(key) {
            Some(prefix) => format!("{prefix} {value}"),
            None => value.clone(),
        })
    }

    pub fn basic_auth_token(&self) -> Option<String> {
        if self.username.is_none() && self.password.is_none() {
            return None;
        }
        let raw = format!(
            "{}:{}",
            self.username.as_deref().unwrap_or(""),
            self.password.as_deref().unwrap_or("")
        );
        Some(format!("Basic {}", STANDARD.encode(raw)))
    }
}

/// A header or query parameter produced by an auth setting.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Injection {
    Header(String, String),
    Query(String, String),
}

/// Auth settings by name plus the credentials they draw on.
#[derive(Debug, Clone, Default)]
pub struct AuthRegistry {
    settings: BTreeMap<String, AuthScheme>,
    credentials: Credentials,
}

impl AuthRegistry {
    pub fn new(settings: Vec<AuthSetting>, credentials: Credentials) -> Self {
        Self {
            settings: settings.into_iter().map(|s| (s.name, s.scheme)).collect(),
            credentials,
        }
    }

    pub fn scheme(&self, name: &str) -> Option<&AuthScheme> {
        self.settings.get(name)
    }

    /// Merge credentials for every named setting into `headers` and `query`.
    ///
    /// Unknown names and settings without a configured credential are skipped.
    /// Existing entries win: header names compare case-insensitively, query
    /// names exactly.
    pub fn apply<S: AsRef<str>>(
        &self,
        names: &[S],
        headers: &mut Vec<(String, String)>,
        query: &mut Vec<(String, QueryValue)>,
    ) {
        for name in names {
            let name = name.as_ref();
            let Some(scheme) = self.settings.get(name) else {
                warn!(auth = name, "unknown auth setting, skipping");
                continue;
            };
            let Some(injection) = self.resolve(scheme) else {
                debug!(auth = name, "no credential configured, skipping");
                continue;
            };
            match injection {
                Injection::Header(key, value) => {
                    if find_header(headers, &key).is_none() {
                        headers.push((key, value));
                    }
                }
                Injection::Query(key, value) => {
                    if !query.iter().any(|(k, _)| *k == key) {
                        query.push((key, QueryValue::Single(value)));
                    }
                }
            }
        }
    }

    fn resolve(&self, scheme: &AuthScheme) -> Option<Injection> {
        match scheme {
            AuthScheme::ApiKey { location, key } => {
                let value = self.credentials.api_key_with_prefix(key)?;
                Some(match location {
                    KeyLocation::Header => Injection::Header(key.clone(), value),
                    KeyLocation::Query => Injection::Query(key.clone(), value),
                })
            }
            AuthScheme::Basic => {
                let token = self.credentials.basic_auth_token()?;
                Some(Injection::Header("Authorization".to_string(), token))
            }
            AuthScheme::Bearer => {
                let token = self.credentials.access_token.as_ref()?;
                Some(Injection::Header("Authorization".to_string(), format!("Bearer {token}")))
            }
        }
    }
}
