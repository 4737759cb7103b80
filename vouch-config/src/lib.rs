//! Read-only configuration for the Vouch redemption widget.
//!
//! A [`WidgetConfig`] is built once at startup from built-in defaults, an
//! optional TOML file, and environment overrides (in that order), then
//! injected into the session — nothing mutates it afterwards.
#![allow(missing_docs)]

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;
use url::Url;

/// Default hard deadline for a validation round trip.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(8000);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no validation endpoint configured")]
    MissingEndpoint,

    #[error("invalid endpoint url {value:?}: {source}")]
    InvalidEndpoint {
        value: String,
        #[source]
        source: url::ParseError,
    },

    #[error("endpoint url {0:?} must use http or https")]
    UnsupportedScheme(String),

    #[error("unknown cross-origin mode {0:?}")]
    InvalidCorsMode(String),

    #[error("invalid duration {value:?}: {source}")]
    InvalidDuration {
        value: String,
        #[source]
        source: humantime::DurationError,
    },

    #[error("invalid boolean {0:?}")]
    InvalidBool(String),

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Cross-origin mode carried on every validation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CorsMode {
    #[default]
    Cors,
    NoCors,
    SameOrigin,
}

impl CorsMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cors => "cors",
            Self::NoCors => "no-cors",
            Self::SameOrigin => "same-origin",
        }
    }

    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value {
            "cors" => Ok(Self::Cors),
            "no-cors" => Ok(Self::NoCors),
            "same-origin" => Ok(Self::SameOrigin),
            other => Err(ConfigError::InvalidCorsMode(other.to_owned())),
        }
    }
}

impl fmt::Display for CorsMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Label set consumed by the (external) view layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UiLabels {
    pub title: String,
    pub subtitle: String,
    pub confirm: String,
    pub deny: String,
    pub error: String,
    pub retry: String,
}

impl Default for UiLabels {
    fn default() -> Self {
        Self {
            title: "Scan your voucher".to_owned(),
            subtitle: "Align the QR within the frame".to_owned(),
            confirm: "Confirmed".to_owned(),
            deny: "Denied".to_owned(),
            error: "Something went wrong".to_owned(),
            retry: "Try again".to_owned(),
        }
    }
}

/// Immutable widget configuration. Process-wide, initialized once.
#[derive(Debug, Clone)]
pub struct WidgetConfig {
    /// Validation endpoint receiving the redemption POST.
    pub endpoint: Url,
    pub cors_mode: CorsMode,
    pub request_timeout: Duration,
    pub allow_upload_fallback: bool,
    pub labels: UiLabels,
    /// Client identification string sent as the request's `ua` field.
    pub client_ident: String,
}

impl WidgetConfig {
    /// Configuration with defaults for everything but the endpoint.
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            cors_mode: CorsMode::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            allow_upload_fallback: true,
            labels: UiLabels::default(),
            client_ident: default_client_ident(),
        }
    }

    /// Load from an optional TOML file, then apply `VOUCH_*` environment
    /// overrides. A missing file is not an error; a missing endpoint is.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        // Pick up a .env if one is present; ignore its absence.
        dotenvy::dotenv().ok();

        let mut raw = RawConfig::default();
        if let Some(path) = path
            && path.exists()
        {
            let contents = std::fs::read_to_string(path)?;
            raw = toml::from_str(&contents)?;
            debug!(path = %path.display(), "loaded widget config file");
        }
        raw.apply_env()?;
        raw.try_into()
    }
}

fn default_client_ident() -> String {
    concat!("vouch/", env!("CARGO_PKG_VERSION")).to_owned()
}

/// File/env shape before validation. Every field optional so files can be
/// partial and env vars can fill the gaps.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    endpoint: Option<String>,
    cors_mode: Option<CorsMode>,
    request_timeout_ms: Option<u64>,
    allow_upload_fallback: Option<bool>,
    client_ident: Option<String>,
    #[serde(default)]
    labels: RawLabels,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawLabels {
    title: Option<String>,
    subtitle: Option<String>,
    confirm: Option<String>,
    deny: Option<String>,
    error: Option<String>,
    retry: Option<String>,
}

impl RawConfig {
    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(endpoint) = std::env::var("VOUCH_ENDPOINT") {
            self.endpoint = Some(endpoint);
        }
        if let Ok(mode) = std::env::var("VOUCH_CORS_MODE") {
            self.cors_mode = Some(CorsMode::parse(&mode)?);
        }
        if let Ok(timeout) = std::env::var("VOUCH_REQUEST_TIMEOUT") {
            let parsed = humantime::parse_duration(&timeout).map_err(|source| {
                ConfigError::InvalidDuration {
                    value: timeout.clone(),
                    source,
                }
            })?;
            self.request_timeout_ms = Some(parsed.as_millis() as u64);
        }
        if let Ok(allow) = std::env::var("VOUCH_ALLOW_UPLOAD") {
            self.allow_upload_fallback = Some(match allow.as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                other => return Err(ConfigError::InvalidBool(other.to_owned())),
            });
        }
        Ok(())
    }
}

impl TryFrom<RawConfig> for WidgetConfig {
    type Error = ConfigError;

    fn try_from(raw: RawConfig) -> Result<Self, ConfigError> {
        let value = raw.endpoint.ok_or(ConfigError::MissingEndpoint)?;
        let endpoint = Url::parse(&value).map_err(|source| ConfigError::InvalidEndpoint {
            value: value.clone(),
            source,
        })?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(ConfigError::UnsupportedScheme(value));
        }

        let defaults = UiLabels::default();
        let labels = UiLabels {
            title: raw.labels.title.unwrap_or(defaults.title),
            subtitle: raw.labels.subtitle.unwrap_or(defaults.subtitle),
            confirm: raw.labels.confirm.unwrap_or(defaults.confirm),
            deny: raw.labels.deny.unwrap_or(defaults.deny),
            error: raw.labels.error.unwrap_or(defaults.error),
            retry: raw.labels.retry.unwrap_or(defaults.retry),
        };

        Ok(Self {
            endpoint,
            cors_mode: raw.cors_mode.unwrap_or_default(),
            request_timeout: raw
                .request_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT),
            allow_upload_fallback: raw.allow_upload_fallback.unwrap_or(true),
            labels,
            client_ident: raw.client_ident.unwrap_or_else(default_client_ident),
        })
    }
}
