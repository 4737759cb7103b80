//! Remote validation round trip: one POST per attempt, hard deadline, no
//! internal retry. Whether to re-trigger is the session controller's call.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, warn};
use url::Url;
use vouch_config::{CorsMode, WidgetConfig};
use vouch_model::{Token, ValidationOutcome, ValidationResponse};

use crate::error::{Result, VouchError};

/// Fixed source tag stamped on every validation request.
const SOURCE_TAG: &str = "vouch-widget";

/// Seam between the session controller and the network. Mocked in tests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenValidator: Send + Sync {
    /// Validate a token, consuming it: one token, one attempt. Failures are
    /// encoded in the outcome rather than an error, because every failure
    /// mode has a defined display state.
    async fn validate(&self, token: Token) -> ValidationOutcome;
}

#[derive(Debug, Serialize)]
struct ValidationRequest<'a> {
    token: &'a str,
    ts: i64,
    ua: &'a str,
    source: &'static str,
}

/// HTTP validator for the configured endpoint.
#[derive(Debug, Clone)]
pub struct ValidationClient {
    http: reqwest::Client,
    endpoint: Url,
    cors_mode: CorsMode,
    client_ident: String,
    request_timeout: Duration,
}

impl ValidationClient {
    pub fn new(config: &WidgetConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|err| VouchError::Network(err.to_string()))?;
        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            cors_mode: config.cors_mode,
            client_ident: config.client_ident.clone(),
            request_timeout: config.request_timeout,
        })
    }

    async fn post_once(&self, token: &Token) -> ValidationOutcome {
        let body = ValidationRequest {
            token: token.as_str(),
            ts: Utc::now().timestamp_millis(),
            ua: &self.client_ident,
            source: SOURCE_TAG,
        };

        let sent = self
            .http
            .post(self.endpoint.clone())
            .header("Sec-Fetch-Mode", self.cors_mode.as_str())
            .json(&body)
            .send()
            .await;

        let response = match sent {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "validation transport failure");
                return ValidationOutcome::NetworkFailure(err.to_string());
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "validation endpoint returned non-success");
            return ValidationOutcome::NetworkFailure(format!("bad_status_{}", status.as_u16()));
        }

        match response.json::<ValidationResponse>().await {
            Ok(parsed) => {
                debug!(status = %parsed.status, "validation response received");
                ValidationOutcome::from_response(parsed)
            }
            Err(err) => ValidationOutcome::NetworkFailure(err.to_string()),
        }
    }
}

#[async_trait]
impl TokenValidator for ValidationClient {
    async fn validate(&self, token: Token) -> ValidationOutcome {
        // The deadline races the round trip; the loser is dropped. A call
        // that resolves after the deadline is never observed.
        match tokio::time::timeout(self.request_timeout, self.post_once(&token)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(timeout_ms = self.request_timeout.as_millis() as u64, "validation timed out");
                ValidationOutcome::NetworkFailure("timeout".to_owned())
            }
        }
    }
}
