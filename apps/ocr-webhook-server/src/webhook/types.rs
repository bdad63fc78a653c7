//! Webhook Types
//!
//! Destination configurations, the create/update requests that shape them,
//! and per-destination delivery outcomes.

use std::collections::HashMap;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderName, HeaderValue};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// HTTP methods a destination may be called with
pub const SUPPORTED_METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE"];

// ============================================================================
// Configuration
// ============================================================================

/// A named delivery destination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub id: String,
    pub name: String,
    pub url: String,
    pub method: String,
    pub enabled: bool,
    /// Extra request headers, stored as given
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Partial payload shallow-merged over the default payload
    #[serde(default)]
    pub payload_template: Option<Map<String, Value>>,
    /// Per-attempt timeout in seconds
    pub timeout: u64,
    /// Total attempts, not retries after the first
    pub retry_attempts: u32,
    /// Backoff base in seconds
    pub retry_delay: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WebhookConfig {
    /// Enabled with somewhere to send to
    pub fn is_active(&self) -> bool {
        self.enabled && !self.url.trim().is_empty()
    }

    /// Whether the url is allowed under the external-url policy
    pub fn url_permitted(&self, allow_external_urls: bool) -> bool {
        allow_external_urls || validate_url(&self.url, false).is_ok()
    }

    /// Check field invariants.
    ///
    /// With `allow_external_urls` off, only loopback and private-network
    /// hosts are accepted.
    pub fn validate(&self, allow_external_urls: bool) -> Result<(), WebhookError> {
        if self.enabled && self.url.trim().is_empty() {
            return Err(WebhookError::Validation(
                "url is required when the webhook is enabled".to_string(),
            ));
        }

        if !self.url.trim().is_empty() {
            validate_url(&self.url, allow_external_urls)?;
        }

        if !SUPPORTED_METHODS.contains(&self.method.as_str()) {
            return Err(WebhookError::Validation(format!(
                "unsupported HTTP method: {}",
                self.method
            )));
        }

        if self.timeout == 0 {
            return Err(WebhookError::Validation(
                "timeout must be greater than zero".to_string(),
            ));
        }

        for (name, value) in &self.headers {
            HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
                WebhookError::Validation(format!("invalid header name: {name}"))
            })?;
            HeaderValue::from_str(value).map_err(|_| {
                WebhookError::Validation(format!("invalid value for header {name}"))
            })?;
        }

        Ok(())
    }
}

fn validate_url(raw: &str, allow_external_urls: bool) -> Result<(), WebhookError> {
    let url = reqwest::Url::parse(raw.trim())
        .map_err(|e| WebhookError::Validation(format!("invalid url {raw}: {e}")))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(WebhookError::Validation(format!(
            "url scheme must be http or https, got {}",
            url.scheme()
        )));
    }

    let host = url
        .host_str()
        .ok_or_else(|| WebhookError::Validation(format!("url has no host: {raw}")))?;

    if !allow_external_urls && !is_internal_host(host) {
        return Err(WebhookError::Validation(format!(
            "external webhook urls are disabled: {host}"
        )));
    }

    Ok(())
}

fn is_internal_host(host: &str) -> bool {
    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }

    match host.trim_start_matches('[').trim_end_matches(']').parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => ip.is_loopback() || ip.is_private() || ip.is_link_local(),
        Ok(IpAddr::V6(ip)) => ip.is_loopback(),
        Err(_) => false,
    }
}

// ============================================================================
// Requests
// ============================================================================

/// Create request; omitted fields take the service defaults
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookConfigCreate {
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default)]
    pub payload_template: Option<Map<String, Value>>,
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub retry_attempts: Option<u32>,
    #[serde(default)]
    pub retry_delay: Option<u64>,
}

/// Partial update; only present fields change.
///
/// `payload_template: null` clears the template, an absent key leaves it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookConfigUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub payload_template: Option<Option<Map<String, Value>>>,
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub retry_attempts: Option<u32>,
    #[serde(default)]
    pub retry_delay: Option<u64>,
}

fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}

impl WebhookConfigUpdate {
    /// Apply present fields onto `config`
    pub fn apply_to(self, config: &mut WebhookConfig) {
        if let Some(name) = self.name {
            config.name = name;
        }
        if let Some(url) = self.url {
            config.url = url;
        }
        if let Some(method) = self.method {
            config.method = method.to_uppercase();
        }
        if let Some(enabled) = self.enabled {
            config.enabled = enabled;
        }
        if let Some(headers) = self.headers {
            config.headers = headers;
        }
        if let Some(template) = self.payload_template {
            config.payload_template = template;
        }
        if let Some(timeout) = self.timeout {
            config.timeout = timeout;
        }
        if let Some(retry_attempts) = self.retry_attempts {
            config.retry_attempts = retry_attempts;
        }
        if let Some(retry_delay) = self.retry_delay {
            config.retry_delay = retry_delay;
        }
    }
}

// ============================================================================
// Reporting
// ============================================================================

/// Result of delivering one extraction result to one destination
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryOutcome {
    pub config_id: String,
    pub config_name: String,
    pub url: String,
    pub success: bool,
    /// HTTP attempts made
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Store-wide counts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSummary {
    pub total_configurations: usize,
    pub active_configurations: usize,
    pub disabled_configurations: usize,
    pub last_updated: Option<DateTime<Utc>>,
}

// ============================================================================
// Error Types
// ============================================================================

/// Errors surfaced to whoever manages webhook configurations
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Webhook configuration not found: {0}")]
    NotFound(String),

    #[error("Configuration store error: {0}")]
    Storage(String),
}

impl WebhookError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
