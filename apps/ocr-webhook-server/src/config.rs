//! Configuration management for the OCR webhook server

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub webhook: WebhookSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Service-wide webhook settings.
///
/// The `default_*` fields fill in whatever a create request leaves out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookSettings {
    /// Global switch; when off, dispatch is skipped entirely
    pub enabled: bool,
    pub config_file: PathBuf,
    pub max_configs: usize,
    pub allow_external_urls: bool,
    pub default_url: String,
    pub default_method: String,
    pub default_timeout: u64,
    pub default_retry_attempts: u32,
    pub default_retry_delay: u64,
    pub default_headers: Map<String, Value>,
    pub default_payload_template: Option<Map<String, Value>>,
}

impl Default for WebhookSettings {
    fn default() -> Self {
        let mut default_headers = Map::new();
        default_headers.insert(
            "Content-Type".to_string(),
            Value::String("application/json".to_string()),
        );

        WebhookSettings {
            enabled: true,
            config_file: PathBuf::from("webhook_configs.json"),
            max_configs: 100,
            allow_external_urls: true,
            default_url: String::new(),
            default_method: "POST".to_string(),
            default_timeout: 30,
            default_retry_attempts: 3,
            default_retry_delay: 1,
            default_headers,
            default_payload_template: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
            },
            webhook: WebhookSettings::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = WebhookSettings::default();

        Ok(Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parse_or("SERVER_PORT", 8000),
            },
            webhook: WebhookSettings {
                enabled: flag_or("WEBHOOK_ENABLED", true),
                config_file: env::var("WEBHOOK_CONFIG_FILE")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.config_file),
                max_configs: parse_or("WEBHOOK_MAX_CONFIGS", defaults.max_configs),
                allow_external_urls: flag_or("WEBHOOK_ALLOW_EXTERNAL_URLS", true),
                // N8N_WEBHOOK_URL is the pre-registry name for the same setting
                default_url: non_empty_var("DEFAULT_WEBHOOK_URL")
                    .or_else(|| non_empty_var("N8N_WEBHOOK_URL"))
                    .unwrap_or_default(),
                default_method: env::var("DEFAULT_WEBHOOK_METHOD")
                    .map(|m| m.to_uppercase())
                    .unwrap_or(defaults.default_method),
                default_timeout: non_empty_var("DEFAULT_WEBHOOK_TIMEOUT")
                    .or_else(|| non_empty_var("WEBHOOK_TIMEOUT"))
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.default_timeout),
                default_retry_attempts: non_empty_var("DEFAULT_WEBHOOK_RETRY_ATTEMPTS")
                    .or_else(|| non_empty_var("WEBHOOK_RETRY_ATTEMPTS"))
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.default_retry_attempts),
                default_retry_delay: parse_or(
                    "DEFAULT_WEBHOOK_RETRY_DELAY",
                    defaults.default_retry_delay,
                ),
                default_headers: json_var_or("DEFAULT_WEBHOOK_HEADERS", parse_headers)
                    .unwrap_or(defaults.default_headers),
                default_payload_template: json_var_or(
                    "DEFAULT_WEBHOOK_PAYLOAD_TEMPLATE",
                    parse_json_object,
                ),
            },
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    non_empty_var(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn flag_or(key: &str, default: bool) -> bool {
    non_empty_var(key)
        .map(|v| v.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

/// Parse a JSON env value; a malformed one is logged and treated as unset
fn json_var_or(
    key: &str,
    parse: fn(&str, &str) -> anyhow::Result<Map<String, Value>>,
) -> Option<Map<String, Value>> {
    let raw = non_empty_var(key)?;
    match parse(key, &raw) {
        Ok(map) => Some(map),
        Err(e) => {
            tracing::warn!(key = key, error = %e, "Ignoring malformed setting, using default");
            None
        }
    }
}

/// A JSON object whose values are all strings
pub(crate) fn parse_headers(key: &str, raw: &str) -> anyhow::Result<Map<String, Value>> {
    let map = parse_json_object(key, raw)?;
    if let Some((name, _)) = map.iter().find(|(_, v)| !v.is_string()) {
        anyhow::bail!("{key}: value for header {name} must be a string");
    }
    Ok(map)
}

pub(crate) fn parse_json_object(key: &str, raw: &str) -> anyhow::Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => anyhow::bail!("{key} must be a JSON object"),
        Err(e) => anyhow::bail!("{key} is not valid JSON: {e}"),
    }
}
