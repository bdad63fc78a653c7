//! Webhook Configuration Store
//!
//! Durable registry of delivery destinations with:
//! - In-memory state behind a read/write lock
//! - JSON file persistence (write to a temp sibling, then rename)
//! - Validation and a capacity limit on every mutation

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::types::{
    ConfigSummary, WebhookConfig, WebhookConfigCreate, WebhookConfigUpdate, WebhookError,
};
use crate::config::WebhookSettings;

// ============================================================================
// Config Source Trait
// ============================================================================

/// Where the dispatcher gets its destinations from
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// All configurations that should receive deliveries
    async fn active_configs(&self) -> Result<Vec<WebhookConfig>, WebhookError>;
}

// ============================================================================
// Store
// ============================================================================

/// On-disk layout, keyed by config id
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    configs: BTreeMap<String, WebhookConfig>,
    #[serde(default)]
    last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
struct StoreState {
    /// Insertion order
    configs: Vec<WebhookConfig>,
    last_updated: Option<DateTime<Utc>>,
}

/// File-backed webhook configuration store
#[derive(Clone)]
pub struct WebhookConfigStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    state: RwLock<StoreState>,
    path: PathBuf,
    settings: WebhookSettings,
}

impl WebhookConfigStore {
    /// Open the store at `settings.config_file`, loading whatever is there
    pub async fn open(settings: WebhookSettings) -> Result<Self, WebhookError> {
        let path = settings.config_file.clone();
        let state = load_state(&path).await?;

        tracing::info!(
            path = %path.display(),
            configs = state.configs.len(),
            "Loaded webhook configurations"
        );

        Ok(Self {
            inner: Arc::new(StoreInner {
                state: RwLock::new(state),
                path,
                settings,
            }),
        })
    }

    /// Settings this store was opened with
    pub fn settings(&self) -> &WebhookSettings {
        &self.inner.settings
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub async fn get(&self, id: &str) -> Result<WebhookConfig, WebhookError> {
        let state = self.inner.state.read().await;
        state
            .configs
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| WebhookError::NotFound(id.to_string()))
    }

    pub async fn list(&self) -> Vec<WebhookConfig> {
        self.inner.state.read().await.configs.clone()
    }

    pub async fn list_active(&self) -> Vec<WebhookConfig> {
        let state = self.inner.state.read().await;
        state
            .configs
            .iter()
            .filter(|c| self.is_deliverable(c))
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.state.read().await.configs.len()
    }

    pub async fn summary(&self) -> ConfigSummary {
        let state = self.inner.state.read().await;
        let active = state.configs.iter().filter(|c| self.is_deliverable(c)).count();

        ConfigSummary {
            total_configurations: state.configs.len(),
            active_configurations: active,
            disabled_configurations: state.configs.len() - active,
            last_updated: state.last_updated,
        }
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Create a configuration, filling omitted fields from the service defaults
    pub async fn create(&self, request: WebhookConfigCreate) -> Result<WebhookConfig, WebhookError> {
        let mut state = self.inner.state.write().await;

        let max = self.inner.settings.max_configs;
        if state.configs.len() >= max {
            return Err(WebhookError::Validation(format!(
                "Maximum number of webhook configurations reached (max: {max})"
            )));
        }

        let config = self.build_config(request);
        config.validate(self.inner.settings.allow_external_urls)?;

        let mut next = state.clone();
        next.configs.push(config.clone());
        next.last_updated = Some(config.created_at);
        self.commit(&mut state, next).await?;

        tracing::info!(
            config_id = %config.id,
            name = %config.name,
            url = %config.url,
            "Created webhook configuration"
        );

        Ok(config)
    }

    /// Merge `request` into an existing configuration
    pub async fn update(
        &self,
        id: &str,
        request: WebhookConfigUpdate,
    ) -> Result<WebhookConfig, WebhookError> {
        let mut state = self.inner.state.write().await;

        let index = state
            .configs
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| WebhookError::NotFound(id.to_string()))?;

        let previous = &state.configs[index];
        let mut updated = previous.clone();
        request.apply_to(&mut updated);
        updated.updated_at = Utc::now();

        // The url policy only gates new urls and re-enabling
        let enforce_url_policy =
            updated.url != previous.url || (updated.enabled && !previous.enabled);
        updated.validate(self.inner.settings.allow_external_urls || !enforce_url_policy)?;

        let mut next = state.clone();
        next.configs[index] = updated.clone();
        next.last_updated = Some(updated.updated_at);
        self.commit(&mut state, next).await?;

        tracing::info!(config_id = %id, "Updated webhook configuration");

        Ok(updated)
    }

    /// Returns whether the configuration existed
    pub async fn delete(&self, id: &str) -> Result<bool, WebhookError> {
        let mut state = self.inner.state.write().await;

        let Some(index) = state.configs.iter().position(|c| c.id == id) else {
            return Ok(false);
        };

        let mut next = state.clone();
        next.configs.remove(index);
        next.last_updated = Some(Utc::now());
        self.commit(&mut state, next).await?;

        tracing::info!(config_id = %id, "Deleted webhook configuration");

        Ok(true)
    }

    /// Returns whether the configuration existed
    pub async fn set_enabled(&self, id: &str, enabled: bool) -> Result<bool, WebhookError> {
        let request = WebhookConfigUpdate {
            enabled: Some(enabled),
            ..Default::default()
        };

        match self.update(id, request).await {
            Ok(_) => Ok(true),
            Err(WebhookError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Create a "Default Webhook" from the environment when the store is empty.
    ///
    /// Returns the created configuration, if any.
    pub async fn seed_default(&self) -> Result<Option<WebhookConfig>, WebhookError> {
        if self.inner.settings.default_url.is_empty() || self.len().await > 0 {
            return Ok(None);
        }

        let config = self
            .create(WebhookConfigCreate {
                name: "Default Webhook".to_string(),
                url: Some(self.inner.settings.default_url.clone()),
                ..Default::default()
            })
            .await?;

        Ok(Some(config))
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Active and allowed by the current url policy
    fn is_deliverable(&self, config: &WebhookConfig) -> bool {
        config.is_active() && config.url_permitted(self.inner.settings.allow_external_urls)
    }

    fn build_config(&self, request: WebhookConfigCreate) -> WebhookConfig {
        let defaults = &self.inner.settings;
        let now = Utc::now();

        let headers = request.headers.unwrap_or_else(|| {
            defaults
                .default_headers
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect()
        });

        WebhookConfig {
            id: Uuid::new_v4().to_string(),
            name: request.name,
            url: request.url.unwrap_or_default(),
            method: request
                .method
                .unwrap_or_else(|| defaults.default_method.clone())
                .to_uppercase(),
            enabled: request.enabled.unwrap_or(true),
            headers,
            payload_template: request
                .payload_template
                .or_else(|| defaults.default_payload_template.clone()),
            timeout: request.timeout.unwrap_or(defaults.default_timeout),
            retry_attempts: request.retry_attempts.unwrap_or(defaults.default_retry_attempts),
            retry_delay: request.retry_delay.unwrap_or(defaults.default_retry_delay),
            created_at: now,
            updated_at: now,
        }
    }

    /// Persist `next`, then make it current. On failure nothing changes.
    async fn commit(&self, current: &mut StoreState, next: StoreState) -> Result<(), WebhookError> {
        save_state(&self.inner.path, &next).await?;
        *current = next;
        Ok(())
    }
}

#[async_trait]
impl ConfigSource for WebhookConfigStore {
    async fn active_configs(&self) -> Result<Vec<WebhookConfig>, WebhookError> {
        Ok(self.list_active().await)
    }
}

// ============================================================================
// Persistence
// ============================================================================

async fn load_state(path: &Path) -> Result<StoreState, WebhookError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(StoreState::default()),
        Err(e) => {
            return Err(WebhookError::Storage(format!(
                "failed to read {}: {e}",
                path.display()
            )))
        }
    };

    let file: StoreFile = serde_json::from_str(&content).map_err(|e| {
        WebhookError::Storage(format!("failed to parse {}: {e}", path.display()))
    })?;

    let mut configs: Vec<WebhookConfig> = file.configs.into_values().collect();
    configs.sort_by(|a, b| a.created_at.cmp(&b.created_at));

    Ok(StoreState {
        configs,
        last_updated: file.last_updated,
    })
}

async fn save_state(path: &Path, state: &StoreState) -> Result<(), WebhookError> {
    let file = StoreFile {
        configs: state
            .configs
            .iter()
            .map(|c| (c.id.clone(), c.clone()))
            .collect(),
        last_updated: state.last_updated,
    };

    let content = serde_json::to_string_pretty(&file)
        .map_err(|e| WebhookError::Storage(format!("failed to serialize configs: {e}")))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| WebhookError::Storage(format!("failed to create {}: {e}", parent.display())))?;
    }

    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, content)
        .await
        .map_err(|e| WebhookError::Storage(format!("failed to write {}: {e}", tmp_path.display())))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| WebhookError::Storage(format!("failed to replace {}: {e}", path.display())))?;

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
