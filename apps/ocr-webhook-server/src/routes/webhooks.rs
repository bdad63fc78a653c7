//! Webhook API endpoints
//!
//! Configuration management plus test and debug dispatch.
//!
//! Endpoints:
//! - GET/POST /webhook/configs - List or create configurations
//! - GET/PUT/DELETE /webhook/configs/:config_id - Read, update or delete one
//! - POST /webhook/configs/:config_id/enable|disable - Toggle delivery
//! - POST /webhook/configs/:config_id/test - Send the sample result to one configuration
//! - GET /webhook/configs/summary - Counts
//! - GET /webhook/environment - Effective service-wide settings
//! - GET /webhook/status - Summary plus active urls
//! - POST /webhook/test - Send the sample result to all active configurations
//! - POST /webhook/dispatch - Send a caller-supplied result to all active configurations

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::ocr::ExtractionResult;
use crate::state::AppState;
use crate::webhook::{
    ConfigSummary, DeliveryOutcome, WebhookConfig, WebhookConfigCreate, WebhookConfigUpdate,
};

/// Create the webhook router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/configs", get(list_configs).post(create_config))
        .route("/configs/summary", get(get_summary))
        .route(
            "/configs/:config_id",
            get(get_config).put(update_config).delete(delete_config),
        )
        .route("/configs/:config_id/enable", post(enable_config))
        .route("/configs/:config_id/disable", post(disable_config))
        .route("/configs/:config_id/test", post(test_config))
        .route("/environment", get(get_environment))
        .route("/status", get(get_status))
        .route("/test", post(test_all))
        .route("/dispatch", post(dispatch_result))
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: &str) -> Json<Self> {
        Json(Self {
            message: message.to_string(),
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookStatus {
    pub enabled: bool,
    pub total_configurations: usize,
    pub active_configurations: usize,
    pub disabled_configurations: usize,
    pub last_updated: Option<DateTime<Utc>>,
    pub active_urls: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub webhook_status: WebhookStatus,
    pub timestamp: DateTime<Utc>,
}

/// Service-wide settings, with header values left out
#[derive(Debug, Serialize, Deserialize)]
pub struct EnvironmentInfo {
    pub webhook_enabled: bool,
    pub config_file: String,
    pub max_configs: usize,
    pub allow_external_urls: bool,
    pub default_url: String,
    pub default_method: String,
    pub default_timeout: u64,
    pub default_retry_attempts: u32,
    pub default_retry_delay: u64,
    pub default_header_names: Vec<String>,
    pub has_default_payload_template: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DispatchResponse {
    pub message: String,
    pub total_configs: usize,
    pub results: Vec<DeliveryOutcome>,
}

#[derive(Debug, Deserialize)]
pub struct DispatchRequest {
    pub result: ExtractionResult,
    #[serde(default)]
    pub filename: Option<String>,
}

// ============================================================================
// Configuration Handlers
// ============================================================================

async fn list_configs(State(state): State<AppState>) -> Json<Vec<WebhookConfig>> {
    Json(state.store().list().await)
}

async fn create_config(
    State(state): State<AppState>,
    Json(request): Json<WebhookConfigCreate>,
) -> Result<Json<WebhookConfig>> {
    let config = state.store().create(request).await?;
    Ok(Json(config))
}

async fn get_config(
    State(state): State<AppState>,
    Path(config_id): Path<String>,
) -> Result<Json<WebhookConfig>> {
    Ok(Json(state.store().get(&config_id).await?))
}

async fn update_config(
    State(state): State<AppState>,
    Path(config_id): Path<String>,
    Json(request): Json<WebhookConfigUpdate>,
) -> Result<Json<WebhookConfig>> {
    Ok(Json(state.store().update(&config_id, request).await?))
}

async fn delete_config(
    State(state): State<AppState>,
    Path(config_id): Path<String>,
) -> Result<Json<MessageResponse>> {
    if !state.store().delete(&config_id).await? {
        return Err(AppError::NotFound(format!(
            "Webhook configuration not found: {}",
            config_id
        )));
    }
    Ok(MessageResponse::new("Webhook configuration deleted successfully"))
}

async fn enable_config(
    State(state): State<AppState>,
    Path(config_id): Path<String>,
) -> Result<Json<MessageResponse>> {
    set_enabled(&state, &config_id, true).await?;
    Ok(MessageResponse::new("Webhook configuration enabled successfully"))
}

async fn disable_config(
    State(state): State<AppState>,
    Path(config_id): Path<String>,
) -> Result<Json<MessageResponse>> {
    set_enabled(&state, &config_id, false).await?;
    Ok(MessageResponse::new("Webhook configuration disabled successfully"))
}

async fn set_enabled(state: &AppState, config_id: &str, enabled: bool) -> Result<()> {
    if !state.store().set_enabled(config_id, enabled).await? {
        return Err(AppError::NotFound(format!(
            "Webhook configuration not found: {}",
            config_id
        )));
    }
    Ok(())
}

/// Deliver the sample result to one configuration, enabled or not
async fn test_config(
    State(state): State<AppState>,
    Path(config_id): Path<String>,
) -> Result<Json<DeliveryOutcome>> {
    let config = state.store().get(&config_id).await?;
    if config.url.trim().is_empty() {
        return Err(AppError::BadRequest(format!(
            "Webhook configuration {} has no url",
            config_id
        )));
    }

    let sample = ExtractionResult::sample();
    let outcome = state
        .dispatcher()
        .deliver_to(&config, &sample, sample.filename.as_deref())
        .await;

    Ok(Json(outcome))
}

async fn get_summary(State(state): State<AppState>) -> Json<ConfigSummary> {
    Json(state.store().summary().await)
}

// ============================================================================
// Service Handlers
// ============================================================================

async fn get_environment(State(state): State<AppState>) -> Json<EnvironmentInfo> {
    let settings = &state.config().webhook;

    let mut default_header_names: Vec<String> = settings.default_headers.keys().cloned().collect();
    default_header_names.sort();

    Json(EnvironmentInfo {
        webhook_enabled: settings.enabled,
        config_file: settings.config_file.display().to_string(),
        max_configs: settings.max_configs,
        allow_external_urls: settings.allow_external_urls,
        default_url: settings.default_url.clone(),
        default_method: settings.default_method.clone(),
        default_timeout: settings.default_timeout,
        default_retry_attempts: settings.default_retry_attempts,
        default_retry_delay: settings.default_retry_delay,
        default_header_names,
        has_default_payload_template: settings.default_payload_template.is_some(),
    })
}

async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let summary = state.store().summary().await;
    let active_urls = state
        .store()
        .list_active()
        .await
        .into_iter()
        .map(|c| c.url)
        .collect();

    Json(StatusResponse {
        webhook_status: WebhookStatus {
            enabled: state.dispatcher().is_enabled() && summary.active_configurations > 0,
            total_configurations: summary.total_configurations,
            active_configurations: summary.active_configurations,
            disabled_configurations: summary.disabled_configurations,
            last_updated: summary.last_updated,
            active_urls,
        },
        timestamp: Utc::now(),
    })
}

/// Deliver the sample result to every active configuration
async fn test_all(State(state): State<AppState>) -> Result<Json<DispatchResponse>> {
    if !state.dispatcher().is_enabled() {
        return Err(AppError::BadRequest(
            "Webhook dispatch is disabled (WEBHOOK_ENABLED=false)".to_string(),
        ));
    }

    if state.store().list_active().await.is_empty() {
        return Err(AppError::BadRequest(
            "No webhook configurations found".to_string(),
        ));
    }

    let sample = ExtractionResult::sample();
    let results = state
        .dispatcher()
        .dispatch(&sample, sample.filename.as_deref())
        .await?;

    Ok(Json(DispatchResponse {
        message: "Test webhook sent".to_string(),
        total_configs: results.len(),
        results,
    }))
}

/// Dispatch a caller-supplied extraction result
async fn dispatch_result(
    State(state): State<AppState>,
    Json(request): Json<DispatchRequest>,
) -> Result<Json<DispatchResponse>> {
    let filename = request.filename.or_else(|| request.result.filename.clone());
    let results = state
        .dispatcher()
        .dispatch(&request.result, filename.as_deref())
        .await?;

    Ok(Json(DispatchResponse {
        message: "Extraction result dispatched".to_string(),
        total_configs: results.len(),
        results,
    }))
}
