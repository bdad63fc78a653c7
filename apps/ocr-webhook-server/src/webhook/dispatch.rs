//! Dispatch Coordinator
//!
//! Fans an extraction result out to every active destination, one task per
//! destination, and collects one outcome per destination. Delivery problems
//! become failed outcomes; only an unavailable config source is an error.

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use tokio::task::JoinHandle;

use super::delivery::{worst_case_duration, DeliveryExecutor};
use super::payload::build_payload;
use super::store::ConfigSource;
use super::types::{DeliveryOutcome, WebhookConfig, WebhookError};
use crate::ocr::ExtractionResult;

/// Delivers extraction results to configured webhooks
#[derive(Clone)]
pub struct Dispatcher {
    source: Arc<dyn ConfigSource>,
    executor: DeliveryExecutor,
    enabled: bool,
}

impl Dispatcher {
    pub fn new(source: Arc<dyn ConfigSource>, executor: DeliveryExecutor) -> Self {
        Self {
            source,
            executor,
            enabled: true,
        }
    }

    /// Turn dispatch on or off service-wide
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Deliver `result` to every active configuration.
    ///
    /// Returns one outcome per active configuration, in configuration order.
    pub async fn dispatch(
        &self,
        result: &ExtractionResult,
        filename: Option<&str>,
    ) -> Result<Vec<DeliveryOutcome>, WebhookError> {
        if !self.enabled {
            tracing::debug!("Webhook dispatch disabled, skipping");
            return Ok(Vec::new());
        }

        let configs = self.source.active_configs().await?;
        if configs.is_empty() {
            tracing::warn!(filename = ?filename, "No active webhook configurations found");
            return Ok(Vec::new());
        }

        let deadline = configs.iter().map(worst_case_duration).max().unwrap_or_default();
        tracing::debug!(
            filename = ?filename,
            destinations = configs.len(),
            deadline_secs = deadline.as_secs(),
            "Dispatching extraction result"
        );

        let result = Arc::new(result.clone());
        let filename: Option<Arc<str>> = filename.map(Arc::from);

        let tasks: Vec<(WebhookConfig, JoinHandle<DeliveryOutcome>)> = configs
            .into_iter()
            .map(|config| {
                let executor = self.executor.clone();
                let result = Arc::clone(&result);
                let filename = filename.clone();
                let task_config = config.clone();

                let handle = tokio::spawn(async move {
                    deliver(&executor, &task_config, &result, filename.as_deref()).await
                });

                (config, handle)
            })
            .collect();

        let (configs, handles): (Vec<_>, Vec<_>) = tasks.into_iter().unzip();
        let joined = join_all(handles).await;

        let outcomes: Vec<DeliveryOutcome> = configs
            .into_iter()
            .zip(joined)
            .map(|(config, joined)| match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(config_id = %config.id, error = %e, "Webhook delivery task failed");
                    DeliveryOutcome {
                        config_id: config.id,
                        config_name: config.name,
                        url: config.url,
                        success: false,
                        attempts: 0,
                        error: Some(format!("delivery task failed: {e}")),
                        timestamp: Utc::now(),
                    }
                }
            })
            .collect();

        let delivered = outcomes.iter().filter(|o| o.success).count();
        tracing::info!(
            filename = ?filename,
            delivered = delivered,
            failed = outcomes.len() - delivered,
            "Webhook dispatch completed"
        );

        Ok(outcomes)
    }

    /// Deliver `result` to one configuration regardless of its enabled flag
    pub async fn deliver_to(
        &self,
        config: &WebhookConfig,
        result: &ExtractionResult,
        filename: Option<&str>,
    ) -> DeliveryOutcome {
        deliver(&self.executor, config, result, filename).await
    }

    /// Run [`Dispatcher::dispatch`] on its own task, logging the outcome
    pub fn dispatch_in_background(
        &self,
        result: ExtractionResult,
        filename: Option<String>,
    ) -> JoinHandle<()> {
        let dispatcher = self.clone();

        tokio::spawn(async move {
            match dispatcher.dispatch(&result, filename.as_deref()).await {
                Ok(outcomes) => {
                    for outcome in outcomes.iter().filter(|o| !o.success) {
                        tracing::warn!(
                            config_id = %outcome.config_id,
                            url = %outcome.url,
                            error = ?outcome.error,
                            "Webhook not delivered"
                        );
                    }
                }
                Err(e) => {
                    tracing::error!(filename = ?filename, error = %e, "Webhook dispatch failed");
                }
            }
        })
    }
}

async fn deliver(
    executor: &DeliveryExecutor,
    config: &WebhookConfig,
    result: &ExtractionResult,
    filename: Option<&str>,
) -> DeliveryOutcome {
    let payload = build_payload(config, result, filename);
    let report = executor.deliver(config, &payload).await;

    DeliveryOutcome {
        config_id: config.id.clone(),
        config_name: config.name.clone(),
        url: config.url.clone(),
        success: report.success,
        attempts: report.attempts,
        error: if report.success { None } else { report.last_error },
        timestamp: Utc::now(),
    }
}

// ============================================================================
// Tests
// ============================================================================
