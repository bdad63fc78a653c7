//! Application state management

use std::sync::Arc;

use crate::config::Config;
use crate::webhook::{DeliveryExecutor, Dispatcher, WebhookConfigStore, WebhookError};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    store: WebhookConfigStore,
    dispatcher: Dispatcher,
}

impl AppState {
    /// Open the webhook store and wire the dispatcher to it.
    ///
    /// Seeds a default webhook from the environment when the store is empty.
    pub async fn new(config: Config) -> Result<Self, WebhookError> {
        let store = WebhookConfigStore::open(config.webhook.clone()).await?;

        if let Some(seeded) = store.seed_default().await? {
            tracing::info!(url = %seeded.url, "Seeded default webhook from environment");
        }

        Ok(Self::with_store(config, store, DeliveryExecutor::http()))
    }

    /// Build state around an already opened store
    pub fn with_store(config: Config, store: WebhookConfigStore, executor: DeliveryExecutor) -> Self {
        let dispatcher = Dispatcher::new(Arc::new(store.clone()), executor)
            .with_enabled(config.webhook.enabled);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                store,
                dispatcher,
            }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the webhook configuration store
    pub fn store(&self) -> &WebhookConfigStore {
        &self.inner.store
    }

    /// Get the webhook dispatcher
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }
}
