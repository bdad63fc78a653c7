//! Webhook Module
//!
//! Forwards extraction results to externally configured webhook endpoints.
//!
//! - `store`: file-backed registry of destination configurations
//! - `payload`: default payload, template overlay and placeholder substitution
//! - `delivery`: HTTP sending with timeout, retry and exponential backoff
//! - `dispatch`: fan-out to all active destinations with per-destination outcomes
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ocr_webhook_server::webhook::{DeliveryExecutor, Dispatcher, WebhookConfigStore};
//!
//! let store = WebhookConfigStore::open(settings).await?;
//! let dispatcher = Dispatcher::new(Arc::new(store.clone()), DeliveryExecutor::http());
//!
//! // After extraction finishes; never blocks the caller's response
//! dispatcher.dispatch_in_background(result, Some("scan.png".to_string()));
//! ```

mod delivery;
mod dispatch;
mod payload;
mod store;
mod types;

pub use delivery::{
    backoff_delay, build_request, worst_case_duration, DeliveryError, DeliveryExecutor,
    DeliveryReport, HttpTransport, OutboundRequest, WebhookTransport, SUCCESS_STATUSES,
};
pub use dispatch::Dispatcher;
pub use payload::{build_payload, file_type, shallow_merge, PayloadError, PAYLOAD_SOURCE};
pub use store::{ConfigSource, WebhookConfigStore};
pub use types::{
    ConfigSummary, DeliveryOutcome, WebhookConfig, WebhookConfigCreate, WebhookConfigUpdate,
    WebhookError, SUPPORTED_METHODS,
};
