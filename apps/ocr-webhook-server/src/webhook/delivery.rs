//! Delivery Executor
//!
//! Sends one payload to one destination with a per-attempt timeout and
//! exponential backoff between attempts. Failures are reported, never raised.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use serde_json::Value;

use super::types::WebhookConfig;

/// Response codes that count as delivered
pub const SUCCESS_STATUSES: &[u16] = &[200, 201, 202];

// ============================================================================
// Transport
// ============================================================================

/// A fully resolved outbound call
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Value,
    pub timeout: Duration,
}

/// Single-attempt delivery errors
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Unexpected response status: {0}")]
    UnexpectedStatus(u16),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Request failed: {0}")]
    Request(String),
}

/// Performs one HTTP attempt and returns the response status
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn send(&self, request: &OutboundRequest) -> Result<u16, DeliveryError>;
}

/// reqwest-backed transport
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WebhookTransport for HttpTransport {
    async fn send(&self, request: &OutboundRequest) -> Result<u16, DeliveryError> {
        let response = self
            .client
            .request(request.method.clone(), &request.url)
            .headers(request.headers.clone())
            .json(&request.body)
            .timeout(request.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DeliveryError::Timeout(request.timeout.as_secs())
                } else if e.is_connect() {
                    DeliveryError::Connection(e.to_string())
                } else {
                    DeliveryError::Request(e.to_string())
                }
            })?;

        Ok(response.status().as_u16())
    }
}

// ============================================================================
// Executor
// ============================================================================

/// What happened across all attempts for one destination
#[derive(Debug, Clone)]
pub struct DeliveryReport {
    pub success: bool,
    pub attempts: u32,
    pub last_error: Option<String>,
}

/// Retrying sender shared by all deliveries
#[derive(Clone)]
pub struct DeliveryExecutor {
    transport: Arc<dyn WebhookTransport>,
}

impl DeliveryExecutor {
    pub fn new(transport: Arc<dyn WebhookTransport>) -> Self {
        Self { transport }
    }

    /// Executor over a plain reqwest client
    pub fn http() -> Self {
        Self::new(Arc::new(HttpTransport::new()))
    }

    /// Deliver `payload`, returning whether any attempt succeeded
    pub async fn send(&self, config: &WebhookConfig, payload: &Value) -> bool {
        self.deliver(config, payload).await.success
    }

    /// Deliver `payload` with retries.
    ///
    /// Makes up to `retry_attempts` attempts; attempt `i` failing waits
    /// `retry_delay * 2^i` seconds before the next one.
    pub async fn deliver(&self, config: &WebhookConfig, payload: &Value) -> DeliveryReport {
        let request = match build_request(config, payload) {
            Ok(request) => request,
            Err(e) => {
                tracing::error!(config_id = %config.id, error = %e, "Cannot build webhook request");
                return DeliveryReport {
                    success: false,
                    attempts: 0,
                    last_error: Some(e.to_string()),
                };
            }
        };

        let max_attempts = config.retry_attempts;
        let mut last_error = None;

        for attempt in 0..max_attempts {
            match self.transport.send(&request).await {
                Ok(status) if SUCCESS_STATUSES.contains(&status) => {
                    tracing::info!(
                        config_id = %config.id,
                        name = %config.name,
                        status = status,
                        attempt = attempt + 1,
                        "Webhook delivered"
                    );
                    return DeliveryReport {
                        success: true,
                        attempts: attempt + 1,
                        last_error: None,
                    };
                }
                Ok(status) => {
                    tracing::warn!(
                        config_id = %config.id,
                        status = status,
                        attempt = attempt + 1,
                        "Webhook attempt rejected"
                    );
                    last_error = Some(DeliveryError::UnexpectedStatus(status).to_string());
                }
                Err(e) => {
                    tracing::warn!(
                        config_id = %config.id,
                        error = %e,
                        attempt = attempt + 1,
                        "Webhook attempt failed"
                    );
                    last_error = Some(e.to_string());
                }
            }

            if attempt + 1 < max_attempts {
                let wait = backoff_delay(config.retry_delay, attempt);
                tracing::debug!(
                    config_id = %config.id,
                    wait_secs = wait.as_secs(),
                    "Waiting before webhook retry"
                );
                tokio::time::sleep(wait).await;
            }
        }

        tracing::error!(
            config_id = %config.id,
            name = %config.name,
            attempts = max_attempts,
            "Webhook delivery failed"
        );

        DeliveryReport {
            success: false,
            attempts: max_attempts,
            last_error: Some(
                last_error.unwrap_or_else(|| "no delivery attempts configured".to_string()),
            ),
        }
    }
}

/// Wait after failed attempt `attempt` (0-indexed)
pub fn backoff_delay(retry_delay: u64, attempt: u32) -> Duration {
    let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
    Duration::from_secs(retry_delay.saturating_mul(factor))
}

/// Longest a delivery to `config` can take: every attempt timing out plus all backoff
pub fn worst_case_duration(config: &WebhookConfig) -> Duration {
    let attempts = config.retry_attempts;
    let timeouts = Duration::from_secs(config.timeout.saturating_mul(u64::from(attempts)));

    (0..attempts.saturating_sub(1))
        .map(|attempt| backoff_delay(config.retry_delay, attempt))
        .fold(timeouts, |total, wait| total.saturating_add(wait))
}

/// Resolve method, headers and body for `config`
pub fn build_request(config: &WebhookConfig, payload: &Value) -> Result<OutboundRequest, DeliveryError> {
    let method = Method::from_bytes(config.method.as_bytes())
        .map_err(|_| DeliveryError::InvalidRequest(format!("invalid method {}", config.method)))?;

    let mut headers = HeaderMap::new();
    for (name, value) in &config.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| DeliveryError::InvalidRequest(format!("invalid header name {name}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| DeliveryError::InvalidRequest(format!("invalid value for header {name}")))?;
        headers.insert(name, value);
    }

    if !headers.contains_key(CONTENT_TYPE) {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }

    Ok(OutboundRequest {
        method,
        url: config.url.clone(),
        headers,
        body: payload.clone(),
        timeout: Duration::from_secs(config.timeout),
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;
    use tokio::time::Instant;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Replays scripted attempt results, then answers 500
    struct ScriptedTransport {
        script: Mutex<VecDeque<Result<u16, DeliveryError>>>,
        calls: Mutex<Vec<Instant>>,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Result<u16, DeliveryError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl WebhookTransport for ScriptedTransport {
        async fn send(&self, _request: &OutboundRequest) -> Result<u16, DeliveryError> {
            self.calls.lock().unwrap().push(Instant::now());
            self.script.lock().unwrap().pop_front().unwrap_or(Ok(500))
        }
    }

    fn config(url: &str, retry_attempts: u32, retry_delay: u64) -> WebhookConfig {
        let now = Utc::now();
        WebhookConfig {
            id: "cfg-1".to_string(),
            name: "n8n".to_string(),
            url: url.to_string(),
            method: "POST".to_string(),
            enabled: true,
            headers: HashMap::new(),
            payload_template: None,
            timeout: 5,
            retry_attempts,
            retry_delay,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_backoff_delay() {
        assert_eq!(backoff_delay(1, 0), Duration::from_secs(1));
        assert_eq!(backoff_delay(1, 1), Duration::from_secs(2));
        assert_eq!(backoff_delay(3, 2), Duration::from_secs(12));
        assert_eq!(backoff_delay(0, 5), Duration::ZERO);
        assert_eq!(backoff_delay(2, 80), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_worst_case_duration() {
        // 3 x 5s timeouts + 1s + 2s backoff
        let cfg = config("http://localhost", 3, 1);
        assert_eq!(worst_case_duration(&cfg), Duration::from_secs(18));

        let cfg = config("http://localhost", 0, 1);
        assert_eq!(worst_case_duration(&cfg), Duration::ZERO);
    }

    #[test]
    fn test_build_request_defaults_content_type() {
        let cfg = config("http://localhost/hook", 1, 0);
        let request = build_request(&cfg, &json!({})).unwrap();
        assert_eq!(request.headers[CONTENT_TYPE], "application/json");
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.timeout, Duration::from_secs(5));

        let mut cfg = config("http://localhost/hook", 1, 0);
        cfg.headers.insert("content-type".to_string(), "text/plain".to_string());
        let request = build_request(&cfg, &json!({})).unwrap();
        assert_eq!(request.headers[CONTENT_TYPE], "text/plain");
        assert_eq!(request.headers.get_all(CONTENT_TYPE).iter().count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_between_failed_attempts() {
        let transport = ScriptedTransport::new(vec![]);
        let executor = DeliveryExecutor::new(transport.clone());

        let report = executor.deliver(&config("http://localhost/hook", 3, 1), &json!({})).await;

        assert!(!report.success);
        assert_eq!(report.attempts, 3);
        assert!(report.last_error.unwrap().contains("500"));

        let calls = transport.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[1] - calls[0], Duration::from_secs(1));
        assert_eq!(calls[2] - calls[1], Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_stops_retries() {
        let transport = ScriptedTransport::new(vec![
            Err(DeliveryError::Connection("refused".to_string())),
            Ok(202),
        ]);
        let executor = DeliveryExecutor::new(transport.clone());
        let start = Instant::now();

        assert!(executor.send(&config("http://localhost/hook", 5, 2), &json!({})).await);
        assert_eq!(transport.calls().len(), 2);
        assert_eq!(Instant::now() - start, Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_attempts_never_sends() {
        let transport = ScriptedTransport::new(vec![Ok(200)]);
        let executor = DeliveryExecutor::new(transport.clone());

        let report = executor.deliver(&config("http://localhost/hook", 0, 1), &json!({})).await;

        assert!(!report.success);
        assert_eq!(report.attempts, 0);
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_http_delivery_sends_json_body() {
        let mock_server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path("/webhook"))
            .and(header("content-type", "application/json"))
            .and(header("x-api-key", "k-123"))
            .and(body_json(json!({"hello": "world"})))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&mock_server)
            .await;

        let mut cfg = config(&format!("{}/webhook", mock_server.uri()), 3, 0);
        cfg.method = "PUT".to_string();
        cfg.headers.insert("X-Api-Key".to_string(), "k-123".to_string());

        let executor = DeliveryExecutor::http();
        let report = executor.deliver(&cfg, &json!({"hello": "world"})).await;

        assert!(report.success);
        assert_eq!(report.attempts, 1);
        mock_server.verify().await;
    }

    #[tokio::test]
    async fn test_http_non_success_status_is_retried() {
        let mock_server = MockServer::start().await;

        // 204 is a 2xx but not an accepted delivery status
        Mock::given(method("POST"))
            .and(path("/webhook"))
            .respond_with(ResponseTemplate::new(204))
            .expect(3)
            .mount(&mock_server)
            .await;

        let cfg = config(&format!("{}/webhook", mock_server.uri()), 3, 0);
        let report = DeliveryExecutor::http().deliver(&cfg, &json!({})).await;

        assert!(!report.success);
        assert_eq!(report.attempts, 3);
        mock_server.verify().await;
    }

    #[tokio::test]
    async fn test_http_timeout_is_failure() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&mock_server)
            .await;

        let mut cfg = config(&format!("{}/slow", mock_server.uri()), 1, 0);
        cfg.timeout = 1;

        let report = DeliveryExecutor::http().deliver(&cfg, &json!({})).await;

        assert!(!report.success);
        assert!(report.last_error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_connection_refused_is_failure() {
        // Bind then drop to get a port with nothing listening
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let cfg = config(&format!("http://127.0.0.1:{port}/hook"), 2, 0);
        let executor = DeliveryExecutor::http();

        assert!(!executor.send(&cfg, &json!({})).await);
    }
}
