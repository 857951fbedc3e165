//! Resilient HTTP client for the inventory service
//!
//! Every logical call runs as:
//!
//! ```text
//! circuit breaker (call timeout)
//!   └─ retry with exponential backoff
//!        └─ attempt (per-attempt timeout around send + body read)
//! ```
//!
//! All attempts of one call carry the same `Idempotency-Key` and
//! `X-Request-Id` headers, so the inventory service can turn a retry of a
//! committed mutation into a replay. A timed-out attempt is dropped, which
//! closes its connection.
//!
//! 4xx responses are never retried and count as breaker successes, since the
//! inventory service answered correctly. Network errors, timeouts and 5xx
//! responses are retried and count as failures once the budget is spent.

use std::{
    sync::atomic::{AtomicU32, Ordering},
    time::Duration,
};

use application::ports::{
    InventoryGatewayError, InventoryGatewayPort, InventoryReceipt, InventoryReservation,
};
use async_trait::async_trait;
use domain::IdempotencyToken;
use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitBreakerStats,
    CircuitOpenError, CircuitState,
};
use crate::retry::{RetryConfig, Retryable, retry};

/// Header carrying the idempotency token
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";
/// Header carrying the correlation ID
pub const X_REQUEST_ID: &str = "x-request-id";
/// Inventory mutation endpoint
pub const UPDATE_PATH: &str = "/api/inventory/update";

const MAX_ERROR_MESSAGE_LEN: usize = 200;

/// Configuration for [`ResilientInventoryClient`]
#[derive(Debug, Clone)]
pub struct InventoryClientConfig {
    /// Base URL of the inventory service
    pub base_url: String,
    /// Timeout for a single attempt
    pub request_timeout: Duration,
    /// Retry schedule
    pub retry: RetryConfig,
    /// Breaker wrapping the whole call
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for InventoryClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3002".to_string(),
            request_timeout: Duration::from_secs(5),
            retry: RetryConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

/// Errors returned by the resilient client
#[derive(Debug, Error)]
pub enum ClientError {
    /// The server refused the request, so it did not take effect
    #[error("Inventory service rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The breaker is open and no request was sent
    #[error(transparent)]
    CircuitOpen(#[from] CircuitOpenError),

    /// Retries exhausted, call timed out, or the response was unreadable
    #[error(
        "Inventory service temporarily unavailable (circuit {circuit_state}, {attempts} attempts): {reason}"
    )]
    Unavailable {
        circuit_state: CircuitState,
        attempts: u32,
        reason: String,
    },

    /// The HTTP client could not be constructed
    #[error("Failed to build HTTP client: {0}")]
    Build(String),
}

impl ClientError {
    /// Whether the request may have taken effect
    pub const fn outcome_unknown(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

impl From<ClientError> for InventoryGatewayError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Rejected { status, message } => Self::Rejected { status, message },
            ClientError::CircuitOpen(open) => Self::CircuitOpen {
                service: open.service_name,
            },
            ClientError::Unavailable {
                circuit_state,
                attempts,
                reason,
            } => Self::Unavailable {
                message: reason,
                circuit_state: circuit_state.to_string(),
                attempts,
            },
            ClientError::Build(message) => Self::Unavailable {
                message,
                circuit_state: CircuitState::Closed.to_string(),
                attempts: 0,
            },
        }
    }
}

/// Failure of a single attempt
#[derive(Debug, Error)]
enum AttemptError {
    #[error("request timed out after {0}ms")]
    Timeout(u128),
    #[error("network error: {0}")]
    Network(String),
    #[error("HTTP {status}: {message}")]
    Server { status: u16, message: String },
    #[error("undecodable response body: {0}")]
    Decode(String),
}

impl Retryable for AttemptError {
    fn is_retryable(&self) -> bool {
        !matches!(self, Self::Decode(_))
    }
}

/// A response the breaker treats as success
enum Answer<T> {
    Accepted(T),
    Rejected { status: u16, message: String },
}

/// Snapshot of the client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResilienceConfigSnapshot {
    pub request_timeout_ms: u64,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub call_timeout_ms: u64,
    pub error_threshold_percentage: u8,
    pub reset_timeout_ms: u64,
    pub rolling_window_ms: u64,
    pub volume_threshold: u32,
}

/// Client statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResilienceStats {
    pub state: CircuitState,
    pub stats: CircuitBreakerStats,
    pub config: ResilienceConfigSnapshot,
}

#[derive(Debug, Serialize)]
struct UpdateRequest<'a> {
    product_key: &'a str,
    quantity: u32,
    causal_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    idempotency_token: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct UpdateResponse {
    #[serde(default)]
    replayed: bool,
    update: UpdateRecord,
}

#[derive(Debug, Deserialize)]
struct UpdateRecord {
    product_key: String,
    quantity_before: i64,
    quantity_after: i64,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn error_message(body: &[u8]) -> String {
    if let Ok(parsed) = serde_json::from_slice::<ErrorBody>(body) {
        return parsed.error;
    }
    let text = String::from_utf8_lossy(body);
    text.chars().take(MAX_ERROR_MESSAGE_LEN).collect()
}

/// HTTP client for the inventory service with timeout, retry and breaker
pub struct ResilientInventoryClient {
    http: Client,
    config: InventoryClientConfig,
    breaker: CircuitBreaker,
}

impl std::fmt::Debug for ResilientInventoryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientInventoryClient")
            .field("base_url", &self.config.base_url)
            .field("breaker", &self.breaker)
            .finish_non_exhaustive()
    }
}

impl ResilientInventoryClient {
    /// Create a new client
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Build` if the underlying reqwest client cannot be built.
    pub fn new(config: InventoryClientConfig) -> Result<Self, ClientError> {
        let http = Client::builder()
            .user_agent(format!("StockGuard/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ClientError::Build(e.to_string()))?;
        let breaker = CircuitBreaker::with_config("inventory", config.circuit_breaker.clone());
        Ok(Self {
            http,
            config,
            breaker,
        })
    }

    /// The breaker guarding this client
    pub const fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Current breaker state, statistics and configuration
    pub fn stats(&self) -> ResilienceStats {
        let breaker = self.breaker.config();
        ResilienceStats {
            state: self.breaker.state(),
            stats: self.breaker.stats(),
            config: ResilienceConfigSnapshot {
                request_timeout_ms: duration_ms(self.config.request_timeout),
                max_retries: self.config.retry.max_retries,
                backoff_base_ms: self.config.retry.base_delay_ms,
                call_timeout_ms: duration_ms(breaker.call_timeout),
                error_threshold_percentage: breaker.error_threshold_percentage,
                reset_timeout_ms: duration_ms(breaker.reset_timeout),
                rolling_window_ms: duration_ms(breaker.rolling_window),
                volume_threshold: breaker.volume_threshold,
            },
        }
    }

    /// Make one logical call to the inventory service
    ///
    /// # Errors
    ///
    /// See [`ClientError`]; only `Unavailable` leaves the outcome unknown.
    #[instrument(skip(self, body, token), fields(token = ?token.map(IdempotencyToken::as_str)))]
    pub async fn call<B, T>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        token: Option<&IdempotencyToken>,
    ) -> Result<T, ClientError>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{path}", self.config.base_url.trim_end_matches('/'));
        let request_id = Uuid::now_v7().to_string();
        let attempts = AtomicU32::new(0);

        let outcome = self
            .breaker
            .call(|| {
                retry(&self.config.retry, |attempt| {
                    attempts.store(attempt, Ordering::Relaxed);
                    self.attempt::<B, T>(&method, &url, body, token, &request_id, attempt)
                })
            })
            .await;

        let attempts = attempts.load(Ordering::Relaxed);
        match outcome {
            Ok(Answer::Accepted(value)) => Ok(value),
            Ok(Answer::Rejected { status, message }) => {
                debug!(status, %message, "Inventory service rejected request");
                Err(ClientError::Rejected { status, message })
            },
            Err(CircuitBreakerError::CircuitOpen(open)) => Err(ClientError::CircuitOpen(open)),
            Err(CircuitBreakerError::Timeout(limit)) => Err(self.unavailable(
                attempts,
                format!("call timed out after {}ms", limit.as_millis()),
            )),
            Err(CircuitBreakerError::ServiceError(err)) => {
                Err(self.unavailable(attempts, err.to_string()))
            },
        }
    }

    fn unavailable(&self, attempts: u32, reason: String) -> ClientError {
        let circuit_state = self.breaker.state();
        warn!(%circuit_state, attempts, %reason, "Inventory service unavailable");
        ClientError::Unavailable {
            circuit_state,
            attempts,
            reason,
        }
    }

    async fn attempt<B, T>(
        &self,
        method: &Method,
        url: &str,
        body: Option<&B>,
        token: Option<&IdempotencyToken>,
        request_id: &str,
        attempt: u32,
    ) -> Result<Answer<T>, AttemptError>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let mut request = self
            .http
            .request(method.clone(), url)
            .header(X_REQUEST_ID, request_id);
        if let Some(token) = token {
            request = request.header(IDEMPOTENCY_KEY_HEADER, token.as_str());
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        debug!(attempt, url, "Calling inventory service");

        let exchange = async {
            let response = request.send().await?;
            let status = response.status();
            let bytes = response.bytes().await?;
            Ok::<_, reqwest::Error>((status, bytes))
        };

        let (status, bytes) = match tokio::time::timeout(self.config.request_timeout, exchange).await
        {
            Ok(Ok(exchanged)) => exchanged,
            Ok(Err(err)) => return Err(AttemptError::Network(err.to_string())),
            Err(_) => {
                return Err(AttemptError::Timeout(
                    self.config.request_timeout.as_millis(),
                ));
            },
        };

        classify(status, &bytes)
    }
}

fn classify<T: DeserializeOwned>(status: StatusCode, body: &[u8]) -> Result<Answer<T>, AttemptError> {
    if status.is_success() {
        serde_json::from_slice(body)
            .map(Answer::Accepted)
            .map_err(|e| AttemptError::Decode(e.to_string()))
    } else if status.is_client_error() {
        Ok(Answer::Rejected {
            status: status.as_u16(),
            message: error_message(body),
        })
    } else {
        Err(AttemptError::Server {
            status: status.as_u16(),
            message: error_message(body),
        })
    }
}

#[async_trait]
impl InventoryGatewayPort for ResilientInventoryClient {
    #[instrument(skip(self, reservation), fields(product_key = %reservation.product_key, order_id = %reservation.order_id))]
    async fn reserve(
        &self,
        reservation: &InventoryReservation,
    ) -> Result<InventoryReceipt, InventoryGatewayError> {
        let body = UpdateRequest {
            product_key: reservation.product_key.as_str(),
            quantity: reservation.quantity,
            causal_id: reservation.order_id.to_string(),
            idempotency_token: reservation.idempotency_token.as_ref().map(IdempotencyToken::as_str),
        };

        let response: UpdateResponse = self
            .call(
                Method::POST,
                UPDATE_PATH,
                Some(&body),
                reservation.idempotency_token.as_ref(),
            )
            .await?;

        Ok(InventoryReceipt {
            product_key: response.update.product_key,
            quantity_before: response.update.quantity_before,
            quantity_after: response.update.quantity_after,
            replayed: response.replayed,
        })
    }
}
