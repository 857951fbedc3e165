//! Fault injection middleware
//!
//! Applies the [`FaultInjector`] decisions to mutating requests:
//!
//! - the latency policy suspends the request before the handler runs and
//!   tags the response with `X-Gremlin-Delay`;
//! - the crash policy acts on the handler's 2xx response, after the stock
//!   change has been committed, by aborting the connection, swapping in a
//!   500, or never answering.
//!
//! Read-only requests, health, metrics and the gremlin admin endpoints pass
//! through untouched.

use std::{
    future::Future,
    io,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use axum::{
    Json,
    body::{Body, Bytes},
    extract::Request,
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
};
use infrastructure::{CrashMode, FaultInjector};
use serde_json::json;
use tower::{Layer, Service};

use crate::handlers::metrics::MetricsCollector;

/// Header carrying the injected delay in milliseconds
pub const GREMLIN_DELAY_HEADER: &str = "X-Gremlin-Delay";

const EXEMPT_PATHS: [&str; 3] = ["/", "/health", "/metrics"];
const GREMLIN_PREFIX: &str = "/api/gremlin/";

/// Whether fault policies apply to a request
pub fn is_fault_target(method: &Method, path: &str) -> bool {
    let mutating = matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    );
    mutating && !EXEMPT_PATHS.contains(&path) && !path.starts_with(GREMLIN_PREFIX)
}

/// Layer applying latency and crash faults
#[derive(Debug, Clone)]
pub struct FaultInjectionLayer {
    injector: Arc<FaultInjector>,
    metrics: Arc<MetricsCollector>,
}

impl FaultInjectionLayer {
    /// Create a layer driven by `injector`
    #[must_use]
    pub const fn new(injector: Arc<FaultInjector>, metrics: Arc<MetricsCollector>) -> Self {
        Self { injector, metrics }
    }
}

impl<S> Layer<S> for FaultInjectionLayer {
    type Service = FaultInjectionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        FaultInjectionService {
            inner,
            injector: Arc::clone(&self.injector),
            metrics: Arc::clone(&self.metrics),
        }
    }
}

/// Service produced by [`FaultInjectionLayer`]
#[derive(Debug, Clone)]
pub struct FaultInjectionService<S> {
    inner: S,
    injector: Arc<FaultInjector>,
    metrics: Arc<MetricsCollector>,
}

impl<S> Service<Request<Body>> for FaultInjectionService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let mut inner = self.inner.clone();

        if !is_fault_target(request.method(), request.uri().path()) {
            return Box::pin(async move { inner.call(request).await });
        }

        // Both counters advance on arrival, in request order.
        let delay = self.injector.latency_decision();
        let ticket = self.injector.crash_ticket();
        let injector = Arc::clone(&self.injector);
        let metrics = Arc::clone(&self.metrics);

        Box::pin(async move {
            if let Some(delay) = delay {
                metrics.record_gremlin_activation();
                tokio::time::sleep(delay).await;
            }

            let mut response = inner.call(request).await?;

            if let Some(delay) = delay {
                if let Ok(value) = HeaderValue::from_str(&delay.as_millis().to_string()) {
                    response.headers_mut().insert(GREMLIN_DELAY_HEADER, value);
                }
            }

            let Some(ticket) = ticket else {
                return Ok(response);
            };
            if !response.status().is_success() {
                return Ok(response);
            }

            match injector.crash_decision(ticket) {
                None => Ok(response),
                Some(mode) => {
                    metrics.record_crash_simulation();
                    Ok(crash(mode).await)
                },
            }
        })
    }
}

/// Replace a committed response according to the crash mode
async fn crash(mode: CrashMode) -> Response {
    match mode {
        CrashMode::ConnectionAbort => aborted_response(),
        CrashMode::ErrorSubstitution => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "error": "Simulated crash after commit",
                "code": "simulated_crash",
            })),
        )
            .into_response(),
        CrashMode::Hang => std::future::pending().await,
    }
}

/// A response whose body fails before yielding any bytes
///
/// The server drops the connection when the body errors, so the client sees
/// the transport close without a status line.
fn aborted_response() -> Response {
    let stream = futures::stream::once(async {
        Err::<Bytes, io::Error>(io::Error::new(
            io::ErrorKind::ConnectionAborted,
            "simulated crash after commit",
        ))
    });
    Response::new(Body::from_stream(stream))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::{
        Router,
        routing::{get, post},
    };
    use infrastructure::{CrashPolicy, LatencyPolicy, TriggerPattern};
    use tower::ServiceExt;

    use super::*;

    fn app(injector: FaultInjector) -> (Router, Arc<FaultInjector>, Arc<MetricsCollector>) {
        let injector = Arc::new(injector);
        let metrics = Arc::new(MetricsCollector::new());
        let router = Router::new()
            .route("/api/inventory/update", post(|| async { "committed" }))
            .route("/api/inventory/reject", post(|| async { StatusCode::CONFLICT }))
            .route("/api/inventory", get(|| async { "listing" }))
            .route("/api/gremlin/reset", post(|| async { "reset" }))
            .layer(FaultInjectionLayer::new(
                Arc::clone(&injector),
                Arc::clone(&metrics),
            ));
        (router, injector, metrics)
    }

    fn every(frequency: u64, mode: CrashMode) -> FaultInjector {
        FaultInjector::new(
            LatencyPolicy::default(),
            CrashPolicy {
                enabled: true,
                frequency,
                pattern: TriggerPattern::Deterministic,
                mode,
                ..CrashPolicy::default()
            },
        )
    }

    fn post_to(uri: &str) -> Request<Body> {
        axum::http::Request::builder()
            .method(Method::POST)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn only_mutating_business_requests_are_targets() {
        assert!(is_fault_target(&Method::POST, "/api/inventory/update"));
        assert!(is_fault_target(&Method::DELETE, "/api/orders/1"));
        assert!(!is_fault_target(&Method::GET, "/api/inventory"));
        assert!(!is_fault_target(&Method::POST, "/health"));
        assert!(!is_fault_target(&Method::POST, "/api/gremlin/reset"));
        assert!(!is_fault_target(&Method::POST, "/"));
    }

    #[tokio::test]
    async fn error_substitution_replaces_success() {
        let (router, injector, metrics) = app(every(1, CrashMode::ErrorSubstitution));

        let response = router.oneshot(post_to("/api/inventory/update")).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(injector.crash_stats().activations, 1);
        assert_eq!(metrics.crash_simulations(), 1);
    }

    #[tokio::test]
    async fn crash_skips_failed_responses_but_counts_them() {
        let (router, injector, _) = app(every(1, CrashMode::ErrorSubstitution));

        let response = router.oneshot(post_to("/api/inventory/reject")).await.unwrap();

        assert_eq!(response.status(), StatusCode::CONFLICT);
        let stats = injector.crash_stats();
        assert_eq!(stats.total_requests, 1);
        assert_eq!(stats.activations, 0);
    }

    #[tokio::test]
    async fn deterministic_crash_fires_on_every_nth_request() {
        let (router, injector, _) = app(every(3, CrashMode::ErrorSubstitution));

        let mut statuses = Vec::new();
        for _ in 0..6 {
            let response = router
                .clone()
                .oneshot(post_to("/api/inventory/update"))
                .await
                .unwrap();
            statuses.push(response.status().as_u16());
        }

        assert_eq!(statuses, vec![200, 200, 500, 200, 200, 500]);
        assert_eq!(injector.crash_stats().activations, 2);
    }

    #[tokio::test]
    async fn connection_abort_body_fails_before_any_bytes() {
        let (router, _, _) = app(every(1, CrashMode::ConnectionAbort));

        let response = router.oneshot(post_to("/api/inventory/update")).await.unwrap();

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await;
        assert!(body.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn hang_never_completes() {
        let (router, _, _) = app(every(1, CrashMode::Hang));

        let pending = tokio::time::timeout(
            Duration::from_secs(60),
            router.oneshot(post_to("/api/inventory/update")),
        )
        .await;

        assert!(pending.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn latency_delays_and_tags_response() {
        let injector = FaultInjector::new(
            LatencyPolicy {
                enabled: true,
                latency_ms: 3000,
                frequency: 1,
                pattern: TriggerPattern::Deterministic,
            },
            CrashPolicy::default(),
        );
        let (router, _, metrics) = app(injector);
        let started = tokio::time::Instant::now();

        let response = router.oneshot(post_to("/api/inventory/update")).await.unwrap();

        assert!(started.elapsed() >= Duration::from_millis(3000));
        assert_eq!(response.headers()[GREMLIN_DELAY_HEADER], "3000");
        assert_eq!(metrics.gremlin_activations(), 1);
    }

    #[tokio::test]
    async fn reads_and_admin_calls_are_not_counted() {
        let (router, injector, _) = app(every(1, CrashMode::ErrorSubstitution));

        let listing = router
            .clone()
            .oneshot(
                axum::http::Request::builder()
                    .uri("/api/inventory")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let reset = router.oneshot(post_to("/api/gremlin/reset")).await.unwrap();

        assert_eq!(listing.status(), StatusCode::OK);
        assert_eq!(reset.status(), StatusCode::OK);
        assert_eq!(injector.crash_stats().total_requests, 0);
    }
}
