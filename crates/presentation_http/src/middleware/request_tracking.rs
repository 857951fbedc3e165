//! Request tracking middleware
//!
//! Gives every request a correlation ID and a tracing span, echoes the ID on
//! the response, and feeds the request counters of [`MetricsCollector`].

use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Instant,
};

use axum::{body::Body, extract::Request, http::header::HeaderValue, response::Response};
use tower::{Layer, Service};
use tracing::Instrument;
use uuid::Uuid;

use crate::handlers::metrics::MetricsCollector;

/// The header name for the request ID
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Layer that tags and counts HTTP requests
#[derive(Debug, Clone)]
pub struct RequestTrackingLayer {
    metrics: Arc<MetricsCollector>,
}

impl RequestTrackingLayer {
    /// Create a tracking layer reporting into `metrics`
    #[must_use]
    pub const fn new(metrics: Arc<MetricsCollector>) -> Self {
        Self { metrics }
    }
}

impl<S> Layer<S> for RequestTrackingLayer {
    type Service = RequestTrackingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestTrackingService {
            inner,
            metrics: Arc::clone(&self.metrics),
        }
    }
}

/// Service produced by [`RequestTrackingLayer`]
#[derive(Debug, Clone)]
pub struct RequestTrackingService<S> {
    inner: S,
    metrics: Arc<MetricsCollector>,
}

/// Marks a request as finished when dropped without a response
struct InFlight {
    metrics: Arc<MetricsCollector>,
    started: Instant,
    finished: bool,
}

impl InFlight {
    fn start(metrics: Arc<MetricsCollector>) -> Self {
        metrics.request_start();
        Self {
            metrics,
            started: Instant::now(),
            finished: false,
        }
    }

    fn finish(mut self, status: u16) {
        let elapsed_us = u64::try_from(self.started.elapsed().as_micros()).unwrap_or(u64::MAX);
        self.metrics.request_end(elapsed_us, status);
        self.finished = true;
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if !self.finished {
            self.metrics.request_abandoned();
        }
    }
}

impl<S> Service<Request<Body>> for RequestTrackingService<S>
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

    fn call(&mut self, mut request: Request<Body>) -> Self::Future {
        let request_id = request
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| Uuid::parse_str(s).ok())
            .unwrap_or_else(Uuid::now_v7);

        request.extensions_mut().insert(RequestId(request_id));

        let span = tracing::info_span!(
            "http_request",
            request_id = %request_id,
            method = %request.method(),
            uri = %request.uri().path(),
        );

        let in_flight = InFlight::start(Arc::clone(&self.metrics));
        let mut inner = self.inner.clone();

        Box::pin(
            async move {
                let mut response = inner.call(request).await?;
                in_flight.finish(response.status().as_u16());

                if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
                    response.headers_mut().insert(REQUEST_ID_HEADER, value);
                }

                Ok(response)
            }
            .instrument(span),
        )
    }
}

/// Request ID extracted from the request headers or generated
#[derive(Debug, Clone, Copy)]
pub struct RequestId(pub Uuid);

impl RequestId {
    /// Get the request ID as a UUID
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
