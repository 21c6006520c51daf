//! Tracing middleware: one `api_request` span per request, tagged with a
//! request id.
//!
//! The id comes from the `x-request-id` header when it holds a UUID,
//! otherwise a UUID v7 is generated. It is echoed back on the response.

use crate::domain::correlation::RequestId;
use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    response::Response,
};
use std::task::{Context, Poll};
use std::time::Instant;
use tower::{Layer, Service};
use tracing::{info, info_span, Instrument, Span};

/// Request id header, read and echoed
pub static REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Tracing layer that creates spans for each request
#[derive(Clone, Default)]
pub struct TracingLayer;

impl TracingLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for TracingLayer {
    type Service = TracingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TracingService { inner }
    }
}

/// Tracing service
#[derive(Clone)]
pub struct TracingService<S> {
    inner: S,
}

impl<S> Service<Request<Body>> for TracingService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let mut inner = self.inner.clone();

        let request_id = RequestId::from_header(
            req.headers()
                .get(&REQUEST_ID_HEADER)
                .and_then(|v| v.to_str().ok()),
        );
        let method = req.method().clone();
        let uri = req.uri().clone();

        let span = info_span!(
            "api_request",
            request_id = %request_id,
            http.method = %method,
            http.target = %uri.path(),
            http.status_code = tracing::field::Empty,
        );

        Box::pin(
            async move {
                let start = Instant::now();
                let mut result = inner.call(req).await;

                if let Ok(response) = &mut result {
                    let status = response.status();
                    Span::current().record("http.status_code", status.as_u16());
                    info!(
                        status = status.as_u16(),
                        latency_ms = start.elapsed().as_millis() as u64,
                        "Request completed"
                    );
                    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
                        response
                            .headers_mut()
                            .insert(REQUEST_ID_HEADER.clone(), value);
                    }
                }

                result
            }
            .instrument(span),
        )
    }
}
