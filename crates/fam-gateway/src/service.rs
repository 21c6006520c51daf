//! Gateway service - main entry point.
//!
//! Provides the public lookup API and the localhost admin API.

use crate::domain::cache::{sweep_task, TtlCache};
use crate::domain::config::GatewayConfig;
use crate::domain::error::{ApiError, GatewayError, LookupError};
use crate::domain::parse::{FamResponseParser, ResponseParser};
use crate::domain::pending::PendingReplyStore;
use crate::domain::rate_limit::RateLimiter;
use crate::domain::types::{HealthResponse, LookupOutcome, ServiceInfo};
use crate::facade::LookupFacade;
use crate::ipc::handler::LookupOrchestrator;
use crate::ipc::session::SessionHandle;
use crate::middleware::{create_cors_layer, GatewayMetrics, TracingLayer};
use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use shared_channel::MessageChannel;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

/// Gateway service state
pub struct ApiGatewayService {
    config: GatewayConfig,
    facade: Arc<LookupFacade>,
    session: Arc<SessionHandle>,
    pending_store: Arc<PendingReplyStore>,
}

impl ApiGatewayService {
    /// Create a service that parses replies with [`FamResponseParser`]
    pub fn new(
        config: GatewayConfig,
        channel: Arc<dyn MessageChannel>,
    ) -> Result<Self, GatewayError> {
        let parser = FamResponseParser::new().map_err(|e| GatewayError::Config(e.to_string()))?;
        Self::with_parser(config, channel, Arc::new(parser))
    }

    /// Create a service with a custom reply parser
    pub fn with_parser(
        config: GatewayConfig,
        channel: Arc<dyn MessageChannel>,
        parser: Arc<dyn ResponseParser>,
    ) -> Result<Self, GatewayError> {
        // Validate configuration
        config
            .validate()
            .map_err(|e| GatewayError::Config(e.to_string()))?;

        let pending_store = Arc::new(PendingReplyStore::new());

        let session = Arc::new(SessionHandle::new(
            Arc::clone(&channel),
            Arc::clone(&pending_store),
            config.channel.session_name.clone(),
            config.channel.dialog_scan_limit,
            config.channel.inbox_capacity,
        ));

        let orchestrator = Arc::new(LookupOrchestrator::new(
            Arc::clone(&session),
            channel,
            Arc::clone(&pending_store),
            parser,
            config.timeouts.clone(),
            &config.channel,
        ));

        let facade = Arc::new(LookupFacade::new(
            orchestrator,
            Arc::new(TtlCache::from_config(&config.cache)),
            Arc::new(RateLimiter::new(config.rate_limit.clone())),
            Arc::new(GatewayMetrics::new()),
        ));

        Ok(Self {
            config,
            facade,
            session,
            pending_store,
        })
    }

    /// Bind both servers and serve until `shutdown` resolves.
    pub async fn start<F>(self, shutdown: F) -> Result<(), GatewayError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!(version = crate::VERSION, "Starting FAM gateway...");

        // Bind every socket before any background task starts
        let admin_listener = if self.config.admin.enabled {
            let admin_addr = self.config.admin_addr();
            let listener = tokio::net::TcpListener::bind(admin_addr)
                .await
                .map_err(|e| GatewayError::Bind(format!("{admin_addr}: {e}")))?;
            Some((admin_addr, listener))
        } else {
            None
        };

        let http_addr = self.config.http_addr();
        let listener = tokio::net::TcpListener::bind(http_addr)
            .await
            .map_err(|e| GatewayError::Bind(format!("{http_addr}: {e}")))?;

        let (stop_tx, stop_rx) = watch::channel(false);

        // Start cache sweep
        let sweep = tokio::spawn(sweep_task(
            Arc::clone(self.facade.cache()),
            self.config.cache.sweep_interval,
        ));

        // Start Admin server
        let admin_handle = admin_listener.map(|(admin_addr, admin_listener)| {
            info!(addr = %admin_addr, "Starting Admin server");
            let router = self.admin_router();
            let mut stop = stop_rx.clone();
            tokio::spawn(async move {
                axum::serve(admin_listener, router)
                    .with_graceful_shutdown(async move {
                        let _ = stop.wait_for(|stopped| *stopped).await;
                    })
                    .await
            })
        });

        info!(addr = %http_addr, "Starting HTTP server");
        info!("FAM gateway started successfully");

        let result = axum::serve(listener, self.http_router())
            .with_graceful_shutdown(async move {
                shutdown.await;
                info!("Received shutdown signal");
                let _ = stop_tx.send(true);
            })
            .await;

        if let Some(handle) = admin_handle {
            match handle.await {
                Ok(Err(e)) => error!(error = %e, "Admin server error"),
                Err(e) => error!(error = %e, "Admin server task failed"),
                Ok(Ok(())) => {}
            }
        }
        sweep.abort();
        self.session.shutdown().await;

        info!("FAM gateway stopped");
        result.map_err(|e| GatewayError::Serve(e.to_string()))
    }

    /// Get the lookup facade
    pub fn facade(&self) -> Arc<LookupFacade> {
        Arc::clone(&self.facade)
    }

    /// Get the correlator
    pub fn pending_store(&self) -> Arc<PendingReplyStore> {
        Arc::clone(&self.pending_store)
    }

    /// Build the public router
    pub fn http_router(&self) -> Router {
        let state = AppState {
            facade: Arc::clone(&self.facade),
            max_retries: self.config.max_retries,
        };

        let router = Router::new()
            .route("/", get(home))
            .route("/api", get(handle_lookup))
            .route("/health", get(health_check))
            .with_state(state);

        let router = match create_cors_layer(&self.config.cors) {
            Some(cors) => router.layer(cors),
            None => router,
        };
        router.layer(TracingLayer::new())
    }

    /// Build Admin router
    pub fn admin_router(&self) -> Router {
        let facade = Arc::clone(&self.facade);
        let session = Arc::clone(&self.session);
        let pending_store = Arc::clone(&self.pending_store);

        Router::new()
            .route("/health", get(health_check))
            .route(
                "/metrics",
                get(move || {
                    let facade = Arc::clone(&facade);
                    let session = Arc::clone(&session);
                    async move {
                        let mut body = facade.metrics().to_json();
                        body["cache"]["store"] = serde_json::json!(facade.cache().snapshot());
                        body["rate_limiting"]["limiter"] =
                            serde_json::json!(facade.limiter().snapshot());
                        body["session"] = serde_json::json!(session.status().await);
                        Json(body)
                    }
                }),
            )
            .route(
                "/pending",
                get(move || {
                    let pending = Arc::clone(&pending_store);
                    async move { Json(pending.snapshot()) }
                }),
            )
            .layer(TracingLayer::new())
    }
}

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    facade: Arc<LookupFacade>,
    max_retries: u32,
}

#[derive(Debug, Deserialize)]
struct LookupParams {
    fam: Option<String>,
}

/// `GET /api?fam=<id>`
async fn handle_lookup(
    State(state): State<AppState>,
    Query(params): Query<LookupParams>,
) -> Response {
    match state.facade.lookup(params.fam.as_deref()).await {
        Ok(outcome) => Json::<LookupOutcome>(outcome).into_response(),
        Err(e) => lookup_error_response(&e, state.max_retries),
    }
}

fn lookup_error_response(error: &LookupError, max_retries: u32) -> Response {
    let mut api_error = ApiError::from(error);
    if error.is_timeout() {
        if let Some(serde_json::Value::Object(data)) = api_error.data.as_mut() {
            data.insert("max_retries".to_string(), serde_json::json!(max_retries));
        }
    }
    api_error.into_response()
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(HealthResponse::healthy())
}

/// Usage description
async fn home(State(state): State<AppState>) -> impl IntoResponse {
    Json(ServiceInfo::new(state.max_retries))
}
