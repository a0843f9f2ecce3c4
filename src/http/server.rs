//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the orchestrator, health and info handlers
//! - Wire up middleware (request ID, tracing, timeout, body limit)
//! - Serve plain HTTP or HTTPS on the given listener
//! - Swap orchestrator state when a new configuration arrives
//! - Drain in-flight requests on shutdown

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::{ConfigOverrides, OrchestratorConfig};
use crate::health;
use crate::http::{request, response};
use crate::lifecycle::startup::build_orchestrator;
use crate::net::tls::load_listener_tls;
use crate::orchestrator::Orchestrator;

pub const CHAT_DETECTION_PATH: &str = "/api/v2/chat/completions-detection";
pub const HEALTH_PATH: &str = "/health";
pub const INFO_PATH: &str = "/info";

/// How long in-flight requests get to finish after shutdown on the TLS listener.
const TLS_DRAIN_SECS: u64 = 30;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ArcSwap<Orchestrator>>,
    pub probe_timeout: Duration,
}

/// HTTP server for the orchestrator.
pub struct HttpServer {
    router: Router,
    state: AppState,
    config: OrchestratorConfig,
    overrides: ConfigOverrides,
}

impl HttpServer {
    /// Create a new HTTP server around a ready orchestrator.
    pub fn new(orchestrator: Orchestrator, config: OrchestratorConfig) -> Self {
        let state = AppState {
            orchestrator: Arc::new(ArcSwap::from_pointee(orchestrator)),
            probe_timeout: Duration::from_secs(config.timeouts.connect_secs),
        };
        let router = Self::build_router(&config, state.clone());
        Self {
            router,
            state,
            config,
            overrides: ConfigOverrides::default(),
        }
    }

    /// Command-line overrides to re-apply to every reloaded configuration.
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &OrchestratorConfig, state: AppState) -> Router {
        Router::new()
            .route(CHAT_DETECTION_PATH, post(chat_detection_handler))
            .route(HEALTH_PATH, get(health_handler))
            .route(INFO_PATH, get(info_handler))
            .with_state(state)
            .layer(DefaultBodyLimit::disable())
            .layer(RequestBodyLimitLayer::new(config.server.max_body_bytes))
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.server.request_timeout_secs,
            )))
            .layer(request::propagate_request_id_layer())
            .layer(TraceLayer::new_for_http().make_span_with(request::make_span))
            .layer(request::set_request_id_layer())
    }

    /// The router, for driving requests without a listener.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// The orchestrator currently serving requests.
    pub fn orchestrator(&self) -> Arc<Orchestrator> {
        self.state.orchestrator.load_full()
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run the server until `shutdown` fires.
    ///
    /// Configurations received on `config_updates` rebuild the orchestrator;
    /// a failed rebuild keeps the current one.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: mpsc::UnboundedReceiver<OrchestratorConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        let reload = tokio::spawn(reload_loop(
            self.state.clone(),
            self.config.clone(),
            self.overrides.clone(),
            config_updates,
            shutdown.resubscribe(),
        ));

        match &self.config.server.tls {
            None => {
                tracing::info!(address = %addr, "HTTP server starting");
                axum::serve(listener, self.router)
                    .with_graceful_shutdown(async move {
                        let _ = shutdown.recv().await;
                        tracing::info!("Shutdown signal received, draining connections");
                    })
                    .await?;
            }
            Some(tls) => {
                let rustls = load_listener_tls(tls)
                    .await
                    .map_err(std::io::Error::other)?;
                let handle = axum_server::Handle::new();
                let drain = handle.clone();
                tokio::spawn(async move {
                    let _ = shutdown.recv().await;
                    tracing::info!("Shutdown signal received, draining connections");
                    drain.graceful_shutdown(Some(Duration::from_secs(TLS_DRAIN_SECS)));
                });

                tracing::info!(address = %addr, "HTTPS server starting");
                axum_server::from_tcp_rustls(listener.into_std()?, rustls)
                    .handle(handle)
                    .serve(self.router.into_make_service())
                    .await?;
            }
        }

        reload.abort();
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Apply configuration updates until shutdown.
///
/// `current` is the last configuration that built successfully; an update
/// equal to it is skipped, anything else is rebuilt even if it failed before.
async fn reload_loop(
    state: AppState,
    mut current: OrchestratorConfig,
    overrides: ConfigOverrides,
    mut config_updates: mpsc::UnboundedReceiver<OrchestratorConfig>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            update = config_updates.recv() => {
                let Some(mut config) = update else { break };
                overrides.apply(&mut config);
                if config == current {
                    tracing::debug!("Configuration unchanged, nothing to reload");
                    continue;
                }
                match build_orchestrator(&config) {
                    Ok(orchestrator) => {
                        if config.server != current.server || config.observability != current.observability {
                            tracing::warn!("Changes to `server` or `observability` take effect after restart");
                        }
                        state.orchestrator.store(Arc::new(orchestrator));
                        current = config;
                        tracing::info!("Configuration reloaded");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Reloaded configuration rejected, keeping current");
                    }
                }
            }
            _ = shutdown.recv() => break,
        }
    }
}

async fn chat_detection_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let start = Instant::now();
    let request_id = request::request_id(&headers);
    // In-flight requests keep the snapshot they started with.
    let orchestrator = state.orchestrator.load_full();
    let result = orchestrator
        .chat_completions_detection(&headers, &body, &request_id)
        .await;
    response::orchestration(result, start)
}

async fn health_handler() -> impl IntoResponse {
    Json(response::liveness())
}

async fn info_handler(State(state): State<AppState>) -> impl IntoResponse {
    let orchestrator = state.orchestrator.load_full();
    Json(health::probe_all(orchestrator.clients(), state.probe_timeout).await)
}
