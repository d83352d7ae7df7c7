//! Wiring for the subscription-service process: storage, lifecycle service
//! and the operational HTTP endpoints.

use crate::config::SubscriptionConfig;
use crate::error::SubscriptionError;
use crate::services::{
    get_metrics, init_metrics, Database, SubscriptionRepository, SubscriptionService,
};
use axum::{
    extract::State,
    http::{header, StatusCode},
    middleware,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;
use service_core::error::AppError;
use service_core::middleware::metrics::metrics_middleware;
use service_core::middleware::tracing::request_id_middleware;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

const SERVICE_NAME: &str = "subscription-service";

/// Store handle shared by the probe endpoints.
#[derive(Clone)]
struct ProbeState {
    store: Arc<dyn SubscriptionRepository>,
}

async fn probe(state: &ProbeState) -> Result<(), SubscriptionError> {
    state.store.health_check().await
}

/// Liveness: 200 with service metadata, 503 when the store is unreachable.
async fn health(State(state): State<ProbeState>) -> impl IntoResponse {
    match probe(&state).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "service": SERVICE_NAME,
                "version": env!("CARGO_PKG_VERSION"),
            })),
        ),
        Err(e) => {
            tracing::warn!(error = %e, kind = e.kind(), "Subscription store unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "service": SERVICE_NAME,
                    "error": e.to_string(),
                })),
            )
        }
    }
}

async fn ready(State(state): State<ProbeState>) -> StatusCode {
    match probe(&state).await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Not ready");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

async fn metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        get_metrics(),
    )
}

/// Routes for `/health`, `/ready` and `/metrics` over any subscription store.
pub fn build_router(store: Arc<dyn SubscriptionRepository>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(ProbeState { store })
}

/// A connected, bound subscription-service instance.
pub struct Application {
    config: SubscriptionConfig,
    listener: TcpListener,
    port: u16,
    database: Arc<Database>,
    subscriptions: SubscriptionService,
}

impl Application {
    /// Connect to Postgres, apply pending migrations and bind the listener.
    pub async fn build(config: SubscriptionConfig) -> Result<Self, AppError> {
        Self::connect(config, true).await
    }

    /// Same as [`Application::build`] but leaves the schema alone.
    pub async fn build_without_migrations(config: SubscriptionConfig) -> Result<Self, AppError> {
        Self::connect(config, false).await
    }

    async fn connect(config: SubscriptionConfig, migrate: bool) -> Result<Self, AppError> {
        init_metrics();

        let database = Database::new(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await
        .inspect_err(|e| tracing::error!(error = %e, "Could not reach subscription database"))?;

        if migrate {
            database
                .run_migrations()
                .await
                .inspect_err(|e| tracing::error!(error = %e, "Schema migration failed"))?;
        }

        let database = Arc::new(database);
        let subscriptions = SubscriptionService::new(database.clone(), database.clone());

        let addr = config.common.http_addr();
        let socket: SocketAddr = addr.parse().map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!("Invalid listen address '{}': {}", addr, e))
        })?;
        let listener = TcpListener::bind(socket)
            .await
            .inspect_err(|e| tracing::error!(error = %e, addr = %socket, "Could not bind listener"))?;
        let port = listener.local_addr()?.port();

        Ok(Self {
            config,
            listener,
            port,
            database,
            subscriptions,
        })
    }

    /// Bound port; differs from the configured one when that was 0.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Lifecycle operations, for callers embedding the service in-process.
    pub fn subscriptions(&self) -> &SubscriptionService {
        &self.subscriptions
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    /// Serve the probe routes until the listener fails or the future is dropped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let router = build_router(self.subscriptions.subscriptions().clone());

        tracing::info!(
            service = %self.config.service_name,
            version = %self.config.service_version,
            port = self.port,
            "subscription-service listening"
        );

        axum::serve(self.listener, router).await
    }
}
