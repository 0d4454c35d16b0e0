//! Panel HTTP Server
//!
//! Axum-based server with CORS, request tracing and graceful shutdown.

use crate::accounts::{AccountRegistry, Sweeper};
use crate::auth::AuthService;
use crate::dashboard::api::{health_router, users_router, HealthState, UsersState};
use crate::dashboard::auth::{auth_middleware, auth_router};
use crate::dashboard::config::DashboardConfig;
use axum::{
    http::{header, HeaderValue, Method},
    middleware, Router,
};
use std::future::Future;
use std::sync::Arc;
use tokio::signal;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Everything the handlers need
#[derive(Clone)]
pub struct PanelState {
    pub auth: Arc<AuthService>,
    pub registry: Arc<AccountRegistry>,
    pub sweeper: Arc<Sweeper>,
    pub health: Arc<HealthState>,
}

/// Panel server
pub struct PanelServer {
    config: DashboardConfig,
    state: PanelState,
}

impl PanelServer {
    pub fn new(config: DashboardConfig, state: PanelState) -> Self {
        Self { config, state }
    }

    /// Build the router with all routes and middleware
    pub fn build_router(&self) -> Router {
        let origins = if self.config.cors_origins.is_empty() {
            AllowOrigin::any()
        } else {
            AllowOrigin::list(
                self.config
                    .cors_origins
                    .iter()
                    .filter_map(|o| o.parse::<HeaderValue>().ok()),
            )
        };
        let cors = CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::DELETE])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

        let users = users_router(UsersState {
            registry: self.state.registry.clone(),
            sweeper: self.state.sweeper.clone(),
        })
        .route_layer(middleware::from_fn_with_state(
            self.state.auth.clone(),
            auth_middleware,
        ));

        let api = health_router(self.state.health.clone())
            .merge(auth_router(self.state.auth.clone()))
            .merge(users);

        let mut router = Router::new().nest("/api", api).layer(cors);

        if self.config.log_requests {
            router = router.layer(TraceLayer::new_for_http());
        }

        router
    }

    /// Start the server and run until Ctrl+C or SIGTERM
    pub async fn run(self) -> anyhow::Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Start the server and run until `shutdown` completes
    pub async fn run_until(self, shutdown: impl Future<Output = ()> + Send + 'static) -> anyhow::Result<()> {
        let addr = self.config.socket_addr();
        let router = self.build_router();

        info!("Starting panel server on {}", addr);
        if !self.config.is_localhost() {
            warn!("Panel bound to {} - put it behind TLS before exposing it", addr);
        }

        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("Panel available at {}", self.config.base_url());

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Panel server shut down gracefully");
        Ok(())
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }
}

/// Graceful shutdown signal handler
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
