use crate::handlers::{
    admit_job, delete_rule, get_metrics, get_rule, health_check, list_rules, readiness_check,
    reset_executions, set_rule, AppState, SharedState,
};
use crate::middleware::logging_middleware;
use crate::throttler::Throttler;
use axum::routing::{delete, get, post};
use axum::{middleware, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Router of the admission service.
pub fn create_app(throttler: Arc<Throttler>) -> Router {
    let shared_state: SharedState = Arc::new(AppState::new(throttler));

    Router::new()
        // Admission
        .route("/admission/:worker", post(admit_job))
        // Worker rules
        .route("/rules", get(list_rules))
        .route(
            "/rules/:worker",
            get(get_rule).put(set_rule).delete(delete_rule),
        )
        // Operations
        .route("/executions/:storage", delete(reset_executions))
        .route("/metrics", get(get_metrics))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .with_state(shared_state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(middleware::from_fn(logging_middleware)),
        )
}

pub struct Server {
    app: Router,
    bind_addr: SocketAddr,
}

impl Server {
    pub fn new(throttler: Arc<Throttler>, bind_addr: SocketAddr) -> Self {
        Self {
            app: create_app(throttler),
            bind_addr,
        }
    }

    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(self.bind_addr).await?;

        tracing::info!("Job throttler listening on {}", listener.local_addr()?);
        tracing::info!("Health check available at /health");
        tracing::info!("Readiness check available at /ready");

        axum::serve(
            listener,
            self.app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        },
    }
}
