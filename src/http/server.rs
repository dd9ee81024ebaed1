//! HTTP server setup.
//!
//! # Responsibilities
//! - Build the Axum router dispatching every request to the engine
//! - Bind the server to a listener
//! - Wire the stop signal: refuse new work, drain in-flight requests

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::response::Response;
use axum::routing::any;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::config::RouterConfig;
use crate::lifecycle::Shutdown;
use crate::proxy::ProxyEngine;
use crate::resolver::Resolver;

/// HTTP server for the router.
pub struct HttpServer {
    engine: Arc<ProxyEngine>,
    shutdown: Arc<Shutdown>,
}

impl HttpServer {
    /// Create a server routing requests through `base` for name resolution.
    pub fn new(config: &RouterConfig, base: Arc<dyn Resolver>) -> Self {
        let shutdown = Arc::new(Shutdown::new());
        let engine = Arc::new(ProxyEngine::new(&config.routing, base, shutdown.clone()));
        Self { engine, shutdown }
    }

    /// Build the Axum router with all middleware layers.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(self.engine.clone())
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server until `signal` resolves, then drain and return.
    pub async fn run<F>(self, listener: TcpListener, signal: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self
            .router()
            .into_make_service_with_connect_info::<SocketAddr>();

        let shutdown = self.shutdown.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                signal.await;
                // Mark the engine stopped first so requests racing the
                // listener teardown are refused with a clean 503.
                shutdown.stop();
                shutdown.wait_drained().await;
                tracing::info!("in-flight requests drained");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Main proxy handler; everything beyond connection handling lives in the
/// engine.
async fn proxy_handler(
    State(engine): State<Arc<ProxyEngine>>,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response<Body> {
    engine.serve(request, remote_addr).await
}
