//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Wrap the reflected router with the server-wide middleware stack
//! - Bind to a plain or TLS listener
//! - Drain in-flight requests on shutdown
//!
//! # Layer Order (outermost first)
//! ```text
//! SetRequestId → PropagateRequestId → Trace → CatchPanic → Timeout
//!     → RequestBodyLimit → erroring → rate limit → ApiRouter
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{body::Body, http::Request, middleware, Router};
use axum_server::tls_rustls::RustlsConfig;
use tokio::net::TcpListener;
use tower_http::{
    catch_panic::CatchPanicLayer,
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ApiConfig;
use crate::http::middleware::erroring;
use crate::http::request::X_REQUEST_ID;
use crate::lifecycle::Shutdown;
use crate::routing::ApiRouter;
use crate::security::{rate_limit_middleware, RateLimiterState};

/// Grace period for TLS connections after shutdown is triggered.
const TLS_DRAIN: Duration = Duration::from_secs(30);

/// HTTP server for the API.
pub struct HttpServer {
    router: Router,
    config: ApiConfig,
}

impl HttpServer {
    pub fn new(config: ApiConfig, api: ApiRouter) -> Self {
        let router = Self::build_router(&config, api.into_axum());
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ApiConfig, app: Router) -> Router {
        let mut app = app;
        if config.rate_limit.enabled {
            let state = Arc::new(RateLimiterState::new(&config.rate_limit));
            app = app.layer(middleware::from_fn_with_state(state, rate_limit_middleware));
        }

        app.layer(middleware::from_fn(erroring))
            .layer(RequestBodyLimitLayer::new(config.security.max_body_size))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(CatchPanicLayer::new())
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                let request_id = request
                    .headers()
                    .get(X_REQUEST_ID)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    path = %request.uri().path(),
                    request_id = %request_id,
                )
            }))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.wait())
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Run the server behind TLS on `addr`.
    pub async fn run_tls(
        self,
        addr: SocketAddr,
        tls: RustlsConfig,
        shutdown: Shutdown,
    ) -> Result<(), std::io::Error> {
        tracing::info!(address = %addr, "HTTPS server starting");

        let handle = axum_server::Handle::new();
        let drain = handle.clone();
        let signalled = shutdown.wait();
        tokio::spawn(async move {
            signalled.await;
            drain.graceful_shutdown(Some(TLS_DRAIN));
        });

        axum_server::bind_rustls(addr, tls)
            .handle(handle)
            .serve(self.router.into_make_service_with_connect_info::<SocketAddr>())
            .await?;

        tracing::info!("HTTPS server stopped");
        Ok(())
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// The fully layered router, for in-process testing.
    pub fn into_router(self) -> Router {
        self.router
    }
}
