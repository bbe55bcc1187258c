//! Network module with deferred startup lifecycle.
//!
//! `new()` allocates shared state, `start()` binds the TCP listener and
//! `serve()` accepts connections until shutdown. Bootstrap runs before
//! `serve()`, so the listener may already be bound while the resources are
//! still resolving; readiness only turns green once `serve()` begins.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::config::NetworkConfig;
use super::handlers::{health_handler, liveness_handler, readiness_handler, AppState};
use super::middleware::{build_http_layers, track_in_flight};
use super::shutdown::ShutdownController;
use crate::error::ApiError;
use crate::service::Dispatcher;

/// Owns the HTTP server lifecycle.
pub struct NetworkModule {
    config: NetworkConfig,
    listener: Option<TcpListener>,
    shutdown: Arc<ShutdownController>,
}

impl NetworkModule {
    /// Creates the module without binding any port.
    #[must_use]
    pub fn new(config: NetworkConfig) -> Self {
        Self {
            config,
            listener: None,
            shutdown: Arc::new(ShutdownController::new()),
        }
    }

    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    /// Assembles the full application router.
    ///
    /// - `GET /health`, `/health/live`, `/health/ready`
    /// - the six resource routes under the dispatcher's mount prefix
    ///
    /// Unmatched paths answer the JSON NotFound body.
    pub fn build_router(&self, dispatcher: Arc<Dispatcher>) -> Router {
        let state = AppState {
            shutdown: Arc::clone(&self.shutdown),
            services: Arc::clone(dispatcher.services()),
            start_time: Instant::now(),
        };

        Router::new()
            .route("/health", get(health_handler))
            .route("/health/live", get(liveness_handler))
            .route("/health/ready", get(readiness_handler))
            .with_state(state)
            .merge(dispatcher.mount())
            .fallback(unmatched)
            .layer(axum::middleware::from_fn_with_state(
                Arc::clone(&self.shutdown),
                track_in_flight,
            ))
            .layer(build_http_layers(&self.config))
    }

    /// Binds the listener and returns the bound port, which differs from the
    /// configured one when port 0 is used.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        let port = listener.local_addr()?.port();
        info!(host = %self.config.host, port, "listener bound");
        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves requests until `shutdown` resolves, then drains.
    ///
    /// On the signal the health state moves to Draining so readiness probes
    /// fail, open connections finish, and the module waits up to the
    /// configured drain timeout before reporting Stopped.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called or the server hits a
    /// fatal I/O error.
    pub async fn serve(
        self,
        dispatcher: Arc<Dispatcher>,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let router = self.build_router(dispatcher);
        let listener = self
            .listener
            .ok_or_else(|| anyhow::anyhow!("start() must be called before serve()"))?;
        let controller = self.shutdown;

        let signal_controller = Arc::clone(&controller);
        let signal = async move {
            shutdown.await;
            info!("shutdown signal received");
            signal_controller.begin_draining();
        };

        controller.mark_ready();
        info!("serving HTTP");
        axum::serve(listener, router)
            .with_graceful_shutdown(signal)
            .await?;

        if controller.wait_for_drain(self.config.drain_timeout).await {
            info!("drained");
        } else {
            warn!(
                in_flight = controller.in_flight_count(),
                "drain timeout expired with requests in flight"
            );
        }
        Ok(())
    }
}

async fn unmatched() -> Response {
    ApiError::not_found("no route").into_response()
}
