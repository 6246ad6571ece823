pub mod admission_review;
mod api;
mod certs;
pub mod cli;
pub mod config;
pub mod errors;
pub mod patch;
pub mod policies;
pub mod policy;
pub mod tracing;

use std::net::SocketAddr;
use std::time::Duration;

use ::tracing::info;
use anyhow::{anyhow, Result};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{catch_panic::CatchPanicLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::api::handlers::{admission_handler, handle_panic, readiness_handler};
use crate::config::{Config, TlsConfig};
use crate::policies::ComputeUnitPolicy;
use crate::policy::PolicyRegistry;

/// Path serving the compute unit policy.
pub const MUTATE_PATH: &str = "/mutate";

pub struct WebhookServer {
    router: Router,
    addr: SocketAddr,
    tls_config: TlsConfig,
}

impl WebhookServer {
    pub fn new_from_config(config: Config) -> Result<Self> {
        let mut registry = PolicyRegistry::new();
        registry.register(
            MUTATE_PATH,
            ComputeUnitPolicy::new(&config.annotation_prefix, config.compute_units),
        )?;

        Ok(Self {
            router: build_router(&registry, config.request_timeout),
            addr: config.addr,
            tls_config: config.tls_config,
        })
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serves the webhook over HTTPS until the process is terminated.
    /// Fails right away when the certificate cannot be loaded or the
    /// address cannot be bound.
    pub async fn run(self) -> Result<()> {
        let tls_config = certs::create_tls_config(&self.tls_config).await?;

        info!(address = %self.addr, "started HTTPS server");
        axum_server::bind_rustls(self.addr, tls_config)
            .serve(self.router.into_make_service())
            .await
            .map_err(|e| anyhow!("HTTPS server on {} failed: {}", self.addr, e))
    }
}

pub fn build_router(registry: &PolicyRegistry, request_timeout: Option<Duration>) -> Router {
    let mut router = Router::new().route("/readiness", get(readiness_handler));
    for (path, policy) in registry.iter() {
        router = router.route(path, post(admission_handler).with_state(policy.clone()));
    }

    if let Some(timeout) = request_timeout {
        router = router.layer(TimeoutLayer::new(timeout));
    }

    router
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
}
