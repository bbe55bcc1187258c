//! `restkit` server binary.
//!
//! Loads the resource manifest, resolves every resource, then serves until
//! ctrl-c. Nothing is reachable unless every resource resolves.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use restkit_core::StateMachines;
use restkit_server::cli::Cli;
use restkit_server::logging::{init_tracing, DEFAULT_FILTER};
use restkit_server::manifest::Manifest;
use restkit_server::network::NetworkModule;
use restkit_server::service::{bootstrap, BaseTemplate, Dispatcher, ResourceRegistry};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format, DEFAULT_FILTER)?;

    let registry = match &cli.resources {
        Some(path) => Manifest::load(path)?.into_registry(),
        None => {
            warn!("no resources file given; serving health endpoints only");
            ResourceRegistry::new()
        }
    };

    let service_config = cli.service_config();
    if service_config.api_tokens.is_empty() {
        warn!("no API tokens configured; only anonymously allowed requests will pass");
    }

    let base = BaseTemplate::new(Arc::new(StateMachines::with_defaults()));
    let services = bootstrap(&registry, &base)
        .await
        .context("resource bootstrap failed")?;
    let dispatcher = Arc::new(Dispatcher::new(services, &service_config));

    let mut network = NetworkModule::new(cli.network_config());
    let port = network.start().await?;
    info!(
        port,
        prefix = dispatcher.mount_prefix(),
        resources = registry.len(),
        "restkit started"
    );

    network
        .serve(dispatcher, async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = %err, "ctrl-c handler failed; shutting down");
            }
        })
        .await
}
