// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Urth Control - Synthetic Monitoring Control Plane
//!
//! Standalone daemon responsible for:
//! - Opening the SQLite resource store (running migrations)
//! - Checking the stored scenarios against the kind registry
//! - Hosting the lifecycle service until shutdown
//!
//! The daemon ships without a runner transport, so it attaches no
//! scheduler: submitted runs are persisted as `pending` and nothing is
//! queued that no one would consume.

use std::sync::Arc;

use tracing::{info, warn};

use urth_control::config::Config;
use urth_control::control_plane::ControlPlane;
use urth_core::selector::Selector;
use urth_core::store::{Pagination, SqliteStore, Store};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "urth_control=info,urth_core=info".into()),
        )
        .init();

    // Load .env file if present
    if let Err(e) = dotenvy::dotenv() {
        warn!("No .env file loaded: {}", e);
    }

    // Load configuration
    let config = Config::from_env()?;

    info!(max_page_size = config.max_page_size, "Starting Urth Control");

    // Open the store; migrations run on connect
    let backend = SqliteStore::connect(&config.database_url)
        .await?
        .with_max_page_size(config.max_page_size);
    let store = Store::new(Arc::new(backend));

    info!("Resource store ready");

    let control = ControlPlane::builder().store(store).build()?;
    info!(
        kinds = ?control.registry().kinds(),
        dispatch = control.has_scheduler(),
        "Control plane ready"
    );

    // Resolving stored probes surfaces decode problems at startup
    let runnable = control
        .list_runnable_scenarios(&Selector::everything(), Pagination::default())
        .await?;
    info!(runnable = runnable.len(), "Runnable scenarios loaded");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    info!("Urth Control shut down");

    Ok(())
}
