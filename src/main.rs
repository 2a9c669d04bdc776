//! EnGarde server.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http::server ──▶ domain (target application)
//!                                          │
//!                                          ▼
//!                     engine::Application ─┬─▶ routing (RouteSelection)
//!                                          ├─▶ negotiation (mime, locale)
//!                                          ├─▶ security (gate, session)
//!                                          └─▶ controller / middlewares
//!     Client Response                      │
//!     ◀────────────── http::response ◀─────┘
//!
//!     Cross-cutting: config (+ watcher), observability, lifecycle, admin
//! ```
//!
//! Applications without a registered setup answer with the built-in
//! welcome controller; embedders register their own setups through
//! [`engarde::HttpServer::new`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;

use engarde::admin::setup_admin_router;
use engarde::config::{load_config, ConfigWatcher};
use engarde::lifecycle::{drain_with_deadline, spawn_signal_handler, Shutdown};
use engarde::observability::{logging, metrics};
use engarde::{HttpServer, SetupRegistry};

#[derive(Parser)]
#[command(name = "engarde")]
#[command(about = "Serve the applications of an EnGarde domain", long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "ENGARDE_CONFIG", default_value = "engarde.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match load_config(&args.config) {
        Ok(config) => config,
        Err(e) => {
            logging::init_logging(None);
            tracing::error!(path = %args.config.display(), error = %e, "Configuration rejected");
            return Err(e.into());
        }
    };
    logging::init_logging(Some(config.observability.log_level.as_str()));

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address,
        environment = config.domain.environment_type.as_str(),
        hosted_apps = ?config.domain.hosted_apps,
        "engarde starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Arc::new(Shutdown::new());
    spawn_signal_handler(Arc::clone(&shutdown));

    let server = HttpServer::new(config.clone(), SetupRegistry::new())?;

    let (watcher, config_updates) = ConfigWatcher::new(&args.config);
    let _watcher = match watcher.run() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "Config watcher unavailable, hot reload disabled");
            None
        }
    };

    if config.admin.enabled {
        let admin_listener = TcpListener::bind(&config.admin.bind_address).await?;
        tracing::info!(address = %admin_listener.local_addr()?, "Admin API listening");
        let admin = setup_admin_router(server.state().clone());
        let mut stop = shutdown.subscribe();
        tokio::spawn(async move {
            let served = axum::serve(admin_listener, admin)
                .with_graceful_shutdown(async move {
                    let _ = stop.recv().await;
                })
                .await;
            if let Err(e) = served {
                tracing::error!(error = %e, "Admin API failed");
            }
        });
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let mut server_task = tokio::spawn(server.run(listener, config_updates, shutdown.subscribe()));

    let mut stop = shutdown.subscribe();
    let outcome = tokio::select! {
        finished = &mut server_task => Some(finished),
        _ = stop.recv() => {
            let deadline = Duration::from_secs(config.timeouts.shutdown_secs);
            let drained = drain_with_deadline(&mut server_task, deadline).await;
            if drained.is_none() {
                server_task.abort();
            }
            drained
        }
    };

    if let Some(finished) = outcome {
        finished??;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
