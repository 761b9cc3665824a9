//! kwpd - K-Line live data bridge daemon
//!
//! Drives a KWP2000 session against an engine ECU and pushes decoded live
//! data to browser viewers over Server-Sent Events.
//!
//! Usage:
//!   kwpd [OPTIONS] [kwpd.toml]
//!
//! Options:
//!   --catalog <path>  Load the parameter catalog from a YAML file
//!
//! If no config file is provided, uses the mock ECU transport.

mod config;

use std::future::IntoFuture;
use std::path::Path;
use std::sync::Arc;

use kwp_api::{create_router, AppState};
use kwp_conv::Catalog;
use kwp_core::SessionControl;
use kwp_diag::{create_transport_factory, SessionManager};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

/// Parsed command-line arguments
struct Args {
    /// Daemon config file (TOML)
    config_path: Option<String>,
    /// Catalog file overriding the config file's entry
    catalog: Option<String>,
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut result = Args {
        config_path: None,
        catalog: None,
    };

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--catalog" | "-c" => {
                if i + 1 < args.len() {
                    result.catalog = Some(args[i + 1].clone());
                    i += 2;
                } else {
                    tracing::error!("Missing argument for --catalog");
                    i += 1;
                }
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            arg if !arg.starts_with('-') => {
                // Positional argument = config file
                result.config_path = Some(arg.to_string());
                i += 1;
            }
            _ => {
                tracing::warn!("Unknown argument: {}", args[i]);
                i += 1;
            }
        }
    }

    result
}

fn print_help() {
    eprintln!(
        r#"kwpd - K-Line live data bridge

Usage: kwpd [OPTIONS] [kwpd.toml]

Options:
  -c, --catalog <path>  Load the parameter catalog from a YAML file
  -h, --help            Print this help message

Examples:
  # Run against the simulated ECU
  kwpd

  # Run with config file
  kwpd config/kwpd.toml

  # Custom catalog
  kwpd --catalog config/catalog.yaml config/kwpd.toml
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kwpd=info,kwp_api=info,kwp_diag=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting kwpd (K-Line live data bridge)");

    let args = parse_args();

    let mut config = if let Some(ref path) = args.config_path {
        tracing::info!("Loading config from: {}", path);
        Config::load(Path::new(path))?
    } else {
        tracing::info!("No config file provided, using mock transport");
        Config::default()
    };
    if let Some(catalog) = args.catalog {
        config.catalog = Some(catalog.into());
    }

    let catalog = load_catalog(config.catalog.as_deref())?;
    tracing::info!(
        sources = catalog.sources().len(),
        parameters = catalog.parameter_count(),
        device = %config.session.device_name,
        "Catalog ready"
    );

    let factory = create_transport_factory(&config.transport)?;
    let manager = Arc::new(SessionManager::new(
        factory,
        Arc::new(catalog),
        config.session.clone(),
    )?);
    let hub = manager.hub().clone();

    let state = AppState::new(manager.clone(), hub);
    let app = create_router(state, config.server.static_dir.as_deref());

    let addr = config.server.bind_addr()?;
    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // SSE connections never finish on their own, so shutdown does not wait
    // for them
    tokio::select! {
        result = axum::serve(listener, app).into_future() => result?,
        _ = shutdown_signal() => tracing::info!("Shutdown requested"),
    }

    manager.stop().await?;
    tracing::info!("kwpd stopped");
    Ok(())
}

/// Built-in catalog, or the YAML file at `path`
fn load_catalog(path: Option<&Path>) -> anyhow::Result<Catalog> {
    match path {
        Some(path) => {
            tracing::info!("Loading catalog from: {}", path.display());
            Ok(Catalog::from_file(path)?)
        }
        None => Ok(Catalog::builtin()),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Cannot listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}
