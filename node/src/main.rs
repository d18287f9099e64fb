// Copyright (c) 2026 AfriTrade. MIT License.
// See LICENSE for details.

//! # AfriTrade Node
//!
//! Entry point for the `afritrade-node` binary. Parses CLI arguments,
//! initializes logging and metrics, opens the ledger, and serves the REST
//! API until SIGINT or SIGTERM.
//!
//! - `run`    : open the ledger and serve
//! - `version`: print build version information

mod api;
mod cli;
mod logging;
mod metrics;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

use afritrade_ledger::chat::{ChatService, ChatStore, OpenRouterClient};
use afritrade_ledger::identity::UserDirectory;
use afritrade_ledger::Bank;

use cli::{AfriTradeCli, Commands};
use metrics::NodeMetrics;

/// How often expired access tokens are swept from the ledger.
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = AfriTradeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(logging::DEFAULT_FILTER, args.log_format());

    tracing::info!(
        api_port = args.api_port,
        metrics_port = args.metrics_port,
        data_dir = %args.data_dir.display(),
        lock_timeout_ms = args.lock_timeout_ms,
        "starting afritrade-node"
    );

    // --- Ledger ---
    let db_path = args.data_dir.join("ledger");
    std::fs::create_dir_all(&db_path)
        .with_context(|| format!("failed to create ledger directory: {}", db_path.display()))?;
    let bank = Bank::open(&db_path, args.ledger_config())
        .with_context(|| format!("failed to open ledger at {}", db_path.display()))?;

    let sweeper = tokio::spawn(sweep_sessions(bank.users.clone()));

    // --- Trade advisor ---
    let chat_config = args.chat_config();
    if chat_config.api_key.is_empty() {
        tracing::warn!("no completion API key configured, /chatbot calls will be unauthenticated");
    }
    let client = OpenRouterClient::new(&chat_config).context("failed to build completion client")?;
    let chat = ChatService::new(
        ChatStore::new(bank.db.clone()),
        Arc::new(client),
        chat_config.system_prompt.clone(),
    );

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new().context("failed to register metrics")?);

    let app_state = api::AppState {
        bank: bank.clone(),
        chat,
        metrics: Arc::clone(&node_metrics),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("{}:{}", args.bind, args.api_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("{}:{}", args.bind, args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router).with_graceful_shutdown(shutdown_signal()) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
    }

    sweeper.abort();
    bank.db.flush().context("failed to flush ledger on shutdown")?;
    tracing::info!("afritrade-node stopped");
    Ok(())
}

/// Delete expired access tokens now and then once per interval.
async fn sweep_sessions(users: UserDirectory) {
    let mut ticker = tokio::time::interval(SESSION_SWEEP_INTERVAL);
    loop {
        ticker.tick().await;
        let users = users.clone();
        match tokio::task::spawn_blocking(move || users.purge_expired_sessions()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "session sweep failed"),
            Err(e) => tracing::error!(error = %e, "session sweep task failed"),
        }
    }
}

fn print_version() {
    println!("afritrade-node {}", env!("CARGO_PKG_VERSION"));
    println!("rustc          {}", option_env!("RUSTC_VERSION").unwrap_or("unknown"));
}

/// Resolves on SIGINT (Ctrl+C) or SIGTERM. Only Ctrl+C on non-Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
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
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received, draining connections");
}
