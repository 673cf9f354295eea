// ============================================================================
// HOUSE SERVER — binary entry point
// ============================================================================

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use house::api::{build_router, AppState};
use house::config::{Config, DEFAULT_TOKEN, NETWORK, VERSION};
use house::engine::Engine;
use house::storage::RedbLedger;
use house::treasury::TempoTreasury;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,house=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("╔══════════════════════════════════════════╗");
    info!("║      TEMPNOMO HOUSE BALANCE SERVER       ║");
    info!("╚══════════════════════════════════════════╝");
    info!(version = VERSION, network = NETWORK, default_token = DEFAULT_TOKEN, "Starting");

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Configuration error");
            std::process::exit(1);
        }
    };

    let store = match RedbLedger::open(&config.data_path) {
        Ok(store) => store,
        Err(e) => {
            error!(error = %e, path = %config.data_path, "Failed to open ledger database");
            std::process::exit(1);
        }
    };

    let treasury = match TempoTreasury::new(&config) {
        Ok(treasury) => treasury,
        Err(e) => {
            error!(error = %e, "Failed to initialize treasury gateway");
            std::process::exit(1);
        }
    };

    let engine = Engine::new(store, treasury);

    // Surface any withdrawal stuck between the chain and the ledger from a
    // previous run before taking traffic.
    match engine.pending_reconciliations() {
        Ok(pending) if !pending.is_empty() => {
            for intent in &pending {
                warn!(
                    intent = %intent.id,
                    wallet = %intent.wallet_address,
                    token = %intent.token_address,
                    amount = intent.amount,
                    "⚠️ Pending reconciliation: tokens sent, ledger not debited"
                );
            }
            warn!(count = pending.len(), "Withdrawals awaiting manual reconciliation");
        }
        Ok(_) => info!("No pending reconciliations"),
        Err(e) => error!(error = %e, "Failed to scan withdrawal intents"),
    }

    let state = AppState {
        engine: Arc::new(engine),
    };
    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, addr = %addr, "Failed to bind");
            std::process::exit(1);
        }
    };

    info!(addr = %addr, "🚀 House server listening");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }

    info!("Shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
