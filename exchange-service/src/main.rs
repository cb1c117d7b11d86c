//! # WACI Exchange Service
//!
//! Backend service orchestrating WACI-DIDComm credential exchanges between
//! in-process issuer, holder and verifier agents.
//!
//! ## Running
//!
//! ```bash
//! # Optional overrides
//! export WACI_STORAGE_ROOT=./storage
//! export WACI_API_PORT=3001
//!
//! # Run the service
//! cargo run --release
//! ```
//!
//! ## API Endpoints
//!
//! - `GET /health` - Health check
//! - `POST /agents` - Provision agents
//! - `POST /issuance/invitation` - Start a credential issuance
//! - `POST /presentation/invitation` - Start a presentation exchange

use anyhow::Result;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use exchange_service::{api, runtime::loopback::LoopbackRuntime, AppState};
use shared::config::ExchangeConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    info!("Starting WACI Exchange Service");
    info!("Version: {}", shared::VERSION);

    // Load configuration
    let config = ExchangeConfig::from_env()?;
    config.validate()?;

    info!(
        did_method = %config.registry.did_method,
        storage_root = ?config.storage.root,
        dwn_url = %config.dwn_url,
        "Configuration loaded"
    );

    // Create application state on the loopback agent runtime
    let runtime = Arc::new(LoopbackRuntime::new(&config));
    let state = Arc::new(AppState::new(config.clone(), runtime));

    // Create router with shared state
    let app = api::create_router(state);

    // Start server
    let bind_addr = config.api.bind_addr();
    info!(address = %bind_addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!("Server running at http://{}", bind_addr);
    info!("API documentation:");
    info!("  POST /agents - Provision agents (issuer, holder, verifier)");
    info!("  GET  /agents - List provisioned agents");
    info!("  POST /issuance/invitation - Create a credential issuance invitation");
    info!("  POST /issuance/proposal - Accept an invitation and run the exchange");
    info!("  POST /presentation/invitation - Create a presentation invitation");
    info!("  POST /presentation/proposal - Accept an invitation and run the exchange");

    axum::serve(listener, app).await?;

    Ok(())
}
