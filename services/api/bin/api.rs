//! Main Entrypoint for the Voxbridge API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Building the provider clients and the capability registry.
//! 3. Building the room provider, the media bridge and the agent runtime.
//! 4. Constructing the Axum router and applying middleware.
//! 5. Starting the web server and stopping all sessions on shutdown.

use anyhow::Context;
use std::{net::SocketAddr, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use voxbridge_api::{
    agent::{AgentLauncher, PipelineAgent},
    config::Config,
    orchestrator::{Orchestrator, OrchestratorSettings},
    provider::Providers,
    router::create_router,
    state::AppState,
    transport::{RoomConnector, RoomProvider, bridge::BridgeConnector, daily::DailyRoomProvider},
};

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    info!("Received shutdown signal. Shutting down gracefully...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!(?config, "Configuration loaded. Initializing application state...");

    // --- 2. Providers ---
    let providers = Providers::from_config(&config);
    let registry = providers.registry(&config);

    // --- 3. Transport and agent runtime ---
    let rooms: Option<Arc<dyn RoomProvider>> = match &config.daily_api_key {
        Some(key) => match DailyRoomProvider::new(config.daily_api_url.clone(), key.clone()) {
            Ok(provider) => Some(Arc::new(provider)),
            Err(e) => {
                warn!(error = %e, "Failed to build room provider client");
                None
            }
        },
        None => {
            warn!("DAILY_API_KEY not set; sessions cannot be created");
            None
        }
    };

    let launcher: Option<Arc<dyn AgentLauncher>> =
        match (&config.transport_bridge_url, &providers.realtime) {
            (Some(bridge_url), Some(realtime)) => {
                let connector: Arc<dyn RoomConnector> =
                    Arc::new(BridgeConnector::new(bridge_url.clone()));
                Some(Arc::new(PipelineAgent::new(
                    connector,
                    realtime.clone(),
                    providers.synthesizer.clone(),
                )))
            }
            (None, _) => {
                warn!("TRANSPORT_BRIDGE_URL not set; agent runtime unavailable");
                None
            }
            (_, None) => {
                warn!("No realtime provider loaded; agent runtime unavailable");
                None
            }
        };
    info!(
        agent_available = launcher.is_some(),
        room_provider_configured = rooms.is_some(),
        "Agent runtime status"
    );

    let mut orchestrator = Orchestrator::new(OrchestratorSettings::from(&config), registry);
    if let Some(rooms) = rooms {
        orchestrator = orchestrator.with_rooms(rooms);
    }
    if let Some(launcher) = launcher {
        orchestrator = orchestrator.with_launcher(launcher);
    }
    if let Some(detector) = providers.detector.clone() {
        orchestrator = orchestrator.with_detector(detector);
    }
    let orchestrator = Arc::new(orchestrator);

    let app_state = Arc::new(AppState {
        orchestrator: orchestrator.clone(),
    });

    // --- 4. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state).layer(cors);

    // --- 5. Start Server ---
    info!(
        bind_address = %config.bind_address,
        default_language = %config.default_language,
        default_model = %config.default_model,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    orchestrator.shutdown_all().await;
    info!("Server has shut down.");
    Ok(())
}
