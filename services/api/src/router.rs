//! Axum Router Configuration
//!
//! The HTTP routes of the service and its OpenAPI documentation.

use crate::{
    error::ErrorKind,
    handlers,
    models::{
        ConnectPayload, ConnectResponse, DetectLanguagePayload, DetectLanguageResponse,
        DisconnectResponse, ErrorResponse, HealthResponse, ModelDetail, ModelSummary,
        ProviderHealth, ServiceBanner, VoiceSummary,
    },
    state::AppState,
};

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use voxbridge_core::{
    language::ResolutionSource,
    pipeline::Topology,
    providers::{Capability, ProviderId},
    session::{SessionInfo, SessionState},
    transcript::{Finality, Role, TranscriptEvent},
};

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::root,
        handlers::health,
        handlers::connect,
        handlers::disconnect,
        handlers::list_sessions,
        handlers::list_models,
        handlers::get_model,
        handlers::list_model_voices,
        handlers::detect_language,
    ),
    components(
        schemas(
            ConnectPayload, ConnectResponse, DisconnectResponse, HealthResponse, ProviderHealth,
            ServiceBanner, ModelSummary, ModelDetail, VoiceSummary, DetectLanguagePayload,
            DetectLanguageResponse, ErrorResponse, ErrorKind, SessionInfo, SessionState,
            ResolutionSource, Topology, ProviderId, Capability, TranscriptEvent, Role, Finality
        )
    ),
    tags(
        (name = "Voxbridge API", description = "Voice session orchestration and speech-service routing")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/connect", post(handlers::connect))
        .route("/disconnect/{room_name}", post(handlers::disconnect))
        .route("/sessions", get(handlers::list_sessions))
        .route("/models", get(handlers::list_models))
        .route("/models/{model_id}", get(handlers::get_model))
        .route("/models/{model_id}/voices", get(handlers::list_model_voices))
        .route("/detect-language", post(handlers::detect_language))
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}
