//! Axum Handlers for the REST API
//!
//! Thin adapters between HTTP and the orchestrator. Each handler carries
//! `utoipa` path docs for the generated OpenAPI spec.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use std::sync::Arc;
use tracing::{info, instrument};
use voxbridge_core::{catalog, language::DetectionOutcome, session::SessionInfo};

use crate::{
    audio_utils,
    error::{ApiError, ErrorKind},
    models::{
        ConnectPayload, ConnectResponse, DetectLanguagePayload, DetectLanguageResponse,
        DisconnectResponse, ErrorResponse, HealthResponse, ModelDetail, ModelSummary,
        ProviderHealth, ServiceBanner, VoiceSummary,
    },
    orchestrator::ConnectRequest,
    state::AppState,
};

const SERVICE_NAME: &str = "voxbridge";
const DEFAULT_DETECTION_MIME_TYPE: &str = "audio/wav";

/// Service banner with the available endpoints.
#[utoipa::path(
    get,
    path = "/",
    responses((status = 200, description = "Service banner", body = ServiceBanner))
)]
pub async fn root() -> Json<ServiceBanner> {
    Json(ServiceBanner {
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        endpoints: [
            "GET /health",
            "POST /connect",
            "POST /disconnect/{room_name}",
            "GET /sessions",
            "GET /models",
            "GET /models/{model_id}",
            "GET /models/{model_id}/voices",
            "POST /detect-language",
            "GET /swagger-ui",
        ]
        .into_iter()
        .map(str::to_string)
        .collect(),
    })
}

/// Provider, transport and agent availability.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service health", body = HealthResponse))
)]
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let orchestrator = &state.orchestrator;
    let degraded = orchestrator.degraded().active();
    let providers = orchestrator
        .providers()
        .descriptors()
        .iter()
        .map(|d| ProviderHealth::new(d, degraded.contains(&d.id)))
        .collect();

    Json(HealthResponse {
        status: "healthy".to_string(),
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        providers,
        room_provider_configured: orchestrator.room_provider_configured(),
        agent_available: orchestrator.agent_available(),
        active_sessions: orchestrator.active_sessions(),
    })
}

/// Start a voice session: provisions a room and launches the agent into it.
#[utoipa::path(
    post,
    path = "/connect",
    request_body = ConnectPayload,
    responses(
        (status = 200, description = "Agent joined; the client may enter the room", body = ConnectResponse),
        (status = 400, description = "Invalid language, model or voice", body = ErrorResponse),
        (status = 502, description = "Room or token could not be provisioned", body = ErrorResponse),
        (status = 503, description = "No provider or agent runtime available", body = ErrorResponse),
        (status = 504, description = "Agent did not join in time", body = ErrorResponse)
    )
)]
#[instrument(skip_all, fields(language = payload.language.as_deref()))]
pub async fn connect(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ConnectPayload>,
) -> Result<Json<ConnectResponse>, ApiError> {
    let detection_audio = payload
        .detection_audio
        .as_deref()
        .map(audio_utils::decode_base64)
        .transpose()
        .map_err(|e| ApiError::BadRequest(format!("detectionAudio is not valid base64: {e}")))?;

    let outcome = state
        .orchestrator
        .connect(ConnectRequest {
            language: payload.language,
            model_id: payload.model_id,
            voice_id: payload.voice_id,
            client_id: payload.client_id,
            detection_audio,
            detection_mime_type: payload.detection_mime_type,
        })
        .await?;

    info!(room = %outcome.room.name, topology = %outcome.topology, "Connect succeeded");
    Ok(Json(outcome.into()))
}

/// Ask the agent in a room to finish.
#[utoipa::path(
    post,
    path = "/disconnect/{room_name}",
    responses(
        (status = 200, description = "Session is stopping", body = DisconnectResponse),
        (status = 404, description = "No session in this room", body = ErrorResponse)
    ),
    params(("room_name" = String, Path, description = "Room name returned by /connect"))
)]
#[instrument(skip(state))]
pub async fn disconnect(
    State(state): State<Arc<AppState>>,
    Path(room_name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.orchestrator.disconnect(&room_name) {
        return Err(ApiError::NotFound(format!(
            "No active session in room '{room_name}'"
        )));
    }
    Ok((
        StatusCode::OK,
        Json(DisconnectResponse {
            room_name,
            status: "stopping".to_string(),
        }),
    ))
}

/// List active sessions.
#[utoipa::path(
    get,
    path = "/sessions",
    responses((status = 200, description = "Active sessions", body = [SessionInfo]))
)]
pub async fn list_sessions(State(state): State<Arc<AppState>>) -> Json<Vec<SessionInfo>> {
    Json(state.orchestrator.sessions())
}

/// List the available models.
#[utoipa::path(
    get,
    path = "/models",
    responses((status = 200, description = "Available models", body = [ModelSummary]))
)]
pub async fn list_models() -> Json<Vec<ModelSummary>> {
    Json(catalog::models().iter().map(ModelSummary::from).collect())
}

/// Get one model with its voices.
#[utoipa::path(
    get,
    path = "/models/{model_id}",
    responses(
        (status = 200, description = "Model details", body = ModelDetail),
        (status = 404, description = "Unknown model", body = ErrorResponse)
    ),
    params(("model_id" = String, Path, description = "Model id"))
)]
pub async fn get_model(Path(model_id): Path<String>) -> Result<Json<ModelDetail>, ApiError> {
    let model = catalog::model(&model_id)
        .ok_or_else(|| ApiError::NotFound(format!("Model '{model_id}' not found")))?;
    Ok(Json(ModelDetail {
        model: ModelSummary::from(model),
        voices: catalog::voices_for(model.id)
            .into_iter()
            .map(VoiceSummary::from)
            .collect(),
    }))
}

/// List the voices a model supports.
#[utoipa::path(
    get,
    path = "/models/{model_id}/voices",
    responses(
        (status = 200, description = "Supported voices", body = [VoiceSummary]),
        (status = 404, description = "Unknown model", body = ErrorResponse)
    ),
    params(("model_id" = String, Path, description = "Model id"))
)]
pub async fn list_model_voices(
    Path(model_id): Path<String>,
) -> Result<Json<Vec<VoiceSummary>>, ApiError> {
    let model = catalog::model(&model_id)
        .ok_or_else(|| ApiError::NotFound(format!("Model '{model_id}' not found")))?;
    Ok(Json(
        catalog::voices_for(model.id)
            .into_iter()
            .map(VoiceSummary::from)
            .collect(),
    ))
}

/// Detect the spoken language of a short sample.
#[utoipa::path(
    post,
    path = "/detect-language",
    request_body = DetectLanguagePayload,
    responses(
        (status = 200, description = "Detected language", body = DetectLanguageResponse),
        (status = 400, description = "Audio is not valid base64", body = ErrorResponse),
        (status = 503, description = "No detector configured or detection failed", body = ErrorResponse),
        (status = 504, description = "Detection did not finish within its budget", body = ErrorResponse)
    )
)]
#[instrument(skip_all, fields(client_id = payload.client_id.as_deref()))]
pub async fn detect_language(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<DetectLanguagePayload>,
) -> Result<Json<DetectLanguageResponse>, ApiError> {
    let audio = audio_utils::decode_base64(&payload.audio)
        .map_err(|e| ApiError::BadRequest(format!("audio is not valid base64: {e}")))?;
    let mime_type = payload
        .mime_type
        .unwrap_or_else(|| DEFAULT_DETECTION_MIME_TYPE.to_string());
    let recorded = payload.client_id.is_some();

    let outcome = state
        .orchestrator
        .detect_language(audio, mime_type, payload.client_id)
        .await
        .ok_or_else(|| {
            ApiError::Unavailable(
                ErrorKind::ProviderUnavailable,
                "No language detector is configured".to_string(),
            )
        })?;

    match outcome {
        DetectionOutcome::Detected(detection) => Ok(Json(DetectLanguageResponse {
            language: detection.language,
            confidence: detection.confidence,
            recorded,
        })),
        DetectionOutcome::TimedOut => Err(ApiError::DetectionTimeout),
        DetectionOutcome::Failed(reason) => {
            Err(ApiError::Unavailable(ErrorKind::ProviderUnavailable, reason))
        }
    }
}
