//! API Models
//!
//! Request and response bodies of the HTTP surface, documented for the
//! OpenAPI spec with `utoipa`.

use crate::{error::ErrorKind, orchestrator::ConnectOutcome};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use voxbridge_core::{
    catalog::{self, ModelInfo, VoiceInfo},
    language::ResolutionSource,
    pipeline::Topology,
    providers::{Capability, ProviderDescriptor, ProviderId},
};

#[derive(Deserialize, ToSchema, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConnectPayload {
    /// BCP-47 tag; the service default applies when absent.
    #[schema(example = "nl-NL")]
    pub language: Option<String>,
    #[schema(example = "gemini-2.0-flash-live-001")]
    pub model_id: Option<String>,
    #[schema(example = "Aoede")]
    pub voice_id: Option<String>,
    /// Stable client identifier used to remember its language between sessions.
    pub client_id: Option<String>,
    /// A short base64 audio sample for live language detection.
    pub detection_audio: Option<String>,
    #[schema(example = "audio/wav")]
    pub detection_mime_type: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ConnectResponse {
    pub room_url: String,
    pub room_name: String,
    pub client_token: String,
    #[schema(example = "nl-NL")]
    pub effective_language: String,
    pub language_source: ResolutionSource,
    pub topology: Topology,
    pub model: String,
    pub voice: Option<String>,
    #[schema(value_type = String, format = Uuid)]
    pub session_id: Uuid,
}

impl From<ConnectOutcome> for ConnectResponse {
    fn from(outcome: ConnectOutcome) -> Self {
        Self {
            room_url: outcome.room.url,
            room_name: outcome.room.name,
            client_token: outcome.client_token,
            effective_language: outcome.resolution.language,
            language_source: outcome.resolution.source,
            topology: outcome.topology,
            model: outcome.model,
            voice: outcome.voice,
            session_id: outcome.session_id,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectResponse {
    pub room_name: String,
    #[schema(example = "stopping")]
    pub status: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ProviderHealth {
    pub id: ProviderId,
    pub credentials_configured: bool,
    pub loaded: bool,
    pub available: bool,
    /// Temporarily excluded from new sessions after runtime failures.
    pub degraded: bool,
    pub capabilities: Vec<Capability>,
    /// `None` when the provider serves any language.
    pub languages: Option<Vec<String>>,
}

impl ProviderHealth {
    pub fn new(descriptor: &ProviderDescriptor, degraded: bool) -> Self {
        Self {
            id: descriptor.id,
            credentials_configured: descriptor.credentials_configured,
            loaded: descriptor.loaded,
            available: descriptor.is_available(),
            degraded,
            capabilities: descriptor.capabilities.iter().copied().collect(),
            languages: descriptor.languages.languages(),
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    #[schema(example = "healthy")]
    pub status: String,
    pub service: String,
    pub version: String,
    pub providers: Vec<ProviderHealth>,
    pub room_provider_configured: bool,
    pub agent_available: bool,
    pub active_sessions: usize,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct ServiceBanner {
    pub service: String,
    pub version: String,
    pub endpoints: Vec<String>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ModelSummary {
    pub id: String,
    pub name: String,
    #[schema(example = "half-cascade")]
    pub model_type: String,
    pub description: String,
    pub features: Vec<String>,
    pub tier: String,
    pub default_voice: String,
}

impl From<&ModelInfo> for ModelSummary {
    fn from(model: &ModelInfo) -> Self {
        let model_type = serde_json::to_value(model.model_type)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        Self {
            id: model.id.to_string(),
            name: model.name.to_string(),
            model_type,
            description: model.description.to_string(),
            features: model.features.iter().map(|f| f.to_string()).collect(),
            tier: model.tier.to_string(),
            default_voice: catalog::default_voice(model.id).to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct VoiceSummary {
    #[schema(example = "Puck")]
    pub id: String,
    pub description: String,
}

impl From<&VoiceInfo> for VoiceSummary {
    fn from(voice: &VoiceInfo) -> Self {
        Self {
            id: voice.id.to_string(),
            description: voice.description.to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct ModelDetail {
    #[serde(flatten)]
    pub model: ModelSummary,
    pub voices: Vec<VoiceSummary>,
}

#[derive(Deserialize, ToSchema, Debug)]
#[serde(rename_all = "camelCase")]
pub struct DetectLanguagePayload {
    /// Base64 audio sample.
    pub audio: String,
    #[schema(example = "audio/wav")]
    pub mime_type: Option<String>,
    pub client_id: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DetectLanguageResponse {
    #[schema(example = "nl-NL")]
    pub language: String,
    pub confidence: f32,
    /// Whether the result was stored as the client's last known good language.
    pub recorded: bool,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct ErrorResponse {
    pub kind: ErrorKind,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxbridge_core::providers::LanguageSupport;

    #[test]
    fn test_connect_payload_accepts_partial_bodies() {
        let payload: ConnectPayload = serde_json::from_str(r#"{"language": "nl-NL"}"#).unwrap();
        assert_eq!(payload.language.as_deref(), Some("nl-NL"));
        assert!(payload.model_id.is_none());

        let payload: ConnectPayload =
            serde_json::from_str(r#"{"modelId": "gemini-2.5-flash", "voiceId": "Kore"}"#).unwrap();
        assert_eq!(payload.model_id.as_deref(), Some("gemini-2.5-flash"));
        assert_eq!(payload.voice_id.as_deref(), Some("Kore"));
    }

    #[test]
    fn test_model_summary_uses_kebab_case_type() {
        let model = catalog::model(catalog::DEFAULT_MODEL).unwrap();
        let summary = ModelSummary::from(model);
        assert_eq!(summary.model_type, "half-cascade");
        assert_eq!(summary.default_voice, "Puck");
    }

    #[test]
    fn test_provider_health_reports_languages() {
        let descriptor = ProviderDescriptor::new(
            ProviderId::Cartesia,
            [Capability::Tts],
            LanguageSupport::only(["nl-NL"]),
        )
        .with_status(true, false);
        let health = ProviderHealth::new(&descriptor, false);
        assert!(health.credentials_configured);
        assert!(!health.available);

        let json = serde_json::to_value(&health).unwrap();
        assert_eq!(json["capabilities"][0], "tts");
        assert_eq!(json["languages"][0], "nl-NL");
        assert_eq!(json["credentialsConfigured"], true);
    }

    #[test]
    fn test_error_response_shape() {
        let body = ErrorResponse {
            kind: ErrorKind::BotJoinTimeout,
            message: "agent did not join".to_string(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["kind"], "BotJoinTimeout");
    }
}
