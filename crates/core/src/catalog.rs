//! Model and voice catalog for the integrated Gemini Live provider, plus the
//! voices of the dedicated Dutch synthesis provider.

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelType {
    HalfCascade,
    NativeAudio,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub model_type: ModelType,
    pub description: &'static str,
    pub features: &'static [&'static str],
    pub tier: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoiceInfo {
    pub id: &'static str,
    pub description: &'static str,
}

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-live-001";
pub const FALLBACK_VOICE: &str = "Puck";

/// Cartesia voices for Dutch speech.
pub const CARTESIA_DUTCH_VOICE_FEMALE: &str = "79a125e8-cd45-4c13-8a67-188112f4dd22";
pub const CARTESIA_DUTCH_VOICE_MALE: &str = "95856005-0332-41b0-935f-352e296aa0df";
pub const CARTESIA_MODEL: &str = "sonic-2";

/// Maps a dedicated Dutch voice name (`female` or `male`) to its Cartesia id.
pub fn dedicated_dutch_voice(name: &str) -> Option<&'static str> {
    match name.trim().to_ascii_lowercase().as_str() {
        "female" => Some(CARTESIA_DUTCH_VOICE_FEMALE),
        "male" => Some(CARTESIA_DUTCH_VOICE_MALE),
        _ => None,
    }
}

/// Languages the Live API speaks and transcribes.
pub const GEMINI_LIVE_LANGUAGES: &[&str] = &[
    "en-US", "en-GB", "nl-NL", "es-ES", "fr-FR", "de-DE", "it-IT", "pt-BR",
];

const MODELS: &[ModelInfo] = &[
    ModelInfo {
        id: "gemini-2.0-flash-exp",
        name: "Gemini 2.0 Flash Experimental",
        model_type: ModelType::HalfCascade,
        description: "Experimental model with Live API support",
        features: &["streaming", "interruption", "low_latency"],
        tier: "free",
    },
    ModelInfo {
        id: "gemini-2.0-flash-live-001",
        name: "Gemini 2.0 Flash Live",
        model_type: ModelType::HalfCascade,
        description: "Stable Live API model used in production",
        features: &["streaming", "interruption", "low_latency", "production"],
        tier: "free",
    },
    ModelInfo {
        id: "gemini-2.5-flash",
        name: "Gemini 2.5 Flash",
        model_type: ModelType::HalfCascade,
        description: "Latest half-cascade model",
        features: &["streaming", "interruption", "low_latency", "latest"],
        tier: "free",
    },
    ModelInfo {
        id: "gemini-2.0-flash",
        name: "Gemini 2.0 Flash",
        model_type: ModelType::HalfCascade,
        description: "Stable half-cascade model",
        features: &["streaming", "interruption", "low_latency"],
        tier: "free",
    },
    ModelInfo {
        id: "gemini-2.5-flash-preview-native-audio-dialog",
        name: "Gemini 2.5 Flash Native Audio Dialog",
        model_type: ModelType::NativeAudio,
        description: "Native audio with emotion-aware responses",
        features: &["native_audio", "all_voices", "emotion_aware"],
        tier: "paid",
    },
    ModelInfo {
        id: "gemini-live-2.5-flash",
        name: "Gemini Live 2.5 Flash",
        model_type: ModelType::NativeAudio,
        description: "Production native audio model",
        features: &["native_audio", "all_voices", "production_ready"],
        tier: "paid_ga",
    },
    ModelInfo {
        id: "gemini-live-2.5-flash-preview-native-audio-09-2025",
        name: "Gemini Live 2.5 Flash Native Audio Preview",
        model_type: ModelType::NativeAudio,
        description: "Public preview of native audio",
        features: &["native_audio", "all_voices", "preview"],
        tier: "paid",
    },
];

const HALF_CASCADE_VOICES: &[VoiceInfo] = &[
    VoiceInfo { id: "Puck", description: "Upbeat voice" },
    VoiceInfo { id: "Charon", description: "Informative voice" },
    VoiceInfo { id: "Kore", description: "Firm voice" },
    VoiceInfo { id: "Fenrir", description: "Excitable voice" },
    VoiceInfo { id: "Aoede", description: "Breezy voice" },
    VoiceInfo { id: "Leda", description: "Youthful voice" },
    VoiceInfo { id: "Orus", description: "Firm voice" },
    VoiceInfo { id: "Zephyr", description: "Bright voice" },
];

const NATIVE_ONLY_VOICES: &[VoiceInfo] = &[
    VoiceInfo { id: "Callirrhoe", description: "Easy-going voice" },
    VoiceInfo { id: "Autonoe", description: "Bright voice" },
    VoiceInfo { id: "Enceladus", description: "Breathy voice" },
    VoiceInfo { id: "Iapetus", description: "Clear voice" },
    VoiceInfo { id: "Umbriel", description: "Easy-going voice" },
    VoiceInfo { id: "Algieba", description: "Smooth voice" },
    VoiceInfo { id: "Despina", description: "Smooth voice" },
    VoiceInfo { id: "Erinome", description: "Clear voice" },
    VoiceInfo { id: "Algenib", description: "Gravelly voice" },
    VoiceInfo { id: "Rasalgethi", description: "Informative voice" },
    VoiceInfo { id: "Laomedeia", description: "Upbeat voice" },
    VoiceInfo { id: "Achernar", description: "Soft voice" },
    VoiceInfo { id: "Alnilam", description: "Firm voice" },
    VoiceInfo { id: "Schedar", description: "Even voice" },
    VoiceInfo { id: "Gacrux", description: "Mature voice" },
    VoiceInfo { id: "Pulcherrima", description: "Forward voice" },
    VoiceInfo { id: "Achird", description: "Friendly voice" },
    VoiceInfo { id: "Zubenelgenubi", description: "Casual voice" },
    VoiceInfo { id: "Vindemiatrix", description: "Gentle voice" },
    VoiceInfo { id: "Sadachbia", description: "Lively voice" },
    VoiceInfo { id: "Sadaltager", description: "Knowledgeable voice" },
    VoiceInfo { id: "Sulafat", description: "Warm voice" },
];

/// Voice used when the client names none, per language.
const PREFERRED_VOICES: &[(&str, &str)] = &[
    ("en-US", "Puck"),
    ("en-GB", "Charon"),
    ("nl-NL", "Aoede"),
    ("es-ES", "Fenrir"),
    ("fr-FR", "Kore"),
    ("de-DE", "Orus"),
];

pub fn models() -> &'static [ModelInfo] {
    MODELS
}

pub fn model(id: &str) -> Option<&'static ModelInfo> {
    MODELS.iter().find(|m| m.id == id)
}

/// Voices supported by `model_id`; empty for unknown models.
pub fn voices_for(model_id: &str) -> Vec<&'static VoiceInfo> {
    match model(model_id).map(|m| m.model_type) {
        Some(ModelType::HalfCascade) => HALF_CASCADE_VOICES.iter().collect(),
        Some(ModelType::NativeAudio) => HALF_CASCADE_VOICES
            .iter()
            .chain(NATIVE_ONLY_VOICES.iter())
            .collect(),
        None => Vec::new(),
    }
}

pub fn supports_voice(model_id: &str, voice_id: &str) -> bool {
    voices_for(model_id).iter().any(|v| v.id == voice_id)
}

pub fn default_voice(model_id: &str) -> &'static str {
    let voices = voices_for(model_id);
    if voices.iter().any(|v| v.id == FALLBACK_VOICE) {
        return FALLBACK_VOICE;
    }
    voices.first().map(|v| v.id).unwrap_or(FALLBACK_VOICE)
}

/// The voice for `language` when the client did not pick one.
pub fn preferred_voice(language: &str, model_id: &str) -> &'static str {
    PREFERRED_VOICES
        .iter()
        .find(|(lang, _)| *lang == language)
        .map(|(_, voice)| *voice)
        .filter(|voice| supports_voice(model_id, voice))
        .unwrap_or_else(|| default_voice(model_id))
}

pub fn system_instruction(language: &str) -> &'static str {
    match language {
        "nl-NL" => {
            "Je bent een behulpzame Nederlandse AI-assistent. Spreek natuurlijk Nederlands en \
             houd je antwoorden beknopt en vriendelijk. Je helpt gebruikers met hun vragen en taken."
        }
        "de-DE" => {
            "Du bist ein hilfreicher deutscher KI-Assistent. Sprich natürliches Deutsch und \
             halte deine Antworten prägnant und freundlich."
        }
        "fr-FR" => {
            "Tu es un assistant IA français serviable. Parle un français naturel et garde tes \
             réponses concises et amicales."
        }
        _ => "You are a helpful voice assistant. Keep responses concise and natural.",
    }
}

/// The resource name the Live API expects.
pub fn model_path(model_id: &str) -> String {
    if model_id.starts_with("models/") {
        model_id.to_string()
    } else {
        format!("models/{model_id}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("unknown model '{0}'")]
    UnknownModel(String),
    #[error("voice '{voice}' is not supported by model '{model}'")]
    UnsupportedVoice { model: String, voice: String },
}

/// The model and voice a session will use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoiceSelection {
    pub model: &'static ModelInfo,
    pub voice: &'static str,
}

/// Validates the client's model and voice choice, filling in defaults.
pub fn select(
    model_id: Option<&str>,
    voice_id: Option<&str>,
    language: &str,
    default_model: &str,
) -> Result<VoiceSelection, CatalogError> {
    let model_id = model_id.unwrap_or(default_model);
    let model = model(model_id).ok_or_else(|| CatalogError::UnknownModel(model_id.to_string()))?;

    let voice = match voice_id {
        Some(requested) => voices_for(model.id)
            .into_iter()
            .find(|v| v.id == requested)
            .map(|v| v.id)
            .ok_or_else(|| CatalogError::UnsupportedVoice {
                model: model.id.to_string(),
                voice: requested.to_string(),
            })?,
        None => preferred_voice(language, model.id),
    };

    Ok(VoiceSelection { model, voice })
}
