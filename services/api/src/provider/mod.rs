//! Speech and language-model provider clients.
//!
//! Each client is constructed once at startup when its credentials are
//! present; the capability registry is derived from which clients exist.

pub mod cartesia;
pub mod deepgram;
pub mod gemini;

use crate::config::Config;
use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{info, warn};
use voxbridge_core::{
    catalog,
    language::LanguageDetector,
    pipeline::IntegratedOptions,
    providers::{
        Capability, LanguageSupport, ProviderCapabilityRegistry, ProviderDescriptor, ProviderId,
    },
    transcript::{ProviderTranscript, Role},
};

/// A conversation turn handed to the realtime service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextMessage {
    pub role: ContextRole,
    pub text: String,
}

impl From<Role> for ContextRole {
    fn from(role: Role) -> Self {
        match role {
            Role::User => ContextRole::User,
            Role::Assistant => ContextRole::Assistant,
        }
    }
}

/// An input passed to a running realtime session.
#[derive(Debug)]
pub enum ServiceInput {
    /// Mono PCM16 at 16 kHz from the room.
    Audio(Bytes),
    /// Sends the conversation so far and asks the model to respond.
    Respond(Vec<ContextMessage>),
}

/// An output of a running realtime session.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceEvent {
    Transcript(ProviderTranscript),
    /// Generated text, when the service runs without audio output.
    AssistantText(String),
    /// Mono PCM16 at 16 kHz.
    Audio(Bytes),
    Interrupted,
    TurnComplete,
    Closed(Option<String>),
}

/// How to configure one realtime session.
#[derive(Debug, Clone, PartialEq)]
pub struct RealtimeSettings {
    pub model: String,
    /// Only used when `options.audio_output` is set.
    pub voice: Option<String>,
    pub language: String,
    pub system_instruction: String,
    pub options: IntegratedOptions,
}

/// A running realtime session: inputs go in through `input`, outputs arrive on
/// `events`, and `task` owns the provider connection.
pub struct RealtimeLink {
    pub input: mpsc::Sender<ServiceInput>,
    pub events: mpsc::Receiver<ServiceEvent>,
    pub task: JoinHandle<()>,
}

#[async_trait]
pub trait RealtimeConnector: Send + Sync {
    /// Opens a session. Resolves once the provider has accepted the setup.
    async fn open(&self, settings: RealtimeSettings) -> Result<RealtimeLink>;
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Returns mono PCM16 at 16 kHz.
    async fn synthesize(&self, text: &str, language: &str) -> Result<Bytes>;
}

/// The provider clients this process could construct.
#[derive(Clone, Default)]
pub struct Providers {
    pub realtime: Option<Arc<dyn RealtimeConnector>>,
    pub synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
    pub detector: Option<Arc<dyn LanguageDetector>>,
    /// Providers whose key was set but whose client failed to build.
    pub failed: Vec<ProviderId>,
}

impl Providers {
    pub fn from_config(config: &Config) -> Self {
        let mut providers = Providers::default();

        if let Some(key) = &config.google_api_key {
            providers.realtime = Some(Arc::new(gemini::GeminiLiveConnector::new(key.clone())));
        }
        if let Some(key) = &config.cartesia_api_key {
            match cartesia::CartesiaSynthesizer::new(key.clone(), config.cartesia_voice.clone()) {
                Ok(client) => providers.synthesizer = Some(Arc::new(client)),
                Err(e) => {
                    warn!(error = %e, "Failed to build Cartesia client");
                    providers.failed.push(ProviderId::Cartesia);
                }
            }
        }
        if let Some(key) = &config.deepgram_api_key {
            match deepgram::DeepgramDetector::new(key.clone()) {
                Ok(client) => providers.detector = Some(Arc::new(client)),
                Err(e) => {
                    warn!(error = %e, "Failed to build Deepgram client");
                    providers.failed.push(ProviderId::Deepgram);
                }
            }
        }
        providers
    }

    /// Describes the providers for composition and health reporting.
    pub fn registry(&self, config: &Config) -> ProviderCapabilityRegistry {
        let gemini = ProviderDescriptor::new(
            ProviderId::GeminiLive,
            [Capability::IntegratedSttLlmTts, Capability::Stt, Capability::Llm],
            LanguageSupport::only(catalog::GEMINI_LIVE_LANGUAGES),
        )
        .with_status(config.google_api_key.is_some(), self.realtime.is_some());

        let cartesia = ProviderDescriptor::new(
            ProviderId::Cartesia,
            [Capability::Tts],
            LanguageSupport::only(["nl-NL"]),
        )
        .with_status(config.cartesia_api_key.is_some(), self.synthesizer.is_some())
        .dedicated();

        let deepgram = ProviderDescriptor::new(
            ProviderId::Deepgram,
            [Capability::LanguageDetection],
            LanguageSupport::Any,
        )
        .with_status(config.deepgram_api_key.is_some(), self.detector.is_some());

        let registry = ProviderCapabilityRegistry::new([gemini, cartesia, deepgram]);
        for descriptor in registry.descriptors() {
            info!(
                provider = %descriptor.id,
                credentials_configured = descriptor.credentials_configured,
                loaded = descriptor.loaded,
                "Provider status"
            );
        }
        registry
    }
}
