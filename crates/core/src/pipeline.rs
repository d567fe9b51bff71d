//! Pipeline Composer
//!
//! Decides, for one session, whether a single integrated provider handles
//! recognition, generation and synthesis, or whether those run as separate
//! stages so a dedicated voice provider can speak instead. The resulting plan
//! is fixed for the session's lifetime.

use crate::providers::{Capability, ProviderCapabilityRegistry, ProviderDescriptor, ProviderId};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fmt};
use thiserror::Error;
use tracing::debug;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Topology {
    Integrated,
    Decomposed,
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topology::Integrated => f.write_str("integrated"),
            Topology::Decomposed => f.write_str("decomposed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum StageKind {
    Input,
    Stt,
    UserTranscriptCapture,
    ContextAggregateUser,
    Llm,
    Tts,
    Output,
    AssistantTranscriptCapture,
    ContextAggregateAssistant,
}

/// What a stage is executed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "provider", rename_all = "lowercase")]
pub enum StageBinding {
    /// The room transport (media in/out).
    Transport,
    Provider(ProviderId),
    /// In-process bookkeeping (transcripts, conversation context).
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDescriptor {
    pub kind: StageKind,
    pub binding: StageBinding,
}

/// Switches applied to the integrated provider's own outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegratedOptions {
    /// The integrated provider produces speech itself.
    pub audio_output: bool,
    pub transcribe_user_audio: bool,
    /// Transcribe the integrated provider's own speech.
    pub transcribe_model_audio: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelinePlan {
    language: String,
    topology: Topology,
    stages: Vec<StageDescriptor>,
    options: IntegratedOptions,
}

impl PipelinePlan {
    fn integrated(language: &str, provider: ProviderId) -> Self {
        use StageBinding::{Local, Provider, Transport};
        use StageKind::*;

        let stages = [
            (Input, Transport),
            (UserTranscriptCapture, Local),
            (ContextAggregateUser, Local),
            (Llm, Provider(provider)),
            (Output, Transport),
            (AssistantTranscriptCapture, Local),
            (ContextAggregateAssistant, Local),
        ];
        Self {
            language: language.to_string(),
            topology: Topology::Integrated,
            stages: stages
                .into_iter()
                .map(|(kind, binding)| StageDescriptor { kind, binding })
                .collect(),
            options: IntegratedOptions {
                audio_output: true,
                transcribe_user_audio: true,
                transcribe_model_audio: true,
            },
        }
    }

    fn decomposed(language: &str, recognizer: ProviderId, synthesizer: ProviderId) -> Self {
        use StageBinding::{Local, Provider, Transport};
        use StageKind::*;

        let stages = [
            (Input, Transport),
            (Stt, Provider(recognizer)),
            (UserTranscriptCapture, Local),
            (ContextAggregateUser, Local),
            (Llm, Provider(recognizer)),
            (Tts, Provider(synthesizer)),
            (Output, Transport),
            (AssistantTranscriptCapture, Local),
            (ContextAggregateAssistant, Local),
        ];
        Self {
            language: language.to_string(),
            topology: Topology::Decomposed,
            stages: stages
                .into_iter()
                .map(|(kind, binding)| StageDescriptor { kind, binding })
                .collect(),
            // The synthesis stage is the only producer of audio out.
            options: IntegratedOptions {
                audio_output: false,
                transcribe_user_audio: true,
                transcribe_model_audio: false,
            },
        }
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn topology(&self) -> Topology {
        self.topology
    }

    pub fn stages(&self) -> &[StageDescriptor] {
        &self.stages
    }

    pub fn options(&self) -> IntegratedOptions {
        self.options
    }

    /// The provider bound to the first stage of `kind`, if any.
    pub fn provider_for(&self, kind: StageKind) -> Option<ProviderId> {
        self.stages
            .iter()
            .find(|s| s.kind == kind)
            .and_then(|s| match s.binding {
                StageBinding::Provider(id) => Some(id),
                _ => None,
            })
    }

    pub fn has_stage(&self, kind: StageKind) -> bool {
        self.stages.iter().any(|s| s.kind == kind)
    }
}

/// Caller-side knobs for composition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositionPreferences {
    /// Use a dedicated synthesis provider when one covers the language.
    pub prefer_override: bool,
    /// Providers to skip, e.g. ones that recently failed at runtime.
    pub excluded: BTreeSet<ProviderId>,
}

impl Default for CompositionPreferences {
    fn default() -> Self {
        Self {
            prefer_override: true,
            excluded: BTreeSet::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ComposeError {
    #[error("no provider is available for language '{language}'")]
    ProviderUnavailable { language: String },
}

/// Chooses the topology and stage bindings for `language`.
///
/// Only reads the registry, so identical inputs always give the same plan.
pub fn compose(
    language: &str,
    registry: &ProviderCapabilityRegistry,
    preferences: &CompositionPreferences,
) -> Result<PipelinePlan, ComposeError> {
    let usable = |d: &&ProviderDescriptor| !preferences.excluded.contains(&d.id);

    let integrated = registry
        .candidates(Capability::IntegratedSttLlmTts, language)
        .find(usable);
    let dedicated_tts = if preferences.prefer_override {
        registry
            .candidates(Capability::Tts, language)
            .filter(|d| d.dedicated)
            .find(usable)
    } else {
        None
    };

    // The override needs a separate recognizer; without one the integrated
    // provider still serves the language.
    let decomposed = dedicated_tts.and_then(|synthesizer| {
        registry
            .candidates(Capability::Stt, language)
            .filter(|d| d.has(Capability::Llm))
            .find(usable)
            .map(|recognizer| PipelinePlan::decomposed(language, recognizer.id, synthesizer.id))
    });

    let plan = match (decomposed, integrated) {
        (Some(plan), _) => plan,
        (None, Some(provider)) => PipelinePlan::integrated(language, provider.id),
        (None, None) => {
            return Err(ComposeError::ProviderUnavailable {
                language: language.to_string(),
            });
        }
    };

    debug!(language, topology = %plan.topology, "Composed pipeline");
    Ok(plan)
}
