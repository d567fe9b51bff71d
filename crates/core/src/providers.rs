//! Provider Capability Registry
//!
//! A static description of the speech and language-model providers this
//! process can use. It is built once during startup from configuration and
//! shared read-only afterwards; availability never changes for the lifetime of
//! the registry.

use crate::language::canonicalize;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderId {
    GeminiLive,
    Cartesia,
    Deepgram,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::GeminiLive => "gemini-live",
            ProviderId::Cartesia => "cartesia",
            ProviderId::Deepgram => "deepgram",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
pub enum Capability {
    #[serde(rename = "stt")]
    Stt,
    #[serde(rename = "llm")]
    Llm,
    #[serde(rename = "tts")]
    Tts,
    #[serde(rename = "integrated-stt-llm-tts")]
    IntegratedSttLlmTts,
    #[serde(rename = "language-detection")]
    LanguageDetection,
}

/// The languages a provider can serve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LanguageSupport {
    Any,
    /// Canonical BCP-47 tags.
    Only(BTreeSet<String>),
}

impl LanguageSupport {
    /// Builds a restricted set, canonicalising every tag and dropping invalid ones.
    pub fn only<I, S>(languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        LanguageSupport::Only(
            languages
                .into_iter()
                .filter_map(|tag| canonicalize(tag.as_ref()))
                .collect(),
        )
    }

    pub fn contains(&self, language: &str) -> bool {
        match self {
            LanguageSupport::Any => true,
            LanguageSupport::Only(set) => {
                canonicalize(language).is_some_and(|language| set.contains(&language))
            }
        }
    }

    /// The explicit language list, or `None` when every language is accepted.
    pub fn languages(&self) -> Option<Vec<String>> {
        match self {
            LanguageSupport::Any => None,
            LanguageSupport::Only(set) => Some(set.iter().cloned().collect()),
        }
    }
}

/// One configured provider and what it can do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderDescriptor {
    pub id: ProviderId,
    pub capabilities: BTreeSet<Capability>,
    pub languages: LanguageSupport,
    pub credentials_configured: bool,
    pub loaded: bool,
    /// Lower values win among peers offering the same capability.
    pub priority: u8,
    /// A language-specific provider that should override the integrated
    /// topology for the languages it supports.
    pub dedicated: bool,
}

impl ProviderDescriptor {
    pub fn new(
        id: ProviderId,
        capabilities: impl IntoIterator<Item = Capability>,
        languages: LanguageSupport,
    ) -> Self {
        Self {
            id,
            capabilities: capabilities.into_iter().collect(),
            languages,
            credentials_configured: false,
            loaded: false,
            priority: 0,
            dedicated: false,
        }
    }

    pub fn with_status(mut self, credentials_configured: bool, loaded: bool) -> Self {
        self.credentials_configured = credentials_configured;
        self.loaded = loaded;
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn dedicated(mut self) -> Self {
        self.dedicated = true;
        self
    }

    /// Credentials are present and the client was constructed.
    pub fn is_available(&self) -> bool {
        self.credentials_configured && self.loaded
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn supports(&self, language: &str) -> bool {
        self.languages.contains(language)
    }

    pub fn offers(&self, capability: Capability, language: &str) -> bool {
        self.is_available() && self.has(capability) && self.supports(language)
    }
}

/// Immutable lookup over the configured providers.
#[derive(Debug, Clone, Default)]
pub struct ProviderCapabilityRegistry {
    providers: Vec<ProviderDescriptor>,
}

impl ProviderCapabilityRegistry {
    /// Builds the registry. A provider listed twice keeps its last descriptor.
    pub fn new(providers: impl IntoIterator<Item = ProviderDescriptor>) -> Self {
        let unique: BTreeMap<ProviderId, ProviderDescriptor> =
            providers.into_iter().map(|d| (d.id, d)).collect();
        let mut providers: Vec<ProviderDescriptor> = unique.into_values().collect();
        providers.sort_by_key(|d| (d.priority, d.id));
        Self { providers }
    }

    /// All descriptors in priority order.
    pub fn descriptors(&self) -> &[ProviderDescriptor] {
        &self.providers
    }

    pub fn get(&self, id: ProviderId) -> Option<&ProviderDescriptor> {
        self.providers.iter().find(|d| d.id == id)
    }

    pub fn is_available(&self, id: ProviderId) -> bool {
        self.get(id).is_some_and(ProviderDescriptor::is_available)
    }

    /// Available providers offering `capability` for `language`, best first.
    pub fn candidates<'a>(
        &'a self,
        capability: Capability,
        language: &'a str,
    ) -> impl Iterator<Item = &'a ProviderDescriptor> + 'a {
        self.providers
            .iter()
            .filter(move |d| d.offers(capability, language))
    }

    /// The result borrows only the registry, not `language`.
    pub fn first_available(
        &self,
        capability: Capability,
        language: &str,
    ) -> Option<&ProviderDescriptor> {
        self.providers.iter().find(|d| d.offers(capability, language))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gemini() -> ProviderDescriptor {
        ProviderDescriptor::new(
            ProviderId::GeminiLive,
            [Capability::IntegratedSttLlmTts, Capability::Stt, Capability::Llm],
            LanguageSupport::only(["en-US", "nl-NL"]),
        )
        .with_status(true, true)
    }

    #[test]
    fn test_availability_requires_credentials_and_loaded_client() {
        let configured_only = gemini().with_status(true, false);
        let loaded_only = gemini().with_status(false, true);
        assert!(!configured_only.is_available());
        assert!(!loaded_only.is_available());
        assert!(gemini().is_available());
    }

    #[test]
    fn test_language_support_canonicalises() {
        let support = LanguageSupport::only(["nl", "en_us", "bogus tag"]);
        assert!(support.contains("nl-NL"));
        assert!(support.contains("en-US"));
        assert!(!support.contains("de-DE"));
        assert_eq!(
            support.languages(),
            Some(vec!["en-US".to_string(), "nl-NL".to_string()])
        );
        assert!(LanguageSupport::Any.contains("sw"));
    }

    #[test]
    fn test_candidates_follow_priority_and_availability() {
        let cartesia = ProviderDescriptor::new(
            ProviderId::Cartesia,
            [Capability::Tts],
            LanguageSupport::only(["nl-NL"]),
        )
        .with_status(true, true)
        .with_priority(5);
        let deepgram = ProviderDescriptor::new(
            ProviderId::Deepgram,
            [Capability::LanguageDetection, Capability::Tts],
            LanguageSupport::Any,
        )
        .with_status(true, true)
        .with_priority(1);
        let registry = ProviderCapabilityRegistry::new([cartesia, deepgram, gemini()]);

        let tts: Vec<ProviderId> = registry
            .candidates(Capability::Tts, "nl-NL")
            .map(|d| d.id)
            .collect();
        assert_eq!(tts, vec![ProviderId::Deepgram, ProviderId::Cartesia]);

        assert_eq!(
            registry
                .first_available(Capability::IntegratedSttLlmTts, "nl-NL")
                .map(|d| d.id),
            Some(ProviderId::GeminiLive)
        );
        assert!(
            registry
                .first_available(Capability::IntegratedSttLlmTts, "ja-JP")
                .is_none()
        );
    }

    #[test]
    fn test_first_available_outlives_the_language_argument() {
        let registry = ProviderCapabilityRegistry::new([gemini()]);
        let found = {
            let language = String::from("en-US");
            registry.first_available(Capability::Stt, &language)
        };
        assert_eq!(found.map(|d| d.id), Some(ProviderId::GeminiLive));
    }

    #[test]
    fn test_duplicate_descriptors_keep_the_last() {
        let registry =
            ProviderCapabilityRegistry::new([gemini(), gemini().with_status(false, true)]);
        assert_eq!(registry.descriptors().len(), 1);
        assert!(!registry.is_available(ProviderId::GeminiLive));
    }
}
