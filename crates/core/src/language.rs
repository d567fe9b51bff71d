//! Language Resolution
//!
//! This module canonicalises language tags and picks the effective language a
//! session is configured with. A live detection result wins when it arrives
//! inside its latency budget; otherwise the chain falls back to the language
//! the client asked for, the client's last known good language, and finally
//! the service default.

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tracing::{debug, info, warn};
use utoipa::ToSchema;

/// Short codes as returned by detectors, mapped to the locale providers are configured with.
const CANONICAL_LOCALES: &[(&str, &str)] = &[
    ("ar", "ar-SA"),
    ("da", "da-DK"),
    ("de", "de-DE"),
    ("en", "en-US"),
    ("es", "es-ES"),
    ("fi", "fi-FI"),
    ("fr", "fr-FR"),
    ("hi", "hi-IN"),
    ("it", "it-IT"),
    ("ja", "ja-JP"),
    ("ko", "ko-KR"),
    ("nl", "nl-NL"),
    ("no", "nb-NO"),
    ("pl", "pl-PL"),
    ("pt", "pt-BR"),
    ("ru", "ru-RU"),
    ("sv", "sv-SE"),
    ("tr", "tr-TR"),
    ("uk", "uk-UA"),
    ("zh", "zh-CN"),
];

/// Converts a language tag into its canonical BCP-47 form.
///
/// Bare primary subtags (`nl`) are expanded through the locale table
/// (`nl-NL`); regions are upper-cased, scripts title-cased and `_` is accepted
/// as a separator. Returns `None` for tags that are not well formed or are
/// explicitly undetermined (`und`).
pub fn canonicalize(tag: &str) -> Option<String> {
    let tag = tag.trim();
    let mut parts = tag.split(['-', '_']);

    let primary = parts.next()?.to_ascii_lowercase();
    if !(2..=3).contains(&primary.len())
        || !primary.chars().all(|c| c.is_ascii_alphabetic())
        || primary == "und"
    {
        return None;
    }

    let mut script: Option<String> = None;
    let mut region: Option<String> = None;
    for part in parts {
        let alphabetic = part.chars().all(|c| c.is_ascii_alphabetic());
        let numeric = part.chars().all(|c| c.is_ascii_digit());
        if part.len() == 4 && alphabetic && script.is_none() && region.is_none() {
            let (head, tail) = part.split_at(1);
            script = Some(format!(
                "{}{}",
                head.to_ascii_uppercase(),
                tail.to_ascii_lowercase()
            ));
        } else if region.is_none() && ((part.len() == 2 && alphabetic) || (part.len() == 3 && numeric)) {
            region = Some(part.to_ascii_uppercase());
        } else {
            return None;
        }
    }

    if script.is_none() && region.is_none() {
        let expanded = CANONICAL_LOCALES
            .iter()
            .find(|(short, _)| *short == primary)
            .map(|(_, locale)| locale.to_string());
        return Some(expanded.unwrap_or(primary));
    }

    let mut canonical = primary;
    for subtag in [script, region].into_iter().flatten() {
        canonical.push('-');
        canonical.push_str(&subtag);
    }
    Some(canonical)
}

/// Where the effective language of a session came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum ResolutionSource {
    Detected,
    Requested,
    LastKnownGood,
    Default,
}

/// The outcome of running the resolution chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub language: String,
    pub source: ResolutionSource,
}

/// Picks the effective language for a session.
///
/// Candidates are tried in order: live detection, the requested language, the
/// client's last known good language, the default. A candidate that does not
/// canonicalise is skipped.
pub fn resolve(
    requested: Option<&str>,
    detected: Option<&str>,
    last_known_good: Option<&str>,
    default_language: &str,
) -> Resolution {
    let chain = [
        (detected, ResolutionSource::Detected),
        (requested, ResolutionSource::Requested),
        (last_known_good, ResolutionSource::LastKnownGood),
    ];

    for (candidate, source) in chain {
        if let Some(language) = candidate.and_then(canonicalize) {
            return Resolution { language, source };
        }
    }

    Resolution {
        language: canonicalize(default_language).unwrap_or_else(|| default_language.to_string()),
        source: ResolutionSource::Default,
    }
}

/// Remembers the last successfully detected language per client.
///
/// Late detection results land here so the next session for the same client
/// starts in the right language even when detection missed its budget.
#[derive(Debug, Default)]
pub struct LanguageMemory {
    by_client: RwLock<HashMap<String, String>>,
}

impl LanguageMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `language` for `client_id`. Returns `false` if the tag is not valid.
    pub fn remember(&self, client_id: &str, language: &str) -> bool {
        match canonicalize(language) {
            Some(language) => {
                self.by_client.write().insert(client_id.to_string(), language);
                true
            }
            None => false,
        }
    }

    pub fn recall(&self, client_id: &str) -> Option<String> {
        self.by_client.read().get(client_id).cloned()
    }
}

/// A language detection result as reported by a detector.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Detection {
    pub language: String,
    pub confidence: f32,
}

/// A service that can guess the spoken language of a short audio sample.
#[async_trait]
pub trait LanguageDetector: Send + Sync {
    async fn detect(&self, audio: Bytes, mime_type: &str) -> Result<Detection>;
}

/// The result of a budgeted detection attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectionOutcome {
    /// Detection finished in time; the language is canonical.
    Detected(Detection),
    /// The budget elapsed first. The attempt keeps running in the background.
    TimedOut,
    Failed(String),
}

impl DetectionOutcome {
    pub fn language(&self) -> Option<&str> {
        match self {
            DetectionOutcome::Detected(detection) => Some(&detection.language),
            _ => None,
        }
    }
}

/// Runs a detection attempt and waits for it at most `budget`.
///
/// The attempt runs as its own task, so a slow detector never holds up the
/// caller. Whenever it finishes successfully, and a `client_id` was given, the
/// result is stored in `memory` for later resolutions.
pub async fn detect_within_budget(
    detector: Arc<dyn LanguageDetector>,
    memory: Arc<LanguageMemory>,
    client_id: Option<String>,
    audio: Bytes,
    mime_type: String,
    budget: Duration,
) -> DetectionOutcome {
    let attempt = tokio::spawn(async move {
        let result = detector.detect(audio, &mime_type).await;
        if let (Ok(detection), Some(client_id)) = (&result, client_id.as_deref()) {
            if memory.remember(client_id, &detection.language) {
                debug!(client_id, language = %detection.language, "Recorded last known good language");
            }
        }
        result
    });

    match tokio::time::timeout(budget, attempt).await {
        Ok(Ok(Ok(detection))) => match canonicalize(&detection.language) {
            Some(language) => {
                info!(%language, confidence = detection.confidence, "Language detected");
                DetectionOutcome::Detected(Detection {
                    language,
                    confidence: detection.confidence,
                })
            }
            None => DetectionOutcome::Failed(format!(
                "detector returned an unusable language '{}'",
                detection.language
            )),
        },
        Ok(Ok(Err(e))) => {
            warn!(error = %e, "Language detection failed");
            DetectionOutcome::Failed(e.to_string())
        }
        Ok(Err(e)) => DetectionOutcome::Failed(e.to_string()),
        Err(_) => {
            warn!(budget_ms = budget.as_millis() as u64, "Language detection exceeded its budget");
            DetectionOutcome::TimedOut
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    struct FixedDetector {
        language: &'static str,
        delay: Duration,
    }

    #[async_trait]
    impl LanguageDetector for FixedDetector {
        async fn detect(&self, _audio: Bytes, _mime_type: &str) -> Result<Detection> {
            tokio::time::sleep(self.delay).await;
            Ok(Detection {
                language: self.language.to_string(),
                confidence: 0.9,
            })
        }
    }

    struct BrokenDetector;

    #[async_trait]
    impl LanguageDetector for BrokenDetector {
        async fn detect(&self, _audio: Bytes, _mime_type: &str) -> Result<Detection> {
            Err(anyhow!("upstream returned 500"))
        }
    }

    #[test]
    fn test_canonicalize_expands_short_codes() {
        assert_eq!(canonicalize("nl").as_deref(), Some("nl-NL"));
        assert_eq!(canonicalize("EN").as_deref(), Some("en-US"));
        assert_eq!(canonicalize("pt").as_deref(), Some("pt-BR"));
        // No table entry: the primary subtag is kept as-is.
        assert_eq!(canonicalize("sw").as_deref(), Some("sw"));
    }

    #[test]
    fn test_canonicalize_normalises_case_and_separators() {
        assert_eq!(canonicalize("nl-NL").as_deref(), Some("nl-NL"));
        assert_eq!(canonicalize("nl_nl").as_deref(), Some("nl-NL"));
        assert_eq!(canonicalize(" en-gb ").as_deref(), Some("en-GB"));
        assert_eq!(canonicalize("zh-hant-tw").as_deref(), Some("zh-Hant-TW"));
        assert_eq!(canonicalize("es-419").as_deref(), Some("es-419"));
    }

    #[test]
    fn test_canonicalize_rejects_malformed_tags() {
        assert_eq!(canonicalize(""), None);
        assert_eq!(canonicalize("und"), None);
        assert_eq!(canonicalize("english"), None);
        assert_eq!(canonicalize("nl-NL-extra"), None);
        assert_eq!(canonicalize("n1"), None);
    }

    #[test]
    fn test_resolve_without_detection_returns_requested() {
        for requested in ["nl-NL", "en-US", "de-DE", "fr-FR"] {
            let resolution = resolve(Some(requested), None, Some("es-ES"), "en-US");
            assert_eq!(resolution.language, requested);
            assert_eq!(resolution.source, ResolutionSource::Requested);
        }

        let resolution = resolve(Some("nl"), None, None, "en-US");
        assert_eq!(resolution.language, "nl-NL");
    }

    #[test]
    fn test_resolve_prefers_detection() {
        let resolution = resolve(Some("en-US"), Some("nl"), None, "en-US");
        assert_eq!(resolution.language, "nl-NL");
        assert_eq!(resolution.source, ResolutionSource::Detected);
    }

    #[test]
    fn test_resolve_falls_back_in_order() {
        let resolution = resolve(None, None, Some("de"), "en-US");
        assert_eq!(resolution.language, "de-DE");
        assert_eq!(resolution.source, ResolutionSource::LastKnownGood);

        let resolution = resolve(None, Some("und"), None, "en-us");
        assert_eq!(resolution.language, "en-US");
        assert_eq!(resolution.source, ResolutionSource::Default);

        let resolution = resolve(Some("not a tag"), None, None, "fr-FR");
        assert_eq!(resolution.source, ResolutionSource::Default);
    }

    #[test]
    fn test_language_memory_stores_canonical_tags() {
        let memory = LanguageMemory::new();
        assert!(memory.remember("client-a", "nl"));
        assert!(!memory.remember("client-b", "und"));

        assert_eq!(memory.recall("client-a").as_deref(), Some("nl-NL"));
        assert_eq!(memory.recall("client-b"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_detection_within_budget_is_used() {
        let memory = Arc::new(LanguageMemory::new());
        let outcome = detect_within_budget(
            Arc::new(FixedDetector {
                language: "nl",
                delay: Duration::from_millis(50),
            }),
            memory.clone(),
            Some("client".to_string()),
            Bytes::from_static(b"RIFF"),
            "audio/wav".to_string(),
            Duration::from_millis(300),
        )
        .await;

        assert_eq!(outcome.language(), Some("nl-NL"));
        assert_eq!(memory.recall("client").as_deref(), Some("nl-NL"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_detection_only_updates_memory() {
        let memory = Arc::new(LanguageMemory::new());
        let outcome = detect_within_budget(
            Arc::new(FixedDetector {
                language: "de",
                delay: Duration::from_millis(800),
            }),
            memory.clone(),
            Some("client".to_string()),
            Bytes::from_static(b"RIFF"),
            "audio/wav".to_string(),
            Duration::from_millis(300),
        )
        .await;

        assert_eq!(outcome, DetectionOutcome::TimedOut);
        let resolution = resolve(Some("en-US"), outcome.language(), None, "en-US");
        assert_eq!(resolution.language, "en-US");
        assert_eq!(memory.recall("client"), None);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(memory.recall("client").as_deref(), Some("de-DE"));
    }

    #[tokio::test]
    async fn test_failed_detection_is_reported() {
        let outcome = detect_within_budget(
            Arc::new(BrokenDetector),
            Arc::new(LanguageMemory::new()),
            None,
            Bytes::new(),
            "audio/wav".to_string(),
            Duration::from_millis(300),
        )
        .await;

        assert!(matches!(outcome, DetectionOutcome::Failed(msg) if msg.contains("500")));
    }
}
