//! Transcript Normalizer
//!
//! Providers report transcription in different shapes: some stream deltas,
//! some resend the whole text so far, some assign utterance ids and some do
//! not. The normalizer turns all of them into one event stream where interim
//! updates for an utterance share its id (so consumers replace the line in
//! place) and each utterance is closed by exactly one final event.

use crate::providers::ProviderId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use utoipa::ToSchema;

/// An id-less final repeating the last closed text is only treated as a
/// provider resend when it arrives this soon after it.
const REPEATED_FINAL_WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Finality {
    Interim,
    Final,
}

/// How the text of a provider event relates to what came before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextMode {
    /// A new piece to append to the utterance.
    Delta,
    /// The whole utterance text so far.
    Snapshot,
}

/// A transcription event as a provider reports it.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderTranscript {
    pub role: Role,
    pub text: String,
    pub finality: Finality,
    pub mode: TextMode,
    pub provider: ProviderId,
    pub utterance_id: Option<String>,
}

/// The uniform event forwarded to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptEvent {
    pub role: Role,
    pub text: String,
    pub finality: Finality,
    pub utterance_id: String,
    pub timestamp: DateTime<Utc>,
    pub provider: ProviderId,
}

impl TranscriptEvent {
    pub fn is_final(&self) -> bool {
        self.finality == Finality::Final
    }
}

#[derive(Debug, Default)]
struct OpenUtterance {
    id: String,
    text: String,
}

#[derive(Debug)]
struct ClosedUtterance {
    id: String,
    text: String,
    at: Instant,
}

#[derive(Debug, Default)]
struct RoleState {
    sequence: u64,
    open: Option<OpenUtterance>,
    last_closed: Option<ClosedUtterance>,
}

impl RoleState {
    fn next_id(&mut self, role: Role) -> String {
        self.sequence += 1;
        format!("{}-{}", role.as_str(), self.sequence)
    }

    fn close(&mut self, id: String, text: String) {
        self.last_closed = Some(ClosedUtterance {
            id,
            text,
            at: Instant::now(),
        });
    }

    fn repeats_last_close(&self, text: &str) -> bool {
        self.last_closed.as_ref().is_some_and(|closed| {
            closed.at.elapsed() < REPEATED_FINAL_WINDOW && closed.text.trim() == text.trim()
        })
    }
}

/// Per-session normalizer; keeps separate state for each role.
#[derive(Debug, Default)]
pub struct TranscriptNormalizer {
    user: RoleState,
    assistant: RoleState,
}

impl TranscriptNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    fn state_mut(&mut self, role: Role) -> &mut RoleState {
        match role {
            Role::User => &mut self.user,
            Role::Assistant => &mut self.assistant,
        }
    }

    /// Folds one provider event into the stream.
    ///
    /// Returns `None` when there is nothing to forward: empty text, a final for
    /// an utterance id already closed, or an id-less final resending the text
    /// closed just before it.
    pub fn normalize(&mut self, event: ProviderTranscript) -> Option<TranscriptEvent> {
        let role = event.role;
        let state = self.state_mut(role);

        if let Some(id) = event.utterance_id.as_deref() {
            if state.last_closed.as_ref().is_some_and(|closed| closed.id == id) {
                return None;
            }
            // A new provider id while another is open abandons the old one.
            if state.open.as_ref().is_some_and(|open| open.id != id) {
                state.open = None;
            }
        }

        match event.finality {
            Finality::Interim => {
                if state.open.is_none() {
                    let id = match event.utterance_id {
                        Some(id) => id,
                        None => state.next_id(role),
                    };
                    state.open = Some(OpenUtterance {
                        id,
                        text: String::new(),
                    });
                }
                let open = state.open.as_mut()?;
                match event.mode {
                    TextMode::Delta => open.text.push_str(&event.text),
                    TextMode::Snapshot => open.text = event.text,
                }
                if open.text.trim().is_empty() {
                    return None;
                }
                Some(emit(role, Finality::Interim, &open.id, &open.text, event.provider))
            }
            Finality::Final => {
                let (id, text) = match state.open.take() {
                    Some(open) => {
                        let text = match event.mode {
                            TextMode::Delta => open.text + &event.text,
                            TextMode::Snapshot if event.text.trim().is_empty() => open.text,
                            TextMode::Snapshot => event.text,
                        };
                        (open.id, text)
                    }
                    None => {
                        if event.utterance_id.is_none() && state.repeats_last_close(&event.text) {
                            return None;
                        }
                        let id = match event.utterance_id {
                            Some(id) => id,
                            None => state.next_id(role),
                        };
                        (id, event.text)
                    }
                };
                if text.trim().is_empty() {
                    return None;
                }
                let out = emit(role, Finality::Final, &id, &text, event.provider);
                state.close(id, text);
                Some(out)
            }
        }
    }

    /// Closes the open utterance of `role` as final, for providers that signal
    /// the end of a turn without sending a final transcript.
    pub fn finalize_open(&mut self, role: Role, provider: ProviderId) -> Option<TranscriptEvent> {
        let state = self.state_mut(role);
        let open = state.open.take()?;
        if open.text.trim().is_empty() {
            return None;
        }
        let out = emit(role, Finality::Final, &open.id, &open.text, provider);
        state.close(open.id, open.text);
        Some(out)
    }
}

fn emit(role: Role, finality: Finality, id: &str, text: &str, provider: ProviderId) -> TranscriptEvent {
    TranscriptEvent {
        role,
        text: text.trim().to_string(),
        finality,
        utterance_id: id.to_string(),
        timestamp: Utc::now(),
        provider,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(role: Role, text: &str, finality: Finality, mode: TextMode) -> ProviderTranscript {
        ProviderTranscript {
            role,
            text: text.to_string(),
            finality,
            mode,
            provider: ProviderId::GeminiLive,
            utterance_id: None,
        }
    }

    #[test]
    fn test_interim_then_final_yields_one_final() {
        let mut normalizer = TranscriptNormalizer::new();
        let interim = normalizer
            .normalize(event(Role::User, "Hallo", Finality::Interim, TextMode::Snapshot))
            .unwrap();
        let fin = normalizer
            .normalize(event(Role::User, "Hallo daar", Finality::Final, TextMode::Snapshot))
            .unwrap();
        let repeat = normalizer.normalize(event(
            Role::User,
            "Hallo daar",
            Finality::Final,
            TextMode::Snapshot,
        ));

        assert_eq!(interim.finality, Finality::Interim);
        assert_eq!(fin.finality, Finality::Final);
        assert_eq!(interim.utterance_id, fin.utterance_id);
        assert_eq!(fin.text, "Hallo daar");
        assert!(repeat.is_none());
    }

    #[test]
    fn test_deltas_accumulate_under_one_id() {
        let mut normalizer = TranscriptNormalizer::new();
        let first = normalizer
            .normalize(event(Role::Assistant, "Goede", Finality::Interim, TextMode::Delta))
            .unwrap();
        let second = normalizer
            .normalize(event(Role::Assistant, "morgen", Finality::Interim, TextMode::Delta))
            .unwrap();
        let second_text = second.text.clone();
        assert_eq!(first.utterance_id, second.utterance_id);
        assert_eq!(second_text, "Goedemorgen");

        let closed = normalizer
            .finalize_open(Role::Assistant, ProviderId::GeminiLive)
            .unwrap();
        assert_eq!(closed.utterance_id, first.utterance_id);
        assert!(closed.is_final());
        assert!(
            normalizer
                .finalize_open(Role::Assistant, ProviderId::GeminiLive)
                .is_none()
        );
    }

    #[test]
    fn test_next_interim_after_final_starts_new_utterance() {
        let mut normalizer = TranscriptNormalizer::new();
        let a = normalizer
            .normalize(event(Role::User, "one", Finality::Final, TextMode::Snapshot))
            .unwrap();
        let b = normalizer
            .normalize(event(Role::User, "two", Finality::Interim, TextMode::Snapshot))
            .unwrap();
        assert_ne!(a.utterance_id, b.utterance_id);
    }

    #[test]
    fn test_provider_ids_suppress_duplicate_finals() {
        let mut normalizer = TranscriptNormalizer::new();
        let mut with_id = |text: &str, finality| {
            let mut e = event(Role::User, text, finality, TextMode::Snapshot);
            e.utterance_id = Some("utt-7".to_string());
            normalizer.normalize(e)
        };

        assert!(with_id("hi", Finality::Interim).is_some());
        let fin = with_id("hi there", Finality::Final).unwrap();
        assert_eq!(fin.utterance_id, "utt-7");
        assert!(with_id("hi there", Finality::Final).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_words_said_again_are_kept() {
        let mut normalizer = TranscriptNormalizer::new();
        let first = normalizer
            .normalize(event(Role::User, "ja", Finality::Final, TextMode::Snapshot))
            .unwrap();

        tokio::time::advance(Duration::from_secs(3)).await;
        let second = normalizer
            .normalize(event(Role::User, "ja", Finality::Final, TextMode::Snapshot))
            .unwrap();

        assert_eq!(second.text, "ja");
        assert_ne!(first.utterance_id, second.utterance_id);
    }

    #[test]
    fn test_roles_are_independent() {
        let mut normalizer = TranscriptNormalizer::new();
        let user = normalizer
            .normalize(event(Role::User, "vraag", Finality::Interim, TextMode::Snapshot))
            .unwrap();
        let assistant = normalizer
            .normalize(event(Role::Assistant, "antwoord", Finality::Final, TextMode::Snapshot))
            .unwrap();
        let user_final = normalizer
            .normalize(event(Role::User, "", Finality::Final, TextMode::Snapshot))
            .unwrap();

        assert_eq!(assistant.role, Role::Assistant);
        assert_eq!(user_final.utterance_id, user.utterance_id);
        assert_eq!(user_final.text, "vraag");
    }

    #[test]
    fn test_empty_text_is_not_forwarded() {
        let mut normalizer = TranscriptNormalizer::new();
        assert!(
            normalizer
                .normalize(event(Role::User, "  ", Finality::Interim, TextMode::Delta))
                .is_none()
        );
        assert!(
            normalizer
                .normalize(event(Role::User, "", Finality::Final, TextMode::Delta))
                .is_none()
        );
    }

    #[test]
    fn test_event_serialises_camel_case() {
        let mut normalizer = TranscriptNormalizer::new();
        let out = normalizer
            .normalize(event(Role::User, "hoi", Finality::Final, TextMode::Snapshot))
            .unwrap();
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["finality"], "final");
        assert_eq!(json["provider"], "gemini-live");
        assert_eq!(json["utteranceId"], "user-1");
    }
}
