//! Session lifecycle state shared by the orchestrator and the agent runtime.

use crate::{language::ResolutionSource, pipeline::Topology};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// `spawning → ready → active → ended`; any state may move straight to `ended`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Spawning,
    Ready,
    Active,
    Ended,
}

impl SessionState {
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Spawning, Ready) | (Ready, Active) | (Spawning | Ready | Active, Ended)
        )
    }
}

/// Everything known about one session, as reported to operators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub session_id: Uuid,
    pub room_name: String,
    pub room_url: String,
    pub requested_language: Option<String>,
    pub effective_language: String,
    pub language_source: ResolutionSource,
    pub topology: Topology,
    pub model: String,
    pub voice: Option<String>,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl SessionInfo {
    /// Applies a lifecycle transition. Returns `false` and changes nothing
    /// when the transition is not allowed.
    pub fn transition(&mut self, next: SessionState) -> bool {
        if !self.state.can_transition_to(next) {
            return false;
        }
        self.state = next;
        self.touch();
        true
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    pub fn is_ended(&self) -> bool {
        self.state == SessionState::Ended
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> SessionInfo {
        let now = Utc::now();
        SessionInfo {
            session_id: Uuid::new_v4(),
            room_name: "abc".to_string(),
            room_url: "https://example.daily.co/abc".to_string(),
            requested_language: Some("nl-NL".to_string()),
            effective_language: "nl-NL".to_string(),
            language_source: ResolutionSource::Requested,
            topology: Topology::Integrated,
            model: "gemini-2.0-flash-live-001".to_string(),
            voice: Some("Aoede".to_string()),
            state: SessionState::Spawning,
            created_at: now,
            last_activity: now,
        }
    }

    #[test]
    fn test_lifecycle_moves_forward_only() {
        let mut session = info();
        assert!(!session.transition(SessionState::Active));
        assert!(session.transition(SessionState::Ready));
        assert!(session.transition(SessionState::Active));
        assert!(!session.transition(SessionState::Ready));
        assert!(session.transition(SessionState::Ended));
        assert!(!session.transition(SessionState::Ended));
        assert!(session.is_ended());
    }

    #[test]
    fn test_any_live_state_can_end() {
        for state in [SessionState::Spawning, SessionState::Ready, SessionState::Active] {
            assert!(state.can_transition_to(SessionState::Ended));
        }
    }
}
