//! Session Orchestrator
//!
//! Turns a connect request into a running session: resolves the language,
//! validates the model and voice, composes the pipeline, provisions a room
//! with two tokens, then launches the agent and waits a bounded time for it
//! to join. Everything that can fail before the room exists is checked
//! before the room is created.

pub mod degraded;
mod supervisor;

use crate::{
    agent::{AgentLauncher, AgentParams, SharedSessionInfo},
    config::Config,
    error::ConnectError,
    transport::{Room, RoomOptions, RoomProvider, TokenGrant, TransportError},
};
use bytes::Bytes;
use chrono::Utc;
use degraded::DegradedProviders;
use parking_lot::RwLock;
use std::{sync::Arc, time::Duration};
use tokio::{sync::oneshot, time::timeout};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use voxbridge_core::{
    catalog,
    language::{
        DetectionOutcome, LanguageDetector, LanguageMemory, Resolution, canonicalize,
        detect_within_budget, resolve,
    },
    pipeline::{CompositionPreferences, Topology, compose},
    providers::ProviderCapabilityRegistry,
    registry::SessionRegistry,
    session::{SessionInfo, SessionState},
};

/// The registry entry for a live session.
#[derive(Clone)]
pub struct SessionHandle {
    pub info: SharedSessionInfo,
    /// Cancelling asks the agent to finish.
    pub shutdown: CancellationToken,
}

impl SessionHandle {
    pub fn session_id(&self) -> Uuid {
        self.info.read().session_id
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub default_language: String,
    pub default_model: String,
    pub bot_name: String,
    pub ready_timeout: Duration,
    pub detection_timeout: Duration,
    pub token_ttl: Duration,
    pub synthesis_failure_threshold: u32,
    pub prefer_dedicated_tts: bool,
    pub override_cooldown: Duration,
    pub idle_timeout: Duration,
    pub shutdown_grace: Duration,
    pub delete_rooms_on_end: bool,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            default_language: "en-US".to_string(),
            default_model: catalog::DEFAULT_MODEL.to_string(),
            bot_name: "Voxbridge Bot".to_string(),
            ready_timeout: Duration::from_secs(10),
            detection_timeout: Duration::from_millis(300),
            token_ttl: Duration::from_secs(3600),
            synthesis_failure_threshold: 3,
            prefer_dedicated_tts: true,
            override_cooldown: Duration::from_secs(300),
            idle_timeout: Duration::from_secs(120),
            shutdown_grace: Duration::from_secs(5),
            delete_rooms_on_end: true,
        }
    }
}

impl From<&Config> for OrchestratorSettings {
    fn from(config: &Config) -> Self {
        Self {
            default_language: config.default_language.clone(),
            default_model: config.default_model.clone(),
            bot_name: config.bot_name.clone(),
            ready_timeout: config.bot_ready_timeout,
            detection_timeout: config.language_detection_timeout,
            token_ttl: config.token_ttl,
            synthesis_failure_threshold: config.synthesis_failure_threshold,
            prefer_dedicated_tts: config.prefer_dedicated_tts,
            override_cooldown: config.override_cooldown,
            idle_timeout: config.agent_idle_timeout,
            shutdown_grace: config.shutdown_grace,
            delete_rooms_on_end: config.delete_rooms_on_end,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConnectRequest {
    pub language: Option<String>,
    pub model_id: Option<String>,
    pub voice_id: Option<String>,
    pub client_id: Option<String>,
    pub detection_audio: Option<Bytes>,
    pub detection_mime_type: Option<String>,
}

/// What a client needs to join its session.
#[derive(Debug, Clone)]
pub struct ConnectOutcome {
    pub session_id: Uuid,
    pub room: Room,
    pub client_token: String,
    pub resolution: Resolution,
    pub topology: Topology,
    pub model: String,
    pub voice: Option<String>,
}

pub struct Orchestrator {
    settings: OrchestratorSettings,
    providers: ProviderCapabilityRegistry,
    rooms: Option<Arc<dyn RoomProvider>>,
    launcher: Option<Arc<dyn AgentLauncher>>,
    detector: Option<Arc<dyn LanguageDetector>>,
    memory: Arc<LanguageMemory>,
    sessions: Arc<SessionRegistry<SessionHandle>>,
    degraded: Arc<DegradedProviders>,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

impl Orchestrator {
    pub fn new(settings: OrchestratorSettings, providers: ProviderCapabilityRegistry) -> Self {
        let degraded = Arc::new(DegradedProviders::new(settings.override_cooldown));
        Self {
            settings,
            providers,
            rooms: None,
            launcher: None,
            detector: None,
            memory: Arc::new(LanguageMemory::new()),
            sessions: Arc::new(SessionRegistry::new()),
            degraded,
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
        }
    }

    pub fn with_rooms(mut self, rooms: Arc<dyn RoomProvider>) -> Self {
        self.rooms = Some(rooms);
        self
    }

    pub fn with_launcher(mut self, launcher: Arc<dyn AgentLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    pub fn with_detector(mut self, detector: Arc<dyn LanguageDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    pub fn providers(&self) -> &ProviderCapabilityRegistry {
        &self.providers
    }

    pub fn room_provider_configured(&self) -> bool {
        self.rooms.is_some()
    }

    pub fn agent_available(&self) -> bool {
        self.launcher.is_some()
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Providers currently left out of composition after runtime failures.
    pub fn degraded(&self) -> &DegradedProviders {
        &self.degraded
    }

    pub fn language_memory(&self) -> &LanguageMemory {
        &self.memory
    }

    pub fn sessions(&self) -> Vec<SessionInfo> {
        self.sessions
            .snapshot()
            .into_iter()
            .map(|(_, handle)| handle.info.read().clone())
            .collect()
    }

    pub fn session(&self, room_name: &str) -> Option<SessionInfo> {
        self.sessions
            .lookup(room_name)
            .map(|handle| handle.info.read().clone())
    }

    fn preferences(&self) -> CompositionPreferences {
        CompositionPreferences {
            prefer_override: self.settings.prefer_dedicated_tts,
            excluded: self.degraded.active(),
        }
    }

    #[instrument(skip_all, fields(
        language = request.language.as_deref(),
        client_id = request.client_id.as_deref(),
    ))]
    pub async fn connect(&self, request: ConnectRequest) -> Result<ConnectOutcome, ConnectError> {
        let rooms = self
            .rooms
            .clone()
            .ok_or_else(|| ConnectError::AgentUnavailable("no room provider configured".into()))?;
        let launcher = self
            .launcher
            .clone()
            .ok_or_else(|| ConnectError::AgentUnavailable("agent runtime not loaded".into()))?;

        if let Some(requested) = request.language.as_deref() {
            if canonicalize(requested).is_none() {
                return Err(ConnectError::InvalidRequest(format!(
                    "'{requested}' is not a valid language tag"
                )));
            }
        }

        let detected = self.detect_for(&request).await;
        let last_known_good = request
            .client_id
            .as_deref()
            .and_then(|client_id| self.memory.recall(client_id));
        let resolution = resolve(
            request.language.as_deref(),
            detected.as_deref(),
            last_known_good.as_deref(),
            &self.settings.default_language,
        );
        info!(
            effective_language = %resolution.language,
            source = ?resolution.source,
            "Resolved session language"
        );

        let selection = catalog::select(
            request.model_id.as_deref(),
            request.voice_id.as_deref(),
            &resolution.language,
            &self.settings.default_model,
        )?;
        let plan = compose(&resolution.language, &self.providers, &self.preferences())?;
        let voice = plan
            .options()
            .audio_output
            .then(|| selection.voice.to_string());

        let room = rooms
            .create_room(&RoomOptions::voice(self.settings.token_ttl))
            .await
            .map_err(ConnectError::RoomCreationFailed)?;
        info!(room = %room.name, "Room created");

        let (agent_token, client_token) = match self.issue_tokens(rooms.as_ref(), &room).await {
            Ok(tokens) => tokens,
            Err(e) => {
                if self.settings.delete_rooms_on_end {
                    if let Err(delete_err) = rooms.delete_room(&room.name).await {
                        warn!(room = %room.name, error = %delete_err, "Failed to roll back room");
                    }
                }
                return Err(ConnectError::TokenIssuanceFailed(e));
            }
        };

        let session_id = Uuid::new_v4();
        let now = Utc::now();
        let info = Arc::new(RwLock::new(SessionInfo {
            session_id,
            room_name: room.name.clone(),
            room_url: room.url.clone(),
            requested_language: request.language.clone(),
            effective_language: resolution.language.clone(),
            language_source: resolution.source,
            topology: plan.topology(),
            model: selection.model.id.to_string(),
            voice: voice.clone(),
            state: SessionState::Spawning,
            created_at: now,
            last_activity: now,
        }));

        let topology = plan.topology();
        let params = AgentParams {
            session: info,
            room: room.clone(),
            token: agent_token,
            bot_name: self.settings.bot_name.clone(),
            plan: Arc::new(plan),
            model: selection.model.id.to_string(),
            voice: voice.clone(),
            idle_timeout: self.settings.idle_timeout,
            synthesis_failure_threshold: self.settings.synthesis_failure_threshold,
        };

        let (registered_tx, registered_rx) = oneshot::channel();
        supervisor::spawn(supervisor::Supervision {
            launcher,
            params,
            shutdown: self.shutdown.child_token(),
            sessions: self.sessions.clone(),
            degraded: self.degraded.clone(),
            rooms: self.settings.delete_rooms_on_end.then_some(rooms),
            grace: self.settings.shutdown_grace,
            tasks: self.tasks.clone(),
            registered: registered_tx,
        });

        match timeout(self.settings.ready_timeout, registered_rx).await {
            Ok(Ok(Ok(()))) => {
                info!(room = %room.name, %topology, "Session ready");
                Ok(ConnectOutcome {
                    session_id,
                    room,
                    client_token,
                    resolution,
                    topology,
                    model: selection.model.id.to_string(),
                    voice,
                })
            }
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(_)) => Err(ConnectError::AgentCrashed(
                "session supervisor exited unexpectedly".to_string(),
            )),
            Err(_) => {
                warn!(
                    kind = "BotJoinTimeout",
                    room = %room.name,
                    timeout = ?self.settings.ready_timeout,
                    "Agent not ready in time; it may still join and register"
                );
                Err(ConnectError::BotJoinTimeout {
                    room: room.name,
                    timeout: self.settings.ready_timeout,
                })
            }
        }
    }

    async fn issue_tokens(
        &self,
        rooms: &dyn RoomProvider,
        room: &Room,
    ) -> Result<(String, String), TransportError> {
        let ttl = self.settings.token_ttl;
        let agent = rooms.issue_token(room, TokenGrant::Owner, ttl).await?;
        let client = rooms.issue_token(room, TokenGrant::Participant, ttl).await?;
        Ok((agent, client))
    }

    /// Runs budgeted detection for a connect request that carries a sample.
    async fn detect_for(&self, request: &ConnectRequest) -> Option<String> {
        let audio = request.detection_audio.clone()?;
        let mime_type = request
            .detection_mime_type
            .clone()
            .unwrap_or_else(|| "audio/wav".to_string());
        match self
            .detect_language(audio, mime_type, request.client_id.clone())
            .await
        {
            Some(DetectionOutcome::Detected(detection)) => Some(detection.language),
            Some(DetectionOutcome::TimedOut) => {
                warn!(kind = "LanguageDetectionTimeout", "Falling back without detection");
                None
            }
            Some(DetectionOutcome::Failed(reason)) => {
                warn!(%reason, "Falling back without detection");
                None
            }
            None => {
                debug!("No language detector configured");
                None
            }
        }
    }

    /// Detects the language of `audio` within the configured budget. `None`
    /// when no detector is configured.
    pub async fn detect_language(
        &self,
        audio: Bytes,
        mime_type: String,
        client_id: Option<String>,
    ) -> Option<DetectionOutcome> {
        let detector = self.detector.clone()?;
        Some(
            detect_within_budget(
                detector,
                self.memory.clone(),
                client_id,
                audio,
                mime_type,
                self.settings.detection_timeout,
            )
            .await,
        )
    }

    /// Asks the session in `room_name` to finish. Returns `false` when no
    /// session is registered there; calling it twice is harmless.
    #[instrument(skip(self))]
    pub fn disconnect(&self, room_name: &str) -> bool {
        match self.sessions.deregister(room_name) {
            Some(handle) => {
                handle.shutdown.cancel();
                info!("Disconnect requested");
                true
            }
            None => false,
        }
    }

    /// Stops every session, including ones still joining, and waits for
    /// their cleanup.
    pub async fn shutdown_all(&self) {
        info!(sessions = self.sessions.len(), "Stopping all sessions");
        self.shutdown.cancel();
        self.tasks.close();
        let budget = self.settings.shutdown_grace + Duration::from_secs(1);
        if timeout(budget, self.tasks.wait()).await.is_err() {
            warn!("Some sessions did not finish cleanup in time");
        }
    }
}
