//! The conversational agent that joins a room and drives one session.
//!
//! The agent opens the realtime service first, then joins the room and fires
//! its readiness signal. From then on it moves audio between the two,
//! forwards normalized transcripts to the room, and, in the decomposed
//! topology, speaks the generated replies through the dedicated synthesizer.

pub mod context;
pub mod synthesis;

use crate::{
    audio_utils,
    provider::{
        RealtimeConnector, RealtimeLink, RealtimeSettings, ServiceEvent, ServiceInput,
        SpeechSynthesizer,
    },
    transport::{Room, RoomCommand, RoomConnector, RoomEvent, TransportError},
};
use context::ConversationContext;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde_json::json;
use std::{sync::Arc, time::Duration};
use synthesis::{SynthesisGuard, SynthesisOutcome};
use thiserror::Error;
use tokio::{
    sync::{mpsc, oneshot},
    time::timeout,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use voxbridge_core::{
    catalog,
    pipeline::{PipelinePlan, StageKind, Topology},
    providers::ProviderId,
    session::{SessionInfo, SessionState},
    transcript::{
        Finality, ProviderTranscript, Role, TextMode, TranscriptEvent, TranscriptNormalizer,
    },
};

/// Session state shared between the agent, its supervisor and the registry.
pub type SharedSessionInfo = Arc<RwLock<SessionInfo>>;

const SERVICE_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("failed to join room: {0}")]
    Join(#[from] TransportError),
    #[error("{provider} is unavailable: {reason}")]
    ProviderUnavailable { provider: ProviderId, reason: String },
    #[error("realtime service failed: {0}")]
    Service(String),
}

/// Why an agent finished on its own terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentExit {
    ParticipantLeft,
    CallEnded,
    IdleTimeout,
    Shutdown,
    RoomClosed,
}

/// Everything an agent needs to run one session.
#[derive(Debug, Clone)]
pub struct AgentParams {
    pub session: SharedSessionInfo,
    pub room: Room,
    pub token: String,
    pub bot_name: String,
    pub plan: Arc<PipelinePlan>,
    pub model: String,
    pub voice: Option<String>,
    pub idle_timeout: Duration,
    pub synthesis_failure_threshold: u32,
}

/// Starts agents. The returned future is the agent task itself; it must fire
/// `ready` once, after joining the room, and finish promptly when `shutdown`
/// is cancelled.
pub trait AgentLauncher: Send + Sync {
    fn launch(
        &self,
        params: AgentParams,
        ready: oneshot::Sender<()>,
        shutdown: CancellationToken,
    ) -> BoxFuture<'static, Result<AgentExit, AgentError>>;
}

/// The production agent: a realtime model, a room connection and, for the
/// decomposed topology, a dedicated synthesizer.
#[derive(Clone)]
pub struct PipelineAgent {
    rooms: Arc<dyn RoomConnector>,
    realtime: Arc<dyn RealtimeConnector>,
    synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
}

impl PipelineAgent {
    pub fn new(
        rooms: Arc<dyn RoomConnector>,
        realtime: Arc<dyn RealtimeConnector>,
        synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
    ) -> Self {
        Self {
            rooms,
            realtime,
            synthesizer,
        }
    }

    async fn run(
        self,
        params: AgentParams,
        ready: oneshot::Sender<()>,
        shutdown: CancellationToken,
    ) -> Result<AgentExit, AgentError> {
        let plan = params.plan.clone();
        let llm_provider = plan
            .provider_for(StageKind::Llm)
            .unwrap_or(ProviderId::GeminiLive);

        let synthesizer = match plan.provider_for(StageKind::Tts) {
            Some(provider) => match &self.synthesizer {
                Some(synthesizer) => Some((provider, synthesizer.clone())),
                None => {
                    return Err(AgentError::ProviderUnavailable {
                        provider,
                        reason: "no synthesis client loaded".to_string(),
                    });
                }
            },
            None => None,
        };

        let system_instruction = catalog::system_instruction(plan.language());
        let settings = RealtimeSettings {
            model: params.model.clone(),
            voice: params.voice.clone().filter(|_| plan.options().audio_output),
            language: plan.language().to_string(),
            system_instruction: system_instruction.to_string(),
            options: plan.options(),
        };
        let RealtimeLink {
            input,
            mut events,
            mut task,
        } = self
            .realtime
            .open(settings)
            .await
            .map_err(|e| AgentError::ProviderUnavailable {
                provider: llm_provider,
                reason: format!("{e:#}"),
            })?;

        let link = tokio::select! {
            link = self.rooms.join(&params.room, &params.token, &params.bot_name) => link,
            _ = shutdown.cancelled() => {
                task.abort();
                return Ok(AgentExit::Shutdown);
            }
        };
        let mut link = match link {
            Ok(link) => link,
            Err(e) => {
                task.abort();
                return Err(e.into());
            }
        };

        params.session.write().transition(SessionState::Ready);
        // The orchestrator may have stopped waiting; the supervisor still listens.
        let _ = ready.send(());
        info!(room = %params.room.name, "Agent joined room");

        let mut conversation = Conversation {
            plan: plan.clone(),
            llm_provider,
            normalizer: TranscriptNormalizer::new(),
            context: ConversationContext::new(system_instruction),
            pending_reply: String::new(),
            synthesizer,
            guard: SynthesisGuard::new(params.synthesis_failure_threshold),
            commands: link.commands.clone(),
        };

        let idle = tokio::time::sleep(params.idle_timeout);
        tokio::pin!(idle);
        let mut participant_present = false;

        let outcome = loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested");
                    break Ok(AgentExit::Shutdown);
                }
                _ = &mut idle, if !participant_present => {
                    info!(timeout = ?params.idle_timeout, "No participant joined in time");
                    break Ok(AgentExit::IdleTimeout);
                }
                event = link.events.recv() => match event {
                    Some(RoomEvent::ParticipantJoined { participant_id }) => {
                        if participant_present {
                            debug!(%participant_id, "Additional participant joined");
                            continue;
                        }
                        participant_present = true;
                        params.session.write().transition(SessionState::Active);
                        info!(%participant_id, "Participant joined; starting conversation");
                        let respond = ServiceInput::Respond(conversation.context.messages());
                        if input.send(respond).await.is_err() {
                            break Err(AgentError::Service("realtime input closed".to_string()));
                        }
                    }
                    Some(RoomEvent::ParticipantLeft { participant_id, reason }) => {
                        info!(%participant_id, ?reason, "Participant left");
                        break Ok(AgentExit::ParticipantLeft);
                    }
                    Some(RoomEvent::CallState(state)) if state == "left" => {
                        info!("Call ended");
                        break Ok(AgentExit::CallEnded);
                    }
                    Some(RoomEvent::CallState(state)) => debug!(%state, "Call state"),
                    Some(RoomEvent::Audio(pcm)) => {
                        if !participant_present {
                            continue;
                        }
                        params.session.write().touch();
                        if input.send(ServiceInput::Audio(pcm)).await.is_err() {
                            break Err(AgentError::Service("realtime input closed".to_string()));
                        }
                    }
                    Some(RoomEvent::Closed) | None => {
                        info!("Room connection closed");
                        break Ok(AgentExit::RoomClosed);
                    }
                },
                event = events.recv() => match event {
                    Some(ServiceEvent::Closed(reason)) => {
                        break Err(AgentError::Service(
                            reason.unwrap_or_else(|| "connection closed".to_string()),
                        ));
                    }
                    None => break Err(AgentError::Service("connection closed".to_string())),
                    Some(event) => {
                        if let Err(e) = conversation.handle(event).await {
                            break Err(e);
                        }
                    }
                },
            }
        };

        conversation.flush();
        drop(input);
        if timeout(SERVICE_DRAIN_TIMEOUT, &mut task).await.is_err() {
            task.abort();
        }
        let _ = link.commands.send(RoomCommand::Leave).await;
        params.session.write().transition(SessionState::Ended);
        info!(?outcome, "Agent finished");
        outcome
    }
}

impl AgentLauncher for PipelineAgent {
    fn launch(
        &self,
        params: AgentParams,
        ready: oneshot::Sender<()>,
        shutdown: CancellationToken,
    ) -> BoxFuture<'static, Result<AgentExit, AgentError>> {
        Box::pin(self.clone().run(params, ready, shutdown))
    }
}

/// Per-session conversation state driven by realtime service events.
struct Conversation {
    plan: Arc<PipelinePlan>,
    llm_provider: ProviderId,
    normalizer: TranscriptNormalizer,
    context: ConversationContext,
    /// Assistant text of the current turn, decomposed topology only.
    pending_reply: String,
    synthesizer: Option<(ProviderId, Arc<dyn SpeechSynthesizer>)>,
    guard: SynthesisGuard,
    commands: mpsc::Sender<RoomCommand>,
}

impl Conversation {
    async fn handle(&mut self, event: ServiceEvent) -> Result<(), AgentError> {
        match event {
            ServiceEvent::Transcript(transcript) => {
                if transcript.role == Role::Assistant {
                    self.close(Role::User);
                }
                self.forward(transcript);
            }
            ServiceEvent::AssistantText(text) => {
                self.close(Role::User);
                if self.plan.topology() == Topology::Decomposed {
                    self.pending_reply.push_str(&text);
                }
                if !self.plan.options().transcribe_model_audio {
                    self.forward(ProviderTranscript {
                        role: Role::Assistant,
                        text,
                        finality: Finality::Interim,
                        mode: TextMode::Delta,
                        provider: self.llm_provider,
                        utterance_id: None,
                    });
                }
            }
            ServiceEvent::Audio(pcm) => {
                self.close(Role::User);
                if self.plan.options().audio_output {
                    self.play(pcm).await;
                }
            }
            ServiceEvent::Interrupted => {
                debug!("Assistant interrupted");
                self.pending_reply.clear();
                self.close(Role::Assistant);
            }
            ServiceEvent::TurnComplete => {
                self.flush();
                self.speak_pending().await?;
            }
            ServiceEvent::Closed(_) => {}
        }
        Ok(())
    }

    async fn speak_pending(&mut self) -> Result<(), AgentError> {
        let Some((provider, synthesizer)) = self.synthesizer.clone() else {
            return Ok(());
        };
        let text = std::mem::take(&mut self.pending_reply);
        match self
            .guard
            .speak(synthesizer.as_ref(), &text, self.plan.language())
            .await
        {
            SynthesisOutcome::Spoken(pcm) => self.play(pcm).await,
            SynthesisOutcome::Skipped => {}
            SynthesisOutcome::Exhausted { failures } => {
                return Err(AgentError::ProviderUnavailable {
                    provider,
                    reason: format!("{failures} consecutive synthesis failures"),
                });
            }
        }
        Ok(())
    }

    async fn play(&self, pcm: bytes::Bytes) {
        for frame in audio_utils::frames(&pcm) {
            if self.commands.send(RoomCommand::Audio(frame)).await.is_err() {
                warn!("Room closed while playing audio");
                return;
            }
        }
    }

    fn forward(&mut self, transcript: ProviderTranscript) {
        if let Some(event) = self.normalizer.normalize(transcript) {
            self.publish(event);
        }
    }

    /// Closes the open utterance of `role`, if any.
    fn close(&mut self, role: Role) {
        let provider = match role {
            Role::User => self.plan.provider_for(StageKind::Stt).unwrap_or(self.llm_provider),
            Role::Assistant => self.llm_provider,
        };
        if let Some(event) = self.normalizer.finalize_open(role, provider) {
            self.publish(event);
        }
    }

    fn flush(&mut self) {
        self.close(Role::User);
        self.close(Role::Assistant);
    }

    fn publish(&mut self, event: TranscriptEvent) {
        if event.is_final() {
            self.context.push(event.role, &event.text);
        }
        let message = transcript_message(&event);
        if let Err(e) = self.commands.try_send(RoomCommand::AppMessage(message)) {
            warn!(
                kind = "TranscriptForwardingFailure",
                utterance_id = %event.utterance_id,
                error = %e,
                "Dropped transcript update"
            );
        }
    }
}

/// The room app message carrying one transcript update.
pub fn transcript_message(event: &TranscriptEvent) -> serde_json::Value {
    json!({
        "type": "transcript",
        "role": event.role,
        "text": event.text,
        "final": event.is_final(),
        "utteranceId": event.utterance_id,
        "timestamp": event.timestamp,
        "provider": event.provider,
    })
}
