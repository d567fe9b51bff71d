//! One supervisor task per session.
//!
//! The supervisor owns the agent task. It registers the session when the
//! agent reports readiness, whether or not the connect request is still
//! waiting, and it runs the session's cleanup exactly once through a drop
//! guard, whichever way the agent ends.

use super::{SessionHandle, degraded::DegradedProviders};
use crate::{
    agent::{AgentError, AgentExit, AgentLauncher, AgentParams, SharedSessionInfo},
    error::ConnectError,
    transport::RoomProvider,
};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::oneshot,
    task::{JoinError, JoinHandle},
    time::timeout,
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;
use voxbridge_core::{
    pipeline::StageKind, providers::ProviderId, registry::SessionRegistry, session::SessionState,
};

type AgentResult = Result<Result<AgentExit, AgentError>, JoinError>;

pub(super) struct Supervision {
    pub launcher: Arc<dyn AgentLauncher>,
    pub params: AgentParams,
    pub shutdown: CancellationToken,
    pub sessions: Arc<SessionRegistry<SessionHandle>>,
    pub degraded: Arc<DegradedProviders>,
    /// Set when the room should be deleted once the session is over.
    pub rooms: Option<Arc<dyn RoomProvider>>,
    pub grace: Duration,
    pub tasks: TaskTracker,
    /// Told whether the session made it to registration.
    pub registered: oneshot::Sender<Result<(), ConnectError>>,
}

pub(super) fn spawn(supervision: Supervision) {
    let (room, session_id, language, topology) = {
        let info = supervision.params.session.read();
        (
            info.room_name.clone(),
            info.session_id,
            info.effective_language.clone(),
            info.topology,
        )
    };
    let span = info_span!(
        "agent_session",
        room = %room,
        session_id = %session_id,
        language = %language,
        topology = %topology
    );
    let tasks = supervision.tasks.clone();
    tasks.spawn(supervise(supervision).instrument(span));
}

async fn supervise(supervision: Supervision) {
    let Supervision {
        launcher,
        params,
        shutdown,
        sessions,
        degraded,
        rooms,
        grace,
        tasks,
        registered,
    } = supervision;

    let info = params.session.clone();
    let room_name = params.room.name.clone();
    let override_provider = params.plan.provider_for(StageKind::Tts);
    let mut cleanup = CleanupGuard {
        sessions: sessions.clone(),
        room_name: room_name.clone(),
        session_id: info.read().session_id,
        info: info.clone(),
        rooms,
        owns_room: true,
        tasks,
    };

    let (ready_tx, ready_rx) = oneshot::channel();
    let mut agent = tokio::spawn(
        launcher
            .launch(params, ready_tx, shutdown.clone())
            .in_current_span(),
    );

    let joined = tokio::select! {
        ready = ready_rx => ready.is_ok(),
        _ = shutdown.cancelled() => {
            info!("Shutdown requested before the agent joined");
            false
        }
    };
    if !joined {
        // Either the agent gave up its readiness signal without firing it, or
        // it is still joining and gets the shutdown grace to stop.
        let result = finish(&mut agent, &shutdown, grace).await;
        report(&result, override_provider, &degraded);
        let _ = registered.send(Err(early_failure(result)));
        return;
    }

    let handle = SessionHandle {
        info: info.clone(),
        shutdown: shutdown.clone(),
    };
    match sessions.register(room_name, handle) {
        Ok(()) => {
            info!("Session registered");
            let _ = registered.send(Ok(()));
        }
        Err(e) => {
            warn!(error = %e, "Room already has a session; stopping this agent");
            // The room belongs to the registered session.
            cleanup.owns_room = false;
            shutdown.cancel();
            let _ = registered.send(Err(ConnectError::AgentCrashed(e.to_string())));
        }
    }

    let result = finish(&mut agent, &shutdown, grace).await;
    report(&result, override_provider, &degraded);
}

/// Waits for the agent. Once shutdown is requested it gets `grace` to finish
/// on its own before it is aborted.
async fn finish(
    agent: &mut JoinHandle<Result<AgentExit, AgentError>>,
    shutdown: &CancellationToken,
    grace: Duration,
) -> AgentResult {
    tokio::select! {
        result = &mut *agent => return result,
        _ = shutdown.cancelled() => {}
    }
    match timeout(grace, &mut *agent).await {
        Ok(result) => result,
        Err(_) => {
            warn!(?grace, "Agent did not finish in time; aborting");
            agent.abort();
            agent.await
        }
    }
}

fn report(
    result: &AgentResult,
    override_provider: Option<ProviderId>,
    degraded: &DegradedProviders,
) {
    match result {
        Ok(Ok(exit)) => info!(?exit, "Agent finished"),
        Ok(Err(AgentError::ProviderUnavailable { provider, reason })) => {
            error!(
                kind = "ProviderUnavailable",
                %provider,
                %reason,
                "Session ended: provider unavailable"
            );
            if override_provider == Some(*provider) {
                degraded.mark(*provider);
            }
        }
        Ok(Err(e)) => error!(error = %e, "Agent failed"),
        Err(e) if e.is_panic() => error!(kind = "AgentCrashed", error = %e, "Agent task panicked"),
        Err(e) => info!(error = %e, "Agent task aborted"),
    }
}

fn early_failure(result: AgentResult) -> ConnectError {
    match result {
        Ok(Err(e)) => ConnectError::from(e),
        Ok(Ok(exit)) => {
            ConnectError::AgentCrashed(format!("agent finished before joining ({exit:?})"))
        }
        Err(e) => ConnectError::AgentCrashed(e.to_string()),
    }
}

/// Runs when the supervisor ends, on every path including panics and aborts.
struct CleanupGuard {
    sessions: Arc<SessionRegistry<SessionHandle>>,
    room_name: String,
    session_id: Uuid,
    info: SharedSessionInfo,
    rooms: Option<Arc<dyn RoomProvider>>,
    /// Cleared when another session holds the room.
    owns_room: bool,
    tasks: TaskTracker,
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        // A disconnect may have removed the entry already, and a later session
        // may own the name by now.
        let removed = self
            .sessions
            .deregister_if(&self.room_name, |handle| handle.session_id() == self.session_id)
            .is_some();
        self.info.write().transition(SessionState::Ended);
        info!(room = %self.room_name, removed, "Session cleaned up");

        if !self.owns_room {
            return;
        }
        let Some(rooms) = self.rooms.take() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let room_name = self.room_name.clone();
        self.tasks.spawn_on(
            async move {
                match rooms.delete_room(&room_name).await {
                    Ok(()) => info!(room = %room_name, "Room deleted"),
                    Err(e) => warn!(room = %room_name, error = %e, "Failed to delete room"),
                }
            },
            &runtime,
        );
    }
}
