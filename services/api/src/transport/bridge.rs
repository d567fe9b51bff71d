//! Joins rooms through a WebSocket media bridge.
//!
//! The bridge owns the WebRTC side of the call and speaks a small JSON
//! protocol with the agent: one `join` handshake, then audio frames and room
//! events in both directions. Audio is base64 PCM16 mono at 16 kHz.

use super::{Room, RoomCommand, RoomConnector, RoomEvent, RoomLink, TransportError};
use crate::audio_utils::{self, ROOM_PCM16_SAMPLE_RATE};
use async_trait::async_trait;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message as WsMessage};
use tracing::{debug, info, warn};

const JOIN_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
enum ClientFrame {
    Join {
        room_url: String,
        token: String,
        user_name: String,
    },
    Audio {
        data: String,
        sample_rate: u32,
    },
    AppMessage {
        data: serde_json::Value,
    },
    Leave,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
enum BridgeFrame {
    Joined {
        #[serde(default)]
        participant_id: Option<String>,
    },
    ParticipantJoined {
        participant_id: String,
    },
    ParticipantLeft {
        participant_id: String,
        #[serde(default)]
        reason: Option<String>,
    },
    CallState {
        state: String,
    },
    Audio {
        data: String,
    },
    Error {
        message: String,
    },
}

impl BridgeFrame {
    fn into_event(self) -> Option<RoomEvent> {
        match self {
            BridgeFrame::ParticipantJoined { participant_id } => {
                Some(RoomEvent::ParticipantJoined { participant_id })
            }
            BridgeFrame::ParticipantLeft {
                participant_id,
                reason,
            } => Some(RoomEvent::ParticipantLeft {
                participant_id,
                reason,
            }),
            BridgeFrame::CallState { state } => Some(RoomEvent::CallState(state)),
            BridgeFrame::Audio { data } => match audio_utils::decode_base64(&data) {
                Ok(pcm) => Some(RoomEvent::Audio(pcm)),
                Err(e) => {
                    warn!(error = %e, "Dropping undecodable audio frame from bridge");
                    None
                }
            },
            BridgeFrame::Error { message } => {
                warn!(%message, "Media bridge reported an error");
                None
            }
            BridgeFrame::Joined { .. } => None,
        }
    }
}

fn encode(frame: &ClientFrame) -> Result<WsMessage, TransportError> {
    let text = serde_json::to_string(frame).map_err(|e| TransportError::Bridge(e.to_string()))?;
    Ok(WsMessage::Text(text.into()))
}

pub struct BridgeConnector {
    url: String,
}

impl BridgeConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl RoomConnector for BridgeConnector {
    async fn join(
        &self,
        room: &Room,
        token: &str,
        display_name: &str,
    ) -> Result<RoomLink, TransportError> {
        let (ws_stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| TransportError::Bridge(format!("connect failed: {e}")))?;
        let (mut ws_tx, mut ws_rx) = ws_stream.split();

        let join = ClientFrame::Join {
            room_url: room.url.clone(),
            token: token.to_string(),
            user_name: display_name.to_string(),
        };
        ws_tx
            .send(encode(&join)?)
            .await
            .map_err(|e| TransportError::Bridge(e.to_string()))?;

        tokio::time::timeout(JOIN_TIMEOUT, await_joined(&mut ws_rx))
            .await
            .map_err(|_| TransportError::Bridge("timed out waiting for join".to_string()))??;
        info!(room = %room.name, "Joined room through media bridge");

        let (events_tx, events_rx) = mpsc::channel(256);
        let (commands_tx, commands_rx) = mpsc::channel(256);
        tokio::spawn(pump(ws_tx, ws_rx, events_tx, commands_rx));

        Ok(RoomLink {
            events: events_rx,
            commands: commands_tx,
        })
    }
}

async fn await_joined<S, E>(ws_rx: &mut S) -> Result<(), TransportError>
where
    S: Stream<Item = Result<WsMessage, E>> + Unpin,
    E: std::fmt::Display,
{
    while let Some(message) = ws_rx.next().await {
        match message.map_err(|e| TransportError::Bridge(e.to_string()))? {
            WsMessage::Text(text) => match serde_json::from_str::<BridgeFrame>(&text) {
                Ok(BridgeFrame::Joined { participant_id }) => {
                    debug!(?participant_id, "Bridge confirmed join");
                    return Ok(());
                }
                Ok(BridgeFrame::Error { message }) => return Err(TransportError::Bridge(message)),
                Ok(other) => debug!(?other, "Ignoring bridge frame before join"),
                Err(e) => warn!(error = %e, "Unparseable bridge frame during join"),
            },
            WsMessage::Close(frame) => {
                return Err(TransportError::Bridge(format!(
                    "bridge closed during join: {frame:?}"
                )));
            }
            _ => {}
        }
    }
    Err(TransportError::Bridge("bridge closed during join".to_string()))
}

async fn pump<Tx, Rx, E>(
    mut ws_tx: Tx,
    mut ws_rx: Rx,
    events: mpsc::Sender<RoomEvent>,
    mut commands: mpsc::Receiver<RoomCommand>,
) where
    Tx: Sink<WsMessage> + Unpin,
    Tx::Error: std::fmt::Display,
    Rx: Stream<Item = Result<WsMessage, E>> + Unpin,
    E: std::fmt::Display,
{
    loop {
        tokio::select! {
            command = commands.recv() => {
                let frame = match command {
                    Some(RoomCommand::Audio(pcm)) => ClientFrame::Audio {
                        data: audio_utils::encode_base64(&pcm),
                        sample_rate: ROOM_PCM16_SAMPLE_RATE,
                    },
                    Some(RoomCommand::AppMessage(data)) => ClientFrame::AppMessage { data },
                    Some(RoomCommand::Leave) | None => {
                        if let Ok(leave) = encode(&ClientFrame::Leave) {
                            let _ = ws_tx.send(leave).await;
                        }
                        let _ = ws_tx.close().await;
                        info!("Left room");
                        break;
                    }
                };
                let sent = match encode(&frame) {
                    Ok(message) => ws_tx.send(message).await.map_err(|e| e.to_string()),
                    Err(e) => Err(e.to_string()),
                };
                if let Err(e) = sent {
                    warn!(error = %e, "Failed to write to media bridge");
                    break;
                }
            },
            message = ws_rx.next() => {
                match message {
                    Some(Ok(WsMessage::Text(text))) => {
                        match serde_json::from_str::<BridgeFrame>(&text) {
                            Ok(frame) => {
                                if let Some(event) = frame.into_event() {
                                    if events.send(event).await.is_err() {
                                        break;
                                    }
                                }
                            }
                            Err(e) => warn!(error = %e, "Unparseable bridge frame"),
                        }
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        info!(?frame, "Media bridge closed the connection");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Error reading from media bridge");
                        break;
                    }
                    None => break,
                    _ => {}
                }
            },
        }
    }
    let _ = events.send(RoomEvent::Closed).await;
}
