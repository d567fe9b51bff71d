//! The real-time room collaborator.
//!
//! Two seams: `RoomProvider` manages rooms and tokens over the provider's REST
//! API, and `RoomConnector` joins a room as the agent and exposes its media
//! and messaging as a pair of channels.

pub mod bridge;
pub mod daily;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("room provider request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("room provider returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected room provider response: {0}")]
    Decode(String),
    #[error("media bridge error: {0}")]
    Bridge(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Room {
    pub name: String,
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomOptions {
    pub ttl: Duration,
    pub enable_chat: bool,
    pub start_video_off: bool,
}

impl RoomOptions {
    /// An audio-only room that expires after `ttl`.
    pub fn voice(ttl: Duration) -> Self {
        Self {
            ttl,
            enable_chat: true,
            start_video_off: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenGrant {
    /// Elevated rights; given to the agent so it can manage the room.
    Owner,
    Participant,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RoomProvider: Send + Sync {
    async fn create_room(&self, options: &RoomOptions) -> Result<Room, TransportError>;

    async fn issue_token(
        &self,
        room: &Room,
        grant: TokenGrant,
        ttl: Duration,
    ) -> Result<String, TransportError>;

    async fn delete_room(&self, room_name: &str) -> Result<(), TransportError>;
}

/// Something that happened in a joined room.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomEvent {
    ParticipantJoined { participant_id: String },
    ParticipantLeft { participant_id: String, reason: Option<String> },
    CallState(String),
    /// Mono PCM16 at 16 kHz from remote participants.
    Audio(Bytes),
    Closed,
}

/// Something the agent wants the room to do.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomCommand {
    /// Mono PCM16 at 16 kHz to play into the room.
    Audio(Bytes),
    AppMessage(serde_json::Value),
    Leave,
}

/// A live connection to a room.
#[derive(Debug)]
pub struct RoomLink {
    pub events: mpsc::Receiver<RoomEvent>,
    pub commands: mpsc::Sender<RoomCommand>,
}

#[async_trait]
pub trait RoomConnector: Send + Sync {
    /// Joins `room`. Resolves once the transport confirms the join.
    async fn join(
        &self,
        room: &Room,
        token: &str,
        display_name: &str,
    ) -> Result<RoomLink, TransportError>;
}
