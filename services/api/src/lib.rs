//! Voxbridge API Library Crate
//!
//! The web service that brokers voice sessions: configuration, the room and
//! provider clients, the agent runtime, the session orchestrator, and the
//! HTTP routes. The binaries are thin wrappers around this library.

pub mod agent;
pub mod audio_utils;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod orchestrator;
pub mod provider;
pub mod router;
pub mod state;
pub mod transport;
