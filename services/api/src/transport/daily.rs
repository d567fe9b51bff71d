//! Daily REST client for rooms and meeting tokens.

use super::{Room, RoomOptions, RoomProvider, TokenGrant, TransportError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct DailyRoomProvider {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct RoomResponse {
    name: String,
    url: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
}

impl DailyRoomProvider {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            client,
            api_url: api_url.into(),
            api_key: api_key.into(),
        })
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, TransportError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(TransportError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

fn expiry(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    now + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::hours(1))
}

fn room_request(options: &RoomOptions, expires_at: DateTime<Utc>) -> Value {
    json!({
        "properties": {
            "exp": expires_at.timestamp(),
            "enable_chat": options.enable_chat,
            "enable_screenshare": false,
            "start_video_off": options.start_video_off,
            "start_audio_off": false,
        }
    })
}

fn token_request(room_name: &str, grant: TokenGrant, expires_at: DateTime<Utc>) -> Value {
    json!({
        "properties": {
            "room_name": room_name,
            "is_owner": grant == TokenGrant::Owner,
            "exp": expires_at.timestamp(),
        }
    })
}

#[async_trait]
impl RoomProvider for DailyRoomProvider {
    async fn create_room(&self, options: &RoomOptions) -> Result<Room, TransportError> {
        let expires_at = expiry(Utc::now(), options.ttl);
        let response = self
            .client
            .post(format!("{}/rooms", self.api_url))
            .bearer_auth(&self.api_key)
            .json(&room_request(options, expires_at))
            .send()
            .await?;
        let room: RoomResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))?;

        info!(room = %room.name, "Created room");
        Ok(Room {
            name: room.name,
            url: room.url,
            expires_at,
        })
    }

    async fn issue_token(
        &self,
        room: &Room,
        grant: TokenGrant,
        ttl: Duration,
    ) -> Result<String, TransportError> {
        let expires_at = expiry(Utc::now(), ttl).min(room.expires_at);
        let response = self
            .client
            .post(format!("{}/meeting-tokens", self.api_url))
            .bearer_auth(&self.api_key)
            .json(&token_request(&room.name, grant, expires_at))
            .send()
            .await?;
        let token: TokenResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))?;

        debug!(room = %room.name, ?grant, "Issued meeting token");
        Ok(token.token)
    }

    async fn delete_room(&self, room_name: &str) -> Result<(), TransportError> {
        let response = self
            .client
            .delete(format!("{}/rooms/{}", self.api_url, room_name))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            warn!(room = room_name, "Room was already gone");
            return Ok(());
        }
        Self::check(response).await?;
        info!(room = room_name, "Deleted room");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_room_request_properties() {
        let expires_at = Utc.with_ymd_and_hms(2025, 1, 8, 12, 0, 0).unwrap();
        let body = room_request(&RoomOptions::voice(Duration::from_secs(3600)), expires_at);
        let props = &body["properties"];

        assert_eq!(props["exp"], expires_at.timestamp());
        assert_eq!(props["enable_chat"], true);
        assert_eq!(props["enable_screenshare"], false);
        assert_eq!(props["start_video_off"], true);
        assert_eq!(props["start_audio_off"], false);
    }

    #[test]
    fn test_token_request_scopes_owner_rights() {
        let expires_at = Utc.with_ymd_and_hms(2025, 1, 8, 12, 0, 0).unwrap();
        let owner = token_request("abc", TokenGrant::Owner, expires_at);
        let guest = token_request("abc", TokenGrant::Participant, expires_at);

        assert_eq!(owner["properties"]["room_name"], "abc");
        assert_eq!(owner["properties"]["is_owner"], true);
        assert_eq!(guest["properties"]["is_owner"], false);
        assert_eq!(guest["properties"]["exp"], expires_at.timestamp());
    }

    #[test]
    fn test_expiry_adds_ttl() {
        let now = Utc.with_ymd_and_hms(2025, 1, 8, 12, 0, 0).unwrap();
        let later = expiry(now, Duration::from_secs(3600));
        assert_eq!((later - now).num_seconds(), 3600);
    }
}
