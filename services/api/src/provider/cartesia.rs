//! Cartesia HTTP speech synthesis, used as the dedicated Dutch voice.

use super::SpeechSynthesizer;
use crate::audio_utils::ROOM_PCM16_SAMPLE_RATE;
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;
use voxbridge_core::catalog;

const CARTESIA_API_URL: &str = "https://api.cartesia.ai";
const CARTESIA_VERSION: &str = "2024-06-10";

pub struct CartesiaSynthesizer {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    voice_id: String,
    model: String,
}

impl CartesiaSynthesizer {
    pub fn new(api_key: String, voice_id: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            api_url: CARTESIA_API_URL.to_string(),
            api_key,
            voice_id,
            model: catalog::CARTESIA_MODEL.to_string(),
        })
    }
}

fn request_body(model: &str, voice_id: &str, text: &str, language: &str) -> Value {
    // Cartesia takes the primary subtag only.
    let language = language.split('-').next().unwrap_or(language);
    json!({
        "model_id": model,
        "transcript": text,
        "voice": { "mode": "id", "id": voice_id },
        "language": language,
        "output_format": {
            "container": "raw",
            "encoding": "pcm_s16le",
            "sample_rate": ROOM_PCM16_SAMPLE_RATE,
        },
    })
}

#[async_trait]
impl SpeechSynthesizer for CartesiaSynthesizer {
    async fn synthesize(&self, text: &str, language: &str) -> Result<Bytes> {
        let response = self
            .client
            .post(format!("{}/tts/bytes", self.api_url))
            .header("X-API-Key", &self.api_key)
            .header("Cartesia-Version", CARTESIA_VERSION)
            .json(&request_body(&self.model, &self.voice_id, text, language))
            .send()
            .await
            .context("Cartesia request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Cartesia returned {}: {}", status, body);
        }
        let audio = response.bytes().await.context("Failed to read Cartesia audio")?;
        debug!(bytes = audio.len(), "Synthesized speech");
        Ok(audio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_asks_for_raw_room_audio() {
        let body = request_body("sonic-2", "voice-1", "Goedemorgen", "nl-NL");
        assert_eq!(body["model_id"], "sonic-2");
        assert_eq!(body["transcript"], "Goedemorgen");
        assert_eq!(body["voice"]["id"], "voice-1");
        assert_eq!(body["language"], "nl");
        assert_eq!(body["output_format"]["encoding"], "pcm_s16le");
        assert_eq!(body["output_format"]["sample_rate"], 16000);
    }
}
