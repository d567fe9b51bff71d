//! Deepgram pre-recorded transcription, used only for language detection.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use voxbridge_core::language::{Detection, LanguageDetector};

const DEEPGRAM_API_URL: &str = "https://api.deepgram.com";

pub struct DeepgramDetector {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl DeepgramDetector {
    pub fn new(api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            api_url: DEEPGRAM_API_URL.to_string(),
            api_key,
        })
    }
}

#[derive(Deserialize, Debug, Default)]
struct ListenResponse {
    #[serde(default)]
    results: Option<ListenResults>,
}

#[derive(Deserialize, Debug, Default)]
struct ListenResults {
    #[serde(default)]
    channels: Vec<Channel>,
}

#[derive(Deserialize, Debug, Default)]
struct Channel {
    detected_language: Option<String>,
    language_confidence: Option<f32>,
    #[serde(default)]
    alternatives: Vec<Alternative>,
}

#[derive(Deserialize, Debug, Default)]
struct Alternative {
    detected_language: Option<String>,
    confidence: Option<f32>,
}

/// Pulls the detected language out of a listen response; `und` when absent.
fn parse_detection(response: ListenResponse) -> Detection {
    let channel = response
        .results
        .and_then(|r| r.channels.into_iter().next())
        .unwrap_or_default();
    let alternative = channel.alternatives.into_iter().next().unwrap_or_default();

    Detection {
        language: channel
            .detected_language
            .or(alternative.detected_language)
            .unwrap_or_else(|| "und".to_string()),
        confidence: channel
            .language_confidence
            .or(alternative.confidence)
            .unwrap_or(0.0),
    }
}

#[async_trait]
impl LanguageDetector for DeepgramDetector {
    async fn detect(&self, audio: Bytes, mime_type: &str) -> Result<Detection> {
        let response = self
            .client
            .post(format!("{}/v1/listen", self.api_url))
            .query(&[
                ("detect_language", "true"),
                ("model", "nova-2"),
                ("punctuate", "false"),
            ])
            .header("Authorization", format!("Token {}", self.api_key))
            .header("Content-Type", mime_type)
            .body(audio)
            .send()
            .await
            .context("Deepgram request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Deepgram returned {}: {}", status, body);
        }
        let parsed: ListenResponse = response
            .json()
            .await
            .context("Failed to parse Deepgram response")?;
        let detection = parse_detection(parsed);
        debug!(language = %detection.language, confidence = detection.confidence, "Deepgram detection");
        Ok(detection)
    }
}
