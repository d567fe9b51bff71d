//! Handles the real-time WebSocket connection to the Gemini Live API.

use super::{
    ContextMessage, ContextRole, RealtimeConnector, RealtimeLink, RealtimeSettings, ServiceEvent,
    ServiceInput,
};
use crate::audio_utils::{self, StreamResampler};
use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message as WsMessage};
use tracing::{Instrument, debug, error, info, warn};
use voxbridge_core::{
    catalog,
    providers::ProviderId,
    transcript::{Finality, ProviderTranscript, Role, TextMode},
};

const GEMINI_LIVE_URL: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";
const SETUP_TIMEOUT: Duration = Duration::from_secs(10);

// --- Local Gemini Live Types (for encapsulation) ---
mod gemini_live_types {
    use serde::{Deserialize, Serialize};

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) enum ClientMessage {
        Setup(BidiGenerateContentSetup),
        RealtimeInput(BidiGenerateContentRealtimeInput),
        ClientContent(BidiGenerateContentClientContent),
    }
    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct BidiGenerateContentSetup {
        pub model: String,
        pub generation_config: GenerationConfig,
        pub system_instruction: Content,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub input_audio_transcription: Option<AudioTranscriptionConfig>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub output_audio_transcription: Option<AudioTranscriptionConfig>,
    }
    #[derive(Serialize)]
    pub(super) struct AudioTranscriptionConfig {}
    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct GenerationConfig {
        pub response_modalities: Vec<ResponseModality>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub speech_config: Option<SpeechConfig>,
    }
    #[derive(Serialize, Debug, PartialEq)]
    #[serde(rename_all = "UPPERCASE")]
    pub(super) enum ResponseModality {
        Text,
        Audio,
    }
    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct SpeechConfig {
        pub voice_config: VoiceConfig,
        pub language_code: String,
    }
    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct VoiceConfig {
        pub prebuilt_voice_config: PrebuiltVoiceConfig,
    }
    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct PrebuiltVoiceConfig {
        pub voice_name: String,
    }
    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct BidiGenerateContentClientContent {
        pub turns: Vec<Content>,
        pub turn_complete: bool,
    }
    #[derive(Serialize)]
    pub(super) struct Content {
        #[serde(skip_serializing_if = "Option::is_none")]
        pub role: Option<String>,
        pub parts: Vec<Part>,
    }
    #[derive(Serialize)]
    pub(super) struct Part {
        pub text: String,
    }
    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct BidiGenerateContentRealtimeInput {
        pub audio: Blob,
    }
    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct Blob {
        pub mime_type: String,
        pub data: String,
    }
    #[derive(Deserialize, Debug, Default)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct ServerMessage {
        pub setup_complete: Option<serde_json::Value>,
        pub server_content: Option<LiveServerContent>,
        pub go_away: Option<serde_json::Value>,
    }
    #[derive(Deserialize, Debug, Default)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct LiveServerContent {
        pub model_turn: Option<ServerContentTurn>,
        pub input_transcription: Option<ServerTranscription>,
        pub output_transcription: Option<ServerTranscription>,
        pub turn_complete: Option<bool>,
        pub interrupted: Option<bool>,
    }
    #[derive(Deserialize, Debug)]
    pub(super) struct ServerContentTurn {
        pub parts: Vec<ServerPart>,
    }
    #[derive(Deserialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct ServerPart {
        pub text: Option<String>,
        pub inline_data: Option<ServerBlob>,
    }
    #[derive(Deserialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct ServerBlob {
        pub data: String,
    }
    #[derive(Deserialize, Debug)]
    pub(super) struct ServerTranscription {
        pub text: String,
    }
}

use gemini_live_types as types;

pub struct GeminiLiveConnector {
    api_key: String,
    url: String,
}

impl GeminiLiveConnector {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            url: GEMINI_LIVE_URL.to_string(),
        }
    }
}

fn text_content(role: Option<&str>, text: &str) -> types::Content {
    types::Content {
        role: role.map(str::to_string),
        parts: vec![types::Part {
            text: text.to_string(),
        }],
    }
}

/// Builds the setup message for `settings`.
///
/// Without audio output the model answers in text, has no voice, and its own
/// speech is not transcribed.
fn setup_message(settings: &RealtimeSettings) -> types::ClientMessage {
    let options = settings.options;
    let (response_modalities, speech_config) = if options.audio_output {
        let voice = settings
            .voice
            .clone()
            .unwrap_or_else(|| catalog::default_voice(&settings.model).to_string());
        (
            vec![types::ResponseModality::Audio],
            Some(types::SpeechConfig {
                voice_config: types::VoiceConfig {
                    prebuilt_voice_config: types::PrebuiltVoiceConfig { voice_name: voice },
                },
                language_code: settings.language.clone(),
            }),
        )
    } else {
        (vec![types::ResponseModality::Text], None)
    };

    types::ClientMessage::Setup(types::BidiGenerateContentSetup {
        model: catalog::model_path(&settings.model),
        generation_config: types::GenerationConfig {
            response_modalities,
            speech_config,
        },
        system_instruction: text_content(None, &settings.system_instruction),
        input_audio_transcription: options
            .transcribe_user_audio
            .then_some(types::AudioTranscriptionConfig {}),
        output_audio_transcription: (options.audio_output && options.transcribe_model_audio)
            .then_some(types::AudioTranscriptionConfig {}),
    })
}

fn respond_message(messages: &[ContextMessage]) -> types::ClientMessage {
    // Live API turns only know `user` and `model`.
    let turns = messages
        .iter()
        .map(|m| {
            let role = match m.role {
                ContextRole::System | ContextRole::User => "user",
                ContextRole::Assistant => "model",
            };
            text_content(Some(role), &m.text)
        })
        .collect();
    types::ClientMessage::ClientContent(types::BidiGenerateContentClientContent {
        turns,
        turn_complete: true,
    })
}

fn audio_message(pcm16: &[u8]) -> types::ClientMessage {
    types::ClientMessage::RealtimeInput(types::BidiGenerateContentRealtimeInput {
        audio: types::Blob {
            mime_type: format!(
                "audio/pcm;rate={}",
                audio_utils::GEMINI_LIVE_INPUT_SAMPLE_RATE
            ),
            data: audio_utils::encode_base64(pcm16),
        },
    })
}

fn transcript(role: Role, text: String) -> ServiceEvent {
    ServiceEvent::Transcript(ProviderTranscript {
        role,
        text,
        finality: Finality::Interim,
        mode: TextMode::Delta,
        provider: ProviderId::GeminiLive,
        utterance_id: None,
    })
}

/// Translates one server message into service events, resampling model audio
/// to the room rate.
fn translate(message: types::ServerMessage, resampler: &mut StreamResampler) -> Vec<ServiceEvent> {
    let mut events = Vec::new();
    let Some(content) = message.server_content else {
        if message.go_away.is_some() {
            warn!("Gemini announced the session is about to end");
        }
        return events;
    };

    if let Some(t) = content.input_transcription {
        events.push(transcript(Role::User, t.text));
    }
    if content.interrupted == Some(true) {
        events.push(ServiceEvent::Interrupted);
    }
    if let Some(turn) = content.model_turn {
        for part in turn.parts {
            if let Some(blob) = part.inline_data {
                let pcm_f32 = audio_utils::decode_f32_from_base64_i16(&blob.data);
                let resampled = resampler.process(&pcm_f32);
                if !resampled.is_empty() {
                    events.push(ServiceEvent::Audio(audio_utils::f32_to_pcm16_bytes(&resampled)));
                }
            }
            if let Some(text) = part.text {
                events.push(ServiceEvent::AssistantText(text));
            }
        }
    }
    if let Some(t) = content.output_transcription {
        events.push(transcript(Role::Assistant, t.text));
    }
    if content.turn_complete == Some(true) {
        events.push(ServiceEvent::TurnComplete);
    }
    events
}

#[async_trait]
impl RealtimeConnector for GeminiLiveConnector {
    async fn open(&self, settings: RealtimeSettings) -> Result<RealtimeLink> {
        let url = format!("{}?key={}", self.url, self.api_key);
        let (ws_stream, _) = connect_async(url)
            .await
            .context("Failed to connect to Gemini Live")?;
        info!(model = %settings.model, language = %settings.language, "Connected to Gemini Live WebSocket.");
        let (mut gemini_tx, mut gemini_rx) = ws_stream.split();

        let setup_msg = serde_json::to_string(&setup_message(&settings))?;
        gemini_tx.send(WsMessage::Text(setup_msg.into())).await?;

        // Wait for `setupComplete` before anything else is sent.
        tokio::time::timeout(SETUP_TIMEOUT, async {
            while let Some(msg) = gemini_rx.next().await {
                match msg? {
                    WsMessage::Text(text) => {
                        match serde_json::from_str::<types::ServerMessage>(&text) {
                            Ok(m) if m.setup_complete.is_some() => return Ok(()),
                            Ok(m) => debug!(?m, "Unexpected message during Gemini setup"),
                            Err(_) => error!("Failed to parse Gemini message during setup. Raw text: {}", text),
                        }
                    }
                    WsMessage::Binary(data) => {
                        if let Ok(m) = serde_json::from_slice::<types::ServerMessage>(&data) {
                            if m.setup_complete.is_some() {
                                return Ok(());
                            }
                        }
                    }
                    WsMessage::Close(frame) => bail!("Gemini closed during setup: {frame:?}"),
                    _ => {}
                }
            }
            Err(anyhow!("Gemini connection ended during setup"))
        })
        .await
        .context("Timed out waiting for Gemini setup")??;
        info!("Gemini session setup is complete. Ready for bidirectional streaming.");

        let mut resampler = StreamResampler::new(
            audio_utils::GEMINI_LIVE_OUTPUT_SAMPLE_RATE,
            audio_utils::ROOM_PCM16_SAMPLE_RATE,
            480,
        )?;
        let (input_tx, mut input_rx) = mpsc::channel::<ServiceInput>(256);
        let (events_tx, events_rx) = mpsc::channel::<ServiceEvent>(256);

        let task = tokio::spawn(
            async move {
                let reason = loop {
                    tokio::select! {
                        input = input_rx.recv() => {
                            let message = match input {
                                Some(ServiceInput::Audio(pcm)) => audio_message(&pcm),
                                Some(ServiceInput::Respond(messages)) => respond_message(&messages),
                                None => {
                                    let _ = gemini_tx.close().await;
                                    break None;
                                }
                            };
                            let payload = match serde_json::to_string(&message) {
                                Ok(p) => p,
                                Err(e) => break Some(e.to_string()),
                            };
                            if let Err(e) = gemini_tx.send(WsMessage::Text(payload.into())).await {
                                error!("Error writing to Gemini WebSocket: {}", e);
                                break Some(e.to_string());
                            }
                        },
                        msg = gemini_rx.next() => {
                            let parsed = match msg {
                                Some(Ok(WsMessage::Text(text))) => serde_json::from_str::<types::ServerMessage>(&text).ok(),
                                Some(Ok(WsMessage::Binary(data))) => serde_json::from_slice::<types::ServerMessage>(&data).ok(),
                                Some(Ok(WsMessage::Close(close_frame))) => {
                                    info!(?close_frame, "Gemini WebSocket connection closed by server.");
                                    break close_frame.map(|f| f.reason.to_string());
                                }
                                Some(Err(e)) => {
                                    error!("Error reading from Gemini WebSocket: {}", e);
                                    break Some(e.to_string());
                                }
                                None => break Some("connection ended".to_string()),
                                _ => None,
                            };
                            for event in parsed.map(|m| translate(m, &mut resampler)).unwrap_or_default() {
                                if events_tx.send(event).await.is_err() {
                                    return;
                                }
                            }
                        },
                    }
                };
                let _ = events_tx.send(ServiceEvent::Closed(reason)).await;
            }
            .in_current_span(),
        );

        Ok(RealtimeLink {
            input: input_tx,
            events: events_rx,
            task,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxbridge_core::pipeline::IntegratedOptions;

    fn settings(audio_output: bool) -> RealtimeSettings {
        RealtimeSettings {
            model: "gemini-2.0-flash-live-001".to_string(),
            voice: Some("Aoede".to_string()),
            language: "nl-NL".to_string(),
            system_instruction: catalog::system_instruction("nl-NL").to_string(),
            options: IntegratedOptions {
                audio_output,
                transcribe_user_audio: true,
                transcribe_model_audio: audio_output,
            },
        }
    }

    #[test]
    fn test_setup_for_integrated_speech() {
        let json = serde_json::to_value(setup_message(&settings(true))).unwrap();
        let setup = &json["setup"];

        assert_eq!(setup["model"], "models/gemini-2.0-flash-live-001");
        assert_eq!(setup["generationConfig"]["responseModalities"][0], "AUDIO");
        let speech = &setup["generationConfig"]["speechConfig"];
        assert_eq!(speech["voiceConfig"]["prebuiltVoiceConfig"]["voiceName"], "Aoede");
        assert_eq!(speech["languageCode"], "nl-NL");
        assert!(setup["inputAudioTranscription"].is_object());
        assert!(setup["outputAudioTranscription"].is_object());
        assert!(
            setup["systemInstruction"]["parts"][0]["text"]
                .as_str()
                .unwrap()
                .contains("Nederlands")
        );
    }

    #[test]
    fn test_setup_without_audio_output_disables_voice_and_model_transcription() {
        let json = serde_json::to_value(setup_message(&settings(false))).unwrap();
        let setup = &json["setup"];

        assert_eq!(setup["generationConfig"]["responseModalities"][0], "TEXT");
        assert!(setup["generationConfig"].get("speechConfig").is_none());
        assert!(setup.get("outputAudioTranscription").is_none());
        assert!(setup["inputAudioTranscription"].is_object());
    }

    #[test]
    fn test_respond_maps_roles() {
        let json = serde_json::to_value(respond_message(&[
            ContextMessage {
                role: ContextRole::System,
                text: "be nice".to_string(),
            },
            ContextMessage {
                role: ContextRole::Assistant,
                text: "hallo".to_string(),
            },
        ]))
        .unwrap();
        let content = &json["clientContent"];
        assert_eq!(content["turnComplete"], true);
        assert_eq!(content["turns"][0]["role"], "user");
        assert_eq!(content["turns"][1]["role"], "model");
    }

    #[test]
    fn test_audio_input_is_tagged_with_rate() {
        let json = serde_json::to_value(audio_message(&[0, 1])).unwrap();
        assert_eq!(json["realtimeInput"]["audio"]["mimeType"], "audio/pcm;rate=16000");
        assert_eq!(json["realtimeInput"]["audio"]["data"], "AAE=");
    }

    #[test]
    fn test_translate_server_content() {
        let mut resampler = StreamResampler::new(24000, 16000, 480).unwrap();
        let message: types::ServerMessage = serde_json::from_str(
            r#"{"serverContent":{
                "inputTranscription":{"text":"Hoe gaat"},
                "modelTurn":{"parts":[{"text":"Goed"}]},
                "outputTranscription":{"text":"Goed"},
                "turnComplete":true
            }}"#,
        )
        .unwrap();
        let events = translate(message, &mut resampler);

        assert_eq!(events.len(), 4);
        assert!(matches!(&events[0], ServiceEvent::Transcript(t) if t.role == Role::User && t.text == "Hoe gaat"));
        assert_eq!(events[1], ServiceEvent::AssistantText("Goed".to_string()));
        assert!(matches!(&events[2], ServiceEvent::Transcript(t) if t.role == Role::Assistant));
        assert_eq!(events[3], ServiceEvent::TurnComplete);
    }

    #[test]
    fn test_translate_resamples_model_audio() {
        let mut resampler = StreamResampler::new(24000, 16000, 480).unwrap();
        // 4800 samples of 24 kHz audio.
        let data = audio_utils::encode_base64(&vec![0u8; 9600]);
        let message: types::ServerMessage = serde_json::from_str(&format!(
            r#"{{"serverContent":{{"modelTurn":{{"parts":[{{"inlineData":{{"mimeType":"audio/pcm;rate=24000","data":"{data}"}}}}]}}}}}}"#
        ))
        .unwrap();
        let events = translate(message, &mut resampler);

        match events.as_slice() {
            [ServiceEvent::Audio(pcm)] => {
                let samples = pcm.len() / 2;
                assert!((3000..=3300).contains(&samples), "samples {samples}");
            }
            other => panic!("unexpected events {other:?}"),
        }
    }

    #[test]
    fn test_interrupted_is_reported() {
        let mut resampler = StreamResampler::new(24000, 16000, 480).unwrap();
        let message: types::ServerMessage =
            serde_json::from_str(r#"{"serverContent":{"interrupted":true}}"#).unwrap();
        assert_eq!(translate(message, &mut resampler), vec![ServiceEvent::Interrupted]);
    }
}
