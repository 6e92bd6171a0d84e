//! Sarvam TTS backend: POST text, get back base64-encoded linear16 PCM.
//!
//! Grounded on this codebase's reqwest-based adapter style
//! (`ai/anthropic_adapter.rs`'s client construction and error mapping),
//! adapted to Sarvam's synchronous text-to-speech REST contract.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{TextToSpeech, TtsError};

const ENDPOINT: &str = "https://api.sarvam.ai/text-to-speech";
const SAMPLE_RATE: u32 = 8_000;

pub struct SarvamTtsProvider {
    client: reqwest::Client,
    api_key: String,
    speaker: String,
}

impl SarvamTtsProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(20))
                .build()
                .expect("reqwest client builds"),
            api_key: api_key.into(),
            speaker: "meera".to_string(),
        }
    }

    pub fn with_speaker(mut self, speaker: impl Into<String>) -> Self {
        self.speaker = speaker.into();
        self
    }
}

#[derive(Serialize)]
struct SynthesizeRequest<'a> {
    text: &'a str,
    target_language_code: &'a str,
    speaker: &'a str,
    model: &'a str,
    speech_sample_rate: u32,
    audio_codec: &'a str,
}

#[derive(Deserialize)]
struct SynthesizeResponse {
    audios: Vec<String>,
}

#[async_trait]
impl TextToSpeech for SarvamTtsProvider {
    async fn synthesize(&self, text: &str, language_code: &str) -> Result<Vec<u8>, TtsError> {
        if text.trim().is_empty() {
            return Err(TtsError::InvalidText("empty text".into()));
        }

        let body = SynthesizeRequest {
            text,
            target_language_code: language_code,
            speaker: &self.speaker,
            model: "bulbul:v2",
            speech_sample_rate: SAMPLE_RATE,
            audio_codec: "linear16",
        };

        let response = self
            .client
            .post(ENDPOINT)
            .header("api-subscription-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| TtsError::SynthesisFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TtsError::SynthesisFailed(format!(
                "upstream returned {}",
                response.status()
            )));
        }

        let parsed: SynthesizeResponse = response
            .json()
            .await
            .map_err(|e| TtsError::SynthesisFailed(e.to_string()))?;

        let first = parsed
            .audios
            .first()
            .ok_or_else(|| TtsError::SynthesisFailed("no audio in response".into()))?;

        B64.decode(first)
            .map_err(|e| TtsError::SynthesisFailed(format!("malformed base64 audio: {e}")))
    }
}
