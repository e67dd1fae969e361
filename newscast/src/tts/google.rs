use anyhow::{Context, Result};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use common::PodcastConfig;

use super::{SpeechRequest, SpeechSynthesizer};

/// Google Cloud Text-to-Speech over its REST `text:synthesize` endpoint, MP3 output.
///
/// The API key travels in a header so it never shows up in a request URL or its errors.
pub struct GoogleTts {
    api_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl GoogleTts {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            api_url: api_url.into(),
            api_key: api_key.into(),
            client,
        })
    }

    /// Build a synthesizer from config, or `Ok(None)` when no API key is set.
    pub fn from_config(podcast: &PodcastConfig) -> Result<Option<Self>> {
        match podcast.api_key() {
            Some(key) => Self::new(&podcast.api_url, key).map(Some),
            None => Ok(None),
        }
    }
}

#[async_trait::async_trait]
impl SpeechSynthesizer for GoogleTts {
    async fn synthesize_line(&self, request: &SpeechRequest) -> Result<Vec<u8>> {
        let body = SynthesizeRequest {
            input: SynthesisInput {
                text: &request.text,
            },
            voice: VoiceSelection {
                language_code: &request.language_code,
                name: &request.voice,
            },
            audio_config: AudioConfig {
                audio_encoding: "MP3",
                speaking_rate: request.speaking_rate,
            },
        };

        let response = self
            .client
            .post(&self.api_url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .context("TTS HTTP request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("TTS API error {}: {}", status, body);
        }

        let parsed: SynthesizeResponse = response
            .json()
            .await
            .context("Failed to parse TTS response")?;

        base64::engine::general_purpose::STANDARD
            .decode(parsed.audio_content.as_bytes())
            .context("TTS response audioContent is not valid base64")
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeRequest<'a> {
    input: SynthesisInput<'a>,
    voice: VoiceSelection<'a>,
    audio_config: AudioConfig,
}

#[derive(Debug, Serialize)]
struct SynthesisInput<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceSelection<'a> {
    language_code: &'a str,
    name: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AudioConfig {
    audio_encoding: &'static str,
    speaking_rate: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeResponse {
    audio_content: String,
}
