use anyhow::{Context, Result};
use std::path::Path;
use tracing::{info, warn};

use common::PodcastConfig;

use crate::script::{Script, Speaker};

pub mod google;

/// One utterance to synthesize.
#[derive(Debug, Clone)]
pub struct SpeechRequest {
    pub text: String,
    pub voice: String,
    pub language_code: String,
    pub speaking_rate: f32,
}

/// Text-to-speech backend returning encoded audio (MP3) for a single utterance.
#[async_trait::async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize_line(&self, request: &SpeechRequest) -> Result<Vec<u8>>;
}

/// Voice bound to each speaker, plus delivery settings.
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    pub primary_voice: String,
    pub secondary_voice: String,
    pub language_code: String,
    pub speaking_rate: f32,
    pub skip_failed_lines: bool,
}

impl VoiceConfig {
    pub fn from_config(podcast: &PodcastConfig) -> Self {
        Self {
            primary_voice: podcast.voice_host.clone(),
            secondary_voice: podcast.voice_guest.clone(),
            language_code: podcast.language_code.clone(),
            speaking_rate: podcast.speaking_rate,
            skip_failed_lines: podcast.skip_failed_lines,
        }
    }

    pub fn voice_for(&self, speaker: Speaker) -> &str {
        match speaker {
            Speaker::Primary => &self.primary_voice,
            Speaker::Secondary => &self.secondary_voice,
        }
    }
}

/// Synthesized segments in script order.
#[derive(Debug, Default)]
pub struct PodcastArtifact {
    segments: Vec<Vec<u8>>,
}

impl PodcastArtifact {
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn segments(&self) -> &[Vec<u8>] {
        &self.segments
    }

    pub fn byte_len(&self) -> usize {
        self.segments.iter().map(Vec::len).sum()
    }

    /// Raw concatenation of all segments; MP3 frames tolerate this without re-encoding.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.segments.concat()
    }

    pub async fn write_to(&self, path: &Path) -> Result<()> {
        tokio::fs::write(path, self.to_bytes())
            .await
            .with_context(|| format!("Failed to write podcast file: {}", path.display()))
    }
}

/// Synthesize every line of the script with the voice of its speaker.
///
/// A failed line aborts the whole artifact unless `skip_failed_lines` is set.
pub async fn synthesize(
    tts: &dyn SpeechSynthesizer,
    script: &Script,
    voice: &VoiceConfig,
) -> Result<PodcastArtifact> {
    let mut artifact = PodcastArtifact::default();

    for (index, line) in script.lines().iter().enumerate() {
        let text = line.text.trim();
        if text.is_empty() {
            continue;
        }

        let request = SpeechRequest {
            text: text.to_string(),
            voice: voice.voice_for(line.speaker).to_string(),
            language_code: voice.language_code.clone(),
            speaking_rate: voice.speaking_rate,
        };

        match tts.synthesize_line(&request).await {
            Ok(audio) => artifact.segments.push(audio),
            Err(e) if voice.skip_failed_lines => {
                warn!(line = index + 1, error = %format!("{:#}", e), "skipping line that failed to synthesize");
            }
            Err(e) => {
                return Err(e.context(format!("speech synthesis failed on script line {}", index + 1)));
            }
        }
    }

    info!(
        segments = artifact.segment_count(),
        bytes = artifact.byte_len(),
        "podcast audio synthesized"
    );
    Ok(artifact)
}
