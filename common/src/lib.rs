/*!
common/src/lib.rs

Shared configuration types for newscast.

This file provides:
- Config data structures (deserialized from TOML)
- An async loader that merges a default file with an optional override file
- Validation of the values the pipeline relies on
- Helpers to resolve credentials referenced by environment variable name
*/

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A single feed to collect articles from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Display name; falls back to the feed's own title when absent
    pub name: Option<String>,
    pub url: String,
}

/// OpenAI-compatible text generation endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_api_url")]
    pub api_url: String,
    /// Name of the environment variable holding the API key
    #[serde(default = "default_llm_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_llm_timeout")]
    pub timeout_seconds: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_url: default_llm_api_url(),
            api_key_env: default_llm_api_key_env(),
            model: default_llm_model(),
            timeout_seconds: default_llm_timeout(),
        }
    }
}

impl LlmConfig {
    pub fn api_key(&self) -> Option<String> {
        resolve_env(&self.api_key_env)
    }
}

/// Podcast branch: script generation and speech synthesis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodcastConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_voice_host")]
    pub voice_host: String,
    #[serde(default = "default_voice_guest")]
    pub voice_guest: String,
    #[serde(default = "default_language_code")]
    pub language_code: String,
    #[serde(default = "default_speaking_rate")]
    pub speaking_rate: f32,
    #[serde(default = "default_output_file")]
    pub output_file: String,
    #[serde(default = "default_host_name")]
    pub host_name: String,
    #[serde(default = "default_guest_name")]
    pub guest_name: String,
    /// Skip lines whose synthesis fails instead of aborting the podcast
    #[serde(default)]
    pub skip_failed_lines: bool,
    #[serde(default = "default_tts_api_url")]
    pub api_url: String,
    #[serde(default = "default_tts_api_key_env")]
    pub api_key_env: String,
}

impl Default for PodcastConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            voice_host: default_voice_host(),
            voice_guest: default_voice_guest(),
            language_code: default_language_code(),
            speaking_rate: default_speaking_rate(),
            output_file: default_output_file(),
            host_name: default_host_name(),
            guest_name: default_guest_name(),
            skip_failed_lines: false,
            api_url: default_tts_api_url(),
            api_key_env: default_tts_api_key_env(),
        }
    }
}

impl PodcastConfig {
    pub fn api_key(&self) -> Option<String> {
        resolve_env(&self.api_key_env)
    }
}

/// Chat webhook used for delivery and error notifications
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    #[serde(default = "default_webhook_url_env")]
    pub url_env: String,
    #[serde(default = "default_webhook_username")]
    pub username: String,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url_env: default_webhook_url_env(),
            username: default_webhook_username(),
        }
    }
}

impl WebhookConfig {
    pub fn url(&self) -> Option<String> {
        resolve_env(&self.url_env)
    }
}

/// Top-level application configuration (deserialized from config.toml)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Free-text description of the reader's interests
    pub profile: String,
    #[serde(default = "default_max_articles")]
    pub max_articles: usize,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_max_article_fetch")]
    pub max_article_fetch: usize,
    #[serde(default = "default_max_age_hours")]
    pub article_max_age_hours: i64,
    #[serde(default = "default_feed_timeout")]
    pub feed_timeout_seconds: u64,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub podcast: PodcastConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
}

impl Config {
    /// Parse and validate configuration from a TOML string.
    pub fn from_toml_str(data: &str) -> Result<Self> {
        let cfg: Config = toml::from_str(data).context("Failed to parse TOML configuration")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load configuration from a TOML file asynchronously.
    ///
    /// Example:
    ///   let cfg = Config::from_file("config.toml").await?;
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = tokio::fs::read_to_string(path.as_ref())
            .await
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        Self::from_toml_str(&data)
    }

    /// Load configuration with an optional default file and an optional override file.
    /// If both are present, they are merged (override takes precedence).
    pub async fn load_with_defaults(
        default_path: Option<&Path>,
        override_path: Option<&Path>,
    ) -> Result<Self> {
        let mut config_value = toml::Value::Table(toml::map::Map::new());

        for path in [default_path, override_path].into_iter().flatten() {
            if !path.exists() {
                continue;
            }
            let data = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            let val: toml::Value = toml::from_str(&data)
                .with_context(|| format!("Failed to parse configuration: {}", path.display()))?;
            merge_toml(&mut config_value, val);
        }

        let cfg: Config = config_value
            .try_into()
            .context("Failed to parse merged configuration")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.profile.trim().is_empty() {
            anyhow::bail!("`profile` must not be empty");
        }
        if self.sources.is_empty() {
            anyhow::bail!("at least one entry in `sources` is required");
        }
        for source in &self.sources {
            url::Url::parse(&source.url)
                .with_context(|| format!("invalid source URL: {}", source.url))?;
        }
        if self.max_articles == 0 {
            anyhow::bail!("`max_articles` must be at least 1");
        }
        if self.max_article_fetch == 0 {
            anyhow::bail!("`max_article_fetch` must be at least 1");
        }
        if self.article_max_age_hours <= 0 {
            anyhow::bail!("`article_max_age_hours` must be positive");
        }
        for (key, name) in [
            ("podcast.host_name", &self.podcast.host_name),
            ("podcast.guest_name", &self.podcast.guest_name),
        ] {
            if name.trim().is_empty() || name.contains(':') {
                anyhow::bail!("`{}` must be non-empty and must not contain ':', got {:?}", key, name);
            }
        }
        // Speaker tags are the upper-cased names, so they must differ after upper-casing.
        if self.podcast.host_name.trim().to_uppercase() == self.podcast.guest_name.trim().to_uppercase() {
            anyhow::bail!(
                "`podcast.host_name` and `podcast.guest_name` must differ, both are {:?}",
                self.podcast.host_name
            );
        }
        if !(0.25..=4.0).contains(&self.podcast.speaking_rate) {
            anyhow::bail!(
                "`podcast.speaking_rate` must be between 0.25 and 4.0, got {}",
                self.podcast.speaking_rate
            );
        }
        Ok(())
    }
}

fn merge_toml(a: &mut toml::Value, b: toml::Value) {
    match (a, b) {
        (toml::Value::Table(a_map), toml::Value::Table(b_map)) => {
            for (k, v) in b_map {
                if let Some(a_val) = a_map.get_mut(&k) {
                    merge_toml(a_val, v);
                } else {
                    a_map.insert(k, v);
                }
            }
        }
        (a_val, b_val) => *a_val = b_val,
    }
}

/// Read an environment variable, treating unset and blank values the same.
pub fn resolve_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn default_max_articles() -> usize {
    5
}
fn default_language() -> String {
    "English".to_string()
}
fn default_max_article_fetch() -> usize {
    60
}
fn default_max_age_hours() -> i64 {
    24
}
fn default_feed_timeout() -> u64 {
    20
}
fn default_llm_api_url() -> String {
    "https://api.groq.com/openai/v1/chat/completions".to_string()
}
fn default_llm_api_key_env() -> String {
    "GROQ_API_KEY".to_string()
}
fn default_llm_model() -> String {
    "llama-3.3-70b-versatile".to_string()
}
fn default_llm_timeout() -> u64 {
    60
}
fn default_voice_host() -> String {
    "en-US-Wavenet-D".to_string()
}
fn default_voice_guest() -> String {
    "en-US-Wavenet-F".to_string()
}
fn default_language_code() -> String {
    "en-US".to_string()
}
fn default_speaking_rate() -> f32 {
    1.05
}
fn default_output_file() -> String {
    "podcast.mp3".to_string()
}
fn default_host_name() -> String {
    "Alex".to_string()
}
fn default_guest_name() -> String {
    "Sara".to_string()
}
fn default_tts_api_url() -> String {
    "https://texttospeech.googleapis.com/v1/text:synthesize".to_string()
}
fn default_tts_api_key_env() -> String {
    "GOOGLE_TTS_API_KEY".to_string()
}
fn default_webhook_url_env() -> String {
    "DISCORD_WEBHOOK_URL".to_string()
}
fn default_webhook_username() -> String {
    "News Agent".to_string()
}
