use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use std::time::Duration;
use tracing::{error, info, warn};

use common::WebhookConfig;

/// Discord rejects messages over 2000 characters; keep some headroom.
pub const MESSAGE_LIMIT: usize = 1900;

/// Per-message delivery tally. Failures are logged, never raised.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub sent: usize,
    pub failed: usize,
}

/// Notification channel for the digest, the podcast file and crash reports.
#[async_trait::async_trait]
pub trait Publisher: Send + Sync {
    /// Post text, split into chunks of at most [`MESSAGE_LIMIT`] characters.
    async fn send_text(&self, text: &str) -> DeliveryReport;

    /// Upload one audio attachment with an optional caption.
    async fn send_file(&self, file_name: &str, bytes: Vec<u8>, caption: &str) -> Result<()>;

    /// Post an error-flavored message describing a failed run.
    async fn send_error(&self, message: &str, at: DateTime<Utc>) -> DeliveryReport;
}

/// Split text into chunks of at most `limit` characters, breaking between lines.
///
/// A line longer than `limit` is the only thing ever split mid-line. Joining the
/// chunks with `\n` gives back the input whenever no such line exists; once a line
/// is hard-split its pieces land in separate chunks and a plain `\n` join no longer
/// round-trips.
pub fn chunk_message(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut chunks = Vec::new();
    if text.trim().is_empty() {
        return chunks;
    }

    let mut current: Option<(String, usize)> = None;

    for line in text.split('\n') {
        for piece in split_long_line(line, limit) {
            let piece_len = piece.chars().count();
            current = match current.take() {
                Some((mut buf, len)) if len + 1 + piece_len <= limit => {
                    buf.push('\n');
                    buf.push_str(&piece);
                    Some((buf, len + 1 + piece_len))
                }
                Some((buf, _)) => {
                    chunks.push(buf);
                    Some((piece, piece_len))
                }
                None => Some((piece, piece_len)),
            };
        }
    }

    if let Some((buf, _)) = current {
        chunks.push(buf);
    }
    chunks
}

fn split_long_line(line: &str, limit: usize) -> Vec<String> {
    if line.chars().count() <= limit {
        return vec![line.to_string()];
    }
    let chars: Vec<char> = line.chars().collect();
    chars.chunks(limit).map(|c| c.iter().collect()).collect()
}

pub fn format_error_message(username: &str, message: &str, at: DateTime<Utc>) -> String {
    format!(
        "**{} error** ({})\n```\n{}\n```\nCheck the job logs for details.",
        username,
        at.format("%Y-%m-%d %H:%M UTC"),
        message
    )
}

/// Discord-style incoming webhook.
pub struct DiscordWebhook {
    url: String,
    username: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct WebhookMessage<'a> {
    content: &'a str,
    username: &'a str,
}

impl DiscordWebhook {
    pub fn new(url: impl Into<String>, username: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            url: url.into(),
            username: username.into(),
            client,
        })
    }

    /// Build a webhook from config, or `Ok(None)` when no URL is set.
    pub fn from_config(config: &WebhookConfig) -> Result<Option<Self>> {
        match config.url() {
            Some(url) => Self::new(url, &config.username).map(Some),
            None => Ok(None),
        }
    }

    async fn post_chunks(&self, text: &str, username: &str) -> DeliveryReport {
        let chunks = chunk_message(text, MESSAGE_LIMIT);
        let total = chunks.len();
        let mut report = DeliveryReport::default();

        for (i, chunk) in chunks.iter().enumerate() {
            match self.post_message(chunk, username).await {
                Ok(()) => {
                    report.sent += 1;
                    info!("message {}/{} sent", i + 1, total);
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(error = %format!("{:#}", e), "message {}/{} failed", i + 1, total);
                }
            }
        }
        report
    }

    async fn post_message(&self, content: &str, username: &str) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(&WebhookMessage { content, username })
            .send()
            .await
            .context("webhook request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("webhook returned {}: {}", status, body);
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Publisher for DiscordWebhook {
    async fn send_text(&self, text: &str) -> DeliveryReport {
        self.post_chunks(text, &self.username).await
    }

    async fn send_file(&self, file_name: &str, bytes: Vec<u8>, caption: &str) -> Result<()> {
        let part = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str("audio/mpeg")
            .context("invalid attachment MIME type")?;
        let form = Form::new()
            .text("content", caption.to_string())
            .text("username", self.username.clone())
            .part("file", part);

        let response = self
            .client
            .post(&self.url)
            .multipart(form)
            .send()
            .await
            .context("webhook upload failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%status, "podcast upload rejected");
            anyhow::bail!("webhook upload returned {}: {}", status, body);
        }
        info!(file = file_name, "podcast file posted");
        Ok(())
    }

    async fn send_error(&self, message: &str, at: DateTime<Utc>) -> DeliveryReport {
        let text = format_error_message(&self.username, message, at);
        let username = format!("{} [error]", self.username);
        self.post_chunks(&text, &username).await
    }
}
