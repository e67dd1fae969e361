use anyhow::{Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use feed_rs::model::Feed;
use feed_rs::parser;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use common::SourceConfig;

/// Only the newest entries of each feed are considered.
pub const MAX_ENTRIES_PER_FEED: usize = 15;
/// Article summaries are cut to this many characters.
pub const SUMMARY_MAX_CHARS: usize = 300;

const UNTITLED: &str = "Untitled";
const UNKNOWN_SOURCE: &str = "Unknown";

/// A feed entry normalized for curation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Article {
    pub title: String,
    pub summary: String,
    pub link: String,
    pub source: String,
}

/// A source that contributed nothing because it could not be fetched or parsed.
#[derive(Debug, Clone)]
pub struct SourceFailure {
    pub source: String,
    pub url: String,
    pub error: String,
}

/// Outcome of a collection pass: whatever could be gathered, plus what failed.
#[derive(Debug, Default)]
pub struct CollectReport {
    pub articles: Vec<Article>,
    pub failures: Vec<SourceFailure>,
}

/// HTTP client for feed fetches with a per-request timeout.
pub fn feed_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent("Newscast/0.1.0")
        .build()
        .context("failed to build reqwest client")
}

/// Fetches a feed from the given URL and parses it.
pub async fn fetch_and_parse_feed(client: &Client, url: &str) -> Result<Feed> {
    let response = client
        .get(url)
        .send()
        .await
        .context("network error during fetch")?;

    let status = response.status();
    if !status.is_success() {
        anyhow::bail!("feed fetch failed with status: {}", status);
    }

    let bytes = response.bytes().await.context("failed to read response body")?;
    parser::parse(bytes.as_ref()).context("failed to parse feed")
}

/// Turn the leading entries of a parsed feed into articles, dropping entries older than `cutoff`.
///
/// Entries without a published or updated date are kept since their age cannot be proven.
pub fn articles_from_feed(feed: &Feed, source: &SourceConfig, cutoff: DateTime<Utc>) -> Vec<Article> {
    let source_name = source
        .name
        .clone()
        .filter(|n| !n.trim().is_empty())
        .or_else(|| feed.title.as_ref().map(|t| t.content.trim().to_string()))
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| UNKNOWN_SOURCE.to_string());

    feed.entries
        .iter()
        .take(MAX_ENTRIES_PER_FEED)
        .filter(|entry| match entry.published.or(entry.updated) {
            Some(published) if published < cutoff => {
                debug!(source = %source_name, %published, "skipping stale entry");
                false
            }
            _ => true,
        })
        .map(|entry| Article {
            title: entry
                .title
                .as_ref()
                .map(|t| t.content.trim().to_string())
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| UNTITLED.to_string()),
            summary: entry
                .summary
                .as_ref()
                .map(|s| truncate_chars(s.content.trim(), SUMMARY_MAX_CHARS))
                .unwrap_or_default(),
            link: entry.links.first().map(|l| l.href.clone()).unwrap_or_default(),
            source: source_name.clone(),
        })
        .collect()
}

/// Fetch every source in order and gather fresh articles, capped at `fetch_limit`.
///
/// A source that fails is recorded in the report and skipped; it never aborts the pass.
pub async fn collect(
    client: &Client,
    sources: &[SourceConfig],
    fetch_limit: usize,
    max_age_hours: i64,
) -> CollectReport {
    let cutoff = Utc::now() - ChronoDuration::hours(max_age_hours);
    let mut report = CollectReport::default();

    for source in sources {
        let label = source.name.clone().unwrap_or_else(|| source.url.clone());
        match fetch_and_parse_feed(client, &source.url).await {
            Ok(feed) => {
                let articles = articles_from_feed(&feed, source, cutoff);
                debug!(source = %label, count = articles.len(), "collected articles");
                report.articles.extend(articles);
            }
            Err(e) => {
                warn!(source = %label, url = %source.url, error = %format!("{:#}", e), "failed to load feed");
                report.failures.push(SourceFailure {
                    source: label,
                    url: source.url.clone(),
                    error: format!("{:#}", e),
                });
            }
        }
    }

    info!(
        "{} articles (last {}h) from {} sources, {} failed",
        report.articles.len(),
        max_age_hours,
        sources.len(),
        report.failures.len()
    );

    report.articles.truncate(fetch_limit);
    report
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
