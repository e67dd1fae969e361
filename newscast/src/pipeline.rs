use chrono::{NaiveDate, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use common::Config;

use crate::dedup::deduplicate;
use crate::digest::{curate, Digest, Profile};
use crate::ingestion::{collect, SourceFailure};
use crate::llm::{GenerationError, LlmProvider, RetryPolicy};
use crate::publish::{DeliveryReport, Publisher};
use crate::script::compose;
use crate::tts::{synthesize, SpeechSynthesizer, VoiceConfig};

/// Fatal outcomes of a run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no articles from the last {max_age_hours}h found; the feeds may be empty or offline")]
    NoArticles { max_age_hours: i64 },
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error("podcast synthesis failed: {0:#}")]
    Synthesis(anyhow::Error),
    #[error("failed to write podcast file: {0:#}")]
    Output(anyhow::Error),
}

#[derive(Debug)]
pub struct PodcastSummary {
    pub path: PathBuf,
    pub lines: usize,
    pub segments: usize,
    pub bytes: usize,
}

#[derive(Debug)]
pub struct RunSummary {
    pub fetched: usize,
    pub kept: usize,
    pub source_failures: Vec<SourceFailure>,
    pub digest_chars: usize,
    pub podcast: Option<PodcastSummary>,
}

/// Everything one run needs, constructed up front and owned for the run.
pub struct RunContext {
    pub config: Config,
    pub http: reqwest::Client,
    /// `None` when no API key is configured; the run fails at curation.
    pub llm: Option<Arc<dyn LlmProvider>>,
    /// `None` when no speech credential is configured; the podcast branch is skipped.
    pub tts: Option<Arc<dyn SpeechSynthesizer>>,
    /// `None` means console-only output.
    pub publisher: Option<Arc<dyn Publisher>>,
    pub retry: RetryPolicy,
    pub podcast_enabled: bool,
}

impl RunContext {
    pub async fn run(&self) -> Result<RunSummary, PipelineError> {
        let config = &self.config;
        let today = Utc::now().date_naive();

        let report = collect(
            &self.http,
            &config.sources,
            config.max_article_fetch,
            config.article_max_age_hours,
        )
        .await;

        if report.articles.is_empty() {
            return Err(PipelineError::NoArticles {
                max_age_hours: config.article_max_age_hours,
            });
        }

        let fetched = report.articles.len();
        let articles = deduplicate(report.articles);
        let kept = articles.len();
        info!(fetched, kept, "articles ready for curation");

        let llm = self
            .llm
            .as_deref()
            .ok_or_else(|| GenerationError::MissingCredential {
                stage: "digest",
                env_var: config.llm.api_key_env.clone(),
            })?;

        let profile = Profile::from_config(config);
        let digest = curate(llm, &articles, &profile, &self.retry, today).await?;
        println!("\n{}\n", digest);

        match &self.publisher {
            Some(publisher) => {
                let delivery = publisher.send_text(digest.as_str()).await;
                info!(sent = delivery.sent, failed = delivery.failed, "digest delivered");
            }
            None => info!("no webhook configured, console output only"),
        }

        let podcast = if !self.podcast_enabled {
            None
        } else if let Some(tts) = self.tts.as_deref() {
            self.produce_podcast(llm, tts, &digest, &profile, today).await?
        } else {
            warn!(
                env_var = %config.podcast.api_key_env,
                "podcast enabled but no speech credential set, skipping"
            );
            None
        };

        info!("done");
        Ok(RunSummary {
            fetched,
            kept,
            source_failures: report.failures,
            digest_chars: digest.char_count(),
            podcast,
        })
    }

    async fn produce_podcast(
        &self,
        llm: &dyn LlmProvider,
        tts: &dyn SpeechSynthesizer,
        digest: &Digest,
        profile: &Profile,
        today: NaiveDate,
    ) -> Result<Option<PodcastSummary>, PipelineError> {
        let podcast = &self.config.podcast;

        info!("generating podcast script");
        let script = compose(llm, digest, profile, podcast, &self.retry, today).await?;
        if script.is_empty() {
            warn!("podcast script had no tagged lines, skipping audio");
            return Ok(None);
        }
        info!(lines = script.len(), words = script.word_count(), "podcast script ready");

        let voice = VoiceConfig::from_config(podcast);
        let artifact = synthesize(tts, &script, &voice)
            .await
            .map_err(PipelineError::Synthesis)?;

        let path = PathBuf::from(&podcast.output_file);
        artifact.write_to(&path).await.map_err(PipelineError::Output)?;
        info!(
            "podcast saved: {} ({} KB, {} segments)",
            path.display(),
            artifact.byte_len() / 1024,
            artifact.segment_count()
        );

        if let Some(publisher) = &self.publisher {
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "podcast.mp3".to_string());
            let caption = format!("**Daily News Podcast – {}**", today.format("%Y-%m-%d"));
            if let Err(e) = publisher.send_file(&file_name, artifact.to_bytes(), &caption).await {
                warn!(error = %format!("{:#}", e), "failed to post podcast file");
            }
        }

        Ok(Some(PodcastSummary {
            path,
            lines: script.len(),
            segments: artifact.segment_count(),
            bytes: artifact.byte_len(),
        }))
    }
}

/// Run once; on failure post an error report (best effort) and hand the error back.
pub async fn run_and_report(ctx: &RunContext) -> Result<RunSummary, PipelineError> {
    match ctx.run().await {
        Ok(summary) => Ok(summary),
        Err(e) => {
            report_failure(ctx.publisher.as_deref(), &e.to_string()).await;
            Err(e)
        }
    }
}

/// Post a timestamped error message, or nothing when there is no publisher.
pub async fn report_failure(publisher: Option<&dyn Publisher>, message: &str) -> DeliveryReport {
    match publisher {
        Some(publisher) => {
            let delivery = publisher.send_error(message, Utc::now()).await;
            if delivery.failed > 0 {
                warn!(failed = delivery.failed, "error report was not fully delivered");
            }
            delivery
        }
        None => DeliveryReport::default(),
    }
}
