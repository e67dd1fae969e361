/*
newscast - main.rs
Runs the pipeline once: collect feeds, curate a digest, optionally produce a
two-voice podcast, and publish to the configured webhook. Meant to be started
by an external scheduler (cron, CI job).
*/

use anyhow::Result;
use clap::Parser;
use common::{Config, WebhookConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use newscast::ingestion::feed_client;
use newscast::llm::remote::RemoteLlmProvider;
use newscast::llm::{LlmProvider, RetryPolicy};
use newscast::pipeline::{report_failure, run_and_report, RunContext};
use newscast::publish::{DiscordWebhook, Publisher};
use newscast::tts::google::GoogleTts;
use newscast::tts::SpeechSynthesizer;

#[derive(Parser, Debug)]
#[command(name = "newscast", about = "Turn news feeds into a curated digest and podcast")]
struct Args {
    /// Path to config.toml (merged over config.default.toml when present)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override log level (info, debug, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Print the digest but do not post anything to the webhook
    #[arg(long)]
    dry_run: bool,

    /// Skip the podcast branch even if enabled in config
    #[arg(long)]
    no_podcast: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    dotenv::dotenv().ok();
    info!("newscast starting");

    let config = match load_config(args.config.clone()).await {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %format!("{:#}", e), "failed to load configuration");
            if !args.dry_run {
                notify_failure(&WebhookConfig::default(), &format!("{:#}", e)).await;
            }
            return Err(e);
        }
    };

    let publisher: Option<Arc<dyn Publisher>> = if args.dry_run {
        info!("dry run: publishing disabled");
        None
    } else {
        match DiscordWebhook::from_config(&config.webhook) {
            Ok(hook) => hook.map(|w| Arc::new(w) as Arc<dyn Publisher>),
            Err(e) => {
                error!(error = %format!("{:#}", e), "failed to set up webhook");
                return Err(e);
            }
        }
    };

    let podcast_enabled = config.podcast.enabled && !args.no_podcast;
    let ctx = match build_context(config, publisher.clone(), podcast_enabled) {
        Ok(ctx) => ctx,
        Err(e) => {
            error!(error = %format!("{:#}", e), "failed to set up run");
            report_failure(publisher.as_deref(), &format!("{:#}", e)).await;
            return Err(e);
        }
    };

    match run_and_report(&ctx).await {
        Ok(summary) => {
            for failure in &summary.source_failures {
                warn!(source = %failure.source, error = %failure.error, "source skipped");
            }
            info!(
                fetched = summary.fetched,
                kept = summary.kept,
                digest_chars = summary.digest_chars,
                podcast = summary.podcast.is_some(),
                "run finished"
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "run failed");
            Err(e.into())
        }
    }
}

fn build_context(
    config: Config,
    publisher: Option<Arc<dyn Publisher>>,
    podcast_enabled: bool,
) -> Result<RunContext> {
    let llm: Option<Arc<dyn LlmProvider>> = RemoteLlmProvider::from_config(&config.llm)
        .map(|p| Arc::new(p) as Arc<dyn LlmProvider>);
    if llm.is_none() {
        warn!(env_var = %config.llm.api_key_env, "text model API key not set");
    }

    let tts: Option<Arc<dyn SpeechSynthesizer>> = if podcast_enabled {
        GoogleTts::from_config(&config.podcast)?.map(|t| Arc::new(t) as Arc<dyn SpeechSynthesizer>)
    } else {
        None
    };

    Ok(RunContext {
        http: feed_client(config.feed_timeout_seconds)?,
        config,
        llm,
        tts,
        publisher,
        retry: RetryPolicy::default(),
        podcast_enabled,
    })
}

async fn load_config(explicit: Option<PathBuf>) -> Result<Config> {
    let default_path = PathBuf::from("config.default.toml");

    let override_path = match explicit {
        Some(p) if !p.exists() => anyhow::bail!("Config file not found: {}", p.display()),
        Some(p) => Some(p),
        None => {
            let p = PathBuf::from("config.toml");
            if p.exists() {
                Some(p)
            } else {
                None
            }
        }
    };

    let config = Config::load_with_defaults(
        if default_path.exists() { Some(default_path.as_path()) } else { None },
        override_path.as_deref(),
    )
    .await?;
    info!(default_file = ?default_path, override_file = ?override_path, "configuration loaded");
    Ok(config)
}

/// Best-effort crash report when no publisher could be built from config.
async fn notify_failure(webhook: &WebhookConfig, message: &str) {
    match DiscordWebhook::from_config(webhook) {
        Ok(hook) => {
            report_failure(hook.as_ref().map(|h| h as &dyn Publisher), message).await;
        }
        Err(e) => warn!(error = %e, "could not build webhook for error report"),
    }
}
