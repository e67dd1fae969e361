use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use common::Config;
use newscast::ingestion::feed_client;
use newscast::llm::{GenerationError, LlmProvider, LlmRequest, LlmResponse, RetryPolicy, UsageMetadata};
use newscast::pipeline::{run_and_report, PipelineError, RunContext};
use newscast::publish::{DeliveryReport, Publisher};
use newscast::tts::{SpeechRequest, SpeechSynthesizer};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

const DIGEST: &str = "**Good morning!**\n---\n**Rust 2.0 announced** <https://example.com/rust>";
const SCRIPT: &str = "ALEX: Welcome to the daily news.\nSure, here is the script:\nSARA: Big Rust news today!\n\nALEX: Indeed. Goodbye.";

/// Answers digest prompts with DIGEST and script prompts with SCRIPT.
#[derive(Default)]
struct ScriptedLlm {
    prompts: Mutex<Vec<String>>,
}

#[async_trait::async_trait]
impl LlmProvider for ScriptedLlm {
    async fn generate(&self, request: LlmRequest) -> Result<LlmResponse> {
        let content = if request.prompt.contains("conversation script") {
            SCRIPT
        } else {
            DIGEST
        };
        self.prompts.lock().unwrap().push(request.prompt);
        Ok(LlmResponse {
            content: content.to_string(),
            usage: UsageMetadata::default(),
            model: "scripted".to_string(),
        })
    }
}

/// Fails the first two attempts of each stage, then answers like [`ScriptedLlm`].
#[derive(Default)]
struct TwoFailuresPerStage {
    digest_calls: AtomicU32,
    script_calls: AtomicU32,
}

#[async_trait::async_trait]
impl LlmProvider for TwoFailuresPerStage {
    async fn generate(&self, request: LlmRequest) -> Result<LlmResponse> {
        let is_script = request.prompt.contains("conversation script");
        let counter = if is_script { &self.script_calls } else { &self.digest_calls };
        let call = counter.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= 2 {
            anyhow::bail!("LLM API error 503 Service Unavailable");
        }
        Ok(LlmResponse {
            content: (if is_script { SCRIPT } else { DIGEST }).to_string(),
            usage: UsageMetadata::default(),
            model: "flaky".to_string(),
        })
    }
}

struct FailingLlm;

#[async_trait::async_trait]
impl LlmProvider for FailingLlm {
    async fn generate(&self, _request: LlmRequest) -> Result<LlmResponse> {
        anyhow::bail!("LLM API error 500 Internal Server Error")
    }
}

#[derive(Default)]
struct VoiceTagTts {
    voices: Mutex<Vec<String>>,
}

#[async_trait::async_trait]
impl SpeechSynthesizer for VoiceTagTts {
    async fn synthesize_line(&self, request: &SpeechRequest) -> Result<Vec<u8>> {
        self.voices.lock().unwrap().push(request.voice.clone());
        Ok(format!("[{}]", request.voice).into_bytes())
    }
}

#[derive(Default)]
struct RecordingPublisher {
    texts: Mutex<Vec<String>>,
    files: Mutex<Vec<(String, Vec<u8>, String)>>,
    errors: Mutex<Vec<(String, DateTime<Utc>)>>,
}

#[async_trait::async_trait]
impl Publisher for RecordingPublisher {
    async fn send_text(&self, text: &str) -> DeliveryReport {
        self.texts.lock().unwrap().push(text.to_string());
        DeliveryReport { sent: 1, failed: 0 }
    }

    async fn send_file(&self, file_name: &str, bytes: Vec<u8>, caption: &str) -> Result<()> {
        self.files
            .lock()
            .unwrap()
            .push((file_name.to_string(), bytes, caption.to_string()));
        Ok(())
    }

    async fn send_error(&self, message: &str, at: DateTime<Utc>) -> DeliveryReport {
        self.errors.lock().unwrap().push((message.to_string(), at));
        DeliveryReport { sent: 1, failed: 0 }
    }
}

fn rss(items: &[(&str, i64)]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0"?><rss version="2.0"><channel><title>Example News</title><link>https://example.com</link><description>d</description>"#,
    );
    for (i, (title, age_hours)) in items.iter().enumerate() {
        let published = Utc::now() - Duration::hours(*age_hours);
        xml.push_str(&format!(
            "<item><title>{}</title><link>https://example.com/{}</link><pubDate>{}</pubDate></item>",
            title,
            i,
            published.to_rfc2822()
        ));
    }
    xml.push_str("</channel></rss>");
    xml
}

fn config(feed_url: &str, output_file: &str, podcast: bool) -> Config {
    Config::from_toml_str(&format!(
        r#"
        profile = "Programming languages"
        max_articles = 2

        [[sources]]
        name = "Example"
        url = "{feed_url}"

        [podcast]
        enabled = {podcast}
        voice_host = "host-voice"
        voice_guest = "guest-voice"
        output_file = "{output_file}"
        "#
    ))
    .expect("config")
}

fn context(
    config: Config,
    llm: Option<Arc<dyn LlmProvider>>,
    tts: Option<Arc<dyn SpeechSynthesizer>>,
    publisher: Option<Arc<dyn Publisher>>,
) -> RunContext {
    RunContext {
        http: feed_client(5).expect("client"),
        podcast_enabled: config.podcast.enabled,
        config,
        llm,
        tts,
        publisher,
        retry: RetryPolicy::immediate(3),
    }
}

#[tokio::test]
async fn full_run_publishes_digest_and_podcast() {
    let mut server = mockito::Server::new_async().await;
    let _feed = server
        .mock("GET", "/feed.xml")
        .with_status(200)
        .with_body(rss(&[
            ("Rust 2.0 announced today", 1),
            ("Rust 2.0 announced today officially", 2),
            ("Python adds JIT", 3),
            ("Ancient story", 72),
        ]))
        .create_async()
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let output = dir.path().join("episode.mp3");
    let cfg = config(
        &format!("{}/feed.xml", server.url()),
        &output.to_string_lossy(),
        true,
    );

    let llm = Arc::new(ScriptedLlm::default());
    let tts = Arc::new(VoiceTagTts::default());
    let publisher = Arc::new(RecordingPublisher::default());

    let summary = context(cfg, Some(llm.clone()), Some(tts.clone()), Some(publisher.clone()))
        .run()
        .await
        .expect("run succeeds");

    assert_eq!(summary.fetched, 3);
    assert_eq!(summary.kept, 2);
    assert!(summary.source_failures.is_empty());

    let prompts = llm.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[0].contains("[Example] Rust 2.0 announced today\n"));
    assert!(prompts[0].contains("[Example] Python adds JIT"));
    assert!(!prompts[0].contains("officially"));
    assert!(!prompts[0].contains("Ancient story"));
    assert!(prompts[1].contains(DIGEST));

    assert_eq!(publisher.texts.lock().unwrap().as_slice(), &[DIGEST.to_string()]);

    let podcast = summary.podcast.expect("podcast produced");
    assert_eq!(podcast.lines, 3);
    assert_eq!(podcast.segments, 3);
    assert_eq!(
        *tts.voices.lock().unwrap(),
        vec!["host-voice", "guest-voice", "host-voice"]
    );

    let written = std::fs::read(&output).expect("podcast file");
    assert_eq!(written, b"[host-voice][guest-voice][host-voice]".to_vec());

    let files = publisher.files.lock().unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].0, "episode.mp3");
    assert_eq!(files[0].1, written);
    assert!(files[0].2.starts_with("**Daily News Podcast"));
}

#[tokio::test]
async fn stale_feeds_abort_before_any_model_call() {
    let mut server = mockito::Server::new_async().await;
    let _feed = server
        .mock("GET", "/feed.xml")
        .with_status(200)
        .with_body(rss(&[("Last week's news", 200)]))
        .create_async()
        .await;

    let cfg = config(&format!("{}/feed.xml", server.url()), "unused.mp3", false);
    let llm = Arc::new(ScriptedLlm::default());

    let err = context(cfg, Some(llm.clone()), None, None).run().await.unwrap_err();

    assert!(matches!(err, PipelineError::NoArticles { max_age_hours: 24 }));
    assert!(llm.prompts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn podcast_is_skipped_without_speech_credential() {
    let mut server = mockito::Server::new_async().await;
    let _feed = server
        .mock("GET", "/feed.xml")
        .with_status(200)
        .with_body(rss(&[("Rust 2.0 announced today", 1)]))
        .create_async()
        .await;

    let cfg = config(&format!("{}/feed.xml", server.url()), "unused.mp3", true);
    let llm = Arc::new(ScriptedLlm::default());

    let summary = context(cfg, Some(llm.clone()), None, None)
        .run()
        .await
        .expect("run succeeds");

    assert!(summary.podcast.is_none());
    assert_eq!(llm.prompts.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn missing_model_key_fails_at_curation() {
    let mut server = mockito::Server::new_async().await;
    let _feed = server
        .mock("GET", "/feed.xml")
        .with_status(200)
        .with_body(rss(&[("Rust 2.0 announced today", 1)]))
        .create_async()
        .await;

    let cfg = config(&format!("{}/feed.xml", server.url()), "unused.mp3", false);
    let err = context(cfg, None, None, None).run().await.unwrap_err();

    match err {
        PipelineError::Generation(GenerationError::MissingCredential { env_var, .. }) => {
            assert_eq!(env_var, "GROQ_API_KEY");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn exhausted_digest_retries_fail_the_run() {
    let mut server = mockito::Server::new_async().await;
    let _feed = server
        .mock("GET", "/feed.xml")
        .with_status(200)
        .with_body(rss(&[("Rust 2.0 announced today", 1)]))
        .create_async()
        .await;

    let cfg = config(&format!("{}/feed.xml", server.url()), "unused.mp3", false);
    let publisher = Arc::new(RecordingPublisher::default());

    let err = context(cfg, Some(Arc::new(FailingLlm)), None, Some(publisher.clone()))
        .run()
        .await
        .unwrap_err();

    assert!(err.to_string().contains("after 3 attempt(s)"));
    assert!(err.to_string().contains("500 Internal Server Error"));
    assert!(publisher.texts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn failed_run_posts_exactly_one_error_report() {
    let mut server = mockito::Server::new_async().await;
    let _feed = server
        .mock("GET", "/feed.xml")
        .with_status(200)
        .with_body(rss(&[("Rust 2.0 announced today", 1)]))
        .create_async()
        .await;

    let cfg = config(&format!("{}/feed.xml", server.url()), "unused.mp3", false);
    let publisher = Arc::new(RecordingPublisher::default());
    let before = Utc::now();

    let err = run_and_report(&context(cfg, Some(Arc::new(FailingLlm)), None, Some(publisher.clone())))
        .await
        .unwrap_err();

    let errors = publisher.errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].0, err.to_string());
    assert!(errors[0].0.contains("digest failed after 3 attempt(s)"));
    assert!(errors[0].1 >= before);
    assert!(publisher.texts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn successful_run_posts_no_error_report() {
    let mut server = mockito::Server::new_async().await;
    let _feed = server
        .mock("GET", "/feed.xml")
        .with_status(200)
        .with_body(rss(&[("Rust 2.0 announced today", 1)]))
        .create_async()
        .await;

    let cfg = config(&format!("{}/feed.xml", server.url()), "unused.mp3", false);
    let publisher = Arc::new(RecordingPublisher::default());

    run_and_report(&context(
        cfg,
        Some(Arc::new(ScriptedLlm::default())),
        None,
        Some(publisher.clone()),
    ))
    .await
    .expect("run succeeds");

    assert!(publisher.errors.lock().unwrap().is_empty());
    assert_eq!(publisher.texts.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn script_gets_its_own_retry_budget() {
    let mut server = mockito::Server::new_async().await;
    let _feed = server
        .mock("GET", "/feed.xml")
        .with_status(200)
        .with_body(rss(&[("Rust 2.0 announced today", 1)]))
        .create_async()
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let output = dir.path().join("episode.mp3");
    let cfg = config(
        &format!("{}/feed.xml", server.url()),
        &output.to_string_lossy(),
        true,
    );
    let llm = Arc::new(TwoFailuresPerStage::default());

    let summary = context(
        cfg,
        Some(llm.clone()),
        Some(Arc::new(VoiceTagTts::default())),
        None,
    )
    .run()
    .await
    .expect("both stages succeed on their third attempt");

    assert_eq!(llm.digest_calls.load(Ordering::SeqCst), 3);
    assert_eq!(llm.script_calls.load(Ordering::SeqCst), 3);
    assert_eq!(summary.podcast.map(|p| p.lines), Some(3));
}
