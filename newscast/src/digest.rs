use chrono::NaiveDate;
use std::fmt;

use common::Config;

use crate::ingestion::Article;
use crate::llm::{generate_with_retry, GenerationError, LlmProvider, LlmRequest, RetryPolicy};

/// Low temperature keeps summaries close to the source text.
pub const DIGEST_TEMPERATURE: f32 = 0.3;
pub const DIGEST_MAX_TOKENS: usize = 2048;

/// What the reader cares about, read once from config.
#[derive(Debug, Clone)]
pub struct Profile {
    pub interests: String,
    pub max_articles: usize,
    pub language: String,
}

impl Profile {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interests: config.profile.clone(),
            max_articles: config.max_articles,
            language: config.language.clone(),
        }
    }
}

/// Curated, chat-formatted summary of the day's articles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Digest(String);

impl Digest {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn char_count(&self) -> usize {
        self.0.chars().count()
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn build_digest_prompt(articles: &[Article], profile: &Profile, today: NaiveDate) -> String {
    let articles_text = articles
        .iter()
        .map(|a| format!("[{}] {}\n{}\nURL: {}", a.source, a.title, a.summary, a.link))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        r#"You are my personal news curator. Today is {today}.

My interest profile: {interests}

Here are today's articles from various sources:

{articles_text}

---
TASK:
1. Select the {count} articles most relevant to my profile
2. Summarize each selected article in 2-3 sentences in {language}
3. Explain in one sentence why the article is relevant to me
4. Include the original link

FORMAT:
Write a clear daily digest for a Discord channel.
Use **bold** for article titles.
Wrap links in < > so Discord does not generate a preview.
Use --- as a separator between articles.
Start with a short greeting and today's date.
End with a brief conclusion naming the most important trend of the day."#,
        today = today.format("%Y-%m-%d"),
        interests = profile.interests,
        count = profile.max_articles,
        language = profile.language,
    )
}

/// Ask the model for the digest, retrying per `policy`.
pub async fn curate(
    provider: &dyn LlmProvider,
    articles: &[Article],
    profile: &Profile,
    policy: &RetryPolicy,
    today: NaiveDate,
) -> Result<Digest, GenerationError> {
    let request = LlmRequest {
        prompt: build_digest_prompt(articles, profile, today),
        max_tokens: Some(DIGEST_MAX_TOKENS),
        temperature: Some(DIGEST_TEMPERATURE),
        timeout_seconds: None,
    };

    let content = generate_with_retry(provider, &request, policy, "digest").await?;
    Ok(Digest::new(content.trim()))
}
