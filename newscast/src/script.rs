use chrono::NaiveDate;
use tracing::debug;

use common::PodcastConfig;

use crate::digest::{Digest, Profile};
use crate::llm::{generate_with_retry, GenerationError, LlmProvider, LlmRequest, RetryPolicy};

pub const SCRIPT_TEMPERATURE: f32 = 0.6;
pub const SCRIPT_MAX_TOKENS: usize = 2048;
/// Roughly five minutes of speech.
pub const SCRIPT_TARGET_WORDS: usize = 750;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    /// Host: presents the news
    Primary,
    /// Guest: asks follow-ups and adds context
    Secondary,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogueLine {
    pub speaker: Speaker,
    pub text: String,
}

/// Ordered two-speaker dialogue ready for synthesis.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Script {
    lines: Vec<DialogueLine>,
}

impl Script {
    pub fn new(lines: Vec<DialogueLine>) -> Self {
        Self { lines }
    }

    pub fn lines(&self) -> &[DialogueLine] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn word_count(&self) -> usize {
        self.lines.iter().map(|l| l.text.split_whitespace().count()).sum()
    }
}

/// Literal line prefixes that mark who is speaking, e.g. `ALEX:` and `SARA:`.
#[derive(Debug, Clone)]
pub struct SpeakerTags {
    primary: String,
    secondary: String,
}

impl SpeakerTags {
    /// Tags are the upper-cased speaker names followed by a colon.
    pub fn new(primary_name: &str, secondary_name: &str) -> Self {
        Self {
            primary: format!("{}:", primary_name.trim().to_uppercase()),
            secondary: format!("{}:", secondary_name.trim().to_uppercase()),
        }
    }

    pub fn from_config(podcast: &PodcastConfig) -> Self {
        Self::new(&podcast.host_name, &podcast.guest_name)
    }

    pub fn tag(&self, speaker: Speaker) -> &str {
        match speaker {
            Speaker::Primary => &self.primary,
            Speaker::Secondary => &self.secondary,
        }
    }

    /// Match a trimmed line against the tags, returning the speaker and the text after the tag.
    pub fn classify<'a>(&self, line: &'a str) -> Option<(Speaker, &'a str)> {
        if let Some(rest) = line.strip_prefix(self.primary.as_str()) {
            Some((Speaker::Primary, rest.trim()))
        } else if let Some(rest) = line.strip_prefix(self.secondary.as_str()) {
            Some((Speaker::Secondary, rest.trim()))
        } else {
            None
        }
    }
}

/// Parse raw model output into dialogue lines.
///
/// Blank lines, lines without a recognized tag, and tags with no text are dropped.
pub fn parse_script(raw: &str, tags: &SpeakerTags) -> Script {
    let mut lines = Vec::new();
    let mut dropped = 0usize;

    for line in raw.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match tags.classify(line) {
            Some((speaker, text)) if !text.is_empty() => lines.push(DialogueLine {
                speaker,
                text: text.to_string(),
            }),
            _ => dropped += 1,
        }
    }

    if dropped > 0 {
        debug!(dropped, kept = lines.len(), "ignored script lines without a speaker tag");
    }
    Script::new(lines)
}

pub fn build_script_prompt(
    digest: &Digest,
    profile: &Profile,
    podcast: &PodcastConfig,
    tags: &SpeakerTags,
    today: NaiveDate,
) -> String {
    let host = tags.tag(Speaker::Primary);
    let guest = tags.tag(Speaker::Secondary);

    format!(
        r#"You write the script for a daily tech news podcast in {language}. Today is {today}.

Here is today's news digest:

{digest}

---
TASK:
Write a natural conversation script for two hosts:
- {host} {host_name} is the main host and explains the news clearly and in order
- {guest} {guest_name} is the co-host, asks smart follow-up questions and adds context

RULES:
- Every line starts with exactly "{host}" or "{guest}" (no other format)
- Natural spoken language, no bullet points or Markdown
- Short, easy sentences (podcast style, not lecture style)
- Cover every article from the digest
- Intro: {host_name} greets the listeners, {guest_name} opens the first topic
- Outro: a short joint conclusion and goodbye
- Target: about 5 minutes of speech (about {words} words in total)

Start directly with the script, no preamble."#,
        language = profile.language,
        today = today.format("%Y-%m-%d"),
        digest = digest,
        host_name = podcast.host_name,
        guest_name = podcast.guest_name,
        words = SCRIPT_TARGET_WORDS,
    )
}

/// Turn the digest into a two-speaker script, retrying per `policy`.
pub async fn compose(
    provider: &dyn LlmProvider,
    digest: &Digest,
    profile: &Profile,
    podcast: &PodcastConfig,
    policy: &RetryPolicy,
    today: NaiveDate,
) -> Result<Script, GenerationError> {
    let tags = SpeakerTags::from_config(podcast);
    let request = LlmRequest {
        prompt: build_script_prompt(digest, profile, podcast, &tags, today),
        max_tokens: Some(SCRIPT_MAX_TOKENS),
        temperature: Some(SCRIPT_TEMPERATURE),
        timeout_seconds: None,
    };

    let raw = generate_with_retry(provider, &request, policy, "podcast script").await?;
    Ok(parse_script(&raw, &tags))
}
