use std::collections::HashSet;
use tracing::info;

use crate::ingestion::Article;

/// Titles sharing more than this fraction of their words are considered the same story.
pub const SIMILARITY_THRESHOLD: f64 = 0.6;

/// Lowercased, whitespace-separated words of a title.
pub fn title_words(title: &str) -> HashSet<String> {
    title.split_whitespace().map(|w| w.to_lowercase()).collect()
}

/// Intersection over union; an empty union counts as 1 so two empty sets score 0.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let intersection = a.intersection(b).count();
    let union = a.union(b).count().max(1);
    intersection as f64 / union as f64
}

/// Remove articles whose title is too similar to an earlier kept article.
///
/// Order is preserved and the first article of each group of near-duplicates wins.
pub fn deduplicate(articles: Vec<Article>) -> Vec<Article> {
    let total = articles.len();
    let mut seen: Vec<HashSet<String>> = Vec::new();
    let mut unique = Vec::with_capacity(total);

    for article in articles {
        let words = title_words(&article.title);
        let is_duplicate = seen
            .iter()
            .any(|prior| jaccard(&words, prior) > SIMILARITY_THRESHOLD);
        if !is_duplicate {
            seen.push(words);
            unique.push(article);
        }
    }

    let removed = total - unique.len();
    if removed > 0 {
        info!("{} duplicates removed", removed);
    }
    unique
}
