//! Text normalization feeding the similarity oracles.
//!
//! Titles and contents share one tokenizer: NFC-normalize, lowercase, strip
//! punctuation and digits, split on unicode word boundaries, then drop
//! stopwords and single-character tokens (short tokens on an allowlist
//! survive). The engine consumes this as an opaque `text -> token string`
//! capability; empty or non-textual input normalizes to the empty string.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;
use unicode_segmentation::UnicodeSegmentation;

static PUNCTUATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").unwrap());
static DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());

static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "about", "after", "again", "all", "also", "an", "and", "any", "are", "as", "at",
        "back", "be", "because", "been", "before", "but", "by", "can", "could", "did", "do",
        "does", "down", "for", "from", "had", "has", "have", "he", "her", "here", "him", "his",
        "how", "if", "in", "into", "is", "it", "its", "just", "like", "may", "more", "most",
        "new", "no", "not", "now", "of", "off", "on", "one", "only", "or", "other", "our",
        "out", "over", "said", "says", "she", "so", "some", "such", "than", "that", "the",
        "their", "them", "then", "there", "these", "they", "this", "those", "through", "to",
        "under", "up", "was", "we", "were", "what", "when", "where", "which", "while", "who",
        "why", "will", "with", "would", "you",
    ]
    .into_iter()
    .collect()
});

// Short tokens that carry signal in news copy despite the length filter.
static KEEP_SHORT: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["ai", "eu", "un", "us", "uk"].into_iter().collect()
});

fn tokenize(text: &str) -> Vec<String> {
    let text: String = text.nfc().collect::<String>().to_lowercase();
    let text = PUNCTUATION.replace_all(&text, " ");
    let text = DIGITS.replace_all(&text, "");

    text.unicode_words()
        .filter(|t| t.chars().count() > 1 || KEEP_SHORT.contains(t))
        .filter(|t| !STOPWORDS.contains(t))
        .map(str::to_string)
        .collect()
}

/// Normalizes an article title into a token string for similarity scoring.
pub fn normalize_title(title: &str) -> String {
    tokenize(title).join(" ")
}

/// Normalizes article body text into a token string for similarity scoring.
pub fn normalize_content(content: &str) -> String {
    tokenize(content).join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_punctuation_and_digits() {
        assert_eq!(
            normalize_title("Markets rally 3.2%, traders cheer!"),
            "markets rally traders cheer"
        );
    }

    #[test]
    fn drops_stopwords_and_short_tokens() {
        assert_eq!(
            normalize_title("The EU and a B side of it"),
            "eu side"
        );
    }

    #[test]
    fn empty_input_normalizes_to_empty() {
        assert_eq!(normalize_title(""), "");
        assert_eq!(normalize_content("  12 34 !!  "), "");
    }

    #[test]
    fn content_and_title_share_tokenizer() {
        let text = "President announces new trade deal";
        assert_eq!(normalize_title(text), normalize_content(text));
    }
}
