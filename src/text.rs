//! Script tokenization and the mapping between "word space" and "token space".
//!
//! The rendering surface splits the script on whitespace (words), while the
//! matcher compares normalized tokens. The two disagree whenever a word
//! normalizes to nothing (a lone dash, an ellipsis), so every index that
//! crosses between them goes through [`ScriptMap`].

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Normalize a single whitespace-delimited chunk into a matching token.
///
/// Lower-cases, decomposes (NFD), strips combining marks and drops every
/// character that is not a letter or a digit. May return an empty string.
pub fn normalize_token(s: &str) -> String {
    s.to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .filter(|c| c.is_alphanumeric())
        .collect()
}

/// Split text on whitespace and normalize, dropping empty tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(normalize_token)
        .filter(|t| !t.is_empty())
        .collect()
}

/// Whitespace-delimited words in rendering order.
pub fn split_words(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_string).collect()
}

/// Derived, immutable view of a script for one session.
#[derive(Debug, Clone, Default)]
pub struct ScriptMap {
    words: Vec<String>,
    tokens: Vec<String>,
    /// For word `i`, the number of tokens contributed by words `0..=i`.
    token_cumulative_per_word: Vec<usize>,
}

impl ScriptMap {
    pub fn new(text: &str) -> Self {
        let words = split_words(text);
        let mut tokens = Vec::with_capacity(words.len());
        let mut token_cumulative_per_word = Vec::with_capacity(words.len());

        for word in &words {
            let token = normalize_token(word);
            if !token.is_empty() {
                tokens.push(token);
            }
            token_cumulative_per_word.push(tokens.len());
        }

        Self {
            words,
            tokens,
            token_cumulative_per_word,
        }
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn token_cumulative_per_word(&self) -> &[usize] {
        &self.token_cumulative_per_word
    }

    pub fn total_words(&self) -> usize {
        self.words.len()
    }

    pub fn total_tokens(&self) -> usize {
        self.tokens.len()
    }

    /// Words per token. 1.0 for an empty script.
    pub fn token_to_word_ratio(&self) -> f64 {
        if self.words.is_empty() {
            return 1.0;
        }
        self.words.len() as f64 / self.tokens.len().max(1) as f64
    }

    /// Index of the word that contains token `token_index`.
    ///
    /// This is the first word whose cumulative token count covers
    /// `token_index + 1`. `None` when the token lies past the end.
    pub fn word_index_for_token(&self, token_index: usize) -> Option<usize> {
        let wanted = token_index + 1;
        // cumulative counts are monotonic, so partition_point finds the first >= wanted
        let idx = self
            .token_cumulative_per_word
            .partition_point(|&count| count < wanted);
        (idx < self.token_cumulative_per_word.len()).then_some(idx)
    }

    /// Number of words read once token `token_index` has been recognized
    /// (a 1-based word count, saturating at the script length).
    pub fn recognized_words(&self, token_index: usize) -> usize {
        match self.word_index_for_token(token_index) {
            Some(idx) => idx + 1,
            None => self.words.len(),
        }
    }
}
