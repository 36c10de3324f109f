//! Alignment of a recognized transcript against the script's token stream.

use super::MatchState;
use crate::text::tokenize;
use log::{debug, trace};
use std::collections::VecDeque;
use std::sync::Arc;
use strsim::sorensen_dice;

/// Number of most recent transcript tokens kept for matching.
pub const TAIL_TOKENS: usize = 60;

/// Longest and shortest n-gram tried, longest first.
pub const MAX_NGRAM: usize = 6;
pub const MIN_NGRAM: usize = 2;

/// Bigram Dice similarity needed for a fuzzy match.
pub const DEFAULT_FUZZY_THRESHOLD: f64 = 0.6;

/// Search radius, in tokens, around the last accepted position.
pub const DEFAULT_WINDOW_RADIUS: usize = 400;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Exact,
    Fuzzy,
}

/// One successful alignment. `index` is the script token aligned with the
/// last spoken token.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenMatch {
    pub index: usize,
    pub len: usize,
    pub kind: MatchKind,
    pub score: f64,
}

/// First position in `[start, end)` where `seq` occurs exactly; returns the
/// index of the last token of the occurrence.
pub fn find_sequence(tokens: &[String], seq: &[String], start: usize, end: usize) -> Option<usize> {
    let (lo, hi) = candidate_range(tokens.len(), seq.len(), start, end)?;
    (lo..=hi)
        .find(|&i| tokens[i..i + seq.len()] == *seq)
        .map(|i| i + seq.len() - 1)
}

/// Best bigram-Dice alignment of `seq` in `[start, end)` scoring at least
/// `threshold`. Equal scores keep the earliest position.
pub fn find_fuzzy_sequence(
    tokens: &[String],
    seq: &[String],
    start: usize,
    end: usize,
    threshold: f64,
) -> Option<(usize, f64)> {
    let (lo, hi) = candidate_range(tokens.len(), seq.len(), start, end)?;
    let spoken = seq.join(" ");
    let mut best: Option<(usize, f64)> = None;

    for i in lo..=hi {
        let candidate = tokens[i..i + seq.len()].join(" ");
        let score = sorensen_dice(&spoken, &candidate);
        if score >= threshold && best.map_or(true, |(_, s)| score > s) {
            best = Some((i + seq.len() - 1, score));
        }
    }
    best
}

fn candidate_range(n: usize, m: usize, start: usize, end: usize) -> Option<(usize, usize)> {
    if m == 0 || m > n {
        return None;
    }
    let hi = (n - m).min(end.checked_sub(m)?);
    (start <= hi).then_some((start, hi))
}

/// Incremental matcher fed with the recognizer's current transcript.
pub struct MatchFinder {
    script: Arc<Vec<String>>,
    tail: VecDeque<String>,
    transcript_tail: String,
    /// Center of the search window; `None` until initial lock
    position: Option<usize>,
    last_counted: Option<usize>,
    match_count: u64,
    last_match_at_ms: Option<f64>,
    window_radius: usize,
    fuzzy_threshold: f64,
}

impl MatchFinder {
    pub fn new(script: Arc<Vec<String>>) -> Self {
        Self {
            script,
            tail: VecDeque::with_capacity(TAIL_TOKENS),
            transcript_tail: String::new(),
            position: None,
            last_counted: None,
            match_count: 0,
            last_match_at_ms: None,
            window_radius: DEFAULT_WINDOW_RADIUS,
            fuzzy_threshold: DEFAULT_FUZZY_THRESHOLD,
        }
    }

    pub fn with_fuzzy_threshold(mut self, threshold: f64) -> Self {
        self.fuzzy_threshold = threshold;
        self
    }

    pub fn set_window_radius(&mut self, radius: usize) {
        self.window_radius = radius;
    }

    pub fn window_radius(&self) -> usize {
        self.window_radius
    }

    pub fn position(&self) -> Option<usize> {
        self.position
    }

    pub fn match_count(&self) -> u64 {
        self.match_count
    }

    /// Feed the recognizer's current transcript for this session.
    ///
    /// Returns the new position when any n-gram of the transcript tail could
    /// be aligned inside the search window.
    pub fn on_transcript(&mut self, transcript: &str, now_ms: f64) -> Option<TokenMatch> {
        let tokens = tokenize(transcript);
        let keep_from = tokens.len().saturating_sub(TAIL_TOKENS);
        self.tail.clear();
        self.tail.extend(tokens.into_iter().skip(keep_from));
        self.transcript_tail = self.tail.iter().cloned().collect::<Vec<_>>().join(" ");

        let found = self.search()?;
        self.position = Some(found.index);

        if self.last_counted.map_or(true, |counted| found.index > counted) {
            self.last_counted = Some(found.index);
            self.match_count += 1;
            self.last_match_at_ms = Some(now_ms);
        }

        debug!(
            "Matched {:?} {}-gram at token {} (score {:.2})",
            found.kind, found.len, found.index, found.score
        );
        Some(found)
    }

    fn search(&self) -> Option<TokenMatch> {
        let (start, end) = match self.position {
            Some(pos) => (
                pos.saturating_sub(self.window_radius),
                pos.saturating_add(self.window_radius),
            ),
            // no lock yet: acquire anywhere in the script
            None => (0, self.script.len()),
        };

        let tail: Vec<String> = self.tail.iter().cloned().collect();
        let longest = MAX_NGRAM.min(tail.len());
        if longest < MIN_NGRAM {
            return None;
        }

        for n in (MIN_NGRAM..=longest).rev() {
            let seq = &tail[tail.len() - n..];
            if let Some(index) = find_sequence(&self.script, seq, start, end) {
                return Some(TokenMatch {
                    index,
                    len: n,
                    kind: MatchKind::Exact,
                    score: 1.0,
                });
            }
            if let Some((index, score)) =
                find_fuzzy_sequence(&self.script, seq, start, end, self.fuzzy_threshold)
            {
                return Some(TokenMatch {
                    index,
                    len: n,
                    kind: MatchKind::Fuzzy,
                    score,
                });
            }
        }

        trace!("No alignment for tail '{}'", self.transcript_tail);
        None
    }

    /// Forget lock, tail and counters.
    pub fn reset(&mut self) {
        self.tail.clear();
        self.transcript_tail.clear();
        self.position = None;
        self.last_counted = None;
        self.match_count = 0;
        self.last_match_at_ms = None;
    }

    /// Copy the matcher's view into a published snapshot.
    pub fn fill_state(&self, state: &mut MatchState) {
        state.matched_token_index = self.position;
        state.last_match_at_ms = self.last_match_at_ms;
        state.transcript_tail = self.transcript_tail.clone();
        state.match_count = self.match_count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finder(script: &str) -> MatchFinder {
        MatchFinder::new(Arc::new(tokenize(script)))
    }

    const HARVEST: &str = "Friends and neighbors, we gather here today to celebrate the harvest \
                           and give thanks for the rain that fell on our fields this spring.";

    #[test]
    fn test_exact_match_returns_last_token_index() {
        let mut f = finder(HARVEST);
        let m = f.on_transcript("we gather here today", 100.0).unwrap();
        assert_eq!(m.kind, MatchKind::Exact);
        assert_eq!(m.len, 4);
        assert_eq!(m.index, 6);
        assert_eq!(f.position(), Some(6));
        assert_eq!(f.match_count(), 1);
    }

    #[test]
    fn test_fuzzy_match_with_one_substitution() {
        let mut f = finder(HARVEST);
        // "tha" for "the"
        let m = f.on_transcript("to celebrate tha harvest", 100.0).unwrap();
        assert_eq!(m.kind, MatchKind::Fuzzy);
        assert_eq!(m.len, 4);
        assert!(m.score >= DEFAULT_FUZZY_THRESHOLD);
        let tokens = tokenize(HARVEST);
        assert_eq!(tokens[m.index], "harvest");
    }

    #[test]
    fn test_single_token_never_matches() {
        let mut f = finder(HARVEST);
        assert!(f.on_transcript("harvest", 0.0).is_none());
        assert_eq!(f.position(), None);
    }

    #[test]
    fn test_window_limits_search_after_lock() {
        let script = format!("{} {}", "alpha beta gamma delta ".repeat(200), "omega sigma tau");
        let mut f = finder(&script);
        f.set_window_radius(20);
        assert_eq!(f.on_transcript("alpha beta gamma", 0.0).unwrap().index, 2);
        // the phrase exists, but far outside the window
        assert!(f.on_transcript("omega sigma tau", 10.0).is_none());
        assert_eq!(f.position(), Some(2));
    }

    #[test]
    fn test_initial_lock_searches_whole_script() {
        let script = format!("{} {}", "filler words here ".repeat(300), "the final line");
        let mut f = finder(&script);
        f.set_window_radius(10);
        let m = f.on_transcript("the final line", 0.0).unwrap();
        assert_eq!(m.index, tokenize(&script).len() - 1);
    }

    #[test]
    fn test_only_forward_matches_are_counted() {
        let mut f = finder(HARVEST);
        f.on_transcript("the rain that fell", 1000.0).unwrap();
        let mut state = MatchState::default();
        f.fill_state(&mut state);
        assert_eq!(state.match_count, 1);
        assert_eq!(state.last_match_at_ms, Some(1000.0));

        // moving back repositions but does not count
        f.on_transcript("celebrate the harvest", 2000.0).unwrap();
        f.fill_state(&mut state);
        assert_eq!(state.match_count, 1);
        assert_eq!(state.last_match_at_ms, Some(1000.0));
        assert_eq!(state.matched_token_index, Some(10));
    }

    #[test]
    fn test_tail_is_bounded() {
        let mut f = finder(HARVEST);
        let long = "noise ".repeat(200);
        f.on_transcript(&long, 0.0);
        assert_eq!(f.tail.len(), TAIL_TOKENS);
    }

    #[test]
    fn test_reset_drops_lock() {
        let mut f = finder(HARVEST);
        f.on_transcript("we gather here", 0.0).unwrap();
        f.reset();
        assert_eq!(f.position(), None);
        assert_eq!(f.match_count(), 0);
    }
}
