//! Speech side of the engine: aligning what the speaker says with the script.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                        SpeechSync (worker thread)             │
//! │                                                               │
//! │  ┌──────────────────┐  events  ┌──────────────┐              │
//! │  │ SpeechRecognizer │─────────▶│ MatchFinder  │              │
//! │  │ (external ASR)   │          │ exact/fuzzy  │              │
//! │  └──────────────────┘          └──────┬───────┘              │
//! │         ▲  restart after End          │                      │
//! │         └───────── 400ms backoff      ▼                      │
//! │                              Arc<Mutex<MatchState>>          │
//! └───────────────────────────────────────┬───────────────────────┘
//!                                         │ polled once per frame
//!                                         ▼
//!                                   engine::tick
//! ```

mod matcher;
mod recognizer;
mod sync;

pub use matcher::{
    find_fuzzy_sequence, find_sequence, MatchFinder, MatchKind, TokenMatch,
    DEFAULT_FUZZY_THRESHOLD, DEFAULT_WINDOW_RADIUS, TAIL_TOKENS,
};
pub use recognizer::{
    parse_transcript_cues, RecognizerEvent, ScriptedRecognizer, SpeechRecognizer, TranscriptCue,
};
pub use sync::{dynamic_window_radius, SpeechSync, RESTART_BACKOFF_MS};

use serde::Serialize;

/// Snapshot of the speech side, copied by the session once per frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MatchState {
    /// Script token aligned with the most recent speech, if any
    pub matched_token_index: Option<usize>,
    /// Session-clock time of the last forward match
    pub last_match_at_ms: Option<f64>,
    pub transcript_tail: String,
    pub match_count: u64,
    pub restart_count: u32,
    pub last_error: Option<String>,
    pub listening: bool,
}
