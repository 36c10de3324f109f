use crate::clock::SessionClock;
use anyhow::{anyhow, Context, Result};
use log::{debug, info};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// What a recognizer reports back to the sync worker.
#[derive(Debug, Clone, PartialEq)]
pub enum RecognizerEvent {
    /// The full transcript of the current recognition session so far,
    /// interim words included.
    Transcript(String),
    Error(String),
    /// The recognition session ended on its own.
    End,
}

/// Adapter over an external speech-to-text service.
///
/// An `Error` or `End` event finishes the current session; the caller then
/// calls `stop` and, after a backoff, `start` again. Implementations should
/// begin a fresh recognition session on each `start`.
pub trait SpeechRecognizer: Send {
    fn start(&mut self, lang: &str, events: Sender<RecognizerEvent>) -> Result<()>;
    fn stop(&mut self);
}

/// One timed line of a transcript replay.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptCue {
    pub at_ms: f64,
    pub event: RecognizerEvent,
}

/// Parse a timed transcript.
///
/// One cue per line: `<ms> <text>`. Blank lines and lines starting with `#`
/// are skipped. `<ms> !end` ends the recognition session and
/// `<ms> !error <message>` reports a fault, which also ends the session.
pub fn parse_transcript_cues(source: &str) -> Result<Vec<TranscriptCue>> {
    let mut cues = Vec::new();
    for (lineno, line) in source.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (time, rest) = line
            .split_once(char::is_whitespace)
            .unwrap_or((line, ""));
        let at_ms: f64 = time
            .parse()
            .with_context(|| format!("line {}: invalid timestamp '{}'", lineno + 1, time))?;
        if !at_ms.is_finite() || at_ms < 0.0 {
            return Err(anyhow!("line {}: timestamp must be >= 0", lineno + 1));
        }

        let rest = rest.trim();
        let event = if rest == "!end" {
            RecognizerEvent::End
        } else if let Some(message) = rest.strip_prefix("!error") {
            RecognizerEvent::Error(message.trim().to_string())
        } else {
            RecognizerEvent::Transcript(rest.to_string())
        };
        cues.push(TranscriptCue { at_ms, event });
    }
    cues.sort_by(|a, b| a.at_ms.total_cmp(&b.at_ms));
    Ok(cues)
}

/// Replays timed transcript cues against the session clock.
///
/// Used for offline runs and tests. A restart after `End` or `Error` resumes
/// with the first cue that has not been delivered yet.
pub struct ScriptedRecognizer {
    cues: Arc<Vec<TranscriptCue>>,
    next_cue: Arc<AtomicUsize>,
    clock: SessionClock,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    fail_starts: u32,
}

impl ScriptedRecognizer {
    pub fn new(cues: Vec<TranscriptCue>, clock: SessionClock) -> Self {
        Self {
            cues: Arc::new(cues),
            next_cue: Arc::new(AtomicUsize::new(0)),
            clock,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
            fail_starts: 0,
        }
    }

    /// Make the next `count` calls to `start` fail, as an unavailable
    /// service would.
    pub fn failing_first_starts(mut self, count: u32) -> Self {
        self.fail_starts = count;
        self
    }

    fn join_worker(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl SpeechRecognizer for ScriptedRecognizer {
    fn start(&mut self, lang: &str, events: Sender<RecognizerEvent>) -> Result<()> {
        if self.fail_starts > 0 {
            self.fail_starts -= 1;
            return Err(anyhow!("recognition service unavailable"));
        }
        self.join_worker();

        let cues = self.cues.clone();
        let next_cue = self.next_cue.clone();
        info!(
            "Scripted recognizer started ({}), {} cue(s) pending",
            lang,
            cues.len().saturating_sub(next_cue.load(Ordering::SeqCst))
        );

        let running = Arc::new(AtomicBool::new(true));
        self.running = running.clone();
        let clock = self.clock;

        self.worker = Some(thread::spawn(move || {
            while let Some(cue) = cues.get(next_cue.load(Ordering::SeqCst)) {
                // sleep in short slices so stop() is honoured promptly
                while running.load(Ordering::SeqCst) && clock.now_ms() < cue.at_ms {
                    let remaining = (cue.at_ms - clock.now_ms()).clamp(0.0, 20.0);
                    thread::sleep(Duration::from_millis(remaining as u64 + 1));
                }
                if !running.load(Ordering::SeqCst) {
                    return;
                }
                next_cue.fetch_add(1, Ordering::SeqCst);
                let is_end = matches!(
                    cue.event,
                    RecognizerEvent::End | RecognizerEvent::Error(_)
                );
                if events.send(cue.event.clone()).is_err() || is_end {
                    return;
                }
            }
            debug!("Scripted recognizer ran out of cues");
        }));
        Ok(())
    }

    fn stop(&mut self) {
        self.join_worker();
    }
}

impl Drop for ScriptedRecognizer {
    fn drop(&mut self) {
        self.join_worker();
    }
}
