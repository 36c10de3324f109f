//! Background owner of the recognizer.
//!
//! The worker thread starts the recognizer, feeds every transcript update to
//! a [`MatchFinder`] and publishes a [`MatchState`] snapshot. Errors are
//! recorded, never returned; a recognition session that ends on its own is
//! restarted after a short backoff for as long as the sync is running.

use super::matcher::{MatchFinder, DEFAULT_WINDOW_RADIUS};
use super::recognizer::{RecognizerEvent, SpeechRecognizer};
use super::MatchState;
use crate::clock::SessionClock;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Delay before restarting a recognition session that ended.
pub const RESTART_BACKOFF_MS: f64 = 400.0;

const MIN_WINDOW_RADIUS: usize = 150;
const MAX_WINDOW_RADIUS: usize = 4000;
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Matcher search radius for the current layout, in tokens.
pub fn dynamic_window_radius(
    viewport_words: f64,
    window_screens: u32,
    token_to_word_ratio: f64,
) -> usize {
    if !(viewport_words > 0.0) || !(token_to_word_ratio > 0.0) || !token_to_word_ratio.is_finite()
    {
        return DEFAULT_WINDOW_RADIUS;
    }
    let radius = (viewport_words * window_screens as f64 / token_to_word_ratio).round();
    (radius as usize).clamp(MIN_WINDOW_RADIUS, MAX_WINDOW_RADIUS)
}

pub struct SpeechSync {
    state: Arc<Mutex<MatchState>>,
    window_radius: Arc<AtomicUsize>,
    reset_requested: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<Box<dyn SpeechRecognizer>>>,
}

impl SpeechSync {
    /// Spawn the worker and start recognizing in `lang`.
    pub fn start(
        script_tokens: Arc<Vec<String>>,
        recognizer: Box<dyn SpeechRecognizer>,
        lang: &str,
        clock: SessionClock,
        window_radius: usize,
    ) -> Self {
        let state = Arc::new(Mutex::new(MatchState::default()));
        let radius = Arc::new(AtomicUsize::new(window_radius));
        let reset_requested = Arc::new(AtomicBool::new(false));
        let running = Arc::new(AtomicBool::new(true));

        let worker = Worker {
            finder: MatchFinder::new(script_tokens),
            recognizer,
            lang: lang.to_string(),
            clock,
            state: state.clone(),
            window_radius: radius.clone(),
            reset_requested: reset_requested.clone(),
            running: running.clone(),
            published: MatchState::default(),
        };
        let handle = thread::spawn(move || worker.run());
        info!("Speech sync started ({})", lang);

        Self {
            state,
            window_radius: radius,
            reset_requested,
            running,
            worker: Some(handle),
        }
    }

    pub fn snapshot(&self) -> MatchState {
        self.state
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn set_window_radius(&self, radius: usize) {
        self.window_radius.store(radius, Ordering::Relaxed);
    }

    /// Drop the current lock; the next match searches the whole script.
    pub fn reset(&self) {
        self.reset_requested.store(true, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Stop recognizing and join the worker. Hands the recognizer back so
    /// it can be started again later.
    pub fn stop(&mut self) -> Option<Box<dyn SpeechRecognizer>> {
        self.running.store(false, Ordering::SeqCst);
        let worker = self.worker.take()?;
        match worker.join() {
            Ok(recognizer) => {
                info!("Speech sync stopped");
                Some(recognizer)
            }
            Err(_) => {
                warn!("Speech sync worker panicked");
                None
            }
        }
    }
}

impl Drop for SpeechSync {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

struct Worker {
    finder: MatchFinder,
    recognizer: Box<dyn SpeechRecognizer>,
    lang: String,
    clock: SessionClock,
    state: Arc<Mutex<MatchState>>,
    window_radius: Arc<AtomicUsize>,
    reset_requested: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    published: MatchState,
}

impl Worker {
    fn run(mut self) -> Box<dyn SpeechRecognizer> {
        let (tx, rx) = mpsc::channel::<RecognizerEvent>();
        let mut restart_at = self.begin_session(&tx);

        while self.running.load(Ordering::SeqCst) {
            if self.reset_requested.swap(false, Ordering::SeqCst) {
                debug!("Speech sync reset");
                self.finder.reset();
                self.finder.fill_state(&mut self.published);
                self.publish();
            }

            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(RecognizerEvent::Transcript(text)) => {
                    self.finder
                        .set_window_radius(self.window_radius.load(Ordering::Relaxed));
                    self.finder.on_transcript(&text, self.clock.now_ms());
                    self.finder.fill_state(&mut self.published);
                    self.publish();
                }
                Ok(RecognizerEvent::Error(message)) => {
                    warn!("Recognizer error: {}, restarting", message);
                    self.published.last_error = Some(message);
                    restart_at = Some(self.end_session());
                }
                Ok(RecognizerEvent::End) => {
                    debug!("Recognition session ended, restarting");
                    restart_at = Some(self.end_session());
                }
                Err(RecvTimeoutError::Timeout) => {}
                // we hold a sender ourselves, so this cannot happen
                Err(RecvTimeoutError::Disconnected) => break,
            }

            if let Some(at) = restart_at {
                if self.clock.now_ms() >= at && self.running.load(Ordering::SeqCst) {
                    self.published.restart_count += 1;
                    restart_at = self.begin_session(&tx);
                }
            }
        }

        self.recognizer.stop();
        self.published.listening = false;
        self.publish();
        self.recognizer
    }

    /// Stop the current session and return when to start the next one.
    fn end_session(&mut self) -> f64 {
        self.recognizer.stop();
        self.published.listening = false;
        self.publish();
        self.clock.now_ms() + RESTART_BACKOFF_MS
    }

    /// Start a recognition session; on failure returns when to retry.
    fn begin_session(&mut self, tx: &mpsc::Sender<RecognizerEvent>) -> Option<f64> {
        match self.recognizer.start(&self.lang, tx.clone()) {
            Ok(()) => {
                self.published.listening = true;
                self.publish();
                None
            }
            Err(e) => {
                warn!("Failed to start recognizer: {}", e);
                self.published.listening = false;
                self.published.last_error = Some(e.to_string());
                self.publish();
                Some(self.clock.now_ms() + RESTART_BACKOFF_MS)
            }
        }
    }

    fn publish(&self) {
        if let Ok(mut guard) = self.state.lock() {
            *guard = self.published.clone();
        }
    }
}
