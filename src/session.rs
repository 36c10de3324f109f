//! A teleprompter session: one script, one surface, the two progress sources
//! and the engine, plus the operator controls.

use crate::audio::{MicPermission, MicSpeechRate, RateHandle, RateState};
use crate::clock::SessionClock;
use crate::engine::{tick, EngineState, TargetMode, TickInputs, TickOutput};
use crate::engine_math::ANCHOR_RATIO;
use crate::geometry::{calibrate, Calibration, Geometry, WordLayout};
use crate::settings::{AppSettings, DriftSource};
use crate::speech::{dynamic_window_radius, MatchState, SpeechRecognizer, SpeechSync};
use crate::text::ScriptMap;
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;

/// Entries kept in the debug event log.
pub const EVENT_LOG_CAPACITY: usize = 30;
/// Minimum spacing between logged manual scroll bumps.
const MANUAL_BUMP_LOG_INTERVAL_MS: f64 = 150.0;
/// Longest frame gap fed to the engine, so a stalled host does not jump.
const MAX_FRAME_DT: f64 = 0.25;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DebugEvent {
    pub at_ms: f64,
    pub message: String,
}

/// Observational state for a debug overlay.
#[derive(Debug, Clone, Serialize)]
pub struct DebugSnapshot {
    pub mode: TargetMode,
    pub error_px: f64,
    pub drift_source: DriftSource,
    pub drift_wps: f64,
    pub asr_drift_wps: f64,
    pub words_read: f64,
    pub total_words: usize,
    pub px_per_word: f64,
    pub speech_index: Option<usize>,
    pub manual_pause_ms: f64,
    pub mic: MicPermission,
    pub rate: RateState,
    pub speech: MatchState,
    pub events: Vec<DebugEvent>,
}

pub struct Teleprompter {
    clock: SessionClock,
    settings: AppSettings,
    script: ScriptMap,
    tokens: Arc<Vec<String>>,
    geometry: Geometry,
    calibration: Option<Calibration>,
    engine: EngineState,

    rate: RateHandle,
    mic: Option<MicSpeechRate>,
    live_mic: bool,

    recognizer: Option<Box<dyn SpeechRecognizer>>,
    speech: Option<SpeechSync>,
    asr_enabled: bool,
    manual_mode: bool,

    last_tick_ms: Option<f64>,
    last_output: Option<TickOutput>,
    events: VecDeque<DebugEvent>,
    last_manual_bump_ms: Option<f64>,
}

impl Teleprompter {
    pub fn new(text: &str, mut settings: AppSettings, clock: SessionClock) -> Self {
        settings.normalize();
        let script = ScriptMap::new(text);
        let tokens = Arc::new(script.tokens().to_vec());
        info!(
            "Session ready: {} words, {} tokens",
            script.total_words(),
            script.total_tokens()
        );

        Self {
            clock,
            settings,
            script,
            tokens,
            geometry: Geometry::default(),
            calibration: None,
            engine: EngineState::new(),
            rate: RateHandle::default(),
            mic: None,
            live_mic: false,
            recognizer: None,
            speech: None,
            asr_enabled: false,
            manual_mode: false,
            last_tick_ms: None,
            last_output: None,
            events: VecDeque::with_capacity(EVENT_LOG_CAPACITY),
            last_manual_bump_ms: None,
        }
    }

    pub fn clock(&self) -> SessionClock {
        self.clock
    }

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    pub fn script(&self) -> &ScriptMap {
        &self.script
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn calibration(&self) -> Option<Calibration> {
        self.calibration
    }

    pub fn engine(&self) -> &EngineState {
        &self.engine
    }

    pub fn is_asr_enabled(&self) -> bool {
        self.asr_enabled
    }

    pub fn is_manual_mode(&self) -> bool {
        self.manual_mode
    }

    pub fn last_output(&self) -> Option<TickOutput> {
        self.last_output
    }

    /// Handle an external rate source (e.g. a recording) publishes into.
    pub fn rate_handle(&self) -> RateHandle {
        self.rate.clone()
    }

    fn now(&self) -> f64 {
        self.clock.now_ms()
    }

    fn push_event(&mut self, message: impl Into<String>) {
        let event = DebugEvent {
            at_ms: self.now(),
            message: message.into(),
        };
        debug!("event: {}", event.message);
        if self.events.len() == EVENT_LOG_CAPACITY {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    fn push_manual_bump(&mut self, message: String) {
        let now = self.now();
        let due = self
            .last_manual_bump_ms
            .map_or(true, |last| now - last > MANUAL_BUMP_LOG_INTERVAL_MS);
        if due {
            self.push_event(message);
            self.last_manual_bump_ms = Some(now);
        }
    }

    // ---- surface -----------------------------------------------------

    /// New surface measurement: viewport and content heights plus one
    /// rectangle per rendered word. Keeps the word on the anchor line.
    pub fn update_layout(&mut self, viewport_height: f64, content_height: f64, words: WordLayout) {
        if words.len() != self.script.total_words() {
            warn!(
                "Layout has {} words but the script has {}",
                words.len(),
                self.script.total_words()
            );
        }
        self.calibration = calibrate(
            viewport_height,
            content_height,
            self.script.total_words(),
            ANCHOR_RATIO,
        );
        let px_per_word = self
            .calibration
            .map(|c| c.px_per_word)
            .unwrap_or(self.geometry.px_per_word);

        self.geometry = Geometry {
            viewport_height,
            content_height,
            px_per_word,
            words,
        };
        self.engine
            .reanchor_from_scroll(&self.geometry, self.script.total_words());
        self.sync_window_radius();
    }

    fn window_radius(&self) -> usize {
        dynamic_window_radius(
            self.geometry.viewport_words(),
            self.settings.asr_window_screens.screens(),
            self.script.token_to_word_ratio(),
        )
    }

    fn sync_window_radius(&self) {
        if let Some(speech) = &self.speech {
            speech.set_window_radius(self.window_radius());
        }
    }

    // ---- script and settings ----------------------------------------

    /// Swap the script. Progress is re-anchored, not reset; the surface is
    /// expected to report a new layout for the new text.
    pub fn load_script(&mut self, text: &str) {
        self.script = ScriptMap::new(text);
        self.tokens = Arc::new(self.script.tokens().to_vec());
        self.engine.clear_speech();
        self.engine
            .reanchor_from_scroll(&self.geometry, self.script.total_words());
        info!("Script loaded: {} words", self.script.total_words());

        if self.speech.is_some() {
            self.stop_speech();
            self.start_speech();
        }
    }

    pub fn set_settings(&mut self, mut settings: AppSettings) {
        settings.normalize();
        let lang_changed = settings.lang != self.settings.lang;
        let rate_changed = settings.rate != self.settings.rate;
        self.settings = settings;

        if lang_changed && self.speech.is_some() {
            self.stop_speech();
            self.start_speech();
        }
        if rate_changed && self.mic.is_some() {
            self.stop_mic();
        }
        self.update_mic();
        self.sync_window_radius();
        self.engine
            .reanchor_from_scroll(&self.geometry, self.script.total_words());
    }

    // ---- sources -------------------------------------------------------

    /// Use the live microphone as rate source whenever the settings want it.
    pub fn use_live_mic(&mut self, enabled: bool) {
        self.live_mic = enabled;
        self.update_mic();
    }

    pub fn mic_permission(&self) -> MicPermission {
        self.mic
            .as_ref()
            .map(|m| m.permission())
            .unwrap_or(MicPermission::Idle)
    }

    fn update_mic(&mut self) {
        let wanted = self.live_mic && self.settings.wants_mic(self.asr_enabled);
        match (wanted, self.mic.is_some()) {
            (true, false) => {
                let mut mic = MicSpeechRate::new(self.settings.rate);
                self.rate = mic.rate_handle();
                if mic.start() == MicPermission::Denied {
                    self.push_event("mic denied");
                }
                self.mic = Some(mic);
            }
            (false, true) => self.stop_mic(),
            _ => {}
        }
    }

    fn stop_mic(&mut self) {
        if let Some(mut mic) = self.mic.take() {
            mic.stop();
        }
    }

    /// Hand over the recognizer used whenever ASR is enabled.
    pub fn attach_recognizer(&mut self, recognizer: Box<dyn SpeechRecognizer>) {
        let restart = self.speech.is_some();
        self.stop_speech();
        self.recognizer = Some(recognizer);
        if restart {
            self.start_speech();
        }
    }

    pub fn set_asr_enabled(&mut self, enabled: bool) {
        if enabled == self.asr_enabled {
            return;
        }
        self.asr_enabled = enabled;
        if enabled {
            self.start_speech();
        } else {
            self.stop_speech();
        }
        self.update_mic();
        self.push_event(if enabled { "asr on" } else { "asr off" });
    }

    fn start_speech(&mut self) {
        if self.speech.is_some() {
            return;
        }
        let Some(recognizer) = self.recognizer.take() else {
            warn!("ASR enabled without a recognizer; progress stays rate-driven");
            return;
        };
        self.speech = Some(SpeechSync::start(
            self.tokens.clone(),
            recognizer,
            &self.settings.lang,
            self.clock,
            self.window_radius(),
        ));
    }

    fn stop_speech(&mut self) {
        if let Some(mut speech) = self.speech.take() {
            if let Some(recognizer) = speech.stop() {
                self.recognizer = Some(recognizer);
            }
        }
    }

    pub fn speech_state(&self) -> MatchState {
        self.speech
            .as_ref()
            .map(|s| s.snapshot())
            .unwrap_or_default()
    }

    // ---- operator controls -------------------------------------------

    pub fn reset(&mut self) {
        let now = self.now();
        self.engine.reset(now);
        if let Some(speech) = &self.speech {
            speech.reset();
        }
        self.push_event("reset");
    }

    pub fn nudge(&mut self, sign: i32) {
        let now = self.now();
        let moved = self.engine.nudge(
            sign,
            now,
            &self.geometry,
            self.script.total_words(),
            self.settings.manual_pause_ms,
        );
        self.push_event(format!("manual nudge {:+.1}", moved));
    }

    pub fn set_manual_mode(&mut self, enabled: bool) {
        if enabled == self.manual_mode {
            return;
        }
        self.manual_mode = enabled;
        self.push_event(if enabled {
            "manual mode on"
        } else {
            "manual mode off"
        });
    }

    /// Wheel or drag on the surface.
    pub fn on_manual_scroll(&mut self, dy: f64) {
        let now = self.now();
        if self
            .engine
            .manual_scroll(dy, now, &self.geometry, self.settings.manual_pause_ms)
        {
            self.push_manual_bump(format!("manual wheel dy={:.1}", dy));
        }
    }

    pub fn on_manual_touch(&mut self) {
        let now = self.now();
        self.engine.manual_touch(now, self.settings.manual_pause_ms);
        self.push_manual_bump("manual touch".to_string());
    }

    // ---- frame -------------------------------------------------------

    /// Advance one display frame at session time `now_ms`.
    pub fn tick(&mut self, now_ms: f64) -> TickOutput {
        let dt = match self.last_tick_ms {
            Some(last) => ((now_ms - last) / 1000.0).clamp(0.0, MAX_FRAME_DT),
            None => 0.0,
        };
        self.last_tick_ms = Some(now_ms);

        let rate = if self.live_mic && self.mic.is_none() {
            RateState::default()
        } else {
            self.rate.snapshot()
        };
        let speech = self.speech_state();
        let inputs = TickInputs {
            now_ms,
            dt,
            script: &self.script,
            geometry: &self.geometry,
            settings: &self.settings,
            rate,
            matched_token_index: speech.matched_token_index,
            last_match_at_ms: speech.last_match_at_ms,
            asr_enabled: self.asr_enabled && self.speech.is_some(),
            manual_mode: self.manual_mode,
        };
        let output = tick(&mut self.engine, &inputs);
        self.last_output = Some(output);
        output
    }

    pub fn debug_snapshot(&self) -> DebugSnapshot {
        let now = self.now();
        DebugSnapshot {
            mode: self.engine.last_mode(),
            error_px: self.engine.last_error_px(),
            drift_source: self.settings.drift_source,
            drift_wps: self.last_output.map(|o| o.drift_wps).unwrap_or(0.0),
            asr_drift_wps: self.engine.asr_drift_wps(),
            words_read: self.engine.words_read,
            total_words: self.script.total_words(),
            px_per_word: self.geometry.px_per_word,
            speech_index: self.engine.speech_index(),
            manual_pause_ms: self.engine.manual_pause_remaining_ms(now).round(),
            mic: self.mic_permission(),
            rate: self.rate.snapshot(),
            speech: self.speech_state(),
            events: self.events.iter().cloned().collect(),
        }
    }

    /// Release the microphone and the recognizer.
    pub fn shutdown(&mut self) {
        if self.speech.is_none() && self.mic.is_none() {
            return;
        }
        self.stop_speech();
        self.stop_mic();
        info!("Session stopped");
    }
}

impl Drop for Teleprompter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::layout_words;
    use crate::speech::{parse_transcript_cues, ScriptedRecognizer};
    use std::thread;
    use std::time::{Duration, Instant};

    const SCRIPT: &str = "Good evening and welcome to the late edition of the news. \
                          Tonight we look at the weather across the northern valleys, \
                          where heavy rain is expected to continue until the weekend.";

    fn measured_session(settings: AppSettings) -> Teleprompter {
        let mut session = Teleprompter::new(SCRIPT, settings, SessionClock::new());
        let (layout, text_height) = layout_words(session.script().words(), 300.0, 20.0);
        // pad so the last line can reach the anchor
        let content = text_height + 400.0 * (1.0 - ANCHOR_RATIO);
        session.update_layout(400.0, content, layout);
        session
    }

    #[test]
    fn test_layout_calibrates_geometry() {
        let session = measured_session(AppSettings::default());
        let calibration = session.calibration().unwrap();
        assert!(calibration.px_per_word >= 1.0);
        assert_eq!(session.geometry().px_per_word, calibration.px_per_word);
        assert!(session.geometry().is_measured());
    }

    #[test]
    fn test_nudge_and_reset_are_logged() {
        let mut session = measured_session(AppSettings::default());
        session.nudge(1);
        assert!(session.engine().words_read > 0.0);
        session.reset();
        assert_eq!(session.engine().words_read, 0.0);

        let events = session.debug_snapshot().events;
        assert_eq!(events.len(), 2);
        assert!(events[0].message.starts_with("manual nudge +"));
        assert_eq!(events[1].message, "reset");
    }

    #[test]
    fn test_manual_bumps_are_throttled() {
        let mut session = measured_session(AppSettings::default());
        session.on_manual_scroll(0.2);
        session.on_manual_scroll(12.0);
        session.on_manual_scroll(12.0);
        session.on_manual_touch();
        let events = session.debug_snapshot().events;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].message, "manual wheel dy=12.0");
        assert!(session.debug_snapshot().manual_pause_ms > 0.0);
    }

    #[test]
    fn test_event_log_is_bounded() {
        let mut session = measured_session(AppSettings::default());
        for _ in 0..(EVENT_LOG_CAPACITY + 10) {
            session.nudge(-1);
        }
        assert_eq!(session.debug_snapshot().events.len(), EVENT_LOG_CAPACITY);
    }

    #[test]
    fn test_external_rate_drives_progress() {
        let mut session = measured_session(AppSettings::default());
        session.rate_handle().publish(RateState {
            wpm_smoothed: 150.0,
            talking: true,
            noise_floor_db: -55.0,
        });
        session.tick(0.0);
        for frame in 1..=60 {
            session.tick(frame as f64 * 1000.0 / 60.0);
        }
        // 2.5 words per second for one second
        assert!((session.engine().words_read - 2.5).abs() < 1e-6);
    }

    #[test]
    fn test_asr_without_recognizer_stays_rate_driven() {
        let mut session = measured_session(AppSettings::default());
        session.set_asr_enabled(true);
        let out = session.tick(0.0);
        assert!(out.applied);
        assert_eq!(session.speech_state(), MatchState::default());
    }

    #[test]
    fn test_scripted_speech_moves_progress() {
        let settings = AppSettings {
            drift_source: DriftSource::None,
            asr_lead_words: 0.0,
            ..AppSettings::default()
        };
        let mut session = measured_session(settings);
        let clock = session.clock();
        let cues = parse_transcript_cues("0 good evening and welcome to the late edition").unwrap();
        session.attach_recognizer(Box::new(ScriptedRecognizer::new(cues, clock)));
        session.set_asr_enabled(true);

        let deadline = Instant::now() + Duration::from_secs(5);
        while session.speech_state().matched_token_index.is_none() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        let out = session.tick(clock.now_ms());
        // "edition" is the eighth word
        assert_eq!(out.words_read, 8.0);
        assert_eq!(out.highlight_words, 8);
        assert_eq!(session.engine().speech_index(), Some(7));

        session.set_asr_enabled(false);
        assert!(!session.is_asr_enabled());
        let out = session.tick(clock.now_ms() + 16.0);
        assert_eq!(out.words_read, 8.0);
        assert_eq!(session.engine().speech_index(), None);
    }

    #[test]
    fn test_load_script_reanchors_instead_of_resetting() {
        let mut session = measured_session(AppSettings::default());
        session.on_manual_scroll(60.0);
        session.load_script("A much shorter script.");
        assert_eq!(session.script().total_words(), 4);
        assert!(session.engine().words_read <= 4.0);
    }
}
