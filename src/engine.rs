//! Progress-fusion engine.
//!
//! One call to [`tick`] per display frame fuses the continuous speaking-rate
//! signal and the latest ASR match into a reading position (`words_read`),
//! a highlight boundary and a scroll offset. All state lives in
//! [`EngineState`]; every input arrives through [`TickInputs`], so the whole
//! loop is testable without a rendering surface.

use crate::audio::RateState;
use crate::engine_math::{
    clamp_scroll_target, compute_asr_instant_wps, compute_fallback_target, ease_alpha,
    AcceptanceWindow, ANCHOR_RATIO,
};
use crate::geometry::Geometry;
use crate::settings::{AppSettings, DriftSource, SnapMode};
use crate::text::ScriptMap;
use log::{debug, trace};
use serde::Serialize;

/// Highlight freeze after a large geometry change or entering manual mode.
pub const GEOMETRY_SETTLE_MS: f64 = 200.0;
/// Highlight freeze after an explicit reset.
pub const RESET_SETTLE_MS: f64 = 250.0;

/// Fraction of the base rate applied during silence when not holding.
pub const SILENCE_BLEED_FACTOR: f64 = 0.15;
/// Fraction of the remaining distance covered per tick in gentle mode.
pub const GENTLE_FRACTION: f64 = 0.6;

const MIN_FORWARD_JUMP_WORDS: f64 = 16.0;
const MAX_FORWARD_JUMP_SCREENS: f64 = 1.2;
const PULL_BACK_FRACTION: f64 = 0.7;
const PULL_BACK_CAP_WORDS: f64 = 2.0;
/// `sticky_threshold_px` bounds the hold band; errors above this multiple of
/// it snap instead of easing.
const STICKY_SNAP_MULTIPLE: f64 = 4.0;
/// Relative `px_per_word` change treated as a layout jump.
const GEOMETRY_JUMP_RATIO: f64 = 0.1;

const NUDGE_VIEWPORT_FRACTION: f64 = 0.15;
const NUDGE_FALLBACK_WORDS: f64 = 10.0;
const MIN_MANUAL_SCROLL_PX: f64 = 0.5;

/// What the scroll target was derived from on the last tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetMode {
    /// Rate-driven position
    #[default]
    Fallback,
    /// Pixel position of the ASR-anchored word
    Anchor,
    Sticky,
    Instant,
}

/// Everything the engine reads during one tick.
#[derive(Debug, Clone, Copy)]
pub struct TickInputs<'a> {
    pub now_ms: f64,
    /// Seconds since the previous tick
    pub dt: f64,
    pub script: &'a ScriptMap,
    pub geometry: &'a Geometry,
    pub settings: &'a AppSettings,
    pub rate: RateState,
    pub matched_token_index: Option<usize>,
    pub last_match_at_ms: Option<f64>,
    pub asr_enabled: bool,
    pub manual_mode: bool,
}

/// Per-tick result handed to the rendering surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TickOutput {
    /// False when the tick was skipped for lack of geometry or words
    pub applied: bool,
    pub words_read: f64,
    pub highlight_words: usize,
    pub scroll_offset: f64,
    pub scroll_target: f64,
    /// Caret x-position of the current target word
    pub caret_left: Option<f64>,
    /// Caret x-position of the last highlighted word
    pub boundary_caret_left: Option<f64>,
    pub mode: TargetMode,
    pub error_px: f64,
    pub drift_wps: f64,
}

#[derive(Debug, Clone, Default)]
pub struct EngineState {
    pub words_read: f64,
    pub highlight_words: usize,
    pub scroll_offset: f64,
    pub scroll_target: f64,
    pub manual_pause_until_ms: f64,
    /// The pause came from the operator scrolling, so progress follows the
    /// scroll position until it expires.
    pause_follows_scroll: bool,

    speech_index: Option<usize>,
    last_seen_match: Option<usize>,
    /// Raw match that was current at reset time; ignored until it changes
    stale_match: Option<usize>,
    last_asr_sample: Option<(usize, f64)>,
    asr_drift_wps: f64,

    settle_until_ms: f64,
    last_px_per_word: f64,
    was_manual: bool,

    last_mode: TargetMode,
    last_error_px: f64,
    last_drift_wps: f64,
}

impl EngineState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last ASR match accepted through the acceptance window.
    pub fn speech_index(&self) -> Option<usize> {
        self.speech_index
    }

    pub fn asr_drift_wps(&self) -> f64 {
        self.asr_drift_wps
    }

    pub fn last_mode(&self) -> TargetMode {
        self.last_mode
    }

    pub fn last_error_px(&self) -> f64 {
        self.last_error_px
    }

    pub fn manual_pause_remaining_ms(&self, now_ms: f64) -> f64 {
        (self.manual_pause_until_ms - now_ms).max(0.0)
    }

    pub fn is_manual_pause_active(&self, now_ms: f64) -> bool {
        now_ms < self.manual_pause_until_ms
    }

    /// Zero progress and re-home the scroll.
    pub fn reset(&mut self, now_ms: f64) {
        self.words_read = 0.0;
        self.highlight_words = 0;
        self.scroll_offset = 0.0;
        self.scroll_target = 0.0;
        self.manual_pause_until_ms = 0.0;
        self.pause_follows_scroll = false;
        self.stale_match = self.last_seen_match;
        self.speech_index = None;
        self.last_asr_sample = None;
        self.asr_drift_wps = 0.0;
        self.settle_until_ms = now_ms + RESET_SETTLE_MS;
        self.last_error_px = 0.0;
        debug!("Engine reset");
    }

    /// Forget everything tied to the previous script's token stream.
    pub fn clear_speech(&mut self) {
        self.speech_index = None;
        self.last_seen_match = None;
        self.stale_match = None;
        self.last_asr_sample = None;
        self.asr_drift_wps = 0.0;
    }

    /// Re-derive `words_read` from the current scroll offset, keeping the
    /// word on the anchor line in place across layout changes.
    ///
    /// A scroll pinned at the top (or bottom) only bounds the position, so
    /// progress inside that range is kept.
    pub fn reanchor_from_scroll(&mut self, geometry: &Geometry, total_words: usize) {
        if !geometry.is_measured() {
            return;
        }
        let max_offset = geometry.max_scroll_offset();
        self.scroll_offset = self.scroll_offset.clamp(0.0, max_offset);
        let anchor_y = self.scroll_offset + geometry.viewport_height * ANCHOR_RATIO;
        let derived = anchor_y / geometry.px_per_word.max(1.0);

        let words = if self.scroll_offset <= 0.0 {
            self.words_read.min(derived)
        } else if self.scroll_offset >= max_offset {
            self.words_read.max(derived)
        } else {
            derived
        };
        self.words_read = clamp_words(words, total_words as f64);
    }

    /// Jump by a fraction of a viewport (`sign` is +1 or -1) and pause
    /// auto-scroll. Returns the number of words moved.
    pub fn nudge(
        &mut self,
        sign: i32,
        now_ms: f64,
        geometry: &Geometry,
        total_words: usize,
        manual_pause_ms: f64,
    ) -> f64 {
        let delta = if geometry.is_measured() {
            geometry.viewport_words() * NUDGE_VIEWPORT_FRACTION
        } else {
            NUDGE_FALLBACK_WORDS
        };
        let direction = f64::from(sign.signum());
        self.words_read = (self.words_read + direction * delta).clamp(0.0, total_words as f64);
        self.manual_pause_until_ms = now_ms + manual_pause_ms;
        self.pause_follows_scroll = false;
        delta * direction
    }

    /// Operator scrolled the surface by `dy` pixels. Tiny momentum deltas
    /// are ignored; returns whether the input counted.
    pub fn manual_scroll(
        &mut self,
        dy: f64,
        now_ms: f64,
        geometry: &Geometry,
        manual_pause_ms: f64,
    ) -> bool {
        if !dy.is_finite() || dy.abs() < MIN_MANUAL_SCROLL_PX {
            return false;
        }
        self.scroll_offset = (self.scroll_offset + dy).clamp(0.0, geometry.max_scroll_offset());
        self.manual_pause_until_ms = now_ms + manual_pause_ms;
        self.pause_follows_scroll = true;
        true
    }

    /// Operator touched the surface without a measurable scroll.
    pub fn manual_touch(&mut self, now_ms: f64, manual_pause_ms: f64) {
        self.manual_pause_until_ms = now_ms + manual_pause_ms;
        self.pause_follows_scroll = true;
    }

    fn output(&self, applied: bool, caret_left: Option<f64>, boundary: Option<f64>) -> TickOutput {
        TickOutput {
            applied,
            words_read: self.words_read,
            highlight_words: self.highlight_words,
            scroll_offset: self.scroll_offset,
            scroll_target: self.scroll_target,
            caret_left,
            boundary_caret_left: boundary,
            mode: self.last_mode,
            error_px: self.last_error_px,
            drift_wps: self.last_drift_wps,
        }
    }
}

/// Where the ASR match wants the reading position to be this tick.
struct AsrTarget {
    words: f64,
    anchor_px: Option<f64>,
    word_index: usize,
}

/// Advance the engine by one frame.
pub fn tick(state: &mut EngineState, inputs: &TickInputs) -> TickOutput {
    let geometry = inputs.geometry;
    let settings = inputs.settings;
    let total_words = inputs.script.total_words();

    if !geometry.is_measured() || total_words == 0 {
        trace!("Skipping tick: geometry not measured or empty script");
        return state.output(false, None, None);
    }

    let now = inputs.now_ms;
    let dt = if inputs.dt.is_finite() { inputs.dt.max(0.0) } else { 0.0 };
    let total = total_words as f64;
    let ratio = inputs.script.token_to_word_ratio();
    let viewport_words = geometry.viewport_words();

    track_settle(state, inputs);
    track_asr_rate(state, inputs, ratio);

    // 1-2. drift or geometric position
    let pausing = state.is_manual_pause_active(now);
    state.last_drift_wps = 0.0;
    if inputs.manual_mode {
        state.words_read = words_at_anchor(state, geometry);
    } else if pausing && state.pause_follows_scroll {
        state.reanchor_from_scroll(geometry, total_words);
    } else {
        let drift = drift_rate(state, inputs);
        state.last_drift_wps = drift;
        state.words_read += drift * dt;
    }
    state.words_read = clamp_words(state.words_read, total);

    // 3. acceptance window
    let new_match = accept_match(state, inputs, viewport_words, ratio);

    // 4. target and snap
    let mut override_target: Option<f64> = None;
    let mut snap_offset = false;
    let mut sticky_anchor: Option<f64> = None;
    let mut asr_target: Option<AsrTarget> = None;

    if !inputs.manual_mode {
        if let Some(speech_index) = state.speech_index {
            let asr_words = bounded_asr_words(state, inputs, speech_index, viewport_words);
            let diff = asr_words - state.words_read;
            let ahead = diff > 0.1;

            if ahead {
                match settings.snap_mode {
                    SnapMode::Aggressive | SnapMode::Instant => state.words_read = asr_words,
                    SnapMode::Gentle => state.words_read += diff * GENTLE_FRACTION,
                    SnapMode::Sticky => {}
                }
            } else if diff < -1.0 && new_match {
                let shortfall = -diff;
                state.words_read =
                    (asr_words + shortfall.min(PULL_BACK_CAP_WORDS) * PULL_BACK_FRACTION).max(0.0);
                debug!(
                    "Late match {:.1} words behind, pulled back to {:.1}",
                    shortfall, state.words_read
                );
            }

            // a match behind the reading position only confirms it
            let target = asr_target_at(inputs, asr_words.max(state.words_read));
            match settings.snap_mode {
                SnapMode::Sticky => {
                    if ahead {
                        sticky_anchor = target.anchor_px;
                    }
                }
                SnapMode::Instant => {
                    override_target = target.anchor_px;
                    snap_offset = ahead && target.anchor_px.is_some();
                }
                SnapMode::Aggressive | SnapMode::Gentle => override_target = target.anchor_px,
            }
            asr_target = Some(target);
        }
    }
    state.words_read = clamp_words(state.words_read, total);

    // 5. highlight boundary
    let desired = match (&asr_target, inputs.asr_enabled) {
        (Some(target), true) => target.words.round(),
        _ => state.words_read.round(),
    };
    let candidate = desired.clamp(0.0, total) as usize;
    let settling = now < state.settle_until_ms && !pausing;
    if !settling {
        state.highlight_words = candidate;
    }

    // 6. scroll target and apply
    let fallback = clamp_scroll_target(
        compute_fallback_target(
            state.words_read,
            geometry.px_per_word,
            geometry.viewport_height,
            ANCHOR_RATIO,
        ),
        geometry.content_height,
        geometry.viewport_height,
    );
    let max_offset = geometry.max_scroll_offset();

    let mut target = override_target.unwrap_or(fallback);
    state.last_mode = match override_target {
        Some(_) if settings.snap_mode == SnapMode::Instant => TargetMode::Instant,
        Some(_) => TargetMode::Anchor,
        None => TargetMode::Fallback,
    };

    if let Some(anchor) = sticky_anchor {
        state.last_mode = TargetMode::Sticky;
        let threshold = settings.sticky_threshold_px;
        let error = anchor - state.scroll_offset;
        if error.abs() > threshold * STICKY_SNAP_MULTIPLE {
            target = anchor;
            snap_offset = true;
            if let Some(asr) = &asr_target {
                state.words_read = clamp_words(asr.words, total);
            }
        } else if error.abs() > threshold {
            target = anchor;
        }
    }

    state.scroll_target = target.clamp(0.0, max_offset);
    state.last_error_px = state.scroll_target - state.scroll_offset;

    if !inputs.manual_mode && !pausing {
        if snap_offset {
            state.scroll_offset = state.scroll_target;
        } else {
            state.scroll_offset += (state.scroll_target - state.scroll_offset) * ease_alpha(dt);
        }
    }
    state.scroll_offset = state.scroll_offset.clamp(0.0, max_offset);

    // carets
    let last_word = total_words - 1;
    let caret_word = match &asr_target {
        Some(target) => target.word_index,
        None => (state.words_read.round() as usize).saturating_sub(1).min(last_word),
    };
    let caret_left = geometry.caret_left_for_word(caret_word);
    let boundary = if state.highlight_words > 0 {
        geometry.caret_left_for_word((state.highlight_words - 1).min(last_word))
    } else {
        None
    };

    state.output(true, caret_left, boundary)
}

fn clamp_words(words: f64, total: f64) -> f64 {
    if words.is_finite() {
        words.clamp(0.0, total)
    } else {
        0.0
    }
}

fn track_settle(state: &mut EngineState, inputs: &TickInputs) {
    let px = inputs.geometry.px_per_word;
    if state.last_px_per_word > 0.0 {
        let rel = (px - state.last_px_per_word).abs() / state.last_px_per_word.max(1e-6);
        if rel > GEOMETRY_JUMP_RATIO {
            debug!(
                "px_per_word jumped {:.2} -> {:.2}, settling highlight",
                state.last_px_per_word, px
            );
            state.settle_until_ms = state.settle_until_ms.max(inputs.now_ms + GEOMETRY_SETTLE_MS);
        }
    }
    state.last_px_per_word = px;

    if inputs.manual_mode && !state.was_manual {
        state.settle_until_ms = state.settle_until_ms.max(inputs.now_ms + GEOMETRY_SETTLE_MS);
    }
    state.was_manual = inputs.manual_mode;
}

/// Smoothed words/sec implied by successive (index, timestamp) pairs.
fn track_asr_rate(state: &mut EngineState, inputs: &TickInputs, ratio: f64) {
    let (Some(index), Some(at_ms)) = (inputs.matched_token_index, inputs.last_match_at_ms) else {
        return;
    };
    if state.last_asr_sample == Some((index, at_ms)) {
        return;
    }
    if let Some((last_index, last_ms)) = state.last_asr_sample {
        if at_ms > last_ms && index >= last_index {
            let instant = compute_asr_instant_wps(last_index, index, last_ms, at_ms, ratio);
            state.asr_drift_wps = 0.6 * instant + 0.4 * state.asr_drift_wps;
        }
    }
    state.last_asr_sample = Some((index, at_ms));
}

fn drift_rate(state: &EngineState, inputs: &TickInputs) -> f64 {
    let settings = inputs.settings;
    let mic_wps = inputs.rate.wpm_smoothed.max(0.0) / 60.0;
    let wps = match settings.drift_source {
        DriftSource::None => return 0.0,
        DriftSource::AsrDerived if inputs.asr_enabled => state.asr_drift_wps,
        DriftSource::AsrDerived | DriftSource::Mic => mic_wps,
    };

    if inputs.rate.talking {
        wps
    } else if !settings.hold_on_silence {
        SILENCE_BLEED_FACTOR * settings.base_wpm / 60.0
    } else {
        0.0
    }
}

/// One-based count of words at or above the anchor line.
fn words_at_anchor(state: &EngineState, geometry: &Geometry) -> f64 {
    let anchor_y = state.scroll_offset + geometry.viewport_height * ANCHOR_RATIO;
    match geometry.words.word_at_offset(anchor_y) {
        Some(index) => (index + 1) as f64,
        None => anchor_y / geometry.px_per_word.max(1.0),
    }
}

/// Feed the raw match through the acceptance window. Returns whether this
/// tick saw a match index it had not seen before.
///
/// A previously accepted index is dropped once the reading position has
/// moved so far that the window no longer contains it, and whenever the
/// position comes from the surface (manual mode).
fn accept_match(
    state: &mut EngineState,
    inputs: &TickInputs,
    viewport_words: f64,
    ratio: f64,
) -> bool {
    if !inputs.asr_enabled {
        state.speech_index = None;
        return false;
    }

    let raw = inputs.matched_token_index;
    let new_match = raw.is_some() && raw != state.last_seen_match;
    state.last_seen_match = raw;

    if state.stale_match.is_some() && raw != state.stale_match {
        state.stale_match = None;
    }

    if inputs.manual_mode {
        state.speech_index = None;
        return false;
    }

    let window = AcceptanceWindow::around(
        state.words_read,
        viewport_words,
        ratio,
        inputs.settings.asr_window_screens.screens(),
    );
    if let Some(held) = state.speech_index {
        if !window.contains(held) {
            debug!(
                "Dropping match at token {} outside [{}, {}]",
                held, window.min_token, window.max_token
            );
            state.speech_index = None;
        }
    }

    let Some(index) = raw else {
        return false;
    };
    if state.stale_match == Some(index) {
        return false;
    }

    if window.contains(index) {
        state.speech_index = Some(index);
        new_match
    } else {
        if new_match {
            debug!(
                "Rejected match at token {} outside [{}, {}]",
                index, window.min_token, window.max_token
            );
        }
        false
    }
}

/// Reading position implied by `speech_index`: recognized words plus the
/// lead, with forward jumps bounded. May lie behind `words_read`.
fn bounded_asr_words(
    state: &EngineState,
    inputs: &TickInputs,
    speech_index: usize,
    viewport_words: f64,
) -> f64 {
    let total = inputs.script.total_words() as f64;
    let matched = inputs.script.recognized_words(speech_index) as f64;
    let raw = (matched + inputs.settings.asr_lead_words).min(total);

    let current = state.words_read;
    let max_jump = MIN_FORWARD_JUMP_WORDS.max(viewport_words * MAX_FORWARD_JUMP_SCREENS);
    if raw >= current {
        raw.min(current + max_jump)
    } else {
        raw
    }
}

fn asr_target_at(inputs: &TickInputs, words: f64) -> AsrTarget {
    let last_word = inputs.script.total_words().saturating_sub(1);
    let word_index = (words.round() as usize).saturating_sub(1).min(last_word);
    AsrTarget {
        words,
        anchor_px: inputs.geometry.anchor_offset_for_word(word_index),
        word_index,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{WordLayout, WordRect};

    const PX: f64 = 10.0;
    const VIEWPORT: f64 = 400.0;
    const FRAME: f64 = 1.0 / 60.0;

    /// One word per 10px row; 40 words per viewport.
    fn geometry(words: usize) -> Geometry {
        Geometry {
            viewport_height: VIEWPORT,
            content_height: words as f64 * PX + VIEWPORT,
            px_per_word: PX,
            words: WordLayout::new(
                (0..words)
                    .map(|i| WordRect::new(i as f64 * PX, (i % 8) as f64 * 50.0, 40.0))
                    .collect(),
            ),
        }
    }

    fn script(words: usize) -> ScriptMap {
        let text: Vec<String> = (0..words).map(|i| format!("w{}", i)).collect();
        ScriptMap::new(&text.join(" "))
    }

    fn settings(snap_mode: SnapMode, lead: f64) -> AppSettings {
        AppSettings {
            snap_mode,
            asr_lead_words: lead,
            drift_source: DriftSource::None,
            ..AppSettings::default()
        }
    }

    struct Rig {
        script: ScriptMap,
        geometry: Geometry,
        settings: AppSettings,
        rate: RateState,
        matched: Option<usize>,
        match_at: Option<f64>,
        asr: bool,
        manual: bool,
    }

    impl Rig {
        fn new(words: usize, settings: AppSettings) -> Self {
            Self {
                script: script(words),
                geometry: geometry(words),
                settings,
                rate: RateState::default(),
                matched: None,
                match_at: None,
                asr: true,
                manual: false,
            }
        }

        fn tick(&self, state: &mut EngineState, now_ms: f64) -> TickOutput {
            tick(
                state,
                &TickInputs {
                    now_ms,
                    dt: FRAME,
                    script: &self.script,
                    geometry: &self.geometry,
                    settings: &self.settings,
                    rate: self.rate,
                    matched_token_index: self.matched,
                    last_match_at_ms: self.match_at,
                    asr_enabled: self.asr,
                    manual_mode: self.manual,
                },
            )
        }
    }

    fn state_at(words_read: f64) -> EngineState {
        EngineState {
            words_read,
            ..EngineState::default()
        }
    }

    #[test]
    fn test_outputs_stay_clamped() {
        let mut rig = Rig::new(50, AppSettings::default());
        rig.rate = RateState {
            wpm_smoothed: 240.0,
            talking: true,
            noise_floor_db: -60.0,
        };
        rig.matched = Some(45);
        rig.match_at = Some(10.0);
        let mut state = EngineState::new();
        let max_offset = rig.geometry.max_scroll_offset();

        for frame in 0..2_000 {
            let out = rig.tick(&mut state, frame as f64 * 16.7);
            assert!(out.words_read >= 0.0 && out.words_read <= 50.0);
            assert!(out.highlight_words <= 50);
            assert!(out.scroll_offset >= 0.0 && out.scroll_offset <= max_offset);
            assert!(out.scroll_target >= 0.0 && out.scroll_target <= max_offset);
        }
        assert_eq!(state.words_read, 50.0);

        state.nudge(-1, 0.0, &rig.geometry, 50, 500.0);
        state.nudge(-1, 0.0, &rig.geometry, 50, 500.0);
        state.words_read = -3.0;
        let out = rig.tick(&mut state, 40_000.0);
        assert!(out.words_read >= 0.0);
    }

    #[test]
    fn test_acceptance_window_edges() {
        // T = 100, one screen ahead = 40 tokens
        let mut rig = Rig::new(400, settings(SnapMode::Aggressive, 0.0));
        rig.asr = true;

        let mut state = state_at(100.0);
        rig.matched = Some(141);
        rig.tick(&mut state, 0.0);
        assert_eq!(state.speech_index(), None);
        assert_eq!(state.words_read, 100.0);

        let mut state = state_at(100.0);
        rig.matched = Some(140);
        rig.tick(&mut state, 0.0);
        assert_eq!(state.speech_index(), Some(140));
    }

    #[test]
    fn test_aggressive_snaps_to_bounded_target() {
        let mut rig = Rig::new(400, settings(SnapMode::Aggressive, 2.0));
        rig.matched = Some(119);
        let mut state = state_at(100.0);
        let out = rig.tick(&mut state, 0.0);
        // 120 words recognized + 2 lead
        assert_eq!(out.words_read, 122.0);
        assert_eq!(out.mode, TargetMode::Anchor);
        // anchor of word 121: 1210 - 140
        assert_eq!(out.scroll_target, 1070.0);
        assert_eq!(out.highlight_words, 122);
    }

    #[test]
    fn test_forward_jump_is_capped() {
        let mut rig = Rig::new(400, settings(SnapMode::Aggressive, 0.0));
        rig.settings.asr_window_screens = crate::settings::AsrWindowScreens::Four;
        rig.matched = Some(150);
        let mut state = state_at(10.0);
        rig.tick(&mut state, 0.0);
        // max(16, 1.2 * 40) = 48
        assert_eq!(state.words_read, 58.0);
    }

    #[test]
    fn test_gentle_moves_sixty_percent() {
        let mut rig = Rig::new(400, settings(SnapMode::Gentle, 2.0));
        rig.matched = Some(119);
        let mut state = state_at(100.0);
        rig.tick(&mut state, 0.0);
        assert!((state.words_read - 113.2).abs() < 1e-9);
        rig.tick(&mut state, 16.0);
        assert!((state.words_read - (113.2 + 0.6 * 8.8)).abs() < 1e-9);
    }

    #[test]
    fn test_instant_sets_offset_immediately() {
        let mut rig = Rig::new(400, settings(SnapMode::Instant, 0.0));
        rig.matched = Some(119);
        let mut state = state_at(100.0);
        let out = rig.tick(&mut state, 0.0);
        assert_eq!(out.mode, TargetMode::Instant);
        assert_eq!(out.scroll_offset, 1190.0 - 140.0);
    }

    #[test]
    fn test_cold_start_holds_on_silence() {
        let mut rig = Rig {
            script: ScriptMap::new("Hello there friend"),
            geometry: geometry(3),
            ..Rig::new(3, AppSettings::default())
        };
        rig.asr = false;
        rig.settings.base_wpm = 120.0;
        rig.settings.hold_on_silence = true;

        let mut state = EngineState::new();
        for frame in 0..300 {
            rig.tick(&mut state, frame as f64 * 1000.0 / 60.0);
        }
        assert_eq!(state.words_read, 0.0);
        assert_eq!(state.highlight_words, 0);
    }

    #[test]
    fn test_silence_bleed_when_not_holding() {
        let mut rig = Rig::new(100, AppSettings::default());
        rig.asr = false;
        rig.settings.hold_on_silence = false;
        rig.settings.base_wpm = 140.0;
        let mut state = EngineState::new();
        for frame in 0..60 {
            rig.tick(&mut state, frame as f64 * 1000.0 / 60.0);
        }
        // 0.15 * 140 / 60 words per second for one second
        assert!((state.words_read - 0.35).abs() < 1e-9);
    }

    #[test]
    fn test_mic_drift_while_talking() {
        let mut rig = Rig::new(100, AppSettings::default());
        rig.asr = false;
        rig.rate = RateState {
            wpm_smoothed: 120.0,
            talking: true,
            noise_floor_db: -50.0,
        };
        let mut state = EngineState::new();
        for frame in 0..60 {
            rig.tick(&mut state, frame as f64 * 1000.0 / 60.0);
        }
        assert!((state.words_read - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_late_match_pulls_back_partially() {
        let mut rig = Rig::new(400, settings(SnapMode::Aggressive, 0.0));
        // token 39 completes word 40
        rig.matched = Some(39);
        let mut state = state_at(50.0);
        rig.tick(&mut state, 0.0);
        assert!((state.words_read - 41.4).abs() < 1e-9);

        // the same match does not keep pulling
        rig.tick(&mut state, 16.0);
        assert!((state.words_read - 41.4).abs() < 1e-9);
    }

    #[test]
    fn test_sticky_holds_within_threshold() {
        let mut rig = Rig::new(300, settings(SnapMode::Sticky, 0.0));
        rig.settings.sticky_threshold_px = 16.0;
        rig.matched = Some(114);

        let mut state = state_at(110.0);
        state.scroll_offset = 990.0;
        let out = rig.tick(&mut state, 0.0);
        assert_eq!(out.mode, TargetMode::Sticky);
        // rate-driven target: 1100 - 140
        assert_eq!(out.scroll_target, 960.0);
        assert_eq!(out.words_read, 110.0);
    }

    #[test]
    fn test_sticky_eases_small_error_and_snaps_large() {
        // word 114 has its top at 1140, so its anchor offset is 1000
        let mut rig = Rig::new(300, settings(SnapMode::Sticky, 0.0));
        rig.settings.sticky_threshold_px = 16.0;
        rig.matched = Some(114);

        let mut state = state_at(110.0);
        state.scroll_offset = 970.0;
        let out = rig.tick(&mut state, 0.0);
        assert_eq!(out.mode, TargetMode::Sticky);
        assert!(out.scroll_offset > 970.0 && out.scroll_offset < 1000.0);
        assert_eq!(out.words_read, 110.0);

        let mut state = state_at(110.0);
        state.scroll_offset = 900.0;
        let out = rig.tick(&mut state, 0.0);
        assert_eq!(out.scroll_offset, 1000.0);
        assert_eq!(out.words_read, 115.0);
    }

    #[test]
    fn test_highlight_settles_after_geometry_jump() {
        let mut rig = Rig::new(400, AppSettings::default());
        rig.asr = false;
        let mut state = state_at(10.0);
        rig.tick(&mut state, 0.0);
        assert_eq!(state.highlight_words, 10);

        rig.geometry.px_per_word = 13.0;
        state.words_read = 30.0;
        rig.tick(&mut state, 50.0);
        assert_eq!(state.highlight_words, 10);
        rig.tick(&mut state, 300.0);
        assert_eq!(state.highlight_words, 30);
    }

    #[test]
    fn test_reset_zeroes_and_settles() {
        let mut rig = Rig::new(400, settings(SnapMode::Aggressive, 0.0));
        rig.matched = Some(60);
        let mut state = state_at(50.0);
        rig.tick(&mut state, 0.0);
        assert!(state.words_read > 50.0);

        state.reset(1_000.0);
        assert_eq!(state.words_read, 0.0);
        assert_eq!(state.scroll_offset, 0.0);
        assert_eq!(state.speech_index(), None);

        // the old match is still published but must not be re-accepted
        let out = rig.tick(&mut state, 1_016.0);
        assert_eq!(out.words_read, 0.0);
        assert_eq!(out.highlight_words, 0);

        rig.matched = Some(5);
        let out = rig.tick(&mut state, 1_400.0);
        assert_eq!(out.words_read, 6.0);
    }

    #[test]
    fn test_manual_mode_reads_position_from_layout() {
        let mut rig = Rig::new(400, AppSettings::default());
        rig.manual = true;
        rig.matched = Some(300);
        let mut state = EngineState::new();
        state.scroll_offset = 500.0;
        let out = rig.tick(&mut state, 0.0);
        // anchor line at 640 => word 64 is the last at or above it
        assert_eq!(out.words_read, 65.0);
        assert_eq!(out.scroll_offset, 500.0);
        assert_eq!(state.speech_index(), None);
    }

    #[test]
    fn test_drift_keeps_moving_past_an_old_match() {
        let mut rig = Rig::new(400, settings(SnapMode::Aggressive, 0.0));
        rig.settings.drift_source = DriftSource::Mic;
        rig.rate = RateState {
            wpm_smoothed: 120.0,
            talking: true,
            noise_floor_db: -50.0,
        };
        // token 39 completes word 40; the recognizer then goes quiet
        rig.matched = Some(39);
        let mut state = state_at(40.0);
        let mut out = rig.tick(&mut state, 0.0);
        for frame in 1..300 {
            out = rig.tick(&mut state, frame as f64 * 1000.0 / 60.0);
        }

        // 2 words per second for five seconds
        assert!((out.words_read - 50.0).abs() < 1e-6);
        assert_eq!(out.highlight_words, 50);
        // anchor of word 49: 490 - 140
        assert_eq!(out.scroll_target, 350.0);
        assert_eq!(state.speech_index(), Some(39));
    }

    #[test]
    fn test_leaving_manual_mode_far_ahead_drops_old_match() {
        let mut rig = Rig::new(1000, settings(SnapMode::Aggressive, 0.0));
        rig.matched = Some(99);
        let mut state = state_at(95.0);
        rig.tick(&mut state, 0.0);
        assert_eq!(state.words_read, 100.0);
        assert_eq!(state.speech_index(), Some(99));

        rig.manual = true;
        state.scroll_offset = 5000.0;
        let out = rig.tick(&mut state, 100.0);
        assert_eq!(out.words_read, 515.0);
        assert_eq!(state.speech_index(), None);

        rig.manual = false;
        let out = rig.tick(&mut state, 1000.0);
        assert_eq!(state.speech_index(), None);
        assert_eq!(out.words_read, 515.0);
        assert_eq!(out.highlight_words, 515);
        assert_eq!(out.mode, TargetMode::Fallback);
        assert_eq!(out.scroll_target, 5010.0);
    }

    #[test]
    fn test_held_match_outside_window_is_dropped() {
        let mut rig = Rig::new(1000, settings(SnapMode::Aggressive, 0.0));
        rig.matched = Some(99);
        let mut state = state_at(95.0);
        rig.tick(&mut state, 0.0);
        assert_eq!(state.speech_index(), Some(99));

        // three screens behind is 120 tokens; move well past that
        state.words_read = 300.0;
        let out = rig.tick(&mut state, 16.0);
        assert_eq!(state.speech_index(), None);
        assert_eq!(out.words_read, 300.0);
    }

    #[test]
    fn test_reanchor_at_top_keeps_progress() {
        let rig = Rig::new(400, AppSettings::default());
        let mut state = state_at(5.0);
        state.reanchor_from_scroll(&rig.geometry, 400);
        assert_eq!(state.words_read, 5.0);

        let mut state = state_at(30.0);
        state.reanchor_from_scroll(&rig.geometry, 400);
        assert_eq!(state.words_read, 14.0);

        let mut state = state_at(30.0);
        state.scroll_offset = 100.0;
        state.reanchor_from_scroll(&rig.geometry, 400);
        assert_eq!(state.words_read, 24.0);
    }

    #[test]
    fn test_manual_scroll_pauses_and_follows() {
        let mut rig = Rig::new(400, AppSettings::default());
        rig.asr = false;
        let mut state = EngineState::new();
        assert!(!state.manual_scroll(0.3, 0.0, &rig.geometry, 500.0));

        assert!(state.manual_scroll(300.0, 0.0, &rig.geometry, 500.0));
        let out = rig.tick(&mut state, 100.0);
        assert_eq!(out.scroll_offset, 300.0);
        // (300 + 140) / 10
        assert_eq!(out.words_read, 44.0);
        assert!(state.is_manual_pause_active(100.0));
        assert!(!state.is_manual_pause_active(600.0));
    }

    #[test]
    fn test_nudge_moves_fraction_of_viewport() {
        let rig = Rig::new(400, AppSettings::default());
        let mut state = state_at(20.0);
        let moved = state.nudge(1, 0.0, &rig.geometry, 400, 500.0);
        assert_eq!(moved, 6.0);
        assert_eq!(state.words_read, 26.0);
        assert_eq!(state.manual_pause_remaining_ms(100.0), 400.0);

        let moved = state.nudge(-1, 0.0, &Geometry::default(), 400, 500.0);
        assert_eq!(moved, -10.0);
        assert_eq!(state.words_read, 16.0);
    }

    #[test]
    fn test_unmeasured_geometry_is_a_no_op() {
        let mut rig = Rig::new(10, AppSettings::default());
        rig.geometry = Geometry::default();
        rig.rate.talking = true;
        rig.rate.wpm_smoothed = 200.0;
        let mut state = state_at(3.0);
        let out = rig.tick(&mut state, 0.0);
        assert!(!out.applied);
        assert_eq!(out.words_read, 3.0);
    }

    #[test]
    fn test_asr_derived_drift_rate() {
        let mut rig = Rig::new(400, settings(SnapMode::Gentle, 0.0));
        rig.settings.drift_source = DriftSource::AsrDerived;
        let mut state = EngineState::new();

        rig.matched = Some(10);
        rig.match_at = Some(1_000.0);
        rig.tick(&mut state, 1_000.0);
        rig.matched = Some(40);
        rig.match_at = Some(11_000.0);
        rig.tick(&mut state, 11_000.0);

        // 30 tokens over 10s = 3 wps, smoothed 0.6 * 3
        assert!((state.asr_drift_wps() - 1.8).abs() < 1e-9);
    }
}
