//! Small pure helpers shared by the engine, the calibrator and the session.

/// Fixed fraction of the viewport height, from the top, where the current
/// reading line is pinned.
pub const ANCHOR_RATIO: f64 = 0.35;

/// Upper bound for the ASR-derived reading speed, in words per second.
pub const MAX_ASR_WPS: f64 = 6.0;

/// Scroll offset that puts `words_read` on the anchor line.
pub fn compute_fallback_target(
    words_read: f64,
    px_per_word: f64,
    viewport_height: f64,
    anchor_ratio: f64,
) -> f64 {
    words_read * px_per_word.max(0.0) - viewport_height * anchor_ratio
}

/// Largest valid scroll offset for the given content and viewport.
pub fn max_scroll_offset(content_height: f64, viewport_height: f64) -> f64 {
    (content_height - viewport_height).max(0.0)
}

/// Clamp a scroll target into `[0, content_height - viewport_height]`.
pub fn clamp_scroll_target(target: f64, content_height: f64, viewport_height: f64) -> f64 {
    let max = max_scroll_offset(content_height, viewport_height);
    if !target.is_finite() {
        return 0.0;
    }
    target.clamp(0.0, max)
}

/// Reading speed implied by two successive ASR matches, in words/sec.
///
/// Returns 0 for non-positive elapsed time or backward movement, and never
/// more than [`MAX_ASR_WPS`].
pub fn compute_asr_instant_wps(
    last_index: usize,
    now_index: usize,
    last_ts_ms: f64,
    now_ts_ms: f64,
    token_to_word_ratio: f64,
) -> f64 {
    let dt = (now_ts_ms - last_ts_ms) / 1000.0;
    let d_tokens = now_index as f64 - last_index as f64;
    let d_words = d_tokens * token_to_word_ratio;
    if !(dt > 1e-3) || d_words < 0.0 {
        return 0.0;
    }
    (d_words / dt).clamp(0.0, MAX_ASR_WPS)
}

/// Token range around the current reading position inside which an ASR
/// match is trusted. Both ends are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcceptanceWindow {
    pub current_token: usize,
    pub min_token: usize,
    pub max_token: usize,
}

impl AcceptanceWindow {
    /// Window ahead scales with `window_screens`; the window behind is three
    /// screens so the recognizer can catch up after a pause.
    pub fn around(
        words_read: f64,
        viewport_words: f64,
        token_to_word_ratio: f64,
        window_screens: u32,
    ) -> Self {
        let ratio = token_to_word_ratio.max(1e-6);
        let current_token = (words_read / ratio).round().max(0.0) as usize;
        let viewport_tokens = viewport_words.max(0.0) / ratio;
        let ahead = (viewport_tokens * window_screens as f64).ceil() as usize;
        let behind = (viewport_tokens * 3.0).ceil() as usize;

        Self {
            current_token,
            min_token: current_token.saturating_sub(behind),
            max_token: current_token + ahead,
        }
    }

    pub fn contains(&self, token_index: usize) -> bool {
        token_index >= self.min_token && token_index <= self.max_token
    }
}

/// Exponential easing factor for one frame of `dt` seconds.
pub fn ease_alpha(dt: f64) -> f64 {
    (dt * 10.0).clamp(0.0, 1.0)
}
