//! Speaking-rate estimation from raw microphone energy.
//!
//! No word recognition is involved: voiced onsets above an adaptive noise
//! floor are counted as syllables, and syllables over a sliding horizon are
//! turned into words per minute.

use super::dsp::{rms, to_db, Biquad};
use log::trace;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Initial noise floor before any audio has been seen.
pub const INITIAL_NOISE_FLOOR_DB: f64 = -60.0;

/// Tuning for [`RateEstimator`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateConfig {
    /// Length of the sliding syllable horizon, in seconds
    pub smoothing_secs: f64,
    /// Energy below this is never speech, whatever the noise floor says
    pub min_db_threshold: f64,
    /// Exponential moving average factor applied to the instantaneous wpm
    pub ema: f64,
    pub refractory_ms: f64,
    pub syllables_per_word: f64,
    pub max_wpm: f64,
    /// Analysis window length in milliseconds
    pub window_ms: f64,
    pub band_center_hz: f64,
    pub band_q: f64,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            smoothing_secs: 1.6,
            min_db_threshold: -52.0,
            ema: 0.25,
            refractory_ms: 120.0,
            syllables_per_word: 1.66,
            max_wpm: 240.0,
            window_ms: 43.0,
            band_center_hz: 1000.0,
            band_q: 0.707,
        }
    }
}

/// Snapshot read by the engine once per frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RateState {
    pub wpm_smoothed: f64,
    pub talking: bool,
    pub noise_floor_db: f64,
}

impl Default for RateState {
    fn default() -> Self {
        Self {
            wpm_smoothed: 0.0,
            talking: false,
            noise_floor_db: INITIAL_NOISE_FLOOR_DB,
        }
    }
}

/// Clamp an instantaneous rate into `[0, max_wpm]`.
pub fn clamp_instant_wpm(wpm: f64, max_wpm: f64) -> f64 {
    if !wpm.is_finite() {
        return 0.0;
    }
    wpm.clamp(0.0, max_wpm)
}

/// Sample-clocked speaking-rate estimator.
///
/// Feed it mono samples at `sample_rate`; time is derived from the number of
/// samples consumed, so a WAV file and a live device behave identically.
pub struct RateEstimator {
    config: RateConfig,
    sample_rate: u32,
    filter: Biquad,
    window: Vec<f32>,
    window_len: usize,
    samples_seen: u64,
    noise_floor_db: f64,
    talking: bool,
    last_peak_ms: Option<f64>,
    syllables: VecDeque<f64>,
    wpm_smoothed: f64,
}

impl RateEstimator {
    pub fn new(sample_rate: u32, config: RateConfig) -> Self {
        let window_len = ((sample_rate as f64 * config.window_ms / 1000.0).round() as usize).max(1);
        Self {
            config,
            sample_rate: sample_rate.max(1),
            filter: Biquad::band_pass(sample_rate, config.band_center_hz, config.band_q),
            window: Vec::with_capacity(window_len),
            window_len,
            samples_seen: 0,
            noise_floor_db: INITIAL_NOISE_FLOOR_DB,
            talking: false,
            last_peak_ms: None,
            syllables: VecDeque::new(),
            wpm_smoothed: 0.0,
        }
    }

    pub fn config(&self) -> &RateConfig {
        &self.config
    }

    pub fn state(&self) -> RateState {
        RateState {
            wpm_smoothed: self.wpm_smoothed,
            talking: self.talking,
            noise_floor_db: self.noise_floor_db,
        }
    }

    /// Milliseconds of audio consumed so far.
    pub fn elapsed_ms(&self) -> f64 {
        self.samples_seen as f64 * 1000.0 / self.sample_rate as f64
    }

    /// Consume mono samples; returns the state after the last full window.
    pub fn push_samples(&mut self, samples: &[f32]) -> RateState {
        for &sample in samples {
            let filtered = self.filter.process(sample);
            self.window.push(filtered);
            self.samples_seen += 1;
            if self.window.len() >= self.window_len {
                let db = to_db(rms(&self.window));
                self.window.clear();
                let now_ms = self.elapsed_ms();
                self.process_level(db, now_ms);
            }
        }
        self.state()
    }

    /// Advance the detector with one analysis window's level.
    pub fn process_level(&mut self, db: f64, now_ms: f64) {
        self.noise_floor_db = 0.98 * self.noise_floor_db + 0.02 * db;

        let threshold = self.config.min_db_threshold.max(self.noise_floor_db + 6.0);
        let is_talking = db > threshold;

        if is_talking && !self.talking {
            let since_last = self
                .last_peak_ms
                .map(|last| now_ms - last)
                .unwrap_or(f64::INFINITY);
            if since_last > self.config.refractory_ms {
                self.last_peak_ms = Some(now_ms);
                self.syllables.push_back(now_ms);
            }
        }
        self.talking = is_talking;

        let horizon_ms = self.config.smoothing_secs * 1000.0;
        let cutoff = now_ms - horizon_ms;
        while self.syllables.front().is_some_and(|&t| t < cutoff) {
            self.syllables.pop_front();
        }

        let syllables_per_sec = self.syllables.len() as f64 / self.config.smoothing_secs.max(1e-3);
        let words_per_sec = syllables_per_sec / self.config.syllables_per_word;
        self.ingest_instant_wpm(words_per_sec * 60.0);

        trace!(
            "rate: db={:.1} floor={:.1} talking={} wpm={:.1}",
            db,
            self.noise_floor_db,
            self.talking,
            self.wpm_smoothed
        );
    }

    /// Clamp an instantaneous reading and fold it into the moving average.
    pub fn ingest_instant_wpm(&mut self, wpm_instant: f64) -> f64 {
        let clamped = clamp_instant_wpm(wpm_instant, self.config.max_wpm);
        let alpha = self.config.ema;
        self.wpm_smoothed = alpha * clamped + (1.0 - alpha) * self.wpm_smoothed;
        self.wpm_smoothed
    }

    /// Drop all history, as when the device is released.
    pub fn reset(&mut self) {
        self.filter.reset();
        self.window.clear();
        self.samples_seen = 0;
        self.noise_floor_db = INITIAL_NOISE_FLOOR_DB;
        self.talking = false;
        self.last_peak_ms = None;
        self.syllables.clear();
        self.wpm_smoothed = 0.0;
    }
}
