//! Minimal signal helpers for the rate estimator.

use std::f64::consts::PI;

/// Second-order IIR section (RBJ cookbook coefficients), direct form I.
#[derive(Debug, Clone)]
pub struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl Biquad {
    /// Band-pass with constant 0 dB peak gain around `center_hz`.
    pub fn band_pass(sample_rate: u32, center_hz: f64, q: f64) -> Self {
        let fs = sample_rate.max(1) as f64;
        // keep the centre strictly below Nyquist for very low sample rates
        let f0 = center_hz.min(fs * 0.45).max(1.0);
        let w0 = 2.0 * PI * f0 / fs;
        let alpha = w0.sin() / (2.0 * q.max(1e-3));
        let cos_w0 = w0.cos();
        let a0 = 1.0 + alpha;

        Self {
            b0: alpha / a0,
            b1: 0.0,
            b2: -alpha / a0,
            a1: -2.0 * cos_w0 / a0,
            a2: (1.0 - alpha) / a0,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    pub fn process(&mut self, x: f32) -> f32 {
        let x = x as f64;
        let y = self.b0 * x + self.b1 * self.x1 + self.b2 * self.x2
            - self.a1 * self.y1
            - self.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;
        y as f32
    }

    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }
}

/// Root-mean-square level of a window, floored to avoid `log10(0)`.
pub fn rms(samples: &[f32]) -> f64 {
    if samples.is_empty() {
        return 1e-9;
    }
    let sum: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    let rms = (sum / samples.len() as f64).sqrt();
    if rms > 0.0 {
        rms
    } else {
        1e-9
    }
}

pub fn to_db(rms: f64) -> f64 {
    20.0 * rms.max(1e-9).log10()
}

/// Average interleaved channels down to mono.
pub fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}
