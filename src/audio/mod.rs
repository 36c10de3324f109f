//! Audio side of the engine: turning a microphone (or a recording) into a
//! speaking-rate signal.

pub mod dsp;
pub mod mic;
pub mod rate;
pub mod utils;

pub use mic::MicSpeechRate;
pub use rate::{RateConfig, RateEstimator, RateState};
pub use utils::load_wav_mono;

use serde::Serialize;
use std::sync::{Arc, Mutex};

/// Capture permission as seen by the rest of the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MicPermission {
    /// Capture has not been requested yet
    Idle,
    Granted,
    /// Access refused, no device, or no capture backend compiled in
    Denied,
}

/// Latest [`RateState`], written by the capture side and read once per frame.
#[derive(Debug, Clone, Default)]
pub struct RateHandle {
    state: Arc<Mutex<RateState>>,
}

impl RateHandle {
    pub fn publish(&self, state: RateState) {
        if let Ok(mut guard) = self.state.lock() {
            *guard = state;
        }
    }

    pub fn snapshot(&self) -> RateState {
        self.state
            .lock()
            .map(|guard| *guard)
            .unwrap_or_default()
    }
}
