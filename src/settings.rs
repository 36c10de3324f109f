use crate::audio::RateConfig;
use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Where continuous progress between ASR matches comes from.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DriftSource {
    /// Progress only moves on ASR matches and operator input
    None,
    /// Speaking rate measured from microphone energy
    Mic,
    /// Reading speed implied by successive ASR matches. Falls back to the
    /// microphone rate while ASR is off.
    AsrDerived,
}

impl Default for DriftSource {
    fn default() -> Self {
        DriftSource::Mic
    }
}

/// How progress converges on an accepted ASR match.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SnapMode {
    /// Jump progress to the match; scroll eases toward it.
    Aggressive,
    /// Jump progress and scroll offset to the match.
    Instant,
    /// Close a fixed share of the gap each tick.
    Gentle,
    /// Follow the rate-driven position while the ASR anchor is within
    /// `sticky_threshold_px` of the scroll offset. Beyond that the scroll eases
    /// toward the anchor, and beyond four times the threshold it snaps there
    /// and progress is re-anchored to the match.
    Sticky,
}

impl Default for SnapMode {
    fn default() -> Self {
        SnapMode::Aggressive
    }
}

/// Screens of text ahead of the reading position in which an ASR match is
/// trusted. Stored as the plain number 1, 2 or 4.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(try_from = "u32", into = "u32")]
pub enum AsrWindowScreens {
    One,
    Two,
    Four,
}

impl AsrWindowScreens {
    pub fn screens(self) -> u32 {
        match self {
            AsrWindowScreens::One => 1,
            AsrWindowScreens::Two => 2,
            AsrWindowScreens::Four => 4,
        }
    }
}

impl Default for AsrWindowScreens {
    fn default() -> Self {
        AsrWindowScreens::One
    }
}

impl TryFrom<u32> for AsrWindowScreens {
    type Error = String;

    fn try_from(value: u32) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(AsrWindowScreens::One),
            2 => Ok(AsrWindowScreens::Two),
            4 => Ok(AsrWindowScreens::Four),
            other => Err(format!("asr_window_screens must be 1, 2 or 4, got {}", other)),
        }
    }
}

impl From<AsrWindowScreens> for u32 {
    fn from(value: AsrWindowScreens) -> Self {
        value.screens()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AppSettings {
    #[serde(default)]
    pub drift_source: DriftSource,
    #[serde(default)]
    pub snap_mode: SnapMode,
    #[serde(default = "default_asr_lead_words")]
    pub asr_lead_words: f64,
    #[serde(default)]
    pub asr_window_screens: AsrWindowScreens,
    #[serde(default = "default_sticky_threshold_px")]
    pub sticky_threshold_px: f64,
    #[serde(default = "default_manual_pause_ms")]
    pub manual_pause_ms: f64,
    #[serde(default = "default_hold_on_silence")]
    pub hold_on_silence: bool,
    #[serde(default = "default_base_wpm")]
    pub base_wpm: f64,
    #[serde(default = "default_lang")]
    pub lang: String,
    /// Keep the microphone rate running while ASR is enabled
    #[serde(default = "default_use_mic_while_asr")]
    pub use_mic_while_asr: bool,
    #[serde(default)]
    pub show_debug: bool,
    #[serde(default = "default_font_size_px")]
    pub font_size_px: f64,
    #[serde(default)]
    pub rate: RateConfig,
}

fn default_asr_lead_words() -> f64 {
    2.0
}

fn default_sticky_threshold_px() -> f64 {
    16.0
}

fn default_manual_pause_ms() -> f64 {
    500.0
}

fn default_hold_on_silence() -> bool {
    true
}

fn default_base_wpm() -> f64 {
    140.0
}

fn default_lang() -> String {
    "it-IT".to_string()
}

fn default_use_mic_while_asr() -> bool {
    true
}

fn default_font_size_px() -> f64 {
    32.0
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            drift_source: DriftSource::default(),
            snap_mode: SnapMode::default(),
            asr_lead_words: default_asr_lead_words(),
            asr_window_screens: AsrWindowScreens::default(),
            sticky_threshold_px: default_sticky_threshold_px(),
            manual_pause_ms: default_manual_pause_ms(),
            hold_on_silence: default_hold_on_silence(),
            base_wpm: default_base_wpm(),
            lang: default_lang(),
            use_mic_while_asr: default_use_mic_while_asr(),
            show_debug: false,
            font_size_px: default_font_size_px(),
            rate: RateConfig::default(),
        }
    }
}

impl AppSettings {
    /// Replace out-of-range numbers with something the engine can use.
    pub fn normalize(&mut self) {
        fn non_negative(value: &mut f64, fallback: f64) {
            if !value.is_finite() || *value < 0.0 {
                *value = fallback;
            }
        }

        non_negative(&mut self.asr_lead_words, default_asr_lead_words());
        non_negative(&mut self.sticky_threshold_px, default_sticky_threshold_px());
        non_negative(&mut self.manual_pause_ms, default_manual_pause_ms());
        non_negative(&mut self.base_wpm, default_base_wpm());
        if !(self.font_size_px > 0.0) {
            self.font_size_px = default_font_size_px();
        }
        if self.lang.trim().is_empty() {
            self.lang = default_lang();
        }
    }

    /// Whether the microphone should be capturing for these settings.
    pub fn wants_mic(&self, asr_enabled: bool) -> bool {
        !asr_enabled || self.use_mic_while_asr
    }
}

pub fn get_default_settings() -> AppSettings {
    AppSettings::default()
}

/// Read settings from `path`. A missing or unreadable file yields defaults.
pub fn load_settings(path: &Path) -> AppSettings {
    let mut settings = match fs::read_to_string(path) {
        Ok(raw) => match serde_json::from_str::<AppSettings>(&raw) {
            Ok(settings) => {
                debug!("Found existing settings: {:?}", settings);
                settings
            }
            Err(e) => {
                warn!("Failed to parse settings {}: {}", path.display(), e);
                get_default_settings()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("No settings at {}, using defaults", path.display());
            get_default_settings()
        }
        Err(e) => {
            warn!("Failed to read settings {}: {}", path.display(), e);
            get_default_settings()
        }
    };

    settings.normalize();
    settings
}

pub fn write_settings(path: &Path, settings: &AppSettings) -> Result<()> {
    let mut normalized = settings.clone();
    normalized.normalize();

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(&normalized).context("Failed to serialize settings")?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
