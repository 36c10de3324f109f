use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(name = "cadence", about = "Cadence - a teleprompter that follows the speaker")]
pub struct CliArgs {
    /// Script to follow (.txt, .md, .srt or .rtf)
    #[arg(required_unless_present_any = ["saved", "list_scripts", "delete_saved"])]
    pub script: Option<PathBuf>,

    /// Saved-script library (JSON)
    #[arg(long)]
    pub library: Option<PathBuf>,

    /// Save the script to the library under this title and exit
    #[arg(long, requires_all = ["library", "script"])]
    pub save_as: Option<String>,

    /// List the saved scripts and exit
    #[arg(long, requires = "library")]
    pub list_scripts: bool,

    /// Follow a saved script instead of a file
    #[arg(long, requires = "library", conflicts_with = "script")]
    pub saved: Option<u64>,

    /// Delete a saved script and exit
    #[arg(long, requires = "library")]
    pub delete_saved: Option<u64>,

    /// Settings file (JSON); defaults are used when missing or invalid
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// Write the effective settings to the settings file and exit
    #[arg(long, requires = "settings")]
    pub init_settings: bool,

    /// Recording to estimate the speaking rate from
    #[arg(long)]
    pub wav: Option<PathBuf>,

    /// Timed transcript ("<ms> text" per line) replayed as speech recognition
    #[arg(long)]
    pub transcript: Option<PathBuf>,

    /// Use the live microphone for the speaking rate
    #[arg(long, conflicts_with = "wav")]
    pub live: bool,

    /// Follow the scroll position instead of the speaker
    #[arg(long)]
    pub manual: bool,

    /// Simulated viewport height in pixels
    #[arg(long, default_value_t = 600.0)]
    pub viewport_height: f64,

    /// Simulated viewport width in pixels
    #[arg(long, default_value_t = 720.0)]
    pub viewport_width: f64,

    /// Frames per second
    #[arg(long, default_value_t = 60)]
    pub fps: u32,

    /// Seconds to run; offline sources default to their own length
    #[arg(long)]
    pub duration: Option<f64>,

    /// Print one line every N frames
    #[arg(long, default_value_t = 6)]
    pub every: u32,

    /// Enable debug mode with verbose logging and debug snapshots
    #[arg(long)]
    pub debug: bool,
}
