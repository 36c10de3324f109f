pub mod audio;
pub mod cli;
pub mod clock;
pub mod engine;
pub mod engine_math;
pub mod geometry;
pub mod library;
pub mod logging;
mod runner;
pub mod script_source;
pub mod session;
pub mod settings;
pub mod speech;
pub mod text;

pub use cli::CliArgs;
pub use clock::SessionClock;
pub use engine::{tick, EngineState, TargetMode, TickInputs, TickOutput};
pub use library::{SavedScript, ScriptLibrary};
pub use runner::run;
pub use session::{DebugSnapshot, Teleprompter};
pub use settings::AppSettings;
