//! Headless driver: a simulated rendering surface ticked at a fixed frame
//! rate, fed by a recording, a timed transcript or the live microphone.
//! Frames go to stdout as JSON lines; logs go to stderr.

use crate::audio::{load_wav_mono, RateEstimator, RateHandle};
use crate::cli::CliArgs;
use crate::clock::SessionClock;
use crate::engine::TickOutput;
use crate::engine_math::ANCHOR_RATIO;
use crate::geometry::layout_words;
use crate::library::ScriptLibrary;
use crate::script_source::load_script;
use crate::session::{DebugSnapshot, Teleprompter};
use crate::settings::{get_default_settings, load_settings, write_settings, AppSettings};
use crate::speech::{parse_transcript_cues, ScriptedRecognizer, TranscriptCue};
use anyhow::{anyhow, Context, Result};
use log::{info, warn};
use serde::Serialize;
use std::io::{self, Write};
use std::time::Duration;

/// Extra time after the last offline input so the scroll can settle.
const OFFLINE_TAIL_MS: f64 = 1000.0;

#[derive(Serialize)]
struct FrameLine<'a> {
    frame: u64,
    t_ms: f64,
    #[serde(flatten)]
    output: &'a TickOutput,
    #[serde(skip_serializing_if = "Option::is_none")]
    debug: Option<DebugSnapshot>,
}

fn send_line<T: Serialize>(line: &T) -> Result<()> {
    let json = serde_json::to_string(line)?;
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{}", json)?;
    stdout.flush()?;
    Ok(())
}

/// Replays a recording into the rate estimator in step with the session
/// clock.
struct WavFeeder {
    samples: Vec<f32>,
    sample_rate: u32,
    cursor: usize,
    estimator: RateEstimator,
    rate: RateHandle,
}

impl WavFeeder {
    fn new(samples: Vec<f32>, sample_rate: u32, settings: &AppSettings, rate: RateHandle) -> Self {
        Self {
            estimator: RateEstimator::new(sample_rate, settings.rate),
            samples,
            sample_rate,
            cursor: 0,
            rate,
        }
    }

    fn duration_ms(&self) -> f64 {
        self.samples.len() as f64 * 1000.0 / self.sample_rate as f64
    }

    fn advance_to(&mut self, now_ms: f64) {
        let end = ((now_ms / 1000.0 * self.sample_rate as f64) as usize).min(self.samples.len());
        if end <= self.cursor {
            return;
        }
        let state = self.estimator.push_samples(&self.samples[self.cursor..end]);
        self.cursor = end;
        self.rate.publish(state);
    }
}

fn resolve_settings(args: &CliArgs) -> Result<AppSettings> {
    let mut settings = match &args.settings {
        Some(path) => load_settings(path),
        None => get_default_settings(),
    };
    if args.debug {
        settings.show_debug = true;
    }
    settings.normalize();

    if args.init_settings {
        if let Some(path) = &args.settings {
            write_settings(path, &settings)?;
            info!("Wrote settings to {}", path.display());
        }
    }
    Ok(settings)
}

fn load_cues(args: &CliArgs) -> Result<Option<Vec<TranscriptCue>>> {
    let Some(path) = &args.transcript else {
        return Ok(None);
    };
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read transcript {}", path.display()))?;
    let cues = parse_transcript_cues(&source)
        .with_context(|| format!("Invalid transcript {}", path.display()))?;
    info!("Loaded {} transcript cues", cues.len());
    Ok(Some(cues))
}

#[derive(Serialize)]
struct LibraryLine<'a> {
    id: u64,
    title: &'a str,
    saved_at: &'a str,
    chars: usize,
}

/// Run a library-only command. Returns whether the command was handled.
fn run_library_command(args: &CliArgs) -> Result<bool> {
    let Some(path) = &args.library else {
        return Ok(false);
    };
    let mut library = ScriptLibrary::open(path);

    if let Some(id) = args.delete_saved {
        library.delete(id)?;
        return Ok(true);
    }
    if let (Some(title), Some(script)) = (&args.save_as, &args.script) {
        let text = load_script(script)?;
        let saved = library.save(title, &text)?;
        send_line(&LibraryLine {
            id: saved.id,
            title: &saved.title,
            saved_at: &saved.saved_at,
            chars: saved.text.chars().count(),
        })?;
        return Ok(true);
    }
    if args.list_scripts {
        for script in library.list() {
            send_line(&LibraryLine {
                id: script.id,
                title: &script.title,
                saved_at: &script.saved_at,
                chars: script.text.chars().count(),
            })?;
        }
        return Ok(true);
    }
    Ok(false)
}

fn resolve_script(args: &CliArgs) -> Result<String> {
    match (args.saved, &args.library, &args.script) {
        (Some(id), Some(path), _) => {
            let library = ScriptLibrary::open(path);
            let script = library.get(id)?;
            info!("Following saved script {} \"{}\"", script.id, script.title);
            Ok(script.text.clone())
        }
        (None, _, Some(path)) => load_script(path),
        _ => Err(anyhow!("No script given")),
    }
}

pub async fn run(args: CliArgs) -> Result<()> {
    let settings = resolve_settings(&args)?;
    if args.init_settings {
        return Ok(());
    }
    if run_library_command(&args)? {
        return Ok(());
    }

    let text = resolve_script(&args)?;
    let clock = SessionClock::new();
    let mut session = Teleprompter::new(&text, settings.clone(), clock);

    // simulated surface: wrapped words plus room for the last line to
    // reach the anchor
    let (layout, text_height) = layout_words(
        session.script().words(),
        args.viewport_width,
        settings.font_size_px,
    );
    let bottom_pad = (args.viewport_height * (1.0 - ANCHOR_RATIO)).ceil();
    session.update_layout(args.viewport_height, text_height + bottom_pad, layout);
    session.set_manual_mode(args.manual);

    let mut feeder = match &args.wav {
        Some(path) => {
            let (samples, sample_rate) = load_wav_mono(path)?;
            Some(WavFeeder::new(samples, sample_rate, &settings, session.rate_handle()))
        }
        None => None,
    };

    let cues = load_cues(&args)?;
    let last_cue_ms = cues
        .as_ref()
        .and_then(|c| c.last().map(|cue| cue.at_ms))
        .unwrap_or(0.0);
    if let Some(cues) = cues {
        session.attach_recognizer(Box::new(ScriptedRecognizer::new(cues, clock)));
        session.set_asr_enabled(true);
    }
    if args.live {
        session.use_live_mic(true);
    }

    let duration_ms = match args.duration {
        Some(secs) => Some(secs.max(0.0) * 1000.0),
        None if args.live => None,
        None => {
            let wav_ms = feeder.as_ref().map(|f| f.duration_ms()).unwrap_or(0.0);
            Some(wav_ms.max(last_cue_ms) + OFFLINE_TAIL_MS)
        }
    };

    let fps = args.fps.max(1);
    let every = u64::from(args.every.max(1));
    let mut interval = tokio::time::interval(Duration::from_secs_f64(1.0 / fps as f64));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    info!(
        "Running at {} fps{}",
        fps,
        duration_ms
            .map(|ms| format!(" for {:.1}s", ms / 1000.0))
            .unwrap_or_default()
    );

    let mut frame: u64 = 0;
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = &mut ctrl_c => {
                info!("Interrupted");
                break;
            }
        }

        let now = clock.now_ms();
        if let Some(feeder) = feeder.as_mut() {
            feeder.advance_to(now);
        }
        let output = session.tick(now);

        if frame % every == 0 {
            let line = FrameLine {
                frame,
                t_ms: now.round(),
                output: &output,
                debug: session.settings().show_debug.then(|| session.debug_snapshot()),
            };
            if let Err(e) = send_line(&line) {
                // stdout closed, nobody is listening any more
                warn!("Failed to write frame: {}", e);
                break;
            }
        }
        frame += 1;

        if duration_ms.is_some_and(|limit| now >= limit) {
            break;
        }
    }

    let summary = session.debug_snapshot();
    info!(
        "Finished after {} frames: {:.1}/{} words, {} matches, {} restarts",
        frame,
        summary.words_read,
        summary.total_words,
        summary.speech.match_count,
        summary.speech.restart_count
    );
    session.shutdown();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::tempdir;

    #[test]
    fn test_save_then_follow_saved_script() {
        let dir = tempdir().unwrap();
        let script = dir.path().join("talk.txt");
        let library = dir.path().join("scripts.json");
        std::fs::write(&script, "Good evening and welcome.").unwrap();
        let library_arg = library.to_str().unwrap();

        let args = CliArgs::try_parse_from([
            "cadence",
            script.to_str().unwrap(),
            "--library",
            library_arg,
            "--save-as",
            "Opening",
        ])
        .unwrap();
        assert!(run_library_command(&args).unwrap());

        let args =
            CliArgs::try_parse_from(["cadence", "--library", library_arg, "--saved", "1"]).unwrap();
        assert!(!run_library_command(&args).unwrap());
        assert_eq!(resolve_script(&args).unwrap(), "Good evening and welcome.");

        let args =
            CliArgs::try_parse_from(["cadence", "--library", library_arg, "--delete-saved", "1"])
                .unwrap();
        assert!(run_library_command(&args).unwrap());
        assert!(run_library_command(&args).is_err());

        let args =
            CliArgs::try_parse_from(["cadence", "--library", library_arg, "--saved", "1"]).unwrap();
        assert!(resolve_script(&args).is_err());
    }
}
