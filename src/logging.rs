//! Console logging for the binary.
//!
//! Output formatting is env_logger's; which records pass is decided by an
//! `env_filter` filter built from `RUST_LOG`, so an invalid value degrades
//! to info-level output instead of silently dropping everything.

use env_filter::{Builder as EnvFilterBuilder, Filter};
use log::{LevelFilter, Log, Metadata, Record};

struct ConsoleLogger {
    filter: Filter,
    inner: env_logger::Logger,
}

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.filter.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        if self.filter.matches(record) {
            self.inner.log(record);
        }
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

/// Build the console filter. Returns the rejected `RUST_LOG` value and its
/// parse error when it could not be used.
fn build_console_filter(spec: Option<&str>, debug: bool) -> (Filter, Option<(String, String)>) {
    let mut builder = EnvFilterBuilder::new();
    let default_level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let mut rejected = None;

    match spec {
        Some(spec) if !spec.trim().is_empty() => {
            if let Err(err) = builder.try_parse(spec) {
                rejected = Some((spec.to_string(), err.to_string()));
                builder.filter_level(default_level);
            }
        }
        _ => {
            builder.filter_level(default_level);
        }
    }
    if debug {
        builder.filter_module("cadence_lib", LevelFilter::Debug);
        builder.filter_module("cadence", LevelFilter::Debug);
    }

    (builder.build(), rejected)
}

/// Install the console logger. Safe to call more than once; later calls are
/// ignored.
pub fn init_logging(debug: bool) {
    let spec = std::env::var("RUST_LOG").ok();
    let (filter, rejected) = build_console_filter(spec.as_deref(), debug);
    let max_level = filter.filter();

    let inner = env_logger::Builder::new()
        .filter_level(LevelFilter::Trace)
        .format_timestamp_millis()
        .format_target(false)
        .build();

    if log::set_boxed_logger(Box::new(ConsoleLogger { filter, inner })).is_err() {
        return;
    }
    log::set_max_level(max_level);

    if let Some((spec, err)) = rejected {
        log::warn!(
            "Ignoring invalid RUST_LOG value '{}': {}. Falling back to info-level console logging",
            spec,
            err
        );
    }
}
