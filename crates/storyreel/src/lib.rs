//! StoryReel Core Library
//!
//! Turns a long-form script into an ordered plan of short clips and drives
//! their generation one clip at a time against a slow, fallible backend,
//! threading a visual continuity frame from each finished clip into the next.
//!
//! The presentation layer, media persistence and concrete backend clients live
//! elsewhere; this crate only talks to them through the capability traits in
//! [`core::ai`], [`core::generative`] and [`core::continuity`].

pub mod core;

use std::path::Path;
use std::sync::OnceLock;

static LOG_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

/// Installs the global tracing subscriber.
///
/// Logs go to stderr and, when `log_dir` is given, to a daily-rolling file in
/// that directory. `RUST_LOG` wins over `verbose`. Calling this more than once
/// is harmless.
pub fn init_logging(log_dir: Option<&Path>, verbose: bool) {
    use tracing_subscriber::prelude::*;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive(verbose)));

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(cfg!(debug_assertions));

    let file_layer = log_dir.and_then(|dir| {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!("Failed to create log directory {}: {}", dir.display(), e);
            return None;
        }
        let file_appender = tracing_appender::rolling::daily(dir, "storyreel.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let _ = LOG_GUARD.set(guard);
        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false),
        )
    });

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer);

    // Avoid panics if already initialized (tests, repeated CLI setup).
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        "info"
    }
}
