//! Usage: tracing subscriber setup (stderr + optional daily-rolling file).

use crate::infra::settings::LogSettings;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

const LOG_FILE_PREFIX: &str = "leaderboard-session.log";

fn build_filter(settings: &LogSettings) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(settings.level.trim()))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global subscriber. Returns the file writer guard, which must be kept
/// alive for buffered lines to be flushed. A second call is a no-op.
pub fn init(settings: &LogSettings) -> Option<WorkerGuard> {
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let Some(directory) = settings.directory.as_ref() else {
        let installed = tracing_subscriber::registry()
            .with(build_filter(settings))
            .with(stderr_layer)
            .try_init();
        if installed.is_err() {
            tracing::debug!("tracing subscriber already installed");
        }
        return None;
    };

    if let Err(err) = std::fs::create_dir_all(directory) {
        eprintln!(
            "failed to create log directory {}: {err}; logging to stderr only",
            directory.display()
        );
        let _ = tracing_subscriber::registry()
            .with(build_filter(settings))
            .with(stderr_layer)
            .try_init();
        return None;
    }

    let appender = tracing_appender::rolling::daily(directory, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let file_layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true);

    let installed = tracing_subscriber::registry()
        .with(build_filter(settings))
        .with(stderr_layer)
        .with(file_layer)
        .try_init();
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
        return None;
    }
    Some(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_level_falls_back() {
        let settings = LogSettings {
            level: "not a [valid directive".to_string(),
            directory: None,
        };
        // Must not panic regardless of RUST_LOG.
        let _ = build_filter(&settings);
    }

    #[test]
    fn init_with_directory_writes_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = LogSettings {
            level: "debug".to_string(),
            directory: Some(dir.path().join("logs")),
        };
        let _guard = init(&settings);
        assert!(dir.path().join("logs").is_dir());
        // A second install is ignored.
        assert!(init(&settings).is_none());
    }
}
