//! Tracing configuration and log routing.
//!
//! Events go to stdout through a compact formatter and are mirrored into a log file through a
//! non-blocking writer. `SYMPTOM_ATLAS_LOG_FILE` names the file explicitly (appended to);
//! otherwise events land in `logs/symptom-atlas.log`.
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Environment variable naming an explicit log file.
pub const LOG_FILE_ENV: &str = "SYMPTOM_ATLAS_LOG_FILE";

const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_LOG_FILE: &str = "symptom-atlas.log";

/// Where file logging should write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    /// File named by [`LOG_FILE_ENV`].
    Explicit(PathBuf),
    /// `logs/symptom-atlas.log` relative to the working directory.
    Default,
}

impl LogTarget {
    /// Pick the target from the raw value of [`LOG_FILE_ENV`], ignoring blank values.
    pub fn from_env_value(value: Option<String>) -> Self {
        match value {
            Some(path) if !path.trim().is_empty() => Self::Explicit(PathBuf::from(path.trim())),
            _ => Self::Default,
        }
    }

    fn open(&self) -> std::io::Result<NonBlocking> {
        let (writer, guard) = match self {
            Self::Explicit(path) => {
                let file = OpenOptions::new().create(true).append(true).open(path)?;
                tracing_appender::non_blocking(file)
            }
            Self::Default => {
                std::fs::create_dir_all(DEFAULT_LOG_DIR)?;
                tracing_appender::non_blocking(tracing_appender::rolling::never(
                    DEFAULT_LOG_DIR,
                    DEFAULT_LOG_FILE,
                ))
            }
        };
        let _ = LOG_GUARD.set(guard);
        Ok(writer)
    }
}

/// Install the global subscriber: `RUST_LOG` filter (default `info`), stdout, and the log file.
///
/// File logging is skipped, with a note on stderr, when the target cannot be opened.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().with_target(false).compact();
    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer);

    let target = LogTarget::from_env_value(std::env::var(LOG_FILE_ENV).ok());
    match target.open() {
        Ok(writer) => {
            let file_layer = fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false)
                .compact();
            registry.with(file_layer).init();
        }
        Err(err) => {
            eprintln!("File logging disabled ({target:?}): {err}");
            registry.init();
        }
    }
}
