//! Logging bootstrap for hosts embedding the core.
//!
//! # Responsibility
//! - Start one rolling file logger per process.
//! - Keep core log lines metadata-only (`event=... module=... status=...`).
//!
//! # Invariants
//! - Initialization is idempotent for the same level and directory, and
//!   rejects any other configuration once active.
//! - Initialization never panics.

use flexi_logger::{Cleanup, Criterion, FileSpec, Logger, LoggerHandle, Naming, WriteMode};
use log::{error, info};
use once_cell::sync::OnceCell;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

const LOG_FILE_BASENAME: &str = "repokit";
const MAX_LOG_FILE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
const MAX_LOG_FILES: usize = 5;
const MAX_PANIC_PAYLOAD_CHARS: usize = 160;

static LOGGING_STATE: OnceCell<LoggingState> = OnceCell::new();
static PANIC_HOOK_INSTALLED: OnceCell<()> = OnceCell::new();

struct LoggingState {
    config: LoggingConfig,
    _logger: LoggerHandle,
}

/// Validated logger settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: &'static str,
    pub log_dir: PathBuf,
}

impl LoggingConfig {
    /// Normalizes `level` and checks that `log_dir` is absolute.
    pub fn new(level: &str, log_dir: impl AsRef<Path>) -> Result<Self, LoggingError> {
        Ok(Self {
            level: normalize_level(level)?,
            log_dir: normalize_log_dir(log_dir.as_ref())?,
        })
    }

    /// Build-mode default level (`debug` or `info`) for `log_dir`.
    pub fn with_default_level(log_dir: impl AsRef<Path>) -> Result<Self, LoggingError> {
        Self::new(default_log_level(), log_dir)
    }
}

#[derive(Debug)]
pub enum LoggingError {
    UnsupportedLevel(String),
    InvalidDirectory(String),
    /// A logger with different settings is already running.
    Conflict {
        active: LoggingConfig,
        requested: LoggingConfig,
    },
    Io(std::io::Error),
    Backend(flexi_logger::FlexiLoggerError),
}

impl Display for LoggingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedLevel(level) => write!(
                f,
                "unsupported log level `{level}`; expected trace|debug|info|warn|error"
            ),
            Self::InvalidDirectory(reason) => write!(f, "invalid log directory: {reason}"),
            Self::Conflict { active, requested } => write!(
                f,
                "logging already initialized with `{}` at `{}`; refusing to switch to `{}` at `{}`",
                active.level,
                active.log_dir.display(),
                requested.level,
                requested.log_dir.display()
            ),
            Self::Io(err) => write!(f, "failed to prepare log directory: {err}"),
            Self::Backend(err) => write!(f, "failed to start logger: {err}"),
        }
    }
}

impl Error for LoggingError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Backend(err) => Some(err),
            Self::UnsupportedLevel(_) | Self::InvalidDirectory(_) | Self::Conflict { .. } => None,
        }
    }
}

impl From<flexi_logger::FlexiLoggerError> for LoggingError {
    fn from(value: flexi_logger::FlexiLoggerError) -> Self {
        Self::Backend(value)
    }
}

/// Starts file logging with `level` under the absolute `log_dir`.
pub fn init_logging(level: &str, log_dir: &str) -> Result<(), LoggingError> {
    init_logging_with(LoggingConfig::new(level, log_dir)?)
}

/// Starts file logging from a prepared config.
pub fn init_logging_with(config: LoggingConfig) -> Result<(), LoggingError> {
    let state = LOGGING_STATE.get_or_try_init(|| start_logger(config.clone()))?;
    if state.config != config {
        return Err(LoggingError::Conflict {
            active: state.config.clone(),
            requested: config,
        });
    }
    Ok(())
}

/// Active configuration, or `None` before `init_logging`.
pub fn logging_status() -> Option<LoggingConfig> {
    LOGGING_STATE.get().map(|state| state.config.clone())
}

/// `debug` for debug builds, `info` for release builds.
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

fn start_logger(config: LoggingConfig) -> Result<LoggingState, LoggingError> {
    std::fs::create_dir_all(&config.log_dir).map_err(LoggingError::Io)?;

    let logger = Logger::try_with_str(config.level)?
        .log_to_file(
            FileSpec::default()
                .directory(config.log_dir.as_path())
                .basename(LOG_FILE_BASENAME),
        )
        .rotate(
            Criterion::Size(MAX_LOG_FILE_SIZE_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(MAX_LOG_FILES),
        )
        .write_mode(WriteMode::BufferAndFlush)
        .append()
        .format_for_files(flexi_logger::detailed_format)
        .start()?;

    install_panic_hook_once();
    info!(
        "event=core_init module=core status=ok version={} level={} log_dir={}",
        env!("CARGO_PKG_VERSION"),
        config.level,
        config.log_dir.display()
    );

    Ok(LoggingState {
        config,
        _logger: logger,
    })
}

fn normalize_level(level: &str) -> Result<&'static str, LoggingError> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok("trace"),
        "debug" => Ok("debug"),
        "info" => Ok("info"),
        "warn" | "warning" => Ok("warn"),
        "error" => Ok("error"),
        other => Err(LoggingError::UnsupportedLevel(other.to_string())),
    }
}

fn normalize_log_dir(log_dir: &Path) -> Result<PathBuf, LoggingError> {
    if log_dir.as_os_str().is_empty() {
        return Err(LoggingError::InvalidDirectory(
            "path cannot be empty".to_string(),
        ));
    }
    if !log_dir.is_absolute() {
        return Err(LoggingError::InvalidDirectory(format!(
            "`{}` is not absolute",
            log_dir.display()
        )));
    }
    Ok(log_dir.to_path_buf())
}

fn install_panic_hook_once() {
    if PANIC_HOOK_INSTALLED.set(()).is_err() {
        return;
    }

    let previous_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        let payload = panic_info
            .payload()
            .downcast_ref::<&str>()
            .map(|message| (*message).to_string())
            .or_else(|| panic_info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        error!(
            "event=panic_captured module=core status=error location={} payload={}",
            location,
            sanitize_message(&payload, MAX_PANIC_PAYLOAD_CHARS)
        );
        previous_hook(panic_info);
    }));
}

/// Single-line, length-capped copy of `value`.
fn sanitize_message(value: &str, max_chars: usize) -> String {
    let normalized = value.replace(['\n', '\r'], " ");
    let mut truncated = normalized.chars().take(max_chars).collect::<String>();
    if normalized.chars().count() > max_chars {
        truncated.push_str("...");
    }
    truncated
}

#[cfg(test)]
mod tests {
    use super::{init_logging, logging_status, sanitize_message, LoggingConfig, LoggingError};

    #[test]
    fn config_normalizes_level_aliases() {
        let config = LoggingConfig::new(" WARNING ", std::env::temp_dir()).unwrap();
        assert_eq!(config.level, "warn");
    }

    #[test]
    fn config_rejects_relative_directory_and_unknown_level() {
        assert!(matches!(
            LoggingConfig::new("info", "logs/dev"),
            Err(LoggingError::InvalidDirectory(_))
        ));
        assert!(matches!(
            LoggingConfig::new("loud", std::env::temp_dir()),
            Err(LoggingError::UnsupportedLevel(_))
        ));
    }

    #[test]
    fn sanitize_message_flattens_and_truncates() {
        let sanitized = sanitize_message("line1\nline2\rline3", 8);
        assert_eq!(sanitized, "line1 li...");
    }

    #[test]
    fn init_logging_is_idempotent_and_rejects_conflicts() {
        let log_dir = tempfile::tempdir().unwrap();
        let other_dir = tempfile::tempdir().unwrap();
        let log_dir_str = log_dir.path().to_str().unwrap().to_string();
        let other_dir_str = other_dir.path().to_str().unwrap().to_string();

        init_logging("info", &log_dir_str).unwrap();
        init_logging("info", &log_dir_str).unwrap();

        assert!(matches!(
            init_logging("debug", &log_dir_str),
            Err(LoggingError::Conflict { .. })
        ));
        assert!(matches!(
            init_logging("info", &other_dir_str),
            Err(LoggingError::Conflict { .. })
        ));

        let active = logging_status().unwrap();
        assert_eq!(active.level, "info");
        assert_eq!(active.log_dir, log_dir.path());
    }
}
