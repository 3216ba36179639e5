//! Logging Setup
//!
//! Installs the global tracing subscriber from the `[logging]` section:
//! console output on stderr and an optional log file, both in the
//! configured format.

use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};
use crate::error::{Error, Result};

/// Keeps the file writer alive; dropping it flushes the log file
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Initialize logging
///
/// The filter comes from `RUST_LOG` if set, then `level_override` (the
/// command line), then `config.level`.
pub fn init_logging(config: &LoggingConfig, level_override: Option<&str>) -> Result<LoggingGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(config, level_override)));

    let (file_writer, file_guard) = match &config.file {
        Some(path) => {
            let (dir, name) = split_log_path(path)?;
            std::fs::create_dir_all(&dir)?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };

    let json = config.format == LogFormat::Json;
    let console_pretty = (!json).then(|| fmt::layer().with_writer(std::io::stderr));
    let console_json = json.then(|| fmt::layer().json().with_writer(std::io::stderr));
    let file_pretty = file_writer
        .clone()
        .filter(|_| !json)
        .map(|writer| fmt::layer().with_ansi(false).with_writer(writer));
    let file_json = file_writer
        .filter(|_| json)
        .map(|writer| fmt::layer().json().with_writer(writer));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_pretty)
        .with(console_json)
        .with(file_pretty)
        .with(file_json)
        .try_init()
        .map_err(|e| Error::Config(format!("Failed to initialize logging: {}", e)))?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

/// Filter directive used when `RUST_LOG` is not set
pub fn filter_directive(config: &LoggingConfig, level_override: Option<&str>) -> String {
    level_override.unwrap_or(&config.level).to_string()
}

/// Split a log file path into the directory and file name the appender wants
fn split_log_path(path: &Path) -> Result<(PathBuf, PathBuf)> {
    let name = path
        .file_name()
        .ok_or_else(|| Error::Config(format!("logging.file {:?} has no file name", path)))?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((dir, PathBuf::from(name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_level_wins_over_config() {
        let config = LoggingConfig {
            level: "warn".into(),
            ..LoggingConfig::default()
        };

        assert_eq!(filter_directive(&config, None), "warn");
        assert_eq!(filter_directive(&config, Some("debug")), "debug");
    }

    #[test]
    fn test_split_log_path() {
        let (dir, name) = split_log_path(Path::new("/var/log/gpstrack/gpstrack.log")).unwrap();
        assert_eq!(dir, PathBuf::from("/var/log/gpstrack"));
        assert_eq!(name, PathBuf::from("gpstrack.log"));

        let (dir, name) = split_log_path(Path::new("gpstrack.log")).unwrap();
        assert_eq!(dir, PathBuf::from("."));
        assert_eq!(name, PathBuf::from("gpstrack.log"));

        assert!(matches!(split_log_path(Path::new("/")), Err(Error::Config(_))));
    }
}
