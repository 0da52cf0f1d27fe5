//! Structured logging setup, mirroring the `fig_log` crate this daemon's workspace sibling uses
//! elsewhere: a reloadable `EnvFilter` layer plus optional file and stdout layers.

use std::fs::File;
use std::path::Path;
use std::sync::Mutex;

use thiserror::Error;
use tracing::info;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{
    EnvFilter,
    Registry,
    fmt,
};

const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;
const DEFAULT_FILTER: LevelFilter = LevelFilter::INFO;
const LOG_LEVEL_ENV_VAR: &str = "OIDCD_LOG_LEVEL";

static LOG_LEVEL_GLOBAL: Mutex<Option<String>> = Mutex::new(None);
static ENV_FILTER_RELOADABLE_HANDLE: Mutex<Option<tracing_subscriber::reload::Handle<EnvFilter, Registry>>> = Mutex::new(None);

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    TracingReload(#[from] tracing_subscriber::reload::Error),
}

pub struct LogArgs<T: AsRef<Path>> {
    pub log_level: Option<String>,
    pub log_to_stdout: bool,
    pub log_file_path: Option<T>,
}

/// Keeps the non-blocking writer threads alive; drop only at process exit.
#[must_use]
pub struct LogGuard {
    _file_guard: Option<WorkerGuard>,
    _stdout_guard: Option<WorkerGuard>,
}

pub fn initialize_logging<T: AsRef<Path>>(args: LogArgs<T>) -> Result<LogGuard, Error> {
    let filter_layer = create_filter_layer();
    let (reloadable_filter_layer, reloadable_handle) = tracing_subscriber::reload::Layer::new(filter_layer);
    *ENV_FILTER_RELOADABLE_HANDLE.lock().unwrap() = Some(reloadable_handle);

    let (file_layer, file_guard) = match args.log_file_path {
        Some(path) => {
            let path = path.as_ref();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            if path.exists() && std::fs::metadata(path)?.len() > MAX_FILE_SIZE {
                std::fs::remove_file(path)?;
            }
            let file = File::options().append(true).create(true).open(path)?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Ok(metadata) = file.metadata() {
                    let mut permissions = metadata.permissions();
                    permissions.set_mode(0o600);
                    file.set_permissions(permissions).ok();
                }
            }

            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            (Some(fmt::layer().with_line_number(true).with_writer(non_blocking)), Some(guard))
        },
        None => (None, None),
    };

    let (stdout_layer, stdout_guard) = if args.log_to_stdout {
        let (non_blocking, guard) = tracing_appender::non_blocking(std::io::stdout());
        (Some(fmt::layer().with_line_number(true).with_writer(non_blocking)), Some(guard))
    } else {
        (None, None)
    };

    if let Some(level) = args.log_level {
        set_log_level(level)?;
    }

    tracing_subscriber::registry().with(reloadable_filter_layer).with(file_layer).with(stdout_layer).init();

    Ok(LogGuard {
        _file_guard: file_guard,
        _stdout_guard: stdout_guard,
    })
}

pub fn get_log_level() -> String {
    LOG_LEVEL_GLOBAL
        .lock()
        .unwrap()
        .clone()
        .unwrap_or_else(|| std::env::var(LOG_LEVEL_ENV_VAR).unwrap_or_else(|_| DEFAULT_FILTER.to_string()))
}

pub fn set_log_level(level: String) -> Result<String, Error> {
    info!(%level, "changing log level");
    let old_level = get_log_level();
    *LOG_LEVEL_GLOBAL.lock().unwrap() = Some(level);

    let filter_layer = create_filter_layer();
    ENV_FILTER_RELOADABLE_HANDLE
        .lock()
        .unwrap()
        .as_ref()
        .expect("set_log_level called before initialize_logging")
        .reload(filter_layer)?;

    Ok(old_level)
}

fn create_filter_layer() -> EnvFilter {
    let directive = Directive::from(DEFAULT_FILTER);
    let level = LOG_LEVEL_GLOBAL.lock().unwrap().clone().or_else(|| std::env::var(LOG_LEVEL_ENV_VAR).ok());
    match level {
        Some(level) => EnvFilter::builder().with_default_directive(directive).parse_lossy(level),
        None => EnvFilter::default().add_directive(directive),
    }
}

#[cfg(test)]
mod tests {
    use std::fs::read_to_string;
    use std::time::Duration;

    use tracing::{
        debug,
        error,
        warn,
    };

    use super::*;

    #[test]
    fn writes_to_file_at_the_requested_level() {
        let tempdir = tempfile::TempDir::new().unwrap();
        let log_path = tempdir.path().join("oidcd.log");

        let _guard = initialize_logging(LogArgs {
            log_level: Some("debug".to_owned()),
            log_to_stdout: false,
            log_file_path: Some(&log_path),
        })
        .unwrap();

        assert_eq!(get_log_level(), "debug");
        debug!("starting up");
        warn!("socket already existed, replacing it");
        error!("discovery fetch failed");

        std::thread::sleep(Duration::from_millis(100));
        let logs = read_to_string(&log_path).unwrap();
        for needle in ["DEBUG", "WARN", "ERROR", "starting up", "discovery fetch failed"] {
            assert!(logs.contains(needle), "missing {needle:?} in {logs}");
        }
    }
}
