//! Tracing subscriber setup: pretty output to stderr by default, JSON lines when `--json`
//! is set, plus an optional rotating file sink read from the config's `[logging]` table.

use tracing_subscriber::{fmt, EnvFilter};

use crate::cli::FILE_GUARD;

fn rotation_from(rotation: Option<&str>) -> tracing_appender::rolling::Rotation {
    match rotation {
        Some("daily") => tracing_appender::rolling::Rotation::DAILY,
        Some("hourly") => tracing_appender::rolling::Rotation::HOURLY,
        _ => tracing_appender::rolling::Rotation::NEVER,
    }
}

pub fn init_tracing(json: bool, log_level: &str, file: Option<&str>, rotation: Option<&str>) {
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    match file {
        Some(path) => {
            let directory = std::path::Path::new(path)
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let file_name = std::path::Path::new(path)
                .file_name()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "regconv.log".to_string());
            let appender =
                tracing_appender::rolling::RollingFileAppender::new(rotation_from(rotation), directory, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);

            if json {
                let _ = fmt()
                    .with_env_filter(filter())
                    .with_writer(non_blocking)
                    .json()
                    .try_init();
            } else {
                let _ = fmt()
                    .with_env_filter(filter())
                    .with_writer(non_blocking)
                    .try_init();
            }
        }
        None => {
            if json {
                let _ = fmt()
                    .with_env_filter(filter())
                    .with_writer(std::io::stderr)
                    .json()
                    .try_init();
            } else {
                let _ = fmt()
                    .with_env_filter(filter())
                    .with_writer(std::io::stderr)
                    .try_init();
            }
        }
    }
}
