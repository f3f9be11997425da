use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const LOG_DIR: &str = "logs";
pub const LOG_FILE: &str = "incidence.log";
/// Used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_FILTER: &str = "cancer_incidence=info,warn";

fn level_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Installs the global subscriber: human-readable lines on stdout and JSON
/// lines in a daily file under `logs/`. Dropping the returned guard flushes
/// the file writer, so hold it until the process exits.
pub fn init_logging() -> WorkerGuard {
    if let Err(e) = std::fs::create_dir_all(LOG_DIR) {
        eprintln!("cannot create {}: {}", LOG_DIR, e);
    }
    let (file_writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(LOG_DIR, LOG_FILE));

    tracing_subscriber::registry()
        .with(level_filter())
        .with(fmt::layer().with_target(true).with_writer(std::io::stdout))
        .with(fmt::layer().json().with_writer(file_writer))
        .init();

    guard
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }
}
