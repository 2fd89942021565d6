//! Log pipeline: stdout for interactive runs, a rolling file for retention.
//!
//! The returned guard must live as long as the process; dropping it flushes
//! and stops the background log writer.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::LogConfig;

/// Dependency targets quieted by default. Per-statement sqlx logging in
/// particular would dwarf the purchase pipeline's own lines during a sale.
const QUIET_TARGETS: &[(&str, &str)] = &[("sqlx", "warn"), ("hyper", "info")];

pub fn init_logging(config: &LogConfig) -> WorkerGuard {
    let rotation = match config.rotation.as_str() {
        "hourly" => Rotation::HOURLY,
        "daily" => Rotation::DAILY,
        _ => Rotation::NEVER,
    };
    let appender = RollingFileAppender::new(rotation, &config.log_dir, &config.log_file);
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    // RUST_LOG overrides everything; the configured level otherwise.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(&config.log_level)));
    let registry = tracing_subscriber::registry().with(filter);

    if config.use_json {
        // Machine-readable file only; log shippers choke on mixed streams.
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(file_writer)
                    .with_ansi(false),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(file_writer)
                    .with_ansi(false),
            )
            .with(fmt::layer().with_target(false))
            .init();
    }

    guard
}

fn filter_directives(level: &str) -> String {
    let mut directives = vec![level.to_string()];
    directives.extend(
        QUIET_TARGETS
            .iter()
            .map(|(target, level)| format!("{target}={level}")),
    );
    directives.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_quiets_dependencies() {
        assert_eq!(filter_directives("info"), "info,sqlx=warn,hyper=info");
        assert_eq!(filter_directives("debug"), "debug,sqlx=warn,hyper=info");
    }
}
