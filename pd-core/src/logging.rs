//! Tracing setup for PostDeck binaries.
//!
//! The configured level applies to the PostDeck crates only; the socket,
//! TLS and HTTP stacks underneath stay at `warn` unless `RUST_LOG` or a
//! full directive string says otherwise.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{PdError, PdResult};

/// Crates whose verbosity follows `logging.level`.
const PD_TARGETS: [&str; 5] = ["pd_core", "pd_models", "pd_api", "pd_realtime", "postdeck"];

const LOG_FILE: &str = "postdeck.log";

/// Keeps the background file writer alive. Dropping it flushes the log.
pub struct LogGuard {
    _file: WorkerGuard,
}

/// Build the filter directives for a configured level.
///
/// A plain level (`info`, `debug`, ...) is scoped to the PostDeck crates.
/// Anything containing `=` or `,` is taken as a complete directive string.
/// `verbose` raises the PostDeck crates to `debug` at least.
pub fn filter_directives(level: &str, verbose: bool) -> String {
    let level = level.trim();
    if level.contains('=') || level.contains(',') {
        return level.to_string();
    }

    let ours = match level.to_ascii_lowercase().as_str() {
        "trace" => "trace",
        _ if verbose => "debug",
        "" => "info",
        other => return scoped(other),
    };
    scoped(ours)
}

fn scoped(level: &str) -> String {
    let mut directives = vec!["warn".to_string()];
    directives.extend(PD_TARGETS.iter().map(|target| format!("{target}={level}")));
    directives.join(",")
}

fn build_filter(directives: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(directives))
        .unwrap_or_else(|_| EnvFilter::new(scoped("info")))
}

/// Install the global subscriber: compact console output on stderr plus a
/// daily-rotated file in `log_dir`, JSON when `logging.json_output` is set.
pub fn init_logging(config: &LoggingConfig, log_dir: &Path, verbose: bool) -> PdResult<LogGuard> {
    std::fs::create_dir_all(log_dir)?;

    let directives = filter_directives(&config.level, verbose);
    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(log_dir, LOG_FILE));

    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .compact();
    let json_file = config.json_output.then(|| {
        fmt::layer()
            .json()
            .with_writer(writer.clone())
            .with_target(true)
    });
    let text_file = (!config.json_output).then(|| {
        fmt::layer()
            .with_writer(writer.clone())
            .with_ansi(false)
            .with_file(true)
            .with_line_number(true)
    });

    tracing_subscriber::registry()
        .with(build_filter(&directives))
        .with(console)
        .with(json_file)
        .with(text_file)
        .try_init()
        .map_err(|e| PdError::Internal(format!("logging init: {e}")))?;

    tracing::debug!("log filter {directives:?}, writing to {}", log_dir.display());
    Ok(LogGuard { _file: guard })
}

/// Console-only subscriber for tests and embedders. Repeat calls are no-ops.
pub fn init_console_logging(level: &str) {
    let _ = tracing_subscriber::registry()
        .with(build_filter(&filter_directives(level, false)))
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}
