//! Utilities for logging.

use std::io;

use tracing::Level;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    HumanReadable,
    Json,
}

fn env_filter(default_level: Level) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy()
}

/// Configure the global logger.
///
/// `RUST_LOG` overrides `default_level` when set. Does nothing if a global
/// logger was already installed.
pub fn configure_global_logger<W>(default_level: Level, format: LogFormat, writer: W)
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let builder = FmtSubscriber::builder()
        .with_env_filter(env_filter(default_level))
        .with_writer(writer);

    let result = match format {
        LogFormat::HumanReadable => {
            tracing::subscriber::set_global_default(builder.with_target(true).finish())
        }
        LogFormat::Json => tracing::subscriber::set_global_default(
            builder.json().with_current_span(false).finish(),
        ),
    };

    if result.is_err() {
        tracing::debug!("global logger already configured");
    }
}

/// Logger for tests. Output is captured by the test harness.
///
/// Safe to call from every test.
pub fn init_test() {
    let subscriber = FmtSubscriber::builder()
        .with_test_writer()
        .with_env_filter(env_filter(Level::DEBUG))
        .with_file(true)
        .with_line_number(true)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Configure a human readable logger writing to stderr.
pub fn init_stderr(default_level: Level) {
    configure_global_logger(default_level, LogFormat::HumanReadable, io::stderr);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_init_is_harmless() {
        init_test();
        init_test();
        init_stderr(Level::INFO);
        tracing::info!("still logging");
    }
}
