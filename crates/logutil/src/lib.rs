//! Utilities for logging.

use std::sync::Once;

use tracing::Level;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    HumanReadable,
    Json,
}

fn env_filter(level: Level) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy()
}

/// Configure the global logger. `RUST_LOG` overrides `level` when set.
///
/// Does nothing if a global subscriber is already installed.
pub fn configure_global_logger<W>(level: Level, format: LogFormat, writer: W)
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let builder = FmtSubscriber::builder()
        .with_env_filter(env_filter(level))
        .with_writer(writer);

    let result = match format {
        LogFormat::HumanReadable => {
            let subscriber = builder.with_file(true).with_line_number(true).finish();
            tracing::subscriber::set_global_default(subscriber)
        }
        LogFormat::Json => {
            let subscriber = builder.json().with_current_span(true).finish();
            tracing::subscriber::set_global_default(subscriber)
        }
    };

    if result.is_err() {
        tracing::debug!("global logger already configured");
    }
}

static TEST_INIT: Once = Once::new();

/// Install a subscriber writing through the test harness. Safe to call from
/// every test.
pub fn init_test() {
    TEST_INIT.call_once(|| {
        let subscriber = FmtSubscriber::builder()
            .with_test_writer()
            .with_env_filter(env_filter(Level::DEBUG))
            .with_file(true)
            .with_line_number(true)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}
