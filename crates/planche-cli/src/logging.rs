//! Logging for the command line tool
//!
//! Console output goes to stderr so stdout carries only the JSON result.
//! A JSON log file rolls daily under the user's data directory.

use std::path::PathBuf;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Directory where log files should be written
    pub log_dir: PathBuf,

    /// Whether to write JSON logs to a daily file
    pub enable_json_logs: bool,

    pub enable_console_logs: bool,

    /// Whether to log span open and close (async edit and export steps)
    pub enable_spans: bool,

    /// Filter used when `RUST_LOG` is not set
    pub default_filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: log_directory(),
            enable_json_logs: true,
            enable_console_logs: true,
            enable_spans: false,
            default_filter: "warn,planche_cli=info,planche_core=info,planche_schema=info,planche_services=info".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Verbose console output with spans
    pub fn verbose() -> Self {
        Self {
            enable_spans: true,
            default_filter: "info,planche_cli=debug,planche_core=debug,planche_schema=debug,planche_services=debug".to_string(),
            ..Self::default()
        }
    }

    /// Console only
    pub fn without_files(mut self) -> Self {
        self.enable_json_logs = false;
        self
    }
}

pub fn init(config: LoggingConfig) -> anyhow::Result<()> {
    // RUST_LOG takes precedence over the default filter
    let env_filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.default_filter))
    };

    // NEW rather than ENTER: awaited futures re-enter their span on every poll
    let span_events = if config.enable_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let mut layers = Vec::new();

    if config.enable_console_logs {
        let console_layer = fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .with_span_events(span_events.clone())
            .compact()
            .with_filter(env_filter())
            .boxed();
        layers.push(console_layer);
    }

    if config.enable_json_logs {
        std::fs::create_dir_all(&config.log_dir)?;
        let file_appender = tracing_appender::rolling::daily(&config.log_dir, "planche.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        // The guard flushes on drop and must outlive every log call
        std::mem::forget(guard);

        let json_layer = fmt::layer()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_span_events(span_events)
            .with_ansi(false)
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_writer(non_blocking)
            .with_filter(env_filter())
            .boxed();
        layers.push(json_layer);
    }

    tracing_subscriber::registry().with(layers).init();

    tracing::debug!(
        log_dir = %config.log_dir.display(),
        json_enabled = config.enable_json_logs,
        "logging initialized"
    );
    Ok(())
}

pub fn log_directory() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("planche")
        .join("logs")
}
