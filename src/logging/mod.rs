//! Logging infrastructure - structured tracing for registry and collector events
//!
//! Design: Uses `tracing` for structured, contextual logging with:
//! - Configurable log level via environment
//! - Zero-cost when disabled
//! - Console output (human-readable or JSON) plus optional file output

use once_cell::sync::OnceCell;
use std::io;
use std::path::Path;
use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

// Re-export tracing macros for use throughout the crate
pub use tracing::{debug, error, info, trace, warn};

/// Global logging state
static LOGGER_INITIALIZED: OnceCell<()> = OnceCell::new();

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default log level
    pub level: Level,
    /// Enable file logging
    pub file_output: bool,
    /// Log file path (if file_output enabled)
    pub log_path: Option<String>,
    /// Enable JSON format (vs human-readable)
    pub json_format: bool,
    /// Show span events (enter/exit)
    pub show_spans: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            file_output: false,
            log_path: None,
            json_format: false,
            show_spans: false,
        }
    }
}

impl LogConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // REFPTR_LOG_LEVEL: trace, debug, info, warn, error
        if let Ok(level_str) = std::env::var("REFPTR_LOG_LEVEL") {
            config.level = parse_level(&level_str);
        }

        // REFPTR_LOG_FILE: path to log file
        if let Ok(path) = std::env::var("REFPTR_LOG_FILE") {
            config.file_output = true;
            config.log_path = Some(path);
        }

        config.json_format = std::env::var("REFPTR_LOG_JSON").is_ok();
        config.show_spans = std::env::var("REFPTR_LOG_SPANS").is_ok();

        config
    }

    /// Verbose config: every refcount transition, written to `refptr.log`
    pub fn debug() -> Self {
        Self {
            level: Level::TRACE,
            file_output: true,
            log_path: Some("refptr.log".to_string()),
            json_format: false,
            show_spans: true,
        }
    }
}

fn parse_level(value: &str) -> Level {
    match value.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Initialize logging with default configuration
pub fn init() {
    init_with_config(LogConfig::from_env());
}

/// Initialize logging with custom configuration
pub fn init_with_config(config: LogConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("refptr={}", config.level.as_str().to_lowercase()))
        });

        let span_events = if config.show_spans {
            FmtSpan::ENTER | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };

        let console = if config.json_format {
            fmt::layer()
                .json()
                .with_writer(io::stdout)
                .with_span_events(span_events)
                .boxed()
        } else {
            fmt::layer()
                .with_writer(io::stdout)
                .with_span_events(span_events)
                .with_target(true)
                .with_line_number(cfg!(debug_assertions))
                .boxed()
        };

        let file = config
            .log_path
            .as_deref()
            .filter(|_| config.file_output)
            .and_then(|path| file_writer(Path::new(path)).ok())
            .map(|writer| fmt::layer().with_ansi(false).with_writer(writer));

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console)
            .with(file)
            .try_init()
            .ok(); // Another subscriber may already be installed
    });
}

/// Check if logging is initialized
pub fn is_initialized() -> bool {
    LOGGER_INITIALIZED.get().is_some()
}

/// Non-rotating file appender for `path`
pub fn file_writer(path: &Path) -> io::Result<RollingFileAppender> {
    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "log path has no file name"))?;

    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(name)
        .build(dir)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
}

// ============================================================================
// Registry-specific logging functions
// ============================================================================

/// Log a new record entering the registry
#[inline]
pub fn log_record_insert(address: usize, len: usize) {
    trace!(
        event = "record_insert",
        address = format_args!("{:#x}", address),
        len,
        "Record inserted"
    );
}

/// Log a refcount transition
#[inline]
pub fn log_refcount(address: usize, count: usize) {
    trace!(
        event = "refcount",
        address = format_args!("{:#x}", address),
        count,
        "Refcount changed"
    );
}

/// Log a collection trigger absorbed by the throttle
pub fn log_sweep_skipped(skipped: usize, collect_cycle: usize) {
    debug!(
        event = "sweep_skipped",
        skipped,
        collect_cycle,
        "Collection deferred by throttle"
    );
}

/// Log sweep completion
pub fn log_sweep_complete(duration_us: u64, swept: usize, remaining: usize) {
    debug!(
        event = "sweep_complete",
        records_swept = swept,
        records_remaining = remaining,
        duration_us,
        "Sweep complete"
    );
}

/// Log an allocation being released
#[inline]
pub fn log_release(address: usize, len: usize) {
    trace!(
        event = "release",
        address = format_args!("{:#x}", address),
        array = len > 0,
        len,
        "Allocation released"
    );
}

/// Log the exit finalizer running for a registry
pub fn log_shutdown(type_name: &str, declared_len: usize, records: usize) {
    info!(
        event = "shutdown",
        pointee = type_name,
        declared_len,
        records,
        "Registry finalizer reclaiming remaining records"
    );
}

/// Log an error that could not be returned to a caller
pub fn log_handle_error(operation: &str, error: &dyn std::fmt::Display) {
    error!(
        event = "handle_error",
        operation,
        error = %error,
        "Handle bookkeeping failed"
    );
}

/// Performance tracking utilities
pub mod perf {
    use std::time::Instant;
    use tracing::debug;

    /// Track operation duration (returns guard that logs on drop)
    #[must_use]
    pub fn track(operation: &'static str) -> PerformanceGuard {
        PerformanceGuard {
            operation,
            start: Instant::now(),
        }
    }

    pub struct PerformanceGuard {
        operation: &'static str,
        start: Instant,
    }

    impl Drop for PerformanceGuard {
        fn drop(&mut self) {
            debug!(
                operation = self.operation,
                duration_us = self.start.elapsed().as_micros() as u64,
                "operation completed"
            );
        }
    }
}
