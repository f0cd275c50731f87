//! Tracing subscriber setup for host applications.
//!
//! The host runtime logs through `tracing` unconditionally; this module only
//! installs a subscriber and is available with the `subscriber` feature.

use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Layer, Registry};

/// Tracing output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracingFormat {
    /// Human-readable format with colors.
    Pretty,

    /// Compact format without colors.
    Compact,

    /// JSON lines, for log shippers.
    Json,
}

/// Tracing configuration.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Log level filter.
    ///
    /// If None, uses RUST_LOG environment variable or defaults to "info".
    pub level: Option<tracing::Level>,

    pub format: TracingFormat,

    /// Include timestamps in output.
    pub timestamps: bool,

    /// Include target module names in output.
    pub target: bool,

    pub thread_ids: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: None,
            format: TracingFormat::Pretty,
            timestamps: true,
            target: true,
            thread_ids: false,
        }
    }
}

impl TracingConfig {
    fn filter(&self) -> EnvFilter {
        match self.level {
            Some(level) => EnvFilter::new(level.to_string()),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        }
    }

    fn fmt_layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        let layer = fmt::layer()
            .with_target(self.target)
            .with_thread_ids(self.thread_ids);
        match (self.format, self.timestamps) {
            (TracingFormat::Pretty, true) => layer.pretty().boxed(),
            (TracingFormat::Pretty, false) => layer.pretty().without_time().boxed(),
            (TracingFormat::Compact, true) => layer.compact().boxed(),
            (TracingFormat::Compact, false) => layer.compact().without_time().boxed(),
            (TracingFormat::Json, true) => layer.json().boxed(),
            (TracingFormat::Json, false) => layer.json().without_time().boxed(),
        }
    }
}

/// Initialize a subscriber with default settings.
///
/// Uses the RUST_LOG environment variable, defaulting to "info". Does
/// nothing if a global subscriber is already installed.
///
/// # Environment Variables
///
/// - `RUST_LOG=debug` - Enable debug logs
/// - `RUST_LOG=xnft_bridge_host=trace` - Per-module filtering
pub fn init_subscriber() {
    if let Err(e) = try_init_subscriber_with_config(TracingConfig::default()) {
        tracing::debug!(error = %e, "Tracing subscriber already installed");
    }
}

/// Initialize a subscriber with custom configuration.
///
/// # Example
///
/// ```ignore
/// use xnft_bridge_host::tracing_support::{try_init_subscriber_with_config, TracingConfig, TracingFormat};
///
/// let config = TracingConfig {
///     format: TracingFormat::Json,
///     ..Default::default()
/// };
/// try_init_subscriber_with_config(config)?;
/// ```
pub fn try_init_subscriber_with_config(config: TracingConfig) -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(config.fmt_layer())
        .with(config.filter())
        .try_init()
}
