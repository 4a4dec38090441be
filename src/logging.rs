//! Structured logging for the deliberation engine.
//!
//! Mirrors `hive_ai::core::logging`: a `tracing-subscriber` registry with an
//! env-filter layer and an optional JSON layer, installed at most once per
//! process regardless of how many times `init` is called.

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static LOGGING_INITIALIZED: Once = Once::new();

/// Logging configuration for one process.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Default level when `RUST_LOG` is not set.
    pub default_level: Level,
    /// Emit structured JSON instead of the human-readable format.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default_level: Level::INFO,
            json: false,
        }
    }
}

/// Initialize the global tracing subscriber. Safe to call more than once;
/// only the first call takes effect.
pub fn init(config: LoggingConfig) {
    LOGGING_INITIALIZED.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.default_level.to_string()));

        let registry = tracing_subscriber::registry().with(filter);

        if config.json {
            let _ = registry.with(fmt::layer().json()).try_init();
        } else {
            let _ = registry.with(fmt::layer()).try_init();
        }
    });
}

/// Initialize with defaults (`INFO`, human-readable).
pub fn init_default() {
    init(LoggingConfig::default());
}
