//! On-disk logging configuration.
//!
//! Thin: the gateway itself only decides *what* to emit through `tracing`
//! macros; wiring an actual subscriber (`tracing_subscriber::fmt`/`EnvFilter`)
//! is the embedding application's job, keeping the split between installing
//! a subscriber and emitting events.

use serde::{Deserialize, Serialize};

fn default_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// An `EnvFilter`-compatible directive string, e.g. `"info"` or
    /// `"gatewayrs=debug,reqwest=warn"`.
    #[serde(default = "default_level")]
    pub level: String,
    /// Emit newline-delimited JSON instead of the default human-readable
    /// format, for log aggregators.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
        }
    }
}

/// Installs a global `tracing_subscriber` per this configuration. Call at
/// most once per process; a second call is a no-op error the caller can
/// safely ignore.
pub fn init_tracing(config: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_new(&config.level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    let result = if config.json {
        subscriber.json().try_init()
    } else {
        subscriber.try_init()
    };
    if let Err(e) = result {
        tracing::debug!("tracing subscriber already initialized: {e}");
    }
}
