//! Logging configuration.

use serde::{Deserialize, Serialize};

/// Console logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default log level (overridden by `RUST_LOG` if set).
    pub default_level: String,
    /// Human-readable pretty output instead of JSONL.
    pub pretty: bool,
    /// Include ANSI colors (only meaningful with `pretty`).
    pub ansi: bool,
    /// Include file/line location on each event.
    pub include_location: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            default_level: "info".to_string(),
            pretty: false,
            ansi: false,
            include_location: true,
        }
    }
}

impl LogConfig {
    /// Verbose, human-readable output for local development.
    pub fn development() -> Self {
        Self {
            default_level: "debug".to_string(),
            pretty: true,
            ansi: true,
            include_location: true,
        }
    }

    /// Quiet, JSONL output suitable for test runs.
    pub fn testing() -> Self {
        Self {
            default_level: "warn".to_string(),
            pretty: false,
            ansi: false,
            include_location: false,
        }
    }
}
