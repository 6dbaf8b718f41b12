//! Console logging bootstrap shared by meshline binaries, examples, and tests.
//!
//! A trimmed-down cousin of a fuller multi-instance JSONL/OTel logging stack:
//! this crate keeps the console subscriber builder and JSONL-by-default
//! convention but drops file rotation, correlation IDs, and distributed
//! tracing export, none of which this overlay subsystem needs.
//!
//! # Quick start
//!
//! ```ignore
//! use meshline_logging::{LogConfig, MeshlineSubscriberBuilder};
//!
//! MeshlineSubscriberBuilder::new().init();
//!
//! MeshlineSubscriberBuilder::new()
//!     .with_config(LogConfig::development())
//!     .init();
//! ```

pub mod config;

pub use config::LogConfig;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Builder for configuring and initializing the meshline console subscriber.
pub struct MeshlineSubscriberBuilder {
    config: LogConfig,
}

impl MeshlineSubscriberBuilder {
    pub fn new() -> Self {
        Self {
            config: LogConfig::default(),
        }
    }

    pub fn with_config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.config.default_level = level.into();
        self
    }

    /// Initialize the subscriber as the global default.
    ///
    /// # Panics
    ///
    /// Panics if a global subscriber has already been set.
    pub fn init(self) {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&self.config.default_level));

        let registry = Registry::default().with(env_filter);

        if self.config.pretty {
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(self.config.ansi)
                .with_file(self.config.include_location)
                .with_line_number(self.config.include_location)
                .with_target(true);
            registry.with(layer).init();
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .flatten_event(true)
                .with_file(self.config.include_location)
                .with_line_number(self.config.include_location);
            registry.with(layer).init();
        }
    }

    /// Initialize the subscriber, returning `Err` instead of panicking if a
    /// global subscriber is already set.
    pub fn try_init(self) -> Result<(), &'static str> {
        // `tracing_subscriber::util::TryInitError` isn't `Sync`-friendly to
        // bubble through a generic error here, so callers that care about
        // double-init get a simple sentinel.
        if tracing::dispatcher::has_been_set() {
            return Err("global subscriber already set");
        }
        self.init();
        Ok(())
    }
}

impl Default for MeshlineSubscriberBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Initialize logging with default settings (JSONL to console).
pub fn init_default() {
    MeshlineSubscriberBuilder::new().init();
}

/// Initialize logging for local development (verbose, pretty console output).
pub fn init_development() {
    MeshlineSubscriberBuilder::new()
        .with_config(LogConfig::development())
        .init();
}

/// Initialize logging for test runs (quiet, best-effort).
pub fn init_testing() {
    let _ = MeshlineSubscriberBuilder::new()
        .with_config(LogConfig::testing())
        .try_init();
}
