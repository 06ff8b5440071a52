//! Configuration management for the framework.
//!
//! Settings are layered with increasing priority:
//! 1. Default values (hardcoded)
//! 2. An optional TOML file
//! 3. Environment variables prefixed with `ZKF`, nested with `__`
//!    (e.g. `ZKF__RECONNECT__BASE_DELAY_MS=250`)

mod cache;
mod connection;
mod retry;
pub use cache::*;
pub use connection::*;
pub use retry::*;


//---
use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;

use crate::constants::CONFIG_ENV_PREFIX;
use crate::Result;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct FrameworkConfig {
    /// Session and per-call timeouts
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Reconnection backoff policy
    #[serde(default)]
    pub reconnect: ReconnectPolicy,
    /// Default options for caches built on this framework
    #[serde(default)]
    pub cache: CacheConfig,
}

impl FrameworkConfig {
    /// Load configuration from the optional file at `path` and the
    /// environment, on top of hardcoded defaults.
    ///
    /// # Errors
    /// Returns [`crate::Error::Config`] when a source cannot be parsed or the
    /// merged result fails validation.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(CONFIG_ENV_PREFIX)
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let config: FrameworkConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.connection.validate()?;
        self.reconnect.validate()?;
        self.cache.validate()?;
        Ok(())
    }
}
