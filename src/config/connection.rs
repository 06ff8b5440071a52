use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;

use crate::constants::DEFAULT_REQUEST_TIMEOUT_MS;
use crate::constants::DEFAULT_SESSION_TIMEOUT_MS;
use crate::Error;
use crate::Result;

/// Session and request timing parameters
#[derive(Debug, Deserialize, Clone)]
pub struct ConnectionConfig {
    /// Session timeout negotiated with the coordination service
    /// Default: 10 seconds
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u64,

    /// Deadline applied to every CRUD-style remote call
    /// Default: 10 seconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            session_timeout_ms: default_session_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl ConnectionConfig {
    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.session_timeout_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "session timeout must be > 0".to_string(),
            )));
        }
        if self.request_timeout_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "request timeout must be > 0".to_string(),
            )));
        }
        Ok(())
    }
}

fn default_session_timeout_ms() -> u64 {
    DEFAULT_SESSION_TIMEOUT_MS
}
fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}
