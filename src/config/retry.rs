use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;

use crate::constants::DEFAULT_RECONNECT_BASE_DELAY_MS;
use crate::constants::DEFAULT_RECONNECT_JITTER_RATIO;
use crate::constants::DEFAULT_RECONNECT_MAX_DELAY_MS;
use crate::Error;
use crate::Result;

/// Backoff policy of the automatic reconnection loop.
///
/// Retries are unlimited while the framework is started; the delay starts at
/// `base_delay_ms`, doubles after every consecutive failure, never exceeds
/// `max_delay_ms` and is spread by `jitter_ratio` in both directions.
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct ReconnectPolicy {
    /// Backoff base (unit: milliseconds)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Maximum backoff time (unit: milliseconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Random spread applied to each delay, in `[0.0, 1.0)`
    #[serde(default = "default_jitter_ratio")]
    pub jitter_ratio: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_ratio: default_jitter_ratio(),
        }
    }
}

impl ReconnectPolicy {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.base_delay_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "reconnect base delay must be > 0".to_string(),
            )));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(Error::Config(ConfigError::Message(format!(
                "reconnect max delay {}ms must not be below base delay {}ms",
                self.max_delay_ms, self.base_delay_ms
            ))));
        }
        if !(0.0..1.0).contains(&self.jitter_ratio) {
            return Err(Error::Config(ConfigError::Message(format!(
                "reconnect jitter ratio {} must be within [0.0, 1.0)",
                self.jitter_ratio
            ))));
        }
        Ok(())
    }
}

fn default_base_delay_ms() -> u64 {
    DEFAULT_RECONNECT_BASE_DELAY_MS
}
fn default_max_delay_ms() -> u64 {
    DEFAULT_RECONNECT_MAX_DELAY_MS
}
fn default_jitter_ratio() -> f64 {
    DEFAULT_RECONNECT_JITTER_RATIO
}
