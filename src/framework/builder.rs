use std::sync::Arc;
use std::time::Duration;

use super::Framework;
use super::Namespace;
use crate::Connector;
use crate::FrameworkConfig;
use crate::FrameworkError;
use crate::ReconnectPolicy;
use crate::Result;

pub struct FrameworkBuilder {
    url: String,
    namespace: Namespace,
    config: FrameworkConfig,
    connector: Arc<dyn Connector>,
}

impl FrameworkBuilder {
    /// Create a new builder with default config, rooted at `/`
    pub fn new(
        url: impl Into<String>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            url: url.into(),
            namespace: Namespace::default(),
            config: FrameworkConfig::default(),
            connector,
        }
    }

    /// Root every path under the namespace built from `segments`
    pub fn namespace<I, S>(
        mut self,
        segments: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.namespace = Namespace::new(segments);
        self
    }

    /// Set session timeout (default: 10s)
    pub fn session_timeout(
        mut self,
        timeout: Duration,
    ) -> Self {
        self.config.connection.session_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the deadline of every CRUD-style call (default: 10s)
    pub fn request_timeout(
        mut self,
        timeout: Duration,
    ) -> Self {
        self.config.connection.request_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn reconnect_policy(
        mut self,
        policy: ReconnectPolicy,
    ) -> Self {
        self.config.reconnect = policy;
        self
    }

    /// Completely replaces the default configuration, discarding anything set
    /// through [`session_timeout`](Self::session_timeout),
    /// [`request_timeout`](Self::request_timeout) or
    /// [`reconnect_policy`](Self::reconnect_policy) before this call.
    pub fn set_config(
        mut self,
        config: FrameworkConfig,
    ) -> Self {
        self.config = config;
        self
    }

    /// Build the framework. Nothing is connected until
    /// [`Framework::start`].
    ///
    /// # Errors
    /// - [`FrameworkError::InvalidConnectionURL`] when the url is empty
    /// - [`crate::Error::Config`] when the configuration is invalid
    pub fn build(self) -> Result<Framework> {
        if self.url.is_empty() {
            return Err(FrameworkError::InvalidConnectionURL.into());
        }
        self.config.validate()?;
        Ok(Framework::new(self.url, self.namespace, self.config, self.connector))
    }
}
