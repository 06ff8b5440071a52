//! Framework Error Hierarchy
//!
//! Defines the error types surfaced by the connection manager, the listener
//! registries, the CRUD collaborator, the watch manager and the cache,
//! categorized by the component that raises them.

use std::time::Duration;

use config::ConfigError;
use tokio::task::JoinError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Connection manager lifecycle failures
    #[error(transparent)]
    Framework(#[from] FrameworkError),

    /// Listener registry bookkeeping failures
    #[error(transparent)]
    Listener(#[from] ListenerError),

    /// CRUD and watch operation failures raised by the framework itself
    #[error(transparent)]
    Operation(#[from] OperationError),

    /// Cache construction and configuration failures
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Errors reported by the coordination service, passed through untouched
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Configuration loading failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A short lived operation task panicked or was aborted
    #[error("Background task failed: {0}")]
    TaskFailed(#[from] JoinError),

    /// Unrecoverable failures
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum FrameworkError {
    /// A connection url is invalid when it is empty
    #[error("invalid connection URL")]
    InvalidConnectionURL,

    #[error("connection timeout after {0:?}")]
    ConnectionTimeout(Duration),

    #[error("framework already started")]
    AlreadyStarted,

    #[error("framework not yet started")]
    NotYetStarted,
}

#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("listener already exists: {0}")]
    AlreadyExists(String),

    #[error("listener not found: {0}")]
    NotFound(String),
}

#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    /// No live session is available to run the operation
    #[error("framework not ready")]
    FrameworkNotReady,

    #[error("unknown node: {0}")]
    UnknownNode(String),

    /// The fixed per-call deadline elapsed before the remote call returned
    #[error("{operation} on {path} exceeded deadline of {timeout:?}")]
    DeadlineExceeded {
        operation: &'static str,
        path: String,
        timeout: Duration,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("invalid cache size: {0}")]
    InvalidCacheSize(i64),

    #[error("invalid eviction policy: {0}")]
    InvalidEvictionPolicy(String),
}

/// Errors of the coordination service itself.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("node does not exist: {0}")]
    NoNode(String),

    #[error("node already exists: {0}")]
    NodeExists(String),

    #[error("node has children: {0}")]
    NotEmpty(String),

    #[error("version conflict on {path}: expected {expected}, actual {actual}")]
    BadVersion { path: String, expected: i32, actual: i32 },

    #[error("ephemeral nodes may not have children: {0}")]
    NoChildrenForEphemerals(String),

    #[error("connection loss")]
    ConnectionLoss,

    #[error("session expired")]
    SessionExpired,

    #[error("session closed")]
    Closed,

    #[error("invalid path: {0}")]
    BadArguments(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn is_invalid_connection_url(&self) -> bool {
        matches!(self, Error::Framework(FrameworkError::InvalidConnectionURL))
    }

    pub fn is_connection_timeout(&self) -> bool {
        matches!(self, Error::Framework(FrameworkError::ConnectionTimeout(_)))
    }

    pub fn is_framework_already_started(&self) -> bool {
        matches!(self, Error::Framework(FrameworkError::AlreadyStarted))
    }

    pub fn is_framework_not_yet_started(&self) -> bool {
        matches!(self, Error::Framework(FrameworkError::NotYetStarted))
    }

    pub fn is_listener_already_exists(&self) -> bool {
        matches!(self, Error::Listener(ListenerError::AlreadyExists(_)))
    }

    pub fn is_listener_not_found(&self) -> bool {
        matches!(self, Error::Listener(ListenerError::NotFound(_)))
    }

    pub fn is_framework_not_ready(&self) -> bool {
        matches!(self, Error::Operation(OperationError::FrameworkNotReady))
    }

    pub fn is_unknown_node(&self) -> bool {
        matches!(self, Error::Operation(OperationError::UnknownNode(_)))
    }

    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, Error::Operation(OperationError::DeadlineExceeded { .. }))
    }

    pub fn is_invalid_cache_size(&self) -> bool {
        matches!(self, Error::Cache(CacheError::InvalidCacheSize(_)))
    }

    pub fn is_invalid_eviction_policy(&self) -> bool {
        matches!(self, Error::Cache(CacheError::InvalidEvictionPolicy(_)))
    }

    /// Returns the service error when this error was passed through from the
    /// coordination service.
    pub fn as_remote(&self) -> Option<&RemoteError> {
        match self {
            Error::Remote(e) => Some(e),
            _ => None,
        }
    }
}
