//! Contract of the remote coordination service.
//!
//! The framework never speaks a wire protocol itself. A [`Connector`] opens
//! sessions, each session reports its raw [`ConnectionState`] changes on an
//! event channel, and the [`Session`] trait exposes the node primitives the
//! framework is built on:
//! - plain reads and writes (`get`, `set`, `create`, `delete`, `exists`,
//!   `children`)
//! - one-shot watches (`exists_w`, `children_w`), delivered through a
//!   [`WatchReceiver`]. A watch whose sender is dropped without firing
//!   belongs to a session that is gone.
//!
//! [`MemoryEnsemble`] is an in-process implementation of the contract.

mod memory;
pub use memory::*;


use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::sync::mpsc;
use tokio::sync::oneshot;

use crate::ConnectionState;
use crate::Result;

/// Matches any node version in `set` and `delete`
pub const ANY_VERSION: i32 = -1;

/// Node change notifications, with the service's stable numeric codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventType {
    NodeCreated = 1,
    NodeDeleted = 2,
    NodeDataChanged = 3,
    NodeChildrenChanged = 4,
}

impl EventType {
    /// Every node event type, in code order
    pub const ALL: [EventType; 4] = [
        EventType::NodeCreated,
        EventType::NodeDeleted,
        EventType::NodeDataChanged,
        EventType::NodeChildrenChanged,
    ];

    pub fn code(&self) -> i32 {
        *self as i32
    }
}

impl fmt::Display for EventType {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let name = match self {
            EventType::NodeCreated => "EventNodeCreated",
            EventType::NodeDeleted => "EventNodeDeleted",
            EventType::NodeDataChanged => "EventNodeDataChanged",
            EventType::NodeChildrenChanged => "EventNodeChildrenChanged",
        };
        f.write_str(name)
    }
}

/// A fired watch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub event_type: EventType,
    /// Absolute path of the node the watch was armed on
    pub path: String,
}

pub type WatchReceiver = oneshot::Receiver<WatchEvent>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CreateMode {
    #[default]
    Persistent,
    Ephemeral,
    PersistentSequential,
    EphemeralSequential,
    /// Persistent node meant to hold children only
    Container,
}

impl CreateMode {
    pub fn is_ephemeral(&self) -> bool {
        matches!(self, CreateMode::Ephemeral | CreateMode::EphemeralSequential)
    }

    pub fn is_sequential(&self) -> bool {
        matches!(self, CreateMode::PersistentSequential | CreateMode::EphemeralSequential)
    }
}

/// Node metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stat {
    /// Data version, bumped by every `set`
    pub version: i32,
    /// Children version, bumped by every child create or delete
    pub cversion: i32,
    pub data_length: usize,
    pub num_children: usize,
    /// Owning session id for ephemeral nodes, 0 otherwise
    pub ephemeral_owner: u64,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Session: Send + Sync + 'static {
    fn id(&self) -> u64;

    async fn get(
        &self,
        path: &str,
    ) -> Result<(Vec<u8>, Stat)>;

    async fn set(
        &self,
        path: &str,
        data: &[u8],
        version: i32,
    ) -> Result<Stat>;

    /// Returns the path actually created, which differs from `path` for
    /// sequential modes
    async fn create(
        &self,
        path: &str,
        data: &[u8],
        mode: CreateMode,
    ) -> Result<String>;

    async fn delete(
        &self,
        path: &str,
        version: i32,
    ) -> Result<()>;

    async fn exists(
        &self,
        path: &str,
    ) -> Result<Option<Stat>>;

    /// Like `exists`, arming a watch that fires on creation, deletion or data
    /// change of `path`. The watch is armed whether or not the node exists.
    async fn exists_w(
        &self,
        path: &str,
    ) -> Result<(Option<Stat>, WatchReceiver)>;

    async fn children(
        &self,
        path: &str,
    ) -> Result<Vec<String>>;

    /// Like `children`, arming a watch that fires when the children of
    /// `path` change or when `path` is deleted.
    async fn children_w(
        &self,
        path: &str,
    ) -> Result<(Vec<String>, WatchReceiver)>;

    /// Ends the session. Outstanding watches are dropped without firing.
    async fn close(&self);
}

/// A freshly opened session and the stream of its raw state changes
pub struct EstablishedSession {
    pub session: Arc<dyn Session>,
    pub events: mpsc::UnboundedReceiver<ConnectionState>,
}

#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(
        &self,
        url: &str,
        session_timeout: Duration,
    ) -> Result<EstablishedSession>;
}
