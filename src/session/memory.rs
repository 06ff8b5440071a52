//! In-process coordination service.
//!
//! [`MemoryEnsemble`] keeps a hierarchical node tree with versions, one-shot
//! watches, ephemeral and sequential nodes, and lets callers simulate the
//! failures the framework must survive:
//! - [`suspend`](MemoryEnsemble::suspend) drops every live session with a
//!   `Disconnected` event and refuses new connections until
//!   [`resume`](MemoryEnsemble::resume)
//! - [`expire_sessions`](MemoryEnsemble::expire_sessions) drops every live
//!   session with an `Expired` event
//!
//! Dropped sessions lose their watches (senders are dropped without firing)
//! and their ephemeral nodes.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tracing::debug;
use tracing::info;

use super::Connector;
use super::CreateMode;
use super::EstablishedSession;
use super::EventType;
use super::Session;
use super::Stat;
use super::WatchEvent;
use super::WatchReceiver;
use super::ANY_VERSION;
use crate::path::is_valid_path;
use crate::path::node_name;
use crate::path::parent_path;
use crate::ConnectionState;
use crate::RemoteError;
use crate::Result;

#[derive(Clone, Default)]
pub struct MemoryEnsemble {
    inner: Arc<EnsembleInner>,
}

struct EnsembleInner {
    tree: Mutex<Tree>,
    sessions: Mutex<HashMap<u64, mpsc::UnboundedSender<ConnectionState>>>,
    next_session_id: AtomicU64,
    available: AtomicBool,
    connects: AtomicUsize,
    reads: DashMap<String, usize>,
    latency: Mutex<Duration>,
}

impl Default for EnsembleInner {
    fn default() -> Self {
        Self {
            tree: Mutex::new(Tree::new()),
            sessions: Mutex::new(HashMap::new()),
            next_session_id: AtomicU64::new(1),
            available: AtomicBool::new(true),
            connects: AtomicUsize::new(0),
            reads: DashMap::new(),
            latency: Mutex::new(Duration::ZERO),
        }
    }
}

struct Node {
    data: Vec<u8>,
    stat: Stat,
}

struct Watcher {
    session_id: u64,
    tx: oneshot::Sender<WatchEvent>,
}

struct Tree {
    nodes: BTreeMap<String, Node>,
    /// Fired on create, delete and data change of the watched path
    data_watches: HashMap<String, Vec<Watcher>>,
    /// Fired on children change and delete of the watched path
    child_watches: HashMap<String, Vec<Watcher>>,
}

impl Tree {
    fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            "/".to_string(),
            Node {
                data: Vec::new(),
                stat: Stat::default(),
            },
        );
        Self {
            nodes,
            data_watches: HashMap::new(),
            child_watches: HashMap::new(),
        }
    }

    fn fire(
        watches: &mut HashMap<String, Vec<Watcher>>,
        path: &str,
        event_type: EventType,
    ) {
        if let Some(watchers) = watches.remove(path) {
            for watcher in watchers {
                let _ = watcher.tx.send(WatchEvent {
                    event_type,
                    path: path.to_string(),
                });
            }
        }
    }

    fn add_watch(
        watches: &mut HashMap<String, Vec<Watcher>>,
        path: &str,
        session_id: u64,
    ) -> WatchReceiver {
        let (tx, rx) = oneshot::channel();
        watches
            .entry(path.to_string())
            .or_default()
            .push(Watcher { session_id, tx });
        rx
    }

    fn children_of(
        &self,
        path: &str,
    ) -> Vec<String> {
        self.nodes
            .keys()
            .filter(|candidate| parent_path(candidate) == Some(path))
            .map(|child| node_name(child).to_string())
            .collect()
    }

    fn create(
        &mut self,
        path: &str,
        data: &[u8],
        mode: CreateMode,
        session_id: u64,
    ) -> Result<String> {
        if !is_valid_path(path) || path == "/" {
            return Err(RemoteError::BadArguments(path.to_string()).into());
        }
        let parent = parent_path(path).unwrap_or("/").to_string();
        let parent_node = self
            .nodes
            .get_mut(&parent)
            .ok_or_else(|| RemoteError::NoNode(parent.clone()))?;
        if parent_node.stat.ephemeral_owner != 0 {
            return Err(RemoteError::NoChildrenForEphemerals(parent).into());
        }

        let actual_path = if mode.is_sequential() {
            format!("{}{:010}", path, parent_node.stat.cversion)
        } else {
            path.to_string()
        };
        if self.nodes.contains_key(&actual_path) {
            return Err(RemoteError::NodeExists(actual_path).into());
        }

        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            parent_node.stat.cversion += 1;
            parent_node.stat.num_children += 1;
        }
        self.nodes.insert(
            actual_path.clone(),
            Node {
                data: data.to_vec(),
                stat: Stat {
                    data_length: data.len(),
                    ephemeral_owner: if mode.is_ephemeral() { session_id } else { 0 },
                    ..Stat::default()
                },
            },
        );

        Self::fire(&mut self.data_watches, &actual_path, EventType::NodeCreated);
        Self::fire(&mut self.child_watches, &parent, EventType::NodeChildrenChanged);
        Ok(actual_path)
    }

    fn set(
        &mut self,
        path: &str,
        data: &[u8],
        version: i32,
    ) -> Result<Stat> {
        let node = self
            .nodes
            .get_mut(path)
            .ok_or_else(|| RemoteError::NoNode(path.to_string()))?;
        if version != ANY_VERSION && version != node.stat.version {
            return Err(RemoteError::BadVersion {
                path: path.to_string(),
                expected: version,
                actual: node.stat.version,
            }
            .into());
        }
        node.data = data.to_vec();
        node.stat.version += 1;
        node.stat.data_length = data.len();
        let stat = node.stat;

        Self::fire(&mut self.data_watches, path, EventType::NodeDataChanged);
        Ok(stat)
    }

    fn delete(
        &mut self,
        path: &str,
        version: i32,
    ) -> Result<()> {
        if path == "/" {
            return Err(RemoteError::BadArguments(path.to_string()).into());
        }
        let node = self
            .nodes
            .get(path)
            .ok_or_else(|| RemoteError::NoNode(path.to_string()))?;
        if version != ANY_VERSION && version != node.stat.version {
            return Err(RemoteError::BadVersion {
                path: path.to_string(),
                expected: version,
                actual: node.stat.version,
            }
            .into());
        }
        if node.stat.num_children > 0 {
            return Err(RemoteError::NotEmpty(path.to_string()).into());
        }

        self.nodes.remove(path);
        let parent = parent_path(path).unwrap_or("/").to_string();
        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            parent_node.stat.cversion += 1;
            parent_node.stat.num_children = parent_node.stat.num_children.saturating_sub(1);
        }

        Self::fire(&mut self.data_watches, path, EventType::NodeDeleted);
        Self::fire(&mut self.child_watches, path, EventType::NodeDeleted);
        Self::fire(&mut self.child_watches, &parent, EventType::NodeChildrenChanged);
        Ok(())
    }

    /// Drops the watches and ephemeral nodes of a session that is gone.
    fn release_session(
        &mut self,
        session_id: u64,
    ) {
        for watchers in self.data_watches.values_mut() {
            watchers.retain(|w| w.session_id != session_id);
        }
        for watchers in self.child_watches.values_mut() {
            watchers.retain(|w| w.session_id != session_id);
        }

        let ephemerals: Vec<String> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.stat.ephemeral_owner == session_id)
            .map(|(path, _)| path.clone())
            .collect();
        for path in ephemerals {
            if let Err(e) = self.delete(&path, ANY_VERSION) {
                debug!("release ephemeral {} failed: {:?}", path, e);
            }
        }
    }
}

impl MemoryEnsemble {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every live session with a `Disconnected` event and refuses new
    /// connections until [`resume`](Self::resume).
    pub fn suspend(&self) {
        info!("memory ensemble suspended");
        self.inner.available.store(false, Ordering::SeqCst);
        self.drop_sessions(ConnectionState::Disconnected);
    }

    pub fn resume(&self) {
        info!("memory ensemble resumed");
        self.inner.available.store(true, Ordering::SeqCst);
    }

    /// Drops every live session with an `Expired` event. New connections are
    /// still accepted.
    pub fn expire_sessions(&self) {
        info!("memory ensemble expiring all sessions");
        self.drop_sessions(ConnectionState::Expired);
    }

    /// Delay applied before every node operation
    pub fn set_latency(
        &self,
        latency: Duration,
    ) {
        *self.inner.latency.lock() = latency;
    }

    /// Number of sessions successfully opened so far
    pub fn connect_count(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }

    pub fn live_sessions(&self) -> usize {
        self.inner.sessions.lock().len()
    }

    /// Number of `get` calls served for `path`
    pub fn read_count(
        &self,
        path: &str,
    ) -> usize {
        self.inner.reads.get(path).map(|count| *count).unwrap_or(0)
    }

    /// Reads a node bypassing sessions
    pub fn node_data(
        &self,
        path: &str,
    ) -> Option<Vec<u8>> {
        self.inner.tree.lock().nodes.get(path).map(|node| node.data.clone())
    }

    fn drop_sessions(
        &self,
        state: ConnectionState,
    ) {
        let sessions: Vec<(u64, mpsc::UnboundedSender<ConnectionState>)> =
            self.inner.sessions.lock().drain().collect();
        let mut tree = self.inner.tree.lock();
        for (session_id, events) in sessions {
            debug!("dropping session {} with {}", session_id, state);
            tree.release_session(session_id);
            let _ = events.send(state);
        }
    }
}

#[async_trait]
impl Connector for MemoryEnsemble {
    async fn connect(
        &self,
        url: &str,
        session_timeout: Duration,
    ) -> Result<EstablishedSession> {
        if !self.inner.available.load(Ordering::SeqCst) {
            debug!("memory ensemble refuses connection from {}", url);
            return Err(RemoteError::ConnectionLoss.into());
        }

        let session_id = self.inner.next_session_id.fetch_add(1, Ordering::SeqCst);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let _ = events_tx.send(ConnectionState::Connecting);
        let _ = events_tx.send(ConnectionState::Connected);
        self.inner.sessions.lock().insert(session_id, events_tx);
        self.inner.connects.fetch_add(1, Ordering::SeqCst);

        debug!(
            "memory ensemble opened session {} for {} (timeout {:?})",
            session_id, url, session_timeout
        );
        Ok(EstablishedSession {
            session: Arc::new(MemorySession {
                id: session_id,
                ensemble: self.inner.clone(),
                closed: AtomicBool::new(false),
            }),
            events: events_rx,
        })
    }
}

pub struct MemorySession {
    id: u64,
    ensemble: Arc<EnsembleInner>,
    closed: AtomicBool,
}

impl MemorySession {
    async fn enter(&self) -> Result<()> {
        let latency = *self.ensemble.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if self.closed.load(Ordering::SeqCst) {
            return Err(RemoteError::Closed.into());
        }
        if !self.ensemble.sessions.lock().contains_key(&self.id) {
            return Err(RemoteError::ConnectionLoss.into());
        }
        Ok(())
    }
}

#[async_trait]
impl Session for MemorySession {
    fn id(&self) -> u64 {
        self.id
    }

    async fn get(
        &self,
        path: &str,
    ) -> Result<(Vec<u8>, Stat)> {
        self.enter().await?;
        *self.ensemble.reads.entry(path.to_string()).or_insert(0) += 1;
        let tree = self.ensemble.tree.lock();
        let node = tree
            .nodes
            .get(path)
            .ok_or_else(|| RemoteError::NoNode(path.to_string()))?;
        Ok((node.data.clone(), node.stat))
    }

    async fn set(
        &self,
        path: &str,
        data: &[u8],
        version: i32,
    ) -> Result<Stat> {
        self.enter().await?;
        self.ensemble.tree.lock().set(path, data, version)
    }

    async fn create(
        &self,
        path: &str,
        data: &[u8],
        mode: CreateMode,
    ) -> Result<String> {
        self.enter().await?;
        self.ensemble.tree.lock().create(path, data, mode, self.id)
    }

    async fn delete(
        &self,
        path: &str,
        version: i32,
    ) -> Result<()> {
        self.enter().await?;
        self.ensemble.tree.lock().delete(path, version)
    }

    async fn exists(
        &self,
        path: &str,
    ) -> Result<Option<Stat>> {
        self.enter().await?;
        Ok(self.ensemble.tree.lock().nodes.get(path).map(|node| node.stat))
    }

    async fn exists_w(
        &self,
        path: &str,
    ) -> Result<(Option<Stat>, WatchReceiver)> {
        self.enter().await?;
        let mut tree = self.ensemble.tree.lock();
        let stat = tree.nodes.get(path).map(|node| node.stat);
        let rx = Tree::add_watch(&mut tree.data_watches, path, self.id);
        Ok((stat, rx))
    }

    async fn children(
        &self,
        path: &str,
    ) -> Result<Vec<String>> {
        self.enter().await?;
        let tree = self.ensemble.tree.lock();
        if !tree.nodes.contains_key(path) {
            return Err(RemoteError::NoNode(path.to_string()).into());
        }
        Ok(tree.children_of(path))
    }

    async fn children_w(
        &self,
        path: &str,
    ) -> Result<(Vec<String>, WatchReceiver)> {
        self.enter().await?;
        let mut tree = self.ensemble.tree.lock();
        if !tree.nodes.contains_key(path) {
            return Err(RemoteError::NoNode(path.to_string()).into());
        }
        let children = tree.children_of(path);
        let rx = Tree::add_watch(&mut tree.child_watches, path, self.id);
        Ok((children, rx))
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let removed = self.ensemble.sessions.lock().remove(&self.id);
        if removed.is_some() {
            self.ensemble.tree.lock().release_session(self.id);
        }
        debug!("memory session {} closed", self.id);
    }
}
