//! Connection manager of the coordination service.
//!
//! A [`Framework`] owns the remote session, runs the connection state machine
//! and recovers lost sessions without caller intervention:
//! - [`start`](Framework::start) opens a session and spawns two background
//!   tasks: one ingesting raw session events, one serializing every state
//!   transition
//! - transitions are published to [`StatusChangeListener`]s and to every task
//!   blocked in [`wait_connection`](Framework::wait_connection)
//! - on the edge "was connected, now not connected" the transition task tears
//!   the session down and reconnects with exponential backoff
//! - [`stop`](Framework::stop) notifies [`ShutdownListener`]s, closes the
//!   session and clears both listener registries
//!
//! # Basic Usage
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use zk_framework::create_framework;
//! use zk_framework::MemoryEnsemble;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let ensemble = Arc::new(MemoryEnsemble::new());
//!     let framework = create_framework("memory://local", ensemble, ["apps", "billing"]).unwrap();
//!
//!     framework.start().await.unwrap();
//!     framework.wait_connection(Duration::from_secs(5)).await.unwrap();
//!
//!     framework.operations().create("config").await.unwrap();
//!     framework.stop().await.unwrap();
//! }
//! ```

mod builder;
mod listener;
mod namespace;
mod state;

pub use builder::*;
pub use listener::*;
pub use namespace::*;
pub(crate) use state::StateTracker;
pub(crate) use state::Transition;
pub use state::ConnectionState;


use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::async_task::spawn_task;
use crate::async_task::ExponentialBackoff;
use crate::metrics::RECONNECT_ATTEMPTS;
use crate::metrics::STATE_TRANSITIONS;
use crate::Connector;
use crate::FrameworkConfig;
use crate::FrameworkError;
use crate::Operations;
use crate::Result;
use crate::Session;

/// Capacity of the per-waiter state event queue
const STATE_EVENTS_CAPACITY: usize = 64;

/// Creates a framework for `url` rooted at the namespace built from
/// `namespace` segments, with default configuration.
///
/// # Errors
/// [`FrameworkError::InvalidConnectionURL`] when `url` is empty.
pub fn create_framework<I, S>(
    url: &str,
    connector: Arc<dyn Connector>,
    namespace: I,
) -> Result<Framework>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    FrameworkBuilder::new(url, connector).namespace(namespace).build()
}

/// How a [`Framework::wait_connection`] call ended without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The session reached a connected state
    Connected,
    /// The framework was stopped before any connection was made
    Shutdown,
}

impl WaitOutcome {
    pub fn is_connected(&self) -> bool {
        matches!(self, WaitOutcome::Connected)
    }
}

/// Handle to one framework instance. Cloning is cheap and every clone drives
/// the same session.
#[derive(Clone)]
pub struct Framework {
    pub(crate) inner: Arc<FrameworkInner>,
}

struct SessionHandle {
    session: Arc<dyn Session>,
}

pub(crate) struct FrameworkInner {
    url: String,
    namespace: Namespace,
    config: FrameworkConfig,
    connector: Arc<dyn Connector>,

    started: AtomicBool,
    state: RwLock<StateTracker>,
    // Serializes read-modify-notify sequences on `state`
    transition_lock: tokio::sync::Mutex<()>,
    backoff: Mutex<ExponentialBackoff>,

    // Replaced wholesale on every (re)connect
    session: ArcSwapOption<SessionHandle>,
    // Fan-out of applied transitions to connection waiters
    state_events: broadcast::Sender<ConnectionState>,
    // Root of every background task of the current run
    shutdown: Mutex<CancellationToken>,

    status_change_listeners: ListenerRegistry<dyn StatusChangeListener>,
    shutdown_listeners: ListenerRegistry<dyn ShutdownListener>,
}

impl Framework {
    pub(crate) fn new(
        url: String,
        namespace: Namespace,
        config: FrameworkConfig,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let (state_events, _) = broadcast::channel(STATE_EVENTS_CAPACITY);
        let backoff = ExponentialBackoff::new(config.reconnect);
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        Framework {
            inner: Arc::new(FrameworkInner {
                url,
                namespace,
                config,
                connector,
                started: AtomicBool::new(false),
                state: RwLock::new(StateTracker::default()),
                transition_lock: tokio::sync::Mutex::new(()),
                backoff: Mutex::new(backoff),
                session: ArcSwapOption::empty(),
                state_events,
                shutdown: Mutex::new(shutdown),
                status_change_listeners: ListenerRegistry::new("status change"),
                shutdown_listeners: ListenerRegistry::new("shutdown"),
            }),
        }
    }

    pub fn builder(
        url: impl Into<String>,
        connector: Arc<dyn Connector>,
    ) -> FrameworkBuilder {
        FrameworkBuilder::new(url, connector)
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    pub fn namespace(&self) -> &Namespace {
        &self.inner.namespace
    }

    pub fn config(&self) -> &FrameworkConfig {
        &self.inner.config
    }

    pub fn started(&self) -> bool {
        self.inner.started.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state.read().current()
    }

    pub fn previous_state(&self) -> ConnectionState {
        self.inner.state.read().previous()
    }

    pub fn connected(&self) -> bool {
        self.state().is_connected()
    }

    /// The live session, if any. Callers must not keep it across calls: it is
    /// replaced on every reconnect.
    pub fn session(&self) -> Option<Arc<dyn Session>> {
        self.inner.session.load_full().map(|handle| handle.session.clone())
    }

    /// CRUD operations against this framework's namespace
    pub fn operations(&self) -> Operations {
        Operations::new(self.clone())
    }

    /// Opens the session and spawns the background tasks.
    ///
    /// # Errors
    /// - [`FrameworkError::AlreadyStarted`] when already running
    /// - the connector error when the initial connect fails; the framework is
    ///   then left stopped
    pub async fn start(&self) -> Result<()> {
        let inner = &self.inner;
        let _guard = inner.transition_lock.lock().await;
        if inner.started.load(Ordering::SeqCst) {
            return Err(FrameworkError::AlreadyStarted.into());
        }

        info!("connecting to coordination service at {}", inner.url);
        let shutdown = CancellationToken::new();
        *inner.shutdown.lock() = shutdown.clone();
        inner.backoff.lock().reset();
        inner.started.store(true, Ordering::SeqCst);

        if let Err(e) = inner.clone().connect(&shutdown).await {
            error!("initial connection to {} failed: {}", inner.url, e);
            inner.started.store(false, Ordering::SeqCst);
            shutdown.cancel();
            return Err(e);
        }
        Ok(())
    }

    /// Waits until the session is connected, the framework stops, or
    /// `timeout` elapses.
    ///
    /// # Errors
    /// - [`FrameworkError::NotYetStarted`] when [`start`](Self::start) was
    ///   never called, whatever the timeout
    /// - [`FrameworkError::ConnectionTimeout`] when `timeout` elapses first
    pub async fn wait_connection(
        &self,
        timeout: Duration,
    ) -> Result<WaitOutcome> {
        if !self.started() {
            return Err(FrameworkError::NotYetStarted.into());
        }

        // Subscribe before checking so no transition slips in between
        let mut events = self.inner.state_events.subscribe();
        if self.connected() {
            return Ok(WaitOutcome::Connected);
        }
        let shutdown = self.inner.shutdown.lock().clone();

        info!("waiting for connection to {}", self.inner.url);
        let deadline = sleep(timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    debug!("stopped while waiting for connection to {}", self.inner.url);
                    return Ok(WaitOutcome::Shutdown);
                }
                event = events.recv() => match event {
                    Ok(state) if state.is_connected() => {
                        info!("connected to {}", self.inner.url);
                        return Ok(WaitOutcome::Connected);
                    }
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        debug!("connection waiter lagged by {} events", skipped);
                        if self.connected() {
                            return Ok(WaitOutcome::Connected);
                        }
                    }
                    Err(RecvError::Closed) => return Ok(WaitOutcome::Shutdown),
                },
                _ = &mut deadline => {
                    return Err(FrameworkError::ConnectionTimeout(timeout).into());
                }
            }
        }
    }

    /// Stops the background tasks, notifies shutdown listeners, closes the
    /// session and clears both listener registries.
    ///
    /// # Errors
    /// [`FrameworkError::NotYetStarted`] when not running.
    pub async fn stop(&self) -> Result<()> {
        let inner = &self.inner;
        let _guard = inner.transition_lock.lock().await;
        if !inner.started.swap(false, Ordering::SeqCst) {
            return Err(FrameworkError::NotYetStarted.into());
        }

        info!("closing connection to {}", inner.url);
        inner.shutdown.lock().cancel();
        inner.shutdown_listeners.notify(|listener| listener.on_shutdown());

        if let Some(handle) = inner.session.swap(None) {
            handle.session.close().await;
        }

        inner.status_change_listeners.clear();
        inner.shutdown_listeners.clear();
        inner.state.write().apply(ConnectionState::Disconnected);
        Ok(())
    }

    pub fn add_status_change_listener(
        &self,
        listener: Arc<dyn StatusChangeListener>,
    ) -> Result<()> {
        self.inner.status_change_listeners.add(listener)
    }

    pub fn remove_status_change_listener(
        &self,
        listener: &dyn StatusChangeListener,
    ) -> Result<()> {
        self.inner.status_change_listeners.remove(listener.id())
    }

    /// Invokes every status-change listener with the current transition
    pub fn notify_status_change(&self) {
        let (previous, current) = {
            let state = self.inner.state.read();
            (state.previous(), state.current())
        };
        self.inner
            .status_change_listeners
            .notify(|listener| listener.on_status_change(previous, current));
    }

    pub fn add_shutdown_listener(
        &self,
        listener: Arc<dyn ShutdownListener>,
    ) -> Result<()> {
        self.inner.shutdown_listeners.add(listener)
    }

    pub fn remove_shutdown_listener(
        &self,
        listener: &dyn ShutdownListener,
    ) -> Result<()> {
        self.inner.shutdown_listeners.remove(listener.id())
    }

    pub fn notify_shutdown(&self) {
        self.inner
            .shutdown_listeners
            .notify(|listener| listener.on_shutdown());
    }

    pub(crate) fn has_status_change_listener(
        &self,
        id: &str,
    ) -> bool {
        self.inner.status_change_listeners.contains(id)
    }

    pub(crate) fn has_shutdown_listener(
        &self,
        id: &str,
    ) -> bool {
        self.inner.shutdown_listeners.contains(id)
    }

    #[cfg(test)]
    pub(crate) fn listener_counts(&self) -> (usize, usize) {
        (
            self.inner.status_change_listeners.len(),
            self.inner.shutdown_listeners.len(),
        )
    }
}

impl FrameworkInner {
    /// Opens a session and spawns its ingestion and transition tasks under a
    /// child of `shutdown`.
    async fn connect(
        self: Arc<Self>,
        shutdown: &CancellationToken,
    ) -> Result<()> {
        let established = self
            .connector
            .connect(&self.url, self.config.connection.session_timeout())
            .await?;
        debug!("session {} opened with {}", established.session.id(), self.url);

        self.session.store(Some(Arc::new(SessionHandle {
            session: established.session,
        })));

        let connection_token = shutdown.child_token();
        let (transitions_tx, transitions_rx) = mpsc::unbounded_channel();

        spawn_task(
            "event_ingestion",
            Self::ingest_events(established.events, transitions_tx, connection_token.clone()),
        );
        spawn_task(
            "state_transition",
            self.clone()
                .watch_connection(transitions_rx, connection_token, shutdown.clone()),
        );
        Ok(())
    }

    async fn ingest_events(
        mut events: mpsc::UnboundedReceiver<ConnectionState>,
        transitions: mpsc::UnboundedSender<ConnectionState>,
        connection_token: CancellationToken,
    ) -> Result<()> {
        loop {
            tokio::select! {
                biased;
                _ = connection_token.cancelled() => return Ok(()),
                event = events.recv() => match event {
                    Some(state) => {
                        if transitions.send(state).is_err() {
                            return Ok(());
                        }
                    }
                    None => {
                        debug!("session event stream closed");
                        let _ = transitions.send(ConnectionState::Disconnected);
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn watch_connection(
        self: Arc<Self>,
        mut transitions: mpsc::UnboundedReceiver<ConnectionState>,
        connection_token: CancellationToken,
        shutdown: CancellationToken,
    ) -> Result<()> {
        loop {
            let state = tokio::select! {
                biased;
                _ = connection_token.cancelled() => return Ok(()),
                state = transitions.recv() => match state {
                    Some(state) => state,
                    None => return Ok(()),
                },
            };

            let Some(transition) = self.handle_status_change(state).await else {
                continue;
            };

            if transition.is_connection_lost() && self.started.load(Ordering::SeqCst) {
                warn!("connection to {} lost, trying to reconnect", self.url);
                connection_token.cancel();
                self.clone().reconnect(shutdown).await;
                return Ok(());
            }
        }
    }

    /// Applies `state` and notifies listeners and waiters. Identical states
    /// are dropped without notification.
    async fn handle_status_change(
        &self,
        state: ConnectionState,
    ) -> Option<Transition> {
        let _guard = self.transition_lock.lock().await;
        if !self.started.load(Ordering::SeqCst) {
            return None;
        }

        let transition = self.state.write().apply(state)?;
        info!("status change from {} to {}", transition.previous, transition.current);
        STATE_TRANSITIONS
            .with_label_values(&[&transition.current.to_string()])
            .inc();

        if transition.is_connection_established() {
            self.backoff.lock().reset();
        }

        self.status_change_listeners
            .notify(|listener| listener.on_status_change(transition.previous, transition.current));
        // No receivers simply means nobody is waiting
        let _ = self.state_events.send(transition.current);

        Some(transition)
    }

    /// Replaces the lost session, retrying until success or shutdown.
    ///
    /// Boxed to break the recursive future type: `connect` spawns the
    /// transition task, which calls `reconnect`, which calls `connect`.
    fn reconnect(
        self: Arc<Self>,
        shutdown: CancellationToken,
    ) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            loop {
                let delay = self.backoff.lock().next_delay();
                info!("reconnecting to {} in {:?}", self.url, delay);
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => {
                        debug!("shutdown while reconnecting to {}", self.url);
                        return;
                    }
                    _ = sleep(delay) => {}
                }

                if let Some(stale) = self.session.swap(None) {
                    stale.session.close().await;
                }
                if shutdown.is_cancelled() {
                    return;
                }

                RECONNECT_ATTEMPTS.inc();
                match self.clone().connect(&shutdown).await {
                    Ok(()) => {
                        if shutdown.is_cancelled() {
                            if let Some(orphan) = self.session.swap(None) {
                                orphan.session.close().await;
                            }
                        }
                        return;
                    }
                    Err(e) => warn!("reconnection to {} failed: {}", self.url, e),
                }
            }
        })
    }
}
