//! Continuous, type-filtered node subscriptions.
//!
//! The coordination service only offers one-shot watches. A subscription set
//! through [`WatchManager::set`] owns a background task that forwards each
//! fired watch whose type was requested and arms the next one right away.
//!
//! Every subscription is registered with the framework twice:
//! - as a [`ShutdownListener`], ending the subscription when the framework
//!   stops
//! - as a [`StatusChangeListener`], re-arming its watches on the session
//!   established after a connection loss
//!
//! Re-arming is best effort: events fired while disconnected are lost.

#[cfg(test)]
mod watcher_test;

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::sync::oneshot::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::async_task::spawn_task;
use crate::metrics::WATCH_REARMS;
use crate::ConnectionState;
use crate::EventType;
use crate::Framework;
use crate::FrameworkError;
use crate::Listener;
use crate::ListenerError;
use crate::OperationError;
use crate::RemoteError;
use crate::Result;
use crate::Session;
use crate::ShutdownListener;
use crate::StatusChangeListener;
use crate::WatchEvent;
use crate::WatchReceiver;

type SubscriptionTable = DashMap<String, Arc<Subscription>>;

/// Owns the subscriptions of one framework consumer.
///
/// Each instance keeps its own registration table; two managers on the same
/// framework never see each other's subscriptions.
#[derive(Clone)]
pub struct WatchManager {
    id: String,
    framework: Framework,
    subscriptions: Arc<SubscriptionTable>,
}

impl WatchManager {
    pub fn new(framework: Framework) -> Self {
        Self {
            id: nanoid::nanoid!(),
            framework,
            subscriptions: Arc::new(DashMap::new()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Subscribes `out` to the events of `types` on `path`, resolved under
    /// the framework namespace. No types means every node event type.
    ///
    /// # Errors
    /// - [`FrameworkError::NotYetStarted`] or
    ///   [`OperationError::FrameworkNotReady`] without a live session
    /// - [`OperationError::UnknownNode`] when `path` does not exist
    /// - [`ListenerError::AlreadyExists`] when the same path and types are
    ///   already subscribed through this manager
    pub async fn set(
        &self,
        path: &str,
        out: mpsc::UnboundedSender<WatchEvent>,
        types: &[EventType],
    ) -> Result<()> {
        let types = normalize_types(types);
        let path = self.framework.namespace().resolve(path);
        let key = registration_key(&types, &path);
        if self.subscriptions.contains_key(&key) {
            return Err(ListenerError::AlreadyExists(key).into());
        }

        let session = ready_session(&self.framework)?;
        let (stat, data_watch) = session.exists_w(&path).await?;
        if stat.is_none() {
            return Err(OperationError::UnknownNode(path).into());
        }
        let children_watch = if types.contains(&EventType::NodeChildrenChanged) {
            Some(session.children_w(&path).await?.1)
        } else {
            None
        };

        let (rearm_tx, rearm_rx) = mpsc::unbounded_channel();
        let subscription = Arc::new(Subscription {
            listener_id: format!("{}:{}", self.id, key),
            key: key.clone(),
            path: path.clone(),
            types,
            alive: AtomicBool::new(true),
            shutdown: CancellationToken::new(),
            rearm: rearm_tx,
        });

        match self.subscriptions.entry(key.clone()) {
            Entry::Occupied(_) => return Err(ListenerError::AlreadyExists(key).into()),
            Entry::Vacant(entry) => {
                entry.insert(subscription.clone());
            }
        }
        if let Err(e) = self.register(&subscription) {
            self.subscriptions.remove(&key);
            return Err(e);
        }

        info!("set watch {} on {} for {:?}", subscription.listener_id, path, subscription.types);
        let task = SubscriptionTask {
            framework: self.framework.clone(),
            subscriptions: self.subscriptions.clone(),
            subscription,
            out,
            rearm: rearm_rx,
            data_watch: Some(data_watch),
            children_watch,
        };
        spawn_task("watch_subscription", task.run());
        Ok(())
    }

    /// Ends the subscription set with the same `path` and `types`.
    ///
    /// # Errors
    /// [`ListenerError::NotFound`] when no such subscription exists.
    pub fn unset(
        &self,
        path: &str,
        types: &[EventType],
    ) -> Result<()> {
        let types = normalize_types(types);
        let path = self.framework.namespace().resolve(path);
        let key = registration_key(&types, &path);

        let Some((_, subscription)) = self.subscriptions.remove(&key) else {
            return Err(ListenerError::NotFound(key).into());
        };
        subscription.shutdown.cancel();
        unregister(&self.framework, &subscription);
        info!("unset watch {} on {}", subscription.listener_id, path);
        Ok(())
    }

    pub fn is_watching(
        &self,
        path: &str,
        types: &[EventType],
    ) -> bool {
        let types = normalize_types(types);
        let path = self.framework.namespace().resolve(path);
        self.subscriptions.contains_key(&registration_key(&types, &path))
    }

    /// Whether the subscription has its watches armed on the live session.
    /// `None` when there is no such subscription.
    pub fn is_alive(
        &self,
        path: &str,
        types: &[EventType],
    ) -> Option<bool> {
        let types = normalize_types(types);
        let path = self.framework.namespace().resolve(path);
        self.subscriptions
            .get(&registration_key(&types, &path))
            .map(|subscription| subscription.alive.load(Ordering::SeqCst))
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    fn register(
        &self,
        subscription: &Arc<Subscription>,
    ) -> Result<()> {
        self.framework.add_shutdown_listener(subscription.clone())?;
        if let Err(e) = self.framework.add_status_change_listener(subscription.clone()) {
            let _ = self.framework.remove_shutdown_listener(subscription.as_ref());
            return Err(e);
        }
        Ok(())
    }
}

/// Sorted, deduplicated; empty selects every type
fn normalize_types(types: &[EventType]) -> Vec<EventType> {
    let mut types = if types.is_empty() {
        EventType::ALL.to_vec()
    } else {
        types.to_vec()
    };
    types.sort();
    types.dedup();
    types
}

/// Type codes joined with `-`, then the absolute path, e.g. `1-3-/app/node`
fn registration_key(
    types: &[EventType],
    path: &str,
) -> String {
    let mut parts: Vec<String> = types.iter().map(|t| t.code().to_string()).collect();
    parts.push(path.to_string());
    parts.join("-")
}

fn ready_session(framework: &Framework) -> Result<Arc<dyn Session>> {
    if !framework.started() {
        return Err(FrameworkError::NotYetStarted.into());
    }
    framework
        .session()
        .ok_or_else(|| OperationError::FrameworkNotReady.into())
}

fn unregister(
    framework: &Framework,
    subscription: &Subscription,
) {
    if let Err(e) = framework.remove_shutdown_listener(subscription) {
        debug!("watch {} shutdown listener: {}", subscription.listener_id, e);
    }
    if let Err(e) = framework.remove_status_change_listener(subscription) {
        debug!("watch {} status listener: {}", subscription.listener_id, e);
    }
}

struct Subscription {
    listener_id: String,
    key: String,
    path: String,
    types: Vec<EventType>,
    /// False while the watches of a lost session await re-arming
    alive: AtomicBool,
    shutdown: CancellationToken,
    rearm: mpsc::UnboundedSender<()>,
}

impl Subscription {
    fn wants(
        &self,
        event_type: EventType,
    ) -> bool {
        self.types.contains(&event_type)
    }
}

impl Listener for Subscription {
    fn id(&self) -> &str {
        &self.listener_id
    }
}

impl ShutdownListener for Subscription {
    fn on_shutdown(&self) -> Result<()> {
        debug!("framework stopped, ending watch {}", self.listener_id);
        self.shutdown.cancel();
        Ok(())
    }
}

impl StatusChangeListener for Subscription {
    fn on_status_change(
        &self,
        previous: ConnectionState,
        current: ConnectionState,
    ) -> Result<()> {
        if !previous.is_connected() && current.is_connected() {
            // The task may already be gone; nothing left to re-arm then
            let _ = self.rearm.send(());
        }
        Ok(())
    }
}

enum Step {
    Shutdown,
    Data(std::result::Result<WatchEvent, RecvError>),
    Children(std::result::Result<WatchEvent, RecvError>),
    Rearm,
}

struct SubscriptionTask {
    framework: Framework,
    subscriptions: Arc<SubscriptionTable>,
    subscription: Arc<Subscription>,
    out: mpsc::UnboundedSender<WatchEvent>,
    rearm: mpsc::UnboundedReceiver<()>,
    data_watch: Option<WatchReceiver>,
    children_watch: Option<WatchReceiver>,
}

impl SubscriptionTask {
    async fn run(mut self) -> Result<()> {
        loop {
            let step = tokio::select! {
                biased;
                _ = self.subscription.shutdown.cancelled() => Step::Shutdown,
                fired = next_event(&mut self.data_watch) => Step::Data(fired),
                fired = next_event(&mut self.children_watch) => Step::Children(fired),
                signal = self.rearm.recv() => match signal {
                    Some(()) => Step::Rearm,
                    None => Step::Shutdown,
                },
            };

            match step {
                Step::Shutdown => break,
                // The next watch is armed before the event is delivered
                Step::Data(Ok(event)) => {
                    self.data_watch = None;
                    self.arm_data().await;
                    if event.event_type == EventType::NodeCreated && self.children_watch.is_none() {
                        self.arm_children().await;
                    }
                    if !self.forward(event) {
                        break;
                    }
                }
                Step::Children(Ok(event)) => {
                    self.children_watch = None;
                    self.arm_children().await;
                    // Deletion is reported by the data watch
                    if event.event_type == EventType::NodeChildrenChanged && !self.forward(event) {
                        break;
                    }
                }
                Step::Data(Err(_)) | Step::Children(Err(_)) => {
                    if self.subscription.alive.swap(false, Ordering::SeqCst) {
                        debug!(
                            "session lost, watch {} waits for reconnection",
                            self.subscription.listener_id
                        );
                    }
                    self.data_watch = None;
                    self.children_watch = None;
                }
                Step::Rearm => {
                    info!("re-arming watch {} on {}", self.subscription.listener_id, self.subscription.path);
                    WATCH_REARMS.inc();
                    self.data_watch = None;
                    self.children_watch = None;
                    if self.arm_data().await && self.arm_children().await {
                        self.subscription.alive.store(true, Ordering::SeqCst);
                    }
                }
            }
        }

        self.subscriptions
            .remove_if(&self.subscription.key, |_, current| Arc::ptr_eq(current, &self.subscription));
        unregister(&self.framework, &self.subscription);
        debug!("watch {} ended", self.subscription.listener_id);
        Ok(())
    }

    /// False once the consumer is gone
    fn forward(
        &self,
        event: WatchEvent,
    ) -> bool {
        if !self.subscription.wants(event.event_type) {
            return true;
        }
        debug!("watch {} delivers {} on {}", self.subscription.listener_id, event.event_type, event.path);
        if self.out.send(event).is_err() {
            info!("consumer of watch {} is gone", self.subscription.listener_id);
            return false;
        }
        true
    }

    /// False when the watch could not be armed
    async fn arm_data(&mut self) -> bool {
        let armed = match ready_session(&self.framework) {
            Ok(session) => session.exists_w(&self.subscription.path).await,
            Err(e) => Err(e),
        };
        match armed {
            Ok((_, watch)) => {
                self.data_watch = Some(watch);
                true
            }
            Err(e) => {
                self.lost(e);
                false
            }
        }
    }

    async fn arm_children(&mut self) -> bool {
        if !self.subscription.wants(EventType::NodeChildrenChanged) {
            return true;
        }
        let armed = match ready_session(&self.framework) {
            Ok(session) => session.children_w(&self.subscription.path).await,
            Err(e) => Err(e),
        };
        match armed {
            Ok((_, watch)) => {
                self.children_watch = Some(watch);
                true
            }
            // Armed again by the data watch once the node is re-created
            Err(e) if matches!(e.as_remote(), Some(RemoteError::NoNode(_))) => true,
            Err(e) => {
                self.lost(e);
                false
            }
        }
    }

    fn lost(
        &self,
        e: crate::Error,
    ) {
        warn!(
            "could not arm watch {} on {}: {}; waiting for reconnection",
            self.subscription.listener_id, self.subscription.path, e
        );
        self.subscription.alive.store(false, Ordering::SeqCst);
    }
}

async fn next_event(watch: &mut Option<WatchReceiver>) -> std::result::Result<WatchEvent, RecvError> {
    match watch {
        Some(receiver) => receiver.await,
        None => std::future::pending().await,
    }
}
