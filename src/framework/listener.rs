//! Status-change and shutdown listeners.
//!
//! Listeners are identified by a string id, unique per registry. Notification
//! runs over a snapshot of the registry, so a callback may add or remove
//! listeners (including itself) without deadlocking.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::warn;

use crate::ConnectionState;
use crate::ListenerError;
use crate::Result;

/// Identity shared by every listener kind
pub trait Listener: Send + Sync {
    fn id(&self) -> &str;
}

/// Notified on every change of the connection state.
///
/// Callbacks run on the framework's state-transition task and must not block.
pub trait StatusChangeListener: Listener {
    fn on_status_change(
        &self,
        previous: ConnectionState,
        current: ConnectionState,
    ) -> Result<()>;
}

/// Notified once when the framework stops.
pub trait ShutdownListener: Listener {
    fn on_shutdown(&self) -> Result<()>;
}

pub(crate) struct ListenerRegistry<L: ?Sized> {
    kind: &'static str,
    listeners: DashMap<String, Arc<L>>,
}

impl<L> ListenerRegistry<L>
where L: Listener + ?Sized
{
    pub(crate) fn new(kind: &'static str) -> Self {
        Self {
            kind,
            listeners: DashMap::new(),
        }
    }

    pub(crate) fn add(
        &self,
        listener: Arc<L>,
    ) -> Result<()> {
        match self.listeners.entry(listener.id().to_string()) {
            Entry::Occupied(entry) => Err(ListenerError::AlreadyExists(entry.key().clone()).into()),
            Entry::Vacant(entry) => {
                entry.insert(listener);
                Ok(())
            }
        }
    }

    pub(crate) fn remove(
        &self,
        id: &str,
    ) -> Result<()> {
        self.listeners
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| ListenerError::NotFound(id.to_string()).into())
    }

    pub(crate) fn contains(
        &self,
        id: &str,
    ) -> bool {
        self.listeners.contains_key(id)
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners.len()
    }

    pub(crate) fn clear(&self) {
        self.listeners.clear();
    }

    /// Invokes `callback` on every registered listener. Failures are logged
    /// and never stop the remaining callbacks.
    pub(crate) fn notify<F>(
        &self,
        callback: F,
    ) where
        F: Fn(&L) -> Result<()>,
    {
        let snapshot: Vec<Arc<L>> = self.listeners.iter().map(|entry| entry.value().clone()).collect();
        for listener in snapshot {
            if let Err(e) = callback(&*listener) {
                warn!("error notifying {} listener {}: {}", self.kind, listener.id(), e);
            }
        }
    }
}
