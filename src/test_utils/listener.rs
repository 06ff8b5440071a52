use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use parking_lot::Mutex;

use crate::ConnectionState;
use crate::Error;
use crate::Listener;
use crate::Result;
use crate::ShutdownListener;
use crate::StatusChangeListener;

/// Records every notification it receives
pub struct RecordingListener {
    id: String,
    fail: bool,
    transitions: Mutex<Vec<(ConnectionState, ConnectionState)>>,
    shutdowns: AtomicUsize,
}

impl RecordingListener {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            fail: false,
            transitions: Mutex::new(Vec::new()),
            shutdowns: AtomicUsize::new(0),
        }
    }

    /// Records like [`new`](Self::new) but fails every callback
    pub fn failing(id: &str) -> Self {
        Self {
            fail: true,
            ..Self::new(id)
        }
    }

    pub fn transitions(&self) -> Vec<(ConnectionState, ConnectionState)> {
        self.transitions.lock().clone()
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    fn outcome(&self) -> Result<()> {
        if self.fail {
            return Err(Error::Fatal(format!("listener {} failed on purpose", self.id)));
        }
        Ok(())
    }
}

impl Listener for RecordingListener {
    fn id(&self) -> &str {
        &self.id
    }
}

impl StatusChangeListener for RecordingListener {
    fn on_status_change(
        &self,
        previous: ConnectionState,
        current: ConnectionState,
    ) -> Result<()> {
        self.transitions.lock().push((previous, current));
        self.outcome()
    }
}

impl ShutdownListener for RecordingListener {
    fn on_shutdown(&self) -> Result<()> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        self.outcome()
    }
}
