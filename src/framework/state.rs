use std::fmt;

/// Session state as reported by the coordination service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    ConnectedReadOnly,
    AuthFailed,
    Expired,
    Unknown,
}

impl ConnectionState {
    /// True for every variant backed by a live session
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected | ConnectionState::ConnectedReadOnly)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "StateDisconnected",
            ConnectionState::Connecting => "StateConnecting",
            ConnectionState::Connected => "StateConnected",
            ConnectionState::ConnectedReadOnly => "StateConnectedReadOnly",
            ConnectionState::AuthFailed => "StateAuthFailed",
            ConnectionState::Expired => "StateExpired",
            ConnectionState::Unknown => "StateUnknown",
        };
        f.write_str(name)
    }
}

/// Current and previous state of one framework instance.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct StateTracker {
    current: ConnectionState,
    previous: ConnectionState,
}

/// Outcome of a [`StateTracker::apply`] that changed the state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Transition {
    pub(crate) previous: ConnectionState,
    pub(crate) current: ConnectionState,
}

impl Transition {
    /// The "was connected, now not connected" edge
    pub(crate) fn is_connection_lost(&self) -> bool {
        self.previous.is_connected() && !self.current.is_connected()
    }

    pub(crate) fn is_connection_established(&self) -> bool {
        !self.previous.is_connected() && self.current.is_connected()
    }
}

impl StateTracker {
    pub(crate) fn current(&self) -> ConnectionState {
        self.current
    }

    pub(crate) fn previous(&self) -> ConnectionState {
        self.previous
    }

    /// Moves to `state`. Returns `None`, leaving the tracker untouched, when
    /// `state` equals the current one.
    pub(crate) fn apply(
        &mut self,
        state: ConnectionState,
    ) -> Option<Transition> {
        if state == self.current {
            return None;
        }
        self.previous = self.current;
        self.current = state;
        Some(Transition {
            previous: self.previous,
            current: self.current,
        })
    }
}
