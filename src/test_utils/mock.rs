use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::ConnectionState;
use crate::Connector;
use crate::EstablishedSession;
use crate::Framework;
use crate::MockSession;
use crate::Result;
use crate::Session;

/// Hands out the same session on every connect, reporting it connected
pub struct MockConnector {
    session: Arc<dyn Session>,
    events: Mutex<Vec<mpsc::UnboundedSender<ConnectionState>>>,
}

impl MockConnector {
    pub fn new(session: Arc<dyn Session>) -> Self {
        Self {
            session,
            events: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(
        &self,
        _url: &str,
        _session_timeout: Duration,
    ) -> Result<EstablishedSession> {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(ConnectionState::Connecting);
        let _ = tx.send(ConnectionState::Connected);
        self.events.lock().push(tx);
        Ok(EstablishedSession {
            session: self.session.clone(),
            events: rx,
        })
    }
}

/// A mock session with the bookkeeping expectations every framework needs
pub fn mock_session() -> MockSession {
    let mut session = MockSession::new();
    session.expect_id().returning(|| 42);
    session.expect_close().returning(|| ());
    session
}

/// A started framework driving `session`
pub async fn mock_framework(session: MockSession) -> Framework {
    super::enable_logger();
    let connector = Arc::new(MockConnector::new(Arc::new(session)));
    let framework = Framework::builder("mock://test", connector)
        .namespace(["mock"])
        .build()
        .expect("mock framework should build");
    framework.start().await.expect("start should succeed");
    framework
        .wait_connection(Duration::from_secs(5))
        .await
        .expect("should connect");
    framework
}
