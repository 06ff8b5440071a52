//! CRUD helpers bound to a framework.
//!
//! Each call resolves its path under the framework namespace and runs the
//! remote work on a short lived task bounded by the configured request
//! timeout. Remote errors pass through untouched; an elapsed deadline is
//! reported as [`OperationError::DeadlineExceeded`].

mod create_options;
pub use create_options::*;


use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use crate::async_task::run_with_deadline;
use crate::metrics::OPERATION_LATENCY_MS;
use crate::path::parent_path;
use crate::CreateMode;
use crate::Framework;
use crate::FrameworkError;
use crate::OperationError;
use crate::RemoteError;
use crate::Result;
use crate::Session;
use crate::ANY_VERSION;

#[derive(Clone)]
pub struct Operations {
    framework: Framework,
}

impl Operations {
    pub(crate) fn new(framework: Framework) -> Self {
        Self { framework }
    }

    /// Payload of the node at `path`
    pub async fn get(
        &self,
        path: &str,
    ) -> Result<Vec<u8>> {
        self.run("get", path, |session, path| async move {
            let (data, _) = session.get(&path).await?;
            Ok(data)
        })
        .await
    }

    /// Overwrites the payload of an existing node and returns its new version.
    ///
    /// # Errors
    /// [`OperationError::UnknownNode`] when the node does not exist.
    pub async fn update(
        &self,
        path: &str,
        data: &[u8],
    ) -> Result<i32> {
        let data = data.to_vec();
        self.run("update", path, |session, path| async move {
            if session.exists(&path).await?.is_none() {
                return Err(OperationError::UnknownNode(path).into());
            }
            let stat = session.set(&path, &data, ANY_VERSION).await?;
            Ok(stat.version)
        })
        .await
    }

    /// Creates an empty persistent node, creating missing parents as
    /// container nodes. Returns the absolute path created.
    pub async fn create(
        &self,
        path: &str,
    ) -> Result<String> {
        self.create_with_options(path, CreateOptions::default()).await
    }

    pub async fn create_with_options(
        &self,
        path: &str,
        options: CreateOptions,
    ) -> Result<String> {
        self.run("create", path, |session, path| async move {
            create_parents(session.as_ref(), &path).await?;
            session.create(&path, &options.data, options.mode).await
        })
        .await
    }

    /// Deletes a node whatever its version.
    ///
    /// # Errors
    /// [`OperationError::UnknownNode`] when the node does not exist.
    pub async fn delete(
        &self,
        path: &str,
    ) -> Result<()> {
        self.run("delete", path, |session, path| async move {
            if session.exists(&path).await?.is_none() {
                return Err(OperationError::UnknownNode(path).into());
            }
            session.delete(&path, ANY_VERSION).await
        })
        .await
    }

    pub async fn exists(
        &self,
        path: &str,
    ) -> Result<bool> {
        self.run("exists", path, |session, path| async move {
            Ok(session.exists(&path).await?.is_some())
        })
        .await
    }

    /// Names of the children of `path`
    pub async fn ls(
        &self,
        path: &str,
    ) -> Result<Vec<String>> {
        self.run("ls", path, |session, path| async move { session.children(&path).await })
            .await
    }

    async fn run<T, F, Fut>(
        &self,
        operation: &'static str,
        path: &str,
        task: F,
    ) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Arc<dyn Session>, String) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let session = self.session()?;
        let path = self.framework.namespace().resolve(path);
        debug!("{} {}", operation, path);

        let started_at = Instant::now();
        let deadline = self.framework.config().connection.request_timeout();
        let result = run_with_deadline(operation, &path, deadline, task(session, path.clone())).await;
        OPERATION_LATENCY_MS
            .with_label_values(&[operation])
            .observe(started_at.elapsed().as_secs_f64() * 1000.0);
        result
    }

    fn session(&self) -> Result<Arc<dyn Session>> {
        if !self.framework.started() {
            return Err(FrameworkError::NotYetStarted.into());
        }
        self.framework
            .session()
            .ok_or_else(|| OperationError::FrameworkNotReady.into())
    }
}

/// Creates every missing ancestor of `path` as a container node, top down.
async fn create_parents(
    session: &dyn Session,
    path: &str,
) -> Result<()> {
    let mut missing = Vec::new();
    let mut current = parent_path(path);
    while let Some(parent) = current {
        if parent == "/" || session.exists(parent).await?.is_some() {
            break;
        }
        missing.push(parent.to_string());
        current = parent_path(parent);
    }

    for parent in missing.iter().rev() {
        match session.create(parent, &[], CreateMode::Container).await {
            Ok(_) => debug!("created parent {}", parent),
            // Lost a race with another creator
            Err(e) if matches!(e.as_remote(), Some(RemoteError::NodeExists(_))) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
