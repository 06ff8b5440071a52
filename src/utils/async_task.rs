use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::error;

use crate::OperationError;
use crate::ReconnectPolicy;
use crate::Result;

/// Exponential backoff schedule driven by a [`ReconnectPolicy`].
///
/// Every call to [`next_delay`](Self::next_delay) yields the current interval
/// (spread by the policy jitter) and doubles it for the next call, capped at
/// the policy maximum. [`reset`](Self::reset) returns to the base interval.
#[derive(Debug, Clone)]
pub(crate) struct ExponentialBackoff {
    policy: ReconnectPolicy,
    current: Duration,
}

impl ExponentialBackoff {
    pub(crate) fn new(policy: ReconnectPolicy) -> Self {
        Self {
            current: policy.base_delay(),
            policy,
        }
    }

    /// Interval the next call to [`next_delay`](Self::next_delay) is based on
    pub(crate) fn current(&self) -> Duration {
        self.current
    }

    pub(crate) fn next_delay(&mut self) -> Duration {
        let delay = apply_jitter(self.current, self.policy.jitter_ratio);
        self.current = (self.current * 2).min(self.policy.max_delay());
        delay
    }

    pub(crate) fn reset(&mut self) {
        self.current = self.policy.base_delay();
    }
}

fn apply_jitter(
    delay: Duration,
    ratio: f64,
) -> Duration {
    if ratio <= 0.0 {
        return delay;
    }
    let factor = rand::thread_rng().gen_range((1.0 - ratio)..(1.0 + ratio));
    delay.mul_f64(factor)
}

/// Spawns a background task, logging its failure under `name`.
pub(crate) fn spawn_task<Fut>(
    name: &str,
    task: Fut,
) -> JoinHandle<()>
where
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let name = name.to_string();
    tokio::spawn(async move {
        if let Err(e) = task.await {
            error!("spawned task: {name} stopped or encountered an error: {:?}", e);
        }
    })
}

/// Runs `task` on a short lived background task and waits for it at most
/// `deadline`.
///
/// An expired deadline surfaces [`OperationError::DeadlineExceeded`]; the
/// task itself is left to finish on its own.
pub(crate) async fn run_with_deadline<T, Fut>(
    operation: &'static str,
    path: &str,
    deadline: Duration,
    task: Fut,
) -> Result<T>
where
    T: Send + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    let handle = tokio::spawn(task);
    match timeout(deadline, handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) => Err(join_error.into()),
        Err(_) => Err(OperationError::DeadlineExceeded {
            operation,
            path: path.to_string(),
            timeout: deadline,
        }
        .into()),
    }
}
