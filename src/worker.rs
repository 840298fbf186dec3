//! Worker lifecycle shared by the aggregator, the charger manager and the
//! control loop.
//!
//! A worker is a tokio task driven by its own child of the process-wide
//! [`CancellationToken`]. When the task body returns it raises a one-shot
//! "closed" signal which [`WorkerHandle::stop`] waits on.

use crate::error::{Result, SevcError};
use std::future::Future;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// How long `stop()` waits for a worker to acknowledge
pub const STOP_TIMEOUT: Duration = Duration::from_secs(30);

/// How long a snapshot may wait for room in the channel before it is dropped
pub const PUBLISH_TIMEOUT: Duration = Duration::from_secs(30);

/// Handle to a running worker task
#[derive(Debug)]
pub struct WorkerHandle {
    name: String,
    quit: CancellationToken,
    closed: Option<oneshot::Receiver<()>>,
}

impl WorkerHandle {
    /// Spawn `body` with a child of `parent` as its quit signal
    pub fn spawn<F, Fut>(name: &str, parent: &CancellationToken, body: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let quit = parent.child_token();
        let (done_tx, closed) = oneshot::channel();
        let task = body(quit.clone());
        tokio::spawn(async move {
            task.await;
            let _ = done_tx.send(());
        });
        Self {
            name: name.to_string(),
            quit,
            closed: Some(closed),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolve once the worker task has returned
    pub async fn closed(&mut self) {
        if let Some(rx) = self.closed.as_mut() {
            let _ = rx.await;
            self.closed = None;
        }
    }

    /// Signal the worker to quit and wait for it
    pub async fn stop(self) -> Result<()> {
        self.stop_with_timeout(STOP_TIMEOUT).await
    }

    pub async fn stop_with_timeout(mut self, wait: Duration) -> Result<()> {
        self.quit.cancel();
        let Some(rx) = self.closed.take() else {
            return Ok(());
        };
        match tokio::time::timeout(wait, rx).await {
            Ok(_) => Ok(()),
            Err(_) => Err(SevcError::timeout(format!(
                "timeout waiting for {} to exit",
                self.name
            ))),
        }
    }
}

/// Send a snapshot, giving up after `wait`
pub async fn publish<T>(tx: &mpsc::Sender<T>, value: T, wait: Duration) -> Result<()> {
    tx.send_timeout(value, wait).await.map_err(|e| match e {
        mpsc::error::SendTimeoutError::Timeout(_) => SevcError::timeout(format!(
            "sending snapshot timed out after {} seconds",
            wait.as_secs()
        )),
        mpsc::error::SendTimeoutError::Closed(_) => SevcError::channel("snapshot receiver dropped"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_times_out_on_full_channel() {
        let (tx, _rx) = mpsc::channel::<u8>(1);
        publish(&tx, 1, Duration::from_millis(10)).await.unwrap();
        let err = publish(&tx, 2, Duration::from_millis(10)).await.unwrap_err();
        assert!(matches!(err, SevcError::Timeout { .. }));
    }

    #[tokio::test]
    async fn stop_times_out_when_worker_ignores_quit() {
        let parent = CancellationToken::new();
        let handle = WorkerHandle::spawn("stubborn", &parent, |_quit| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
        });
        let err = handle
            .stop_with_timeout(Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("stubborn"));
    }

    #[tokio::test]
    async fn parent_cancel_reaches_worker() {
        let parent = CancellationToken::new();
        let mut handle = WorkerHandle::spawn("child", &parent, |quit| async move {
            quit.cancelled().await;
        });
        parent.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle.closed())
            .await
            .unwrap();
        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn publish_reports_dropped_receiver() {
        let (tx, rx) = mpsc::channel::<u8>(1);
        drop(rx);
        let err = publish(&tx, 1, Duration::from_millis(10)).await.unwrap_err();
        assert!(matches!(err, SevcError::Channel { .. }));
    }
}
