//! Per-call cancellation scope
//!
//! A call is cancelled when its deadline passes or the server starts
//! shutting down. Admission waits race against [`CallContext::cancelled`];
//! streaming loops poll [`CallContext::check`] at chunk boundaries.

use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;

/// Why a call was cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Cancellation {
    #[error("deadline exceeded")]
    DeadlineExceeded,
    #[error("server shutting down")]
    Shutdown,
}

/// Cancellation scope for a single call
#[derive(Debug, Clone)]
pub struct CallContext {
    deadline: Option<Instant>,
    shutdown: watch::Receiver<bool>,
}

impl CallContext {
    /// Create a context with an optional absolute deadline
    ///
    /// `shutdown` flips to `true` when the server begins a graceful shutdown.
    #[must_use]
    pub fn new(deadline: Option<Instant>, shutdown: watch::Receiver<bool>) -> Self {
        Self { deadline, shutdown }
    }

    /// Create a context whose deadline is `timeout` from now
    #[must_use]
    pub fn with_timeout(timeout: Duration, shutdown: watch::Receiver<bool>) -> Self {
        Self::new(Some(Instant::now() + timeout), shutdown)
    }

    /// Context that is never cancelled
    #[must_use]
    pub fn background() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self::new(None, rx)
    }

    /// Tighten the deadline to a client-requested budget, if shorter
    #[must_use]
    pub fn with_client_deadline(mut self, deadline_ms: Option<u64>) -> Self {
        if let Some(ms) = deadline_ms {
            let client_deadline = Instant::now() + Duration::from_millis(ms);
            self.deadline = Some(match self.deadline {
                Some(current) => current.min(client_deadline),
                None => client_deadline,
            });
        }
        self
    }

    /// Absolute deadline of the call, if any
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Non-blocking cancellation check
    ///
    /// # Errors
    ///
    /// Returns the cancellation reason once the deadline has passed or
    /// shutdown has been signalled.
    pub fn check(&self) -> Result<(), Cancellation> {
        if *self.shutdown.borrow() {
            return Err(Cancellation::Shutdown);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(Cancellation::DeadlineExceeded);
        }
        Ok(())
    }

    /// Returns `true` if the call has been cancelled
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.check().is_err()
    }

    /// Resolve once the call is cancelled
    ///
    /// Never resolves for a context without a deadline whose shutdown sender
    /// has been dropped.
    pub async fn cancelled(&self) -> Cancellation {
        let mut shutdown = self.shutdown.clone();
        let shutdown_signalled = async move {
            if shutdown.wait_for(|stopping| *stopping).await.is_err() {
                std::future::pending::<()>().await;
            }
        };

        match self.deadline {
            Some(deadline) => tokio::select! {
                () = tokio::time::sleep_until(deadline) => Cancellation::DeadlineExceeded,
                () = shutdown_signalled => Cancellation::Shutdown,
            },
            None => {
                shutdown_signalled.await;
                Cancellation::Shutdown
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_background_never_cancelled() {
        let ctx = CallContext::background();
        assert!(!ctx.is_cancelled());
        assert!(
            timeout(Duration::from_millis(50), ctx.cancelled())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_deadline_cancels() {
        let (_tx, rx) = watch::channel(false);
        let ctx = CallContext::with_timeout(Duration::from_millis(20), rx);
        assert_eq!(ctx.check(), Ok(()));

        let reason = timeout(Duration::from_secs(5), ctx.cancelled())
            .await
            .unwrap();
        assert_eq!(reason, Cancellation::DeadlineExceeded);
        assert_eq!(ctx.check(), Err(Cancellation::DeadlineExceeded));
    }

    #[tokio::test]
    async fn test_shutdown_cancels() {
        let (tx, rx) = watch::channel(false);
        let ctx = CallContext::new(None, rx);

        let waiter = {
            let ctx = ctx.clone();
            tokio::spawn(async move { ctx.cancelled().await })
        };
        tx.send(true).unwrap();

        let reason = timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reason, Cancellation::Shutdown);
        assert_eq!(ctx.check(), Err(Cancellation::Shutdown));
    }

    #[tokio::test]
    async fn test_client_deadline_only_tightens() {
        let (_tx, rx) = watch::channel(false);
        let base = CallContext::with_timeout(Duration::from_secs(30), rx);
        let base_deadline = base.deadline().unwrap();

        let tighter = base.clone().with_client_deadline(Some(100));
        assert!(tighter.deadline().unwrap() < base_deadline);

        let looser = base.clone().with_client_deadline(Some(3_600_000));
        assert_eq!(looser.deadline(), Some(base_deadline));

        let unchanged = base.with_client_deadline(None);
        assert_eq!(unchanged.deadline(), Some(base_deadline));
    }

    #[tokio::test]
    async fn test_client_deadline_without_server_deadline() {
        let ctx = CallContext::background().with_client_deadline(Some(10));
        assert!(ctx.deadline().is_some());
    }
}
