//! Admission control for concurrent operations
//!
//! Each operation kind has its own counting permit pool. A call must hold a
//! permit of its kind for as long as it touches the filesystem; the permit
//! is returned when the guard is dropped, so every exit path releases it,
//! including cancellation of the owning future.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::context::{CallContext, Cancellation};

/// Operation kinds with independent capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Create,
    Get,
    List,
}

impl OperationKind {
    /// Lowercase name used in logs
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Get => "get",
            Self::List => "list",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Permit capacities per operation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionLimits {
    pub create: usize,
    pub get: usize,
    pub list: usize,
}

/// Why a permit could not be granted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AdmissionError {
    #[error("gave up waiting for a permit: {0}")]
    Cancelled(Cancellation),
    #[error("admission controller closed")]
    Closed,
}

/// Bounds simultaneous creates, gets and lists
#[derive(Debug)]
pub struct AdmissionController {
    create: Arc<Semaphore>,
    get: Arc<Semaphore>,
    list: Arc<Semaphore>,
    limits: AdmissionLimits,
}

impl AdmissionController {
    /// Create a controller with fixed capacities
    ///
    /// Capacities above `Semaphore::MAX_PERMITS` are clamped.
    #[must_use]
    pub fn new(limits: AdmissionLimits) -> Self {
        let pool = |n: usize| Arc::new(Semaphore::new(n.min(Semaphore::MAX_PERMITS)));
        Self {
            create: pool(limits.create),
            get: pool(limits.get),
            list: pool(limits.list),
            limits,
        }
    }

    fn semaphore(&self, kind: OperationKind) -> &Arc<Semaphore> {
        match kind {
            OperationKind::Create => &self.create,
            OperationKind::Get => &self.get,
            OperationKind::List => &self.list,
        }
    }

    /// Wait for a permit of `kind`
    ///
    /// A permit that is available right away is granted even if `ctx` is
    /// already cancelled. Waiters are served in FIFO order.
    ///
    /// # Errors
    ///
    /// - `AdmissionError::Cancelled` if the call is cancelled while waiting
    /// - `AdmissionError::Closed` if the controller has been closed
    pub async fn acquire(
        &self,
        kind: OperationKind,
        ctx: &CallContext,
    ) -> Result<Permit, AdmissionError> {
        if let Some(permit) = self.try_acquire(kind) {
            return Ok(permit);
        }

        let semaphore = Arc::clone(self.semaphore(kind));
        tokio::select! {
            biased;
            result = semaphore.acquire_owned() => match result {
                Ok(permit) => Ok(Permit { kind, _permit: permit }),
                Err(_) => Err(AdmissionError::Closed),
            },
            reason = ctx.cancelled() => Err(AdmissionError::Cancelled(reason)),
        }
    }

    /// Take a permit only if one is free right now
    #[must_use]
    pub fn try_acquire(&self, kind: OperationKind) -> Option<Permit> {
        Arc::clone(self.semaphore(kind))
            .try_acquire_owned()
            .ok()
            .map(|permit| Permit {
                kind,
                _permit: permit,
            })
    }

    /// Configured capacity for `kind`
    #[must_use]
    pub fn capacity(&self, kind: OperationKind) -> usize {
        match kind {
            OperationKind::Create => self.limits.create,
            OperationKind::Get => self.limits.get,
            OperationKind::List => self.limits.list,
        }
    }

    /// Permits of `kind` not currently held
    #[must_use]
    pub fn available(&self, kind: OperationKind) -> usize {
        self.semaphore(kind).available_permits()
    }

    /// Close all pools; pending and future acquires fail with `Closed`
    ///
    /// Permits already handed out stay valid until dropped.
    pub fn close(&self) {
        self.create.close();
        self.get.close();
        self.list.close();
    }

    /// Returns `true` once [`close`](Self::close) has been called
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.create.is_closed()
    }
}

/// RAII guard for one unit of capacity
///
/// Dropping the guard returns the permit to its pool.
#[derive(Debug)]
pub struct Permit {
    kind: OperationKind,
    _permit: OwnedSemaphorePermit,
}

impl Permit {
    /// Operation kind this permit was issued for
    #[must_use]
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Return the permit to its pool
    pub fn release(self) {
        drop(self);
    }
}
