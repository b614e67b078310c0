//! Concurrency gate
//!
//! One gate is shared by a whole traversal and bounds the number of export
//! tasks doing store work at any instant, however deep the tree goes.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::error::ExportError;

/// Counting semaphore with a fixed capacity. Clones share the same permits.
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// A token from the gate; dropping it returns it.
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}

impl ConcurrencyGate {
    /// Create a gate. A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, Semaphore::MAX_PERMITS);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Tokens currently handed out.
    pub fn outstanding(&self) -> usize {
        self.capacity - self.semaphore.available_permits()
    }

    /// Wait for a token. Waiters are served in FIFO order; a cancelled
    /// context ends the wait with [`ExportError::Cancelled`].
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<GatePermit, ExportError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ExportError::Cancelled),
            permit = Arc::clone(&self.semaphore).acquire_owned() => permit
                .map(|permit| GatePermit { _permit: permit })
                // the semaphore is never closed while a gate is alive
                .map_err(|_| ExportError::Cancelled),
        }
    }
}

/// The token slot of one running task.
///
/// A task holds a token while it talks to the store and gives it up while
/// it waits, either for a child's token or for its children to finish.
/// Holders never block on the gate, so nested fan-outs cannot starve each
/// other even with a capacity of one.
#[derive(Debug)]
pub(crate) struct Lease {
    gate: ConcurrencyGate,
    permit: Option<GatePermit>,
}

impl Lease {
    /// A slot that starts empty (the root of a traversal).
    pub(crate) fn vacant(gate: ConcurrencyGate) -> Self {
        Self { gate, permit: None }
    }

    /// A slot that starts with the token its producer acquired for it.
    pub(crate) fn held(gate: ConcurrencyGate, permit: GatePermit) -> Self {
        Self {
            gate,
            permit: Some(permit),
        }
    }

    /// Make sure a token is held before the next store call.
    pub(crate) async fn hold(&mut self, cancel: &CancellationToken) -> Result<(), ExportError> {
        if self.permit.is_none() {
            self.permit = Some(self.gate.acquire(cancel).await?);
        }
        Ok(())
    }

    pub(crate) fn release(&mut self) {
        self.permit = None;
    }

    #[cfg(test)]
    pub(crate) fn is_held(&self) -> bool {
        self.permit.is_some()
    }
}
