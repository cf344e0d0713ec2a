//! Idempotency cache — correlation identifier → WorkflowResult.
//!
//! The only state shared across runs. Admission uses insert-if-absent under
//! a single lock rather than read-then-write, so two concurrent submissions
//! of the same identifier can never both execute side effects: exactly one
//! wins the slot, the other awaits and adopts the winner's result.
//!
//! Completed results stay cached for a bounded window (TTL) and are evicted
//! lazily on the next admission for that identifier. There is no background
//! reaper.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::watch;
use uuid::Uuid;

use crate::result::WorkflowResult;

enum Slot {
    /// A run holds the slot; waiters subscribe to its completion.
    InFlight(watch::Receiver<Option<Arc<WorkflowResult>>>),
    /// A run completed within the cache window.
    Done {
        result: Arc<WorkflowResult>,
        stored_at: Instant,
    },
}

struct Inner {
    ttl: Duration,
    slots: Mutex<HashMap<Uuid, Slot>>,
}

/// Outcome of an admission attempt for a correlation identifier.
pub enum Admission {
    /// This submission won the slot. Run the workflow, then call
    /// [`RunGuard::complete`] exactly once.
    Winner(RunGuard),
    /// Another submission with the same identifier is in flight.
    Duplicate(PendingResult),
    /// A result completed within the cache window; re-submission returns it
    /// unchanged, side effects are not re-executed.
    Cached(Arc<WorkflowResult>),
}

/// Held by the winning submission; publishing the result releases waiters
/// and caches the result for the TTL window.
pub struct RunGuard {
    id: Uuid,
    inner: Arc<Inner>,
    tx: watch::Sender<Option<Arc<WorkflowResult>>>,
    completed: bool,
}

impl RunGuard {
    /// Publish the finished result to the cache and to any waiters.
    pub fn complete(mut self, result: Arc<WorkflowResult>) {
        {
            let mut slots = self.inner.slots.lock().expect("idempotency lock poisoned");
            slots.insert(
                self.id,
                Slot::Done {
                    result: Arc::clone(&result),
                    stored_at: Instant::now(),
                },
            );
        }
        // Waiters observe the value before the sender drops.
        let _ = self.tx.send(Some(result));
        self.completed = true;
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if !self.completed {
            // The winner died without publishing; free the slot so a later
            // submission can run instead of waiting forever.
            let mut slots = self.inner.slots.lock().expect("idempotency lock poisoned");
            slots.remove(&self.id);
        }
    }
}

/// Subscription to an in-flight run with the same correlation identifier.
pub struct PendingResult {
    rx: watch::Receiver<Option<Arc<WorkflowResult>>>,
}

impl PendingResult {
    /// Wait for the winning run to publish its result.
    ///
    /// Returns `None` only if the winner was dropped without completing.
    pub async fn wait(mut self) -> Option<Arc<WorkflowResult>> {
        loop {
            if let Some(result) = self.rx.borrow().clone() {
                return Some(result);
            }
            if self.rx.changed().await.is_err() {
                // Sender gone; one last look in case it published first.
                return self.rx.borrow().clone();
            }
        }
    }
}

/// The shared cache. Cheap to clone; all clones share one slot map.
#[derive(Clone)]
pub struct IdempotencyCache {
    inner: Arc<Inner>,
}

impl IdempotencyCache {
    /// Create a cache whose completed entries expire after `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                ttl,
                slots: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Admit a submission for `id`: exactly one concurrent caller becomes
    /// the winner, the rest observe the in-flight run or the cached result.
    pub fn admit(&self, id: Uuid) -> Admission {
        let mut slots = self.inner.slots.lock().expect("idempotency lock poisoned");

        match slots.get(&id) {
            Some(Slot::InFlight(rx)) => {
                tracing::debug!(correlation_id = %id, "Duplicate submission joins in-flight run");
                return Admission::Duplicate(PendingResult { rx: rx.clone() });
            }
            Some(Slot::Done { result, stored_at }) => {
                if stored_at.elapsed() < self.inner.ttl {
                    tracing::debug!(correlation_id = %id, "Cached result returned");
                    return Admission::Cached(Arc::clone(result));
                }
                // Window elapsed — fall through and take the slot.
            }
            None => {}
        }

        let (tx, rx) = watch::channel(None);
        slots.insert(id, Slot::InFlight(rx));
        Admission::Winner(RunGuard {
            id,
            inner: Arc::clone(&self.inner),
            tx,
            completed: false,
        })
    }

    /// Number of live entries (in-flight or unexpired).
    pub fn len(&self) -> usize {
        let slots = self.inner.slots.lock().expect("idempotency lock poisoned");
        slots
            .values()
            .filter(|slot| match slot {
                Slot::InFlight(_) => true,
                Slot::Done { stored_at, .. } => stored_at.elapsed() < self.inner.ttl,
            })
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
