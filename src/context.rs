use std::fmt::{self, Debug, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard, OwnedMutexGuard};
use tracing::trace;

struct Shared<C> {
    value: Arc<Mutex<C>>,
    in_flight: AtomicBool,
}

/// A handle to one context (blackboard) and its evaluation guard.
///
/// The host creates the context and keeps a clone of the handle for as long
/// as the entity it describes lives. Clones refer to the same context; the
/// guard is keyed by that identity, so two handles created from equal values
/// are still two independent contexts.
pub struct SharedContext<C> {
    shared: Arc<Shared<C>>,
}

impl<C> SharedContext<C> {
    pub fn new(value: C) -> Self {
        Self {
            shared: Arc::new(Shared {
                value: Arc::new(Mutex::new(value)),
                in_flight: AtomicBool::new(false),
            }),
        }
    }

    /// Whether an evaluation currently owns this context.
    pub fn is_evaluating(&self) -> bool {
        self.shared.in_flight.load(Ordering::Acquire)
    }

    /// Wait for exclusive access to the context.
    ///
    /// An in-flight evaluation owns the context until it finishes, so this
    /// resolves only between evaluations.
    pub async fn lock(&self) -> MutexGuard<'_, C> {
        self.shared.value.lock().await
    }

    pub fn try_lock(&self) -> Option<MutexGuard<'_, C>> {
        self.shared.value.try_lock().ok()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Set the in-flight flag, unless an evaluation already holds it.
    pub(crate) fn try_acquire(&self) -> Option<EvaluationGuard<C>> {
        self.shared
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| EvaluationGuard {
                shared: self.shared.clone(),
            })
    }
}

impl<C> Clone for SharedContext<C> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<C> Debug for SharedContext<C> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("SharedContext")
            .field("evaluating", &self.is_evaluating())
            .finish()
    }
}

/// Exclusive right to evaluate a tree against one context.
///
/// Dropping the guard clears the in-flight flag, whichever way the
/// evaluation ended.
pub(crate) struct EvaluationGuard<C> {
    shared: Arc<Shared<C>>,
}

impl<C> EvaluationGuard<C> {
    pub(crate) async fn lock(&self) -> OwnedMutexGuard<C> {
        self.shared.value.clone().lock_owned().await
    }
}

impl<C> Drop for EvaluationGuard<C> {
    fn drop(&mut self) {
        self.shared.in_flight.store(false, Ordering::Release);
        trace!("evaluation guard released");
    }
}
