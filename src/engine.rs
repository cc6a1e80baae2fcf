//! The execution engine: one tree traversal per accepted tick request.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, debug_span, trace, warn, Instrument};

use crate::context::{EvaluationGuard, SharedContext};
use crate::error::{EngineError, Fault, Interrupt};
use crate::{Outcome, Tree};

/// How a tick request ended.
#[derive(Debug)]
pub enum TickOutcome {
    Completed(Outcome),
    Cancelled,
    Faulted(Fault),
}

impl TickOutcome {
    pub fn outcome(&self) -> Option<Outcome> {
        match self {
            Self::Completed(outcome) => Some(*outcome),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn is_faulted(&self) -> bool {
        matches!(self, Self::Faulted(_))
    }
}

/// The synchronous answer to a tick request.
#[derive(Debug)]
pub enum TickResult {
    /// A new evaluation was started; await the completion for its outcome.
    Started(Completion),
    /// An evaluation for this context is still in flight. The tick is dropped.
    AlreadyRunning,
}

impl TickResult {
    pub fn is_started(&self) -> bool {
        matches!(self, Self::Started(_))
    }

    pub fn into_completion(self) -> Option<Completion> {
        match self {
            Self::Started(completion) => Some(completion),
            Self::AlreadyRunning => None,
        }
    }
}

/// Resolves to the [`TickOutcome`] of a started evaluation.
///
/// Dropping a `Completion` does not stop the evaluation; cancel its token
/// for that.
#[derive(Debug)]
pub struct Completion {
    handle: JoinHandle<TickOutcome>,
}

impl Completion {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Future for Completion {
    type Output = TickOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<TickOutcome> {
        Pin::new(&mut self.handle).poll(cx).map(|res| match res {
            Ok(outcome) => outcome,
            // The runtime shut down underneath the evaluation.
            Err(err) if err.is_cancelled() => TickOutcome::Cancelled,
            Err(err) => TickOutcome::Faulted(Fault::Panic(err.to_string())),
        })
    }
}

/// Runs evaluations on a tokio runtime, at most one per context at a time.
#[derive(Debug, Clone)]
pub struct Engine {
    handle: Handle,
}

impl Engine {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// An engine on the runtime the caller is running in.
    pub fn current() -> Result<Self, EngineError> {
        Ok(Self::new(Handle::try_current()?))
    }

    /// Ask for one evaluation of `tree` against `context`.
    ///
    /// If an evaluation for the same context is still in flight the request
    /// is dropped and [`TickResult::AlreadyRunning`] is returned without doing
    /// any work. Otherwise the guard is taken before this returns, so a second
    /// request issued right after this one is always dropped. The guard is
    /// released when the evaluation completes, is cancelled through `cancel`,
    /// faults or panics.
    pub fn request_tick<C>(
        &self,
        tree: &Arc<Tree<C>>,
        context: &SharedContext<C>,
        cancel: CancellationToken,
    ) -> TickResult
    where
        C: Send + 'static,
    {
        let Some(guard) = context.try_acquire() else {
            trace!(tree = %tree.name(), "evaluation in flight, tick dropped");
            return TickResult::AlreadyRunning;
        };

        let span = debug_span!("evaluate", tree = %tree.name());
        let handle = self
            .handle
            .spawn(run_evaluation(tree.clone(), guard, cancel).instrument(span));
        TickResult::Started(Completion { handle })
    }
}

async fn run_evaluation<C>(
    tree: Arc<Tree<C>>,
    guard: EvaluationGuard<C>,
    cancel: CancellationToken,
) -> TickOutcome
where
    C: Send + 'static,
{
    let mut ctx = guard.lock().await;
    let res = AssertUnwindSafe(tree.evaluate(&mut ctx, &cancel))
        .catch_unwind()
        .await;
    drop(ctx);
    drop(guard);

    match res {
        Ok(Ok(outcome)) => {
            debug!(?outcome, "evaluation completed");
            TickOutcome::Completed(outcome)
        }
        Ok(Err(Interrupt::Cancelled)) => {
            debug!("evaluation cancelled");
            TickOutcome::Cancelled
        }
        Ok(Err(Interrupt::Faulted(fault))) => {
            warn!(%fault, "evaluation faulted");
            TickOutcome::Faulted(fault)
        }
        Err(payload) => {
            let fault = Fault::Panic(panic_message(payload));
            warn!(%fault, "evaluation faulted");
            TickOutcome::Faulted(fault)
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

#[cfg(test)]
mod test;
