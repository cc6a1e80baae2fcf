//! Leaf actions and conditions, the only places where a tree touches its context.
//!
//! Leaves are plain functions over an explicit context parameter rather than
//! capturing closures. A [`Leaf`] stores a function pointer and a name, so a
//! tree is built once and evaluated any number of times without allocating.

use std::borrow::Cow;
use std::fmt::{self, Debug, Formatter};

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{Fault, Interrupt};
use crate::{LeafResult, Outcome};

/// A leaf body that resolves without suspending.
pub type InstantFn<C> = fn(&mut C) -> LeafResult;

/// A leaf body that may suspend any number of times before resolving.
///
/// Declare these as ordinary functions with an explicit lifetime:
///
/// ```rust
/// # use fluent_behavior_tree::*;
/// # use futures::future::BoxFuture;
/// # use tokio_util::sync::CancellationToken;
/// struct Npc {
///     ticks: Ticks,
/// }
///
/// fn wind_up<'a>(npc: &'a mut Npc, _cancel: &'a CancellationToken) -> BoxFuture<'a, LeafResult> {
///     Box::pin(async move {
///         npc.ticks.next().await?;
///         Ok(Outcome::Succeeded)
///     })
/// }
///
/// let node: Node<Npc> = action("WindUp", wind_up);
/// ```
pub type AsyncFn<C> = for<'a> fn(&'a mut C, &'a CancellationToken) -> BoxFuture<'a, LeafResult>;

/// A synchronous predicate. Predicates must not suspend.
pub type PredicateFn<C> = fn(&C) -> bool;

pub enum LeafBody<C> {
    Instant(InstantFn<C>),
    Async(AsyncFn<C>),
}

impl<C> Clone for LeafBody<C> {
    fn clone(&self) -> Self {
        match self {
            Self::Instant(f) => Self::Instant(*f),
            Self::Async(f) => Self::Async(*f),
        }
    }
}

/// A named leaf action.
pub struct Leaf<C> {
    name: Cow<'static, str>,
    body: LeafBody<C>,
}

impl<C> Leaf<C> {
    pub fn instant(name: impl Into<Cow<'static, str>>, body: InstantFn<C>) -> Self {
        Self {
            name: name.into(),
            body: LeafBody::Instant(body),
        }
    }

    pub fn action(name: impl Into<Cow<'static, str>>, body: AsyncFn<C>) -> Self {
        Self {
            name: name.into(),
            body: LeafBody::Async(body),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn body(&self) -> &LeafBody<C> {
        &self.body
    }

    pub fn is_instant(&self) -> bool {
        matches!(self.body, LeafBody::Instant(_))
    }

    /// Run the leaf once against `ctx`.
    ///
    /// The token is checked before the body starts, so a leaf scheduled after
    /// a cancellation is never invoked. A suspending body is raced against the
    /// token and dropped at its current suspension point when the token fires.
    /// An `Err` from the body becomes [`Fault::Leaf`].
    pub async fn run(&self, ctx: &mut C, cancel: &CancellationToken) -> Result<Outcome, Interrupt> {
        if cancel.is_cancelled() {
            debug!(leaf = %self.name, "cancelled before start");
            return Err(Interrupt::Cancelled);
        }
        trace!(leaf = %self.name, "leaf started");

        let res = match self.body {
            LeafBody::Instant(body) => body(ctx),
            LeafBody::Async(body) => {
                let fut = body(ctx, cancel);
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        debug!(leaf = %self.name, "cancelled while suspended");
                        return Err(Interrupt::Cancelled);
                    }
                    res = fut => res,
                }
            }
        };

        match res {
            Ok(outcome) => {
                trace!(leaf = %self.name, ?outcome, "leaf finished");
                Ok(outcome)
            }
            Err(error) => Err(Fault::Leaf {
                leaf: self.name.clone(),
                error,
            }
            .into()),
        }
    }
}

impl<C> Clone for Leaf<C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            body: self.body.clone(),
        }
    }
}

impl<C> Debug for Leaf<C> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("Leaf")
            .field("name", &self.name)
            .field("instant", &self.is_instant())
            .finish()
    }
}

/// A named predicate guarding a conditional node.
pub struct Condition<C> {
    name: Cow<'static, str>,
    test: PredicateFn<C>,
    negated: bool,
}

impl<C> Condition<C> {
    pub fn new(name: impl Into<Cow<'static, str>>, test: PredicateFn<C>) -> Self {
        Self {
            name: name.into(),
            test,
            negated: false,
        }
    }

    /// Flip the result of the predicate.
    pub fn negate(mut self) -> Self {
        self.negated = !self.negated;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_negated(&self) -> bool {
        self.negated
    }

    pub fn test(&self, ctx: &C) -> bool {
        (self.test)(ctx) != self.negated
    }
}

impl<C> Clone for Condition<C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            test: self.test,
            negated: self.negated,
        }
    }
}

impl<C> Debug for Condition<C> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("Condition")
            .field("name", &self.name)
            .field("negated", &self.negated)
            .finish()
    }
}
