//! # fluent-behavior-tree (Rust crate)
//!
//! A behavior tree whose leaves are cooperative asynchronous actions.
//!
//!
//! ## Overview
//!
//! A behavior tree decides what an agent does next by evaluating a tree of
//! combinators from the root down to the leaves.
//! Composites ([`sequence`], [`selector`]) decide which child runs next based on the
//! outcome of the previous one, conditionals ([`when`], [`unless`]) guard a subtree
//! with a predicate, and leaves do the actual work.
//!
//! Unlike a classic behavior tree, leaves here do not report "running" and get
//! re-entered on the next tick.
//! A leaf that takes several ticks (a wind-up, an attack, a walk across the room)
//! is an `async` function that suspends on [`Ticks`] and resumes exactly where it
//! left off, and the whole traversal suspends with it.
//! While a traversal is suspended, further ticks for the same context are
//! dropped, never queued.
//!
//!
//! ## How it looks like
//!
//! First, you define the state that the tree reads and modifies, the context.
//! It is an ordinary struct owned by the host.
//!
//! ```rust
//! struct Npc {
//!     distance_to_player: f32,
//!     attacks: u32,
//! }
//! ```
//!
//! Then define leaves and predicates as plain functions taking the context.
//! A leaf returns [`LeafResult`], which is `anyhow::Result<Outcome>`.
//! The `Err` arm is reserved for unexpected failures (faults), a leaf that simply
//! could not do its job returns `Ok(Outcome::Failed)`.
//!
//! ```rust
//! # use fluent_behavior_tree::*;
//! # struct Npc { distance_to_player: f32, attacks: u32 }
//! fn in_melee_range(npc: &Npc) -> bool {
//!     npc.distance_to_player < 2.
//! }
//!
//! fn melee_attack(npc: &mut Npc) -> LeafResult {
//!     npc.attacks += 1;
//!     Ok(Outcome::Succeeded)
//! }
//!
//! fn idle(_npc: &mut Npc) -> LeafResult {
//!     Ok(Outcome::Succeeded)
//! }
//! ```
//!
//! Then you build the tree with the fluent helpers and compile it once into a [`Tree`].
//!
//! ```rust
//! # use fluent_behavior_tree::*;
//! # struct Npc { distance_to_player: f32, attacks: u32 }
//! # fn in_melee_range(npc: &Npc) -> bool { npc.distance_to_player < 2. }
//! # fn melee_attack(npc: &mut Npc) -> LeafResult { npc.attacks += 1; Ok(Outcome::Succeeded) }
//! # fn idle(_npc: &mut Npc) -> LeafResult { Ok(Outcome::Succeeded) }
//! let tree = Tree::from(selector([
//!     when("InMeleeRange", in_melee_range, instant("MeleeAttack", melee_attack)),
//!     instant("Idle", idle),
//! ]));
//!
//! let mut npc = Npc { distance_to_player: 1., attacks: 0 };
//! let cancel = tokio_util::sync::CancellationToken::new();
//! let outcome = futures::executor::block_on(tree.evaluate(&mut npc, &cancel)).unwrap();
//! assert_eq!(outcome, Outcome::Succeeded);
//! assert_eq!(npc.attacks, 1);
//! ```
//!
//! A [`Tree`] holds no state of its own, so one tree can be shared behind an
//! `Arc` by every entity that uses the same behavior.
//! Evaluation walks the compiled tree without recursion and without allocating,
//! so a tree made only of instant leaves costs nothing on the heap per tick.
//! Compiling, evaluating and rendering a [`Tree`] never recurse, so its depth
//! is not limited by the call stack. The text and YAML loaders do recurse
//! while parsing, and an uncompiled [`Node`] is dropped recursively.
//!
//!
//! ## Running the tree from a host loop
//!
//! Hosts do not await evaluations directly. They hand the context to the
//! [`Engine`] wrapped in a [`SharedContext`] and request ticks.
//! [`Engine::request_tick`] answers synchronously: either an evaluation was
//! started and you get a [`Completion`] to await, or an evaluation for that
//! context is still in flight and the tick was dropped.
//!
//! ```rust
//! # use std::sync::Arc;
//! # use fluent_behavior_tree::*;
//! # use tokio_util::sync::CancellationToken;
//! # fn idle(_ctx: &mut u32) -> LeafResult { Ok(Outcome::Succeeded) }
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> anyhow::Result<()> {
//! let tree = Arc::new(Tree::from(instant("Idle", idle)));
//! let context = SharedContext::new(0_u32);
//! let engine = Engine::current()?;
//!
//! if let TickResult::Started(completion) =
//!     engine.request_tick(&tree, &context, CancellationToken::new())
//! {
//!     assert_eq!(completion.await.outcome(), Some(Outcome::Succeeded));
//! }
//! # Ok(())
//! # }
//! ```
//!
//! The [`Driver`] wraps this into a ready-made loop with a [`TickSource`],
//! a fixed tick interval and a policy for faults.
//!
//!
//! ## Leaves that take more than one tick
//!
//! An async leaf is a function returning a [`futures::future::BoxFuture`].
//! Keep a [`Ticks`] handle in the context and await it to give the rest of the
//! host a turn.
//!
//! ```rust
//! # use std::time::Duration;
//! # use fluent_behavior_tree::*;
//! # use futures::future::BoxFuture;
//! # use tokio_util::sync::CancellationToken;
//! struct Archer {
//!     ticks: Ticks,
//!     arrows: u32,
//! }
//!
//! fn range_attack<'a>(archer: &'a mut Archer, _cancel: &'a CancellationToken) -> BoxFuture<'a, LeafResult> {
//!     Box::pin(async move {
//!         // Wind up for half a second of host time.
//!         archer.ticks.wait(Duration::from_millis(500)).await?;
//!         archer.arrows -= 1;
//!         Ok(Outcome::Succeeded)
//!     })
//! }
//!
//! let node: Node<Archer> = action("RangeAttack", range_attack);
//! ```
//!
//! Cancelling the token given to [`Engine::request_tick`] stops the traversal at
//! the leaf's current suspension point; leaves that have not started yet never run.
//!
//!
//! ## The text format
//!
//! Trees can also be written in a small text format and instantiated against a
//! [`Registry`] of named leaves and conditions.
//!
//! ```rust
//! # use fluent_behavior_tree::*;
//! # fn find_target(_: &mut ()) -> LeafResult { Ok(Outcome::Succeeded) }
//! # fn attack(_: &mut ()) -> LeafResult { Ok(Outcome::Succeeded) }
//! # fn has_target(_: &()) -> bool { true }
//! let mut registry = Registry::default();
//! registry.register_instant("FindTarget", find_target);
//! registry.register_instant("Attack", attack);
//! registry.register_condition("HasTarget", has_target);
//!
//! let tree = load_str(r#"
//! tree main = Sequence {
//!     FindTarget
//!     if (HasTarget) {
//!         Attack
//!     }
//! }
//! "#, &registry)?;
//! # Ok::<(), LoadError>(())
//! ```
//!
//! ### Line comments
//!
//! A `#` starts a comment that runs to the end of the line.
//!
//! ```raw
//! # This is a comment
//! tree main = Sequence { # This is a comment too
//!     Patrol
//! }
//! ```
//!
//! ### Node definition
//!
//! `Sequence` (or `Sequencer`) and `Selector` (or `Fallback`) take their children
//! in braces.
//! Any other name refers to a leaf registered in the [`Registry`].
//!
//! ```raw
//! tree main = Selector {
//!     Sequence {
//!         FindTarget
//!         MeleeAttack
//!     }
//!     Patrol
//! }
//! ```
//!
//! ### Conditionals
//!
//! `if (Cond) { ... }` evaluates its children as a sequence only if the registered
//! condition holds, and fails otherwise. `if (!Cond) { ... }` negates it.
//! Put several of them in a `Selector` to get an if / else-if chain.
//!
//! ```raw
//! tree main = Selector {
//!     if (InMeleeRange) { MeleeAttack }
//!     if (!Blocked) { Move }
//!     Idle
//! }
//! ```
//!
//! ### Subtrees
//!
//! A name that is not a registered leaf is looked up among the other trees in
//! the same source, and that tree is inlined in its place.
//! A tree that refers to itself, directly or through other trees, is an error.
//!
//! ```raw
//! tree main = Selector {
//!     Engage
//!     Patrol
//! }
//!
//! tree Engage = Sequence {
//!     FindTarget
//!     MeleeAttack
//! }
//! ```
//!
//! Rendering a [`Tree`] with `Display` produces the same format, with all subtrees inlined.
//!
//! The same trees can be declared in YAML with [`load_yaml`].

mod context;
mod driver;
mod engine;
pub mod error;
mod leaf;
mod nodes;
pub mod parser;
mod registry;
mod tick;

pub use crate::context::SharedContext;
pub use crate::driver::{Driver, DriverConfig, DriverStats, FaultPolicy, TickReport};
pub use crate::engine::{Completion, Engine, TickOutcome, TickResult};
pub use crate::error::{EngineError, Fault, Interrupt, LoadError, LoadYamlError, TickSourceClosed};
pub use crate::leaf::{AsyncFn, Condition, InstantFn, Leaf, LeafBody, PredicateFn};
pub use crate::nodes::{
    action, condition, instant, selector, sequence, unless, when, Children, Composite, Node,
    NodeId, NodeView, Tree,
};
pub use crate::tick::{TickInfo, TickSource, Ticks};
pub use crate::{
    parser::{load, load_str, load_tree, load_yaml, parse_file},
    registry::Registry,
};
pub use ::once_cell::sync::Lazy;

/// The result of a leaf, a combinator or a whole evaluation.
#[derive(PartialEq, Eq, Debug, Clone, Copy, Hash)]
pub enum Outcome {
    Succeeded,
    Failed,
}

impl Outcome {
    pub fn is_succeeded(self) -> bool {
        self == Self::Succeeded
    }

    pub fn is_failed(self) -> bool {
        self == Self::Failed
    }

    pub fn invert(self) -> Self {
        match self {
            Self::Succeeded => Self::Failed,
            Self::Failed => Self::Succeeded,
        }
    }
}

impl From<bool> for Outcome {
    fn from(succeeded: bool) -> Self {
        if succeeded {
            Self::Succeeded
        } else {
            Self::Failed
        }
    }
}

/// What a leaf body returns. `Err` is a fault, not a failure.
pub type LeafResult = anyhow::Result<Outcome>;
