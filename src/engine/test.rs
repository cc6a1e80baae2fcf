use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::Notify;

use super::*;
use crate::{action, instant, selector, sequence, when, LeafResult, TickSource, Ticks};

struct Pawn {
    calls: Vec<&'static str>,
    entered: Arc<Notify>,
    gate: Arc<Notify>,
    ticks: Ticks,
    armed: bool,
}

struct Harness {
    engine: Engine,
    ctx: SharedContext<Pawn>,
    entered: Arc<Notify>,
    gate: Arc<Notify>,
    source: TickSource,
}

impl Harness {
    fn new() -> Self {
        let entered = Arc::new(Notify::new());
        let gate = Arc::new(Notify::new());
        let source = TickSource::new();
        let ctx = SharedContext::new(Pawn {
            calls: vec![],
            entered: entered.clone(),
            gate: gate.clone(),
            ticks: source.subscribe(),
            armed: false,
        });
        Self {
            engine: Engine::current().unwrap(),
            ctx,
            entered,
            gate,
            source,
        }
    }

    fn start(&self, tree: &Arc<Tree<Pawn>>, cancel: CancellationToken) -> Completion {
        self.engine
            .request_tick(tree, &self.ctx, cancel)
            .into_completion()
            .expect("a fresh tick should start an evaluation")
    }

    async fn calls(&self) -> Vec<&'static str> {
        self.ctx.lock().await.calls.clone()
    }
}

async fn finish(completion: Completion) -> TickOutcome {
    tokio::time::timeout(Duration::from_secs(5), completion)
        .await
        .expect("evaluation did not finish")
}

fn gated<'a>(ctx: &'a mut Pawn, _cancel: &'a CancellationToken) -> BoxFuture<'a, LeafResult> {
    Box::pin(async move {
        ctx.calls.push("gated:start");
        ctx.entered.notify_one();
        ctx.gate.notified().await;
        ctx.calls.push("gated:end");
        Ok(Outcome::Succeeded)
    })
}

fn wind_up<'a>(ctx: &'a mut Pawn, _cancel: &'a CancellationToken) -> BoxFuture<'a, LeafResult> {
    Box::pin(async move {
        ctx.calls.push("wind_up:start");
        ctx.ticks.wait(Duration::from_millis(40)).await?;
        ctx.calls.push("wind_up:end");
        Ok(Outcome::Succeeded)
    })
}

fn after(ctx: &mut Pawn) -> LeafResult {
    ctx.calls.push("after");
    Ok(Outcome::Succeeded)
}

fn explode_once(ctx: &mut Pawn) -> LeafResult {
    ctx.calls.push("explode_once");
    if ctx.armed {
        ctx.armed = false;
        anyhow::bail!("boom");
    }
    Ok(Outcome::Succeeded)
}

fn arm(ctx: &mut Pawn) -> LeafResult {
    ctx.armed = true;
    Ok(Outcome::Succeeded)
}

fn cancel_self<'a>(ctx: &'a mut Pawn, cancel: &'a CancellationToken) -> BoxFuture<'a, LeafResult> {
    Box::pin(async move {
        ctx.calls.push("cancel_self");
        cancel.cancel();
        Ok(Outcome::Succeeded)
    })
}

fn panicking(_ctx: &Pawn) -> bool {
    panic!("predicate blew up")
}

#[tokio::test]
async fn test_second_request_is_dropped_while_in_flight() {
    let h = Harness::new();
    let tree = Arc::new(Tree::from(sequence([
        action("gated", gated),
        instant("after", after),
    ])));

    let first = h.start(&tree, CancellationToken::new());
    // Dropped even before the evaluation got to run.
    assert!(!h.engine.request_tick(&tree, &h.ctx, CancellationToken::new()).is_started());

    h.entered.notified().await;
    assert!(h.ctx.is_evaluating());
    assert!(matches!(
        h.engine.request_tick(&tree, &h.ctx, CancellationToken::new()),
        TickResult::AlreadyRunning
    ));

    h.gate.notify_one();
    assert_eq!(finish(first).await.outcome(), Some(Outcome::Succeeded));
    assert!(!h.ctx.is_evaluating());

    h.gate.notify_one();
    let second = h.start(&tree, CancellationToken::new());
    assert_eq!(finish(second).await.outcome(), Some(Outcome::Succeeded));

    assert_eq!(
        h.calls().await,
        vec!["gated:start", "gated:end", "after", "gated:start", "gated:end", "after"]
    );
}

#[tokio::test]
async fn test_ticks_are_dropped_not_queued() {
    let h = Harness::new();
    let tree = Arc::new(Tree::from(action("wind_up", wind_up)));

    let first = h.start(&tree, CancellationToken::new());
    let mut dropped = 0;
    for _ in 0..100 {
        h.source.fire(Duration::from_millis(16));
        tokio::task::yield_now().await;
        if first.is_finished() {
            break;
        }
        assert!(!h.engine.request_tick(&tree, &h.ctx, CancellationToken::new()).is_started());
        dropped += 1;
    }

    assert_eq!(finish(first).await.outcome(), Some(Outcome::Succeeded));
    assert!(dropped >= 2);
    assert_eq!(h.calls().await, vec!["wind_up:start", "wind_up:end"]);
}

#[tokio::test]
async fn test_fault_clears_guard() {
    let h = Harness::new();
    let tree = Arc::new(Tree::from(selector([
        instant("explode_once", explode_once),
        instant("after", after),
    ])));
    h.ctx.lock().await.armed = true;

    match finish(h.start(&tree, CancellationToken::new())).await {
        TickOutcome::Faulted(Fault::Leaf { leaf, error }) => {
            assert_eq!(leaf, "explode_once");
            assert_eq!(error.to_string(), "boom");
        }
        outcome => panic!("unexpected outcome {outcome:?}"),
    }
    assert!(!h.ctx.is_evaluating());

    let outcome = finish(h.start(&tree, CancellationToken::new())).await;
    assert_eq!(outcome.outcome(), Some(Outcome::Succeeded));
    // The selector never reached its fallback: the fault ended the first traversal.
    assert_eq!(h.calls().await, vec!["explode_once", "explode_once"]);
}

#[tokio::test]
async fn test_fault_mid_sequence_skips_rest() {
    let h = Harness::new();
    let tree = Arc::new(Tree::from(sequence([
        instant("arm", arm),
        instant("explode_once", explode_once),
        instant("after", after),
    ])));

    assert!(finish(h.start(&tree, CancellationToken::new())).await.is_faulted());
    assert_eq!(h.calls().await, vec!["explode_once"]);
}

#[tokio::test]
async fn test_panic_is_reported_as_fault() {
    let h = Harness::new();
    let panics = Arc::new(Tree::from(when("Panicking", panicking, instant("after", after))));

    match finish(h.start(&panics, CancellationToken::new())).await {
        TickOutcome::Faulted(Fault::Panic(msg)) => assert!(msg.contains("predicate blew up")),
        outcome => panic!("unexpected outcome {outcome:?}"),
    }
    assert!(!h.ctx.is_evaluating());

    let healthy = Arc::new(Tree::from(instant("after", after)));
    let outcome = finish(h.start(&healthy, CancellationToken::new())).await;
    assert_eq!(outcome.outcome(), Some(Outcome::Succeeded));
}

#[tokio::test]
async fn test_cancel_while_suspended() {
    let h = Harness::new();
    let tree = Arc::new(Tree::from(sequence([
        action("gated", gated),
        instant("after", after),
    ])));
    let cancel = CancellationToken::new();

    let completion = h.start(&tree, cancel.clone());
    h.entered.notified().await;
    cancel.cancel();

    assert!(finish(completion).await.is_cancelled());
    assert!(!h.ctx.is_evaluating());
    assert_eq!(h.calls().await, vec!["gated:start"]);
}

#[tokio::test]
async fn test_cancel_during_last_leaf() {
    let h = Harness::new();
    let tree = Arc::new(Tree::from(sequence([
        instant("after", after),
        action("cancel_self", cancel_self),
    ])));
    let cancel = CancellationToken::new();

    assert!(finish(h.start(&tree, cancel.clone())).await.is_cancelled());
    assert!(cancel.is_cancelled());
    assert!(!h.ctx.is_evaluating());
    assert_eq!(h.calls().await, vec!["after", "cancel_self"]);

    let healthy = Arc::new(Tree::from(instant("after", after)));
    let outcome = finish(h.start(&healthy, CancellationToken::new())).await;
    assert_eq!(outcome.outcome(), Some(Outcome::Succeeded));
}

#[tokio::test]
async fn test_cancel_before_start() {
    let h = Harness::new();
    let tree = Arc::new(Tree::from(instant("after", after)));
    let cancel = CancellationToken::new();
    cancel.cancel();

    assert!(finish(h.start(&tree, cancel)).await.is_cancelled());
    assert!(h.calls().await.is_empty());

    let outcome = finish(h.start(&tree, CancellationToken::new())).await;
    assert_eq!(outcome.outcome(), Some(Outcome::Succeeded));
}

#[tokio::test]
async fn test_contexts_are_independent() {
    let h = Harness::new();
    let other = Harness::new();
    let tree = Arc::new(Tree::from(action("gated", gated)));

    let first = h.start(&tree, CancellationToken::new());
    h.entered.notified().await;

    // Same tree, different context: not blocked by the first evaluation.
    other.gate.notify_one();
    let second = other.start(&tree, CancellationToken::new());
    assert_eq!(finish(second).await.outcome(), Some(Outcome::Succeeded));

    h.gate.notify_one();
    assert_eq!(finish(first).await.outcome(), Some(Outcome::Succeeded));
}

#[test]
fn test_engine_requires_runtime() {
    assert!(matches!(Engine::current(), Err(EngineError::NoRuntime(_))));
}
