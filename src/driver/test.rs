use futures::future::BoxFuture;

use super::*;
use crate::{action, instant, LeafResult, Outcome};

struct Worker {
    ticks: Ticks,
    finished: u32,
}

fn fixture(tree: Tree<Worker>, fault_policy: FaultPolicy) -> Driver<Worker> {
    let source = TickSource::new();
    let context = SharedContext::new(Worker {
        ticks: source.subscribe(),
        finished: 0,
    });
    Driver::new(
        Engine::current().unwrap(),
        Arc::new(tree),
        context,
        source,
        DriverConfig {
            fault_policy,
            ..DriverConfig::default()
        },
    )
}

fn wind_up<'a>(ctx: &'a mut Worker, _cancel: &'a CancellationToken) -> BoxFuture<'a, LeafResult> {
    Box::pin(async move {
        ctx.ticks.wait(Duration::from_millis(40)).await?;
        ctx.finished += 1;
        Ok(Outcome::Succeeded)
    })
}

fn forever<'a>(ctx: &'a mut Worker, _cancel: &'a CancellationToken) -> BoxFuture<'a, LeafResult> {
    Box::pin(async move {
        ctx.ticks.wait(Duration::from_secs(3600)).await?;
        ctx.finished += 1;
        Ok(Outcome::Succeeded)
    })
}

fn explode(_ctx: &mut Worker) -> LeafResult {
    anyhow::bail!("overheated")
}

const FRAME: Duration = Duration::from_millis(16);

#[test]
fn test_config_defaults() {
    let config = DriverConfig::default();
    assert_eq!(config.tick_interval(), Duration::from_millis(16));
    assert_eq!(config.fault_policy, FaultPolicy::Log);

    let config: DriverConfig = serde_yaml::from_str("fault_policy: propagate").unwrap();
    assert_eq!(config.tick_interval_ms, 16);
    assert_eq!(config.fault_policy, FaultPolicy::Propagate);

    let config: DriverConfig = serde_yaml::from_str("tick_interval_ms: 50").unwrap();
    assert_eq!(config.tick_interval(), Duration::from_millis(50));
    assert_eq!(config.fault_policy, FaultPolicy::Log);
}

#[tokio::test]
async fn test_multi_tick_leaf_drops_ticks() {
    let mut driver = fixture(Tree::from(action("WindUp", wind_up)), FaultPolicy::Log);

    let first = driver.tick(FRAME).await.unwrap();
    assert!(first.started);
    assert_eq!(first.tick.frame, 1);
    assert!(first.finished.is_none());

    let mut finished = None;
    for _ in 0..20 {
        tokio::task::yield_now().await;
        let report = driver.tick(FRAME).await.unwrap();
        if let Some(outcome) = report.finished {
            assert!(report.started);
            finished = Some(outcome);
            break;
        }
        assert!(report.dropped());
    }

    assert_eq!(
        finished.and_then(|outcome| outcome.outcome()),
        Some(Outcome::Succeeded)
    );
    let stats = driver.stats();
    assert_eq!(stats.started, 2);
    assert_eq!(stats.completed, 1);
    assert!(stats.dropped >= 2, "{stats:?}");

    // The tick that collected the outcome started the next evaluation.
    assert!(matches!(driver.shutdown().await, Ok(Some(TickOutcome::Cancelled))));
    assert_eq!(driver.context().lock().await.finished, 1);
}

#[tokio::test]
async fn test_fault_is_logged() {
    let mut driver = fixture(Tree::from(instant("Explode", explode)), FaultPolicy::Log);

    assert!(driver.tick(FRAME).await.unwrap().started);
    tokio::task::yield_now().await;

    let report = driver.tick(FRAME).await.unwrap();
    assert!(matches!(report.finished, Some(TickOutcome::Faulted(Fault::Leaf { .. }))));
    // The driver keeps going after a logged fault.
    assert!(report.started);
    assert_eq!(driver.stats().faulted, 1);
}

#[tokio::test]
async fn test_fault_is_propagated() {
    let mut driver = fixture(Tree::from(instant("Explode", explode)), FaultPolicy::Propagate);

    assert!(driver.tick(FRAME).await.unwrap().started);
    tokio::task::yield_now().await;

    match driver.tick(FRAME).await {
        Err(Fault::Leaf { leaf, error }) => {
            assert_eq!(leaf, "Explode");
            assert_eq!(error.to_string(), "overheated");
        }
        res => panic!("unexpected result {res:?}"),
    }
    assert_eq!(driver.stats().faulted, 1);
}

#[tokio::test]
async fn test_shutdown_cancels_in_flight() {
    let mut driver = fixture(Tree::from(action("Forever", forever)), FaultPolicy::Log);

    assert!(driver.tick(FRAME).await.unwrap().started);
    tokio::task::yield_now().await;
    assert!(driver.context().is_evaluating());

    let outcome = driver.shutdown().await.unwrap();
    assert!(matches!(outcome, Some(TickOutcome::Cancelled)));
    assert!(!driver.context().is_evaluating());
    assert!(!driver.is_evaluating());

    // A fresh token is installed, so the driver can start again.
    assert!(driver.tick(FRAME).await.unwrap().started);
}

#[tokio::test(start_paused = true)]
async fn test_run_until_cancelled() {
    let mut driver = fixture(Tree::from(action("Forever", forever)), FaultPolicy::Log);
    let cancel = CancellationToken::new();

    let stopper = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        stopper.cancel();
    });

    let stats = driver.run(cancel).await.unwrap();
    assert_eq!(stats.started, 1);
    assert_eq!(stats.cancelled, 1);
    assert!(stats.dropped >= 3, "{stats:?}");
    assert_eq!(driver.context().lock().await.finished, 0);
}
