//! A reference host loop: fire the tick source, collect the outcome of a
//! finished evaluation, and ask for a new one.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, debug_span, error, info, Instrument};

use crate::engine::{Completion, Engine, TickOutcome, TickResult};
use crate::error::Fault;
use crate::tick::{TickInfo, TickSource, Ticks};
use crate::{SharedContext, Tree};

/// What the driver does with a faulted evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultPolicy {
    /// Log the fault and keep ticking.
    #[default]
    Log,
    /// Return the fault from [`Driver::tick`] and [`Driver::run`].
    Propagate,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    pub tick_interval_ms: u64,
    pub fault_policy: FaultPolicy,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 16,
            fault_policy: FaultPolicy::default(),
        }
    }
}

impl DriverConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

/// Evaluation counters kept by a [`Driver`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverStats {
    pub started: u64,
    pub dropped: u64,
    pub completed: u64,
    pub cancelled: u64,
    pub faulted: u64,
}

#[derive(Debug)]
pub struct TickReport {
    pub tick: TickInfo,
    /// A new evaluation was started by this tick.
    pub started: bool,
    /// An evaluation that finished since the previous tick.
    pub finished: Option<TickOutcome>,
}

impl TickReport {
    /// The tick found an evaluation still in flight and was dropped.
    pub fn dropped(&self) -> bool {
        !self.started
    }
}

/// Drives one tree against one context.
pub struct Driver<C> {
    config: DriverConfig,
    engine: Engine,
    tree: Arc<Tree<C>>,
    context: SharedContext<C>,
    source: TickSource,
    pending: Option<Completion>,
    cancel: CancellationToken,
    stats: DriverStats,
}

impl<C> Driver<C>
where
    C: Send + 'static,
{
    /// `source` is the tick source the context's leaves subscribed to.
    pub fn new(
        engine: Engine,
        tree: Arc<Tree<C>>,
        context: SharedContext<C>,
        source: TickSource,
        config: DriverConfig,
    ) -> Self {
        Self {
            config,
            engine,
            tree,
            context,
            source,
            pending: None,
            cancel: CancellationToken::new(),
            stats: DriverStats::default(),
        }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn tree(&self) -> &Arc<Tree<C>> {
        &self.tree
    }

    pub fn context(&self) -> &SharedContext<C> {
        &self.context
    }

    pub fn ticks(&self) -> Ticks {
        self.source.subscribe()
    }

    pub fn stats(&self) -> DriverStats {
        self.stats
    }

    pub fn is_evaluating(&self) -> bool {
        self.pending.is_some()
    }

    /// Advance the host by one tick of `delta`.
    pub async fn tick(&mut self, delta: Duration) -> Result<TickReport, Fault> {
        let tick = self.source.fire(delta);
        let span = debug_span!("tick", frame = tick.frame);
        self.tick_inner(tick).instrument(span).await
    }

    async fn tick_inner(&mut self, tick: TickInfo) -> Result<TickReport, Fault> {
        let mut finished = None;
        if self.pending.as_ref().map_or(false, Completion::is_finished) {
            if let Some(done) = self.pending.take() {
                finished = Some(self.record(done.await)?);
            }
        }

        let started = match self
            .engine
            .request_tick(&self.tree, &self.context, self.cancel.child_token())
        {
            TickResult::Started(completion) => {
                self.stats.started += 1;
                // The previous evaluation released the guard after the check above.
                if let Some(previous) = self.pending.replace(completion) {
                    finished = Some(self.record(previous.await)?);
                }
                true
            }
            TickResult::AlreadyRunning => {
                self.stats.dropped += 1;
                false
            }
        };

        Ok(TickReport {
            tick,
            started,
            finished,
        })
    }

    fn record(&mut self, outcome: TickOutcome) -> Result<TickOutcome, Fault> {
        match outcome {
            TickOutcome::Completed(_) => self.stats.completed += 1,
            TickOutcome::Cancelled => self.stats.cancelled += 1,
            TickOutcome::Faulted(fault) => {
                self.stats.faulted += 1;
                match self.config.fault_policy {
                    FaultPolicy::Log => {
                        error!(tree = %self.tree.name(), %fault, "evaluation faulted");
                        return Ok(TickOutcome::Faulted(fault));
                    }
                    FaultPolicy::Propagate => return Err(fault),
                }
            }
        }
        Ok(outcome)
    }

    /// Cancel the in-flight evaluation, if any, and wait for it to wind down.
    pub async fn shutdown(&mut self) -> Result<Option<TickOutcome>, Fault> {
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
        match self.pending.take() {
            Some(pending) => Ok(Some(self.record(pending.await)?)),
            None => Ok(None),
        }
    }

    /// Tick at the configured interval until `cancel` fires.
    ///
    /// Cancelling also cancels the evaluation in flight at that moment.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<DriverStats, Fault> {
        let mut interval = tokio::time::interval(self.config.tick_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            tree = %self.tree.name(),
            interval = ?self.config.tick_interval(),
            "driver started"
        );

        let mut last = Instant::now();
        let res = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break Ok(()),
                now = interval.tick() => {
                    let delta = now.saturating_duration_since(last);
                    last = now;
                    if let Err(fault) = self.tick(delta).await {
                        break Err(fault);
                    }
                }
            }
        };

        let shutdown = self.shutdown().await;
        debug!(stats = ?self.stats, "driver stopped");
        res?;
        shutdown?;
        Ok(self.stats)
    }
}

#[cfg(test)]
mod test;
