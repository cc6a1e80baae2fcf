//! A generic "wait for the next tick" suspension point.
//!
//! The host owns a [`TickSource`] and fires it once per scheduling period
//! (a frame, a timer, a message). Multi-tick leaves keep a [`Ticks`] handle in
//! their context and await it between the steps of their work.

use std::time::Duration;

use tokio::sync::watch;

use crate::error::TickSourceClosed;

/// A snapshot of the host's tick counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickInfo {
    /// Number of ticks fired so far.
    pub frame: u64,
    /// Tick time since the previous tick.
    pub delta: Duration,
    /// Tick time accumulated since the source was created.
    pub elapsed: Duration,
}

pub struct TickSource {
    tx: watch::Sender<TickInfo>,
}

impl TickSource {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(TickInfo::default());
        Self { tx }
    }

    /// Publish a new tick, waking every leaf suspended on [`Ticks::next`].
    pub fn fire(&self, delta: Duration) -> TickInfo {
        let mut fired = TickInfo::default();
        self.tx.send_modify(|info| {
            info.frame += 1;
            info.delta = delta;
            info.elapsed += delta;
            fired = *info;
        });
        fired
    }

    pub fn current(&self) -> TickInfo {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> Ticks {
        Ticks {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for TickSource {
    fn default() -> Self {
        Self::new()
    }
}

/// The leaf side of a [`TickSource`].
#[derive(Debug, Clone)]
pub struct Ticks {
    rx: watch::Receiver<TickInfo>,
}

impl Ticks {
    /// Suspend until a tick strictly later than the latest one is fired.
    ///
    /// Ticks fired while nobody was waiting are not replayed: the caller
    /// always yields at least once.
    pub async fn next(&mut self) -> Result<TickInfo, TickSourceClosed> {
        self.rx.borrow_and_update();
        self.rx.changed().await.map_err(|_| TickSourceClosed)?;
        Ok(*self.rx.borrow_and_update())
    }

    pub fn current(&self) -> TickInfo {
        *self.rx.borrow()
    }

    /// Suspend across as many ticks as it takes for `duration` of tick time to pass.
    ///
    /// Returns the number of ticks waited. A zero duration still yields once.
    pub async fn wait(&mut self, duration: Duration) -> Result<u64, TickSourceClosed> {
        let start = self.current().elapsed;
        let mut waited = 0;
        loop {
            let info = self.next().await?;
            waited += 1;
            if info.elapsed.saturating_sub(start) >= duration {
                return Ok(waited);
            }
        }
    }
}
