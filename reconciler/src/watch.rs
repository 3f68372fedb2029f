//! Continuous reconciliation
//!
//! Re-runs the pipeline at a fixed interval. Every tick is an independent
//! pass: a failing tick is logged and the loop carries on. The loop stops
//! only on cancellation.

use crate::cancel::CancelToken;
use std::future::Future;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

/// Ticker around the reconciliation pipeline.
#[derive(Debug, Clone)]
pub struct WatchLoop {
    interval: Duration,
}

impl WatchLoop {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Run `tick` once per interval until cancelled. The first tick fires
    /// immediately. Returns the number of ticks that ran.
    ///
    /// `tick` receives the 0-based tick counter and reports success as
    /// `Ok(())`; errors are logged and swallowed so one bad pass never
    /// blocks the next.
    pub async fn run<F, Fut, E>(&self, cancel: &CancelToken, mut tick: F) -> u64
    where
        F: FnMut(u64) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: std::fmt::Display,
    {
        let mut timer = tokio::time::interval(self.interval.max(Duration::from_millis(1)));
        // A slow pass must not cause a burst of catch-up ticks.
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut ticks = 0u64;
        loop {
            tokio::select! {
                // Checked first so a pre-cancelled token never starts a tick.
                biased;
                _ = cancel.cancelled() => break,
                _ = timer.tick() => {}
            }

            let n = ticks;
            ticks += 1;
            info!(tick = n, "watch tick starting");
            // The pass itself also honors the token; a cancel mid-pass ends
            // both the pass and the loop.
            match tick(n).await {
                Ok(()) => info!(tick = n, "watch tick finished"),
                Err(e) => error!(tick = n, error = %e, "watch tick failed; continuing"),
            }

            if cancel.is_cancelled() {
                break;
            }
        }
        info!(ticks, "watch loop stopped");
        ticks
    }
}
