use std::{sync::Arc, time::Duration};

use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;

use super::internal_event::{RateGateWindowReport, emit};
use super::window::WindowCounter;

/// Turns successive counter readings into per-window deltas.
///
/// The counter drops back to zero at every period reset, so a reading lower than the
/// previous one yields a delta of zero rather than wrapping.
#[derive(Debug, Default)]
pub(crate) struct WindowTracker {
    previous: u64,
}

impl WindowTracker {
    pub(crate) fn advance(&mut self, current: u64) -> u64 {
        let completed = current.saturating_sub(self.previous);
        self.previous = current;
        completed
    }
}

/// Periodically reports throughput for a verbose gate until `shutdown` fires.
///
/// Only reads the counter; gating decisions never depend on it.
pub(crate) struct DiagnosticsReporter {
    pub(crate) identifier: Arc<str>,
    pub(crate) counter: Arc<WindowCounter>,
    pub(crate) target_per_second: u32,
    pub(crate) every: Duration,
}

impl DiagnosticsReporter {
    pub(crate) async fn run(self, shutdown: CancellationToken) {
        let mut ticker = interval_at(Instant::now() + self.every, self.every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Spawned before the first admission completes, so every completion is counted.
        let mut tracker = WindowTracker::default();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let admitted_this_period = self.counter.current();
            emit(RateGateWindowReport {
                gate: &self.identifier,
                completed: tracker.advance(admitted_this_period),
                window: self.every,
                target_per_second: self.target_per_second,
                admitted_this_period,
            });
        }

        debug!(gate = %self.identifier, "Diagnostics reporter stopped.");
    }
}
