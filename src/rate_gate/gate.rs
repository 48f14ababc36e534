use std::{
    future::pending,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::{
    PERIOD, REPORT_INTERVAL, RateGateSettings, RoundingMode,
    diagnostics::DiagnosticsReporter,
    error::{CancelledSnafu, ClosedSnafu, RateGateError},
    internal_event::{RateGatePeriodReport, RateGateQuotaExhausted, RateGateStarted, emit},
    pacer::Pacer,
    window::{Reservation, WindowCounter},
};

/// Admits work at a steady per-second pace without exceeding a per-minute quota.
///
/// The gate is shared by reference (usually behind an `Arc`) between every task that performs
/// gated work. Each task awaits [`RateGate::admit`] before doing one unit of work.
///
/// Background tasks (the period reset and, for verbose gates, the throughput reporter) are
/// spawned on the first admission and run until [`RateGate::shutdown`] is called or the gate
/// is dropped. Admission therefore has to happen inside a tokio runtime.
#[derive(Debug)]
pub struct RateGate {
    identifier: Arc<str>,
    target_per_minute: u32,
    target_per_second: u32,
    rounding_mode: RoundingMode,
    verbose: bool,

    pacer: Pacer,
    counter: Arc<WindowCounter>,

    started: AtomicBool,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

impl RateGate {
    pub fn new(
        identifier: impl Into<String>,
        target_per_minute: u32,
        rounding_mode: RoundingMode,
        verbose: bool,
    ) -> Self {
        Self::from_settings(
            RateGateSettings::builder()
                .identifier(identifier)
                .target_per_minute(target_per_minute)
                .rounding_mode(rounding_mode)
                .verbose(verbose)
                .build(),
        )
    }

    pub fn from_settings(settings: RateGateSettings) -> Self {
        let target_per_second = settings.target_per_second();

        Self {
            identifier: Arc::from(settings.identifier),
            target_per_minute: settings.target_per_minute,
            target_per_second,
            rounding_mode: settings.rounding_mode,
            verbose: settings.verbose,
            pacer: Pacer::new(target_per_second),
            counter: Arc::new(WindowCounter::new()),
            started: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
        }
    }

    /// Waits until both the period quota and the pacer allow one more unit of work.
    ///
    /// Blocks for as long as it takes: with a `target_per_minute` of zero it never returns
    /// unless the gate is shut down. Fails only with [`RateGateError::Closed`].
    pub async fn admit(&self) -> Result<(), RateGateError> {
        self.acquire(None).await
    }

    /// Like [`RateGate::admit`], but gives up with [`RateGateError::Cancelled`] once `cancel`
    /// fires. A quota reservation taken before cancellation is handed back, unless its period
    /// has already ended.
    pub async fn admit_until(&self, cancel: &CancellationToken) -> Result<(), RateGateError> {
        self.acquire(Some(cancel)).await
    }

    /// Stops the background tasks and waits for them to exit.
    ///
    /// Pending and later admissions fail with [`RateGateError::Closed`]. Calling it more than
    /// once is harmless.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.tasks.close();
        self.tasks.wait().await;

        debug!(gate = %self.identifier, "Rate gate shut down.");
    }

    async fn acquire(&self, cancel: Option<&CancellationToken>) -> Result<(), RateGateError> {
        if self.shutdown.is_cancelled() {
            return self.closed();
        }
        self.ensure_started();

        let caller_cancelled = async {
            match cancel {
                Some(token) => token.cancelled().await,
                None => pending().await,
            }
        };
        tokio::pin!(caller_cancelled);

        let reservation = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return self.closed(),
            _ = &mut caller_cancelled => return self.cancelled(),
            reservation = self.reserve() => reservation,
        };

        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => {
                self.counter.release(reservation);
                self.closed()
            }
            _ = &mut caller_cancelled => {
                self.counter.release(reservation);
                self.cancelled()
            }
            _ = self.pacer.take_slot() => {
                self.counter.complete(reservation);
                Ok(())
            }
        }
    }

    /// Takes a slot in the current period's quota, waiting for period resets while the quota
    /// is exhausted.
    async fn reserve(&self) -> Reservation {
        loop {
            let reset = self.counter.notified();
            tokio::pin!(reset);
            reset.as_mut().enable();

            if let Some(reservation) = self.counter.try_reserve(self.target_per_minute) {
                return reservation;
            }

            if self.verbose {
                emit(RateGateQuotaExhausted {
                    gate: &self.identifier,
                    reserved: self.counter.reserved(),
                    allowed_per_minute: self.target_per_minute,
                });
            }

            reset.await;
        }
    }

    fn ensure_started(&self) {
        if self.started.load(Ordering::Acquire)
            || self
                .started
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
        {
            return;
        }

        let first_reset = Instant::now() + PERIOD;
        self.tasks.spawn(run_period_reset(
            Arc::clone(&self.identifier),
            Arc::clone(&self.counter),
            self.target_per_minute,
            self.verbose,
            first_reset,
            self.shutdown.clone(),
        ));

        if self.verbose {
            let reporter = DiagnosticsReporter {
                identifier: Arc::clone(&self.identifier),
                counter: Arc::clone(&self.counter),
                target_per_second: self.target_per_second,
                every: REPORT_INTERVAL,
            };
            self.tasks.spawn(reporter.run(self.shutdown.clone()));

            emit(RateGateStarted {
                gate: &self.identifier,
                target_per_minute: self.target_per_minute,
                target_per_second: self.target_per_second,
            });
        }

        debug!(
            gate = %self.identifier,
            target_per_minute = self.target_per_minute,
            target_per_second = self.target_per_second,
            pacing_interval_ms = self.pacer.interval().as_millis() as u64,
            "Rate gate background tasks started."
        );
    }

    fn closed(&self) -> Result<(), RateGateError> {
        ClosedSnafu {
            identifier: &*self.identifier,
        }
        .fail()
    }

    fn cancelled(&self) -> Result<(), RateGateError> {
        CancelledSnafu {
            identifier: &*self.identifier,
        }
        .fail()
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn target_per_minute(&self) -> u32 {
        self.target_per_minute
    }

    pub fn target_per_second(&self) -> u32 {
        self.target_per_second
    }

    pub fn rounding_mode(&self) -> RoundingMode {
        self.rounding_mode
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Whether the first admission has already launched the background tasks.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Admissions completed in the current period.
    ///
    /// Callers still waiting for their pacer slot are not included.
    pub fn admitted_this_period(&self) -> u64 {
        self.counter.current()
    }

    /// Number of background tasks still running for this gate.
    pub fn background_tasks(&self) -> usize {
        self.tasks.len()
    }
}

impl Drop for RateGate {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.tasks.close();
    }
}

/// Zeroes the admissions counter once per period until `shutdown` fires.
async fn run_period_reset(
    identifier: Arc<str>,
    counter: Arc<WindowCounter>,
    target_per_minute: u32,
    verbose: bool,
    first_reset: Instant,
    shutdown: CancellationToken,
) {
    let mut ticker = interval_at(first_reset, PERIOD);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if verbose {
            emit(RateGatePeriodReport {
                gate: &identifier,
                admitted: counter.current(),
                allowed_per_minute: target_per_minute,
            });
        }

        let previous = counter.reset();
        trace!(gate = %identifier, previous, "Period reset.");
    }

    debug!(gate = %identifier, "Period reset task stopped.");
}
