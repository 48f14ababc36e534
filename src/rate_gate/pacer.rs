use std::{
    sync::{Mutex, PoisonError},
    time::Duration,
};

use tokio::time::{Instant, sleep_until};

/// Uniform-spacing slot reserver.
///
/// Each `take_slot()` reserves the next slot separated by `interval` from the previous one and
/// sleeps until it arrives. The first slot is available immediately. A pacer built for zero
/// admissions per second is unrestricted.
///
/// A caller dropped while still sleeping gives its slot back, as long as no later slot has
/// been handed out in the meantime.
#[derive(Debug)]
pub(crate) struct Pacer {
    interval: Duration,
    next_at: Mutex<Instant>,
}

impl Pacer {
    pub(crate) fn new(per_second: u32) -> Self {
        let interval = if per_second == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs(1) / per_second
        };

        Self {
            interval,
            next_at: Mutex::new(Instant::now()),
        }
    }

    pub(crate) fn interval(&self) -> Duration {
        self.interval
    }

    pub(crate) async fn take_slot(&self) {
        if self.interval.is_zero() {
            return;
        }

        let mut slot = PendingSlot {
            pacer: self,
            deadline: self.reserve_slot(),
            taken: false,
        };

        if slot.deadline > Instant::now() {
            sleep_until(slot.deadline).await;
        }
        slot.taken = true;
    }

    fn reserve_slot(&self) -> Instant {
        let mut next_at = self.next_at.lock().unwrap_or_else(PoisonError::into_inner);
        let deadline = (*next_at).max(Instant::now());
        *next_at = deadline + self.interval;
        deadline
    }

    fn give_back(&self, deadline: Instant) {
        let mut next_at = self.next_at.lock().unwrap_or_else(PoisonError::into_inner);
        if *next_at == deadline + self.interval {
            *next_at = deadline;
        }
    }
}

struct PendingSlot<'a> {
    pacer: &'a Pacer,
    deadline: Instant,
    taken: bool,
}

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        if !self.taken {
            self.pacer.give_back(self.deadline);
        }
    }
}
