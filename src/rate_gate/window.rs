use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Notify, futures::Notified};

const COUNT_BITS: u32 = 32;
const COUNT_MASK: u64 = (1 << COUNT_BITS) - 1;

fn pack(epoch: u32, reserved: u32) -> u64 {
    (u64::from(epoch) << COUNT_BITS) | u64::from(reserved)
}

fn unpack(quota: u64) -> (u32, u32) {
    ((quota >> COUNT_BITS) as u32, (quota & COUNT_MASK) as u32)
}

/// Quota slot taken in a given period.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[must_use]
pub(crate) struct Reservation {
    epoch: u32,
}

/// Admission bookkeeping for the current period.
///
/// Two counts are kept. `reserved` gates admission: a reservation is a single conditional
/// read-modify-write on a word holding both the period epoch and the count, so concurrent
/// callers never push it past the limit and a released reservation only ever comes off the
/// period it was taken in. `admitted` counts admissions that actually completed this period.
///
/// `reset()` starts a new epoch, zeroes both counts and wakes every caller waiting in
/// [`WindowCounter::notified`].
#[derive(Debug, Default)]
pub(crate) struct WindowCounter {
    quota: AtomicU64,
    admitted: AtomicU64,
    reset_signal: Notify,
}

impl WindowCounter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Takes one slot if fewer than `limit` have been taken this period.
    pub(crate) fn try_reserve(&self, limit: u32) -> Option<Reservation> {
        self.quota
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |quota| {
                let (epoch, reserved) = unpack(quota);
                (reserved < limit).then(|| pack(epoch, reserved + 1))
            })
            .ok()
            .map(|previous| Reservation {
                epoch: unpack(previous).0,
            })
    }

    /// Gives back an abandoned reservation. Returns `false` when its period is already over.
    pub(crate) fn release(&self, reservation: Reservation) -> bool {
        self.quota
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |quota| {
                let (epoch, reserved) = unpack(quota);
                (epoch == reservation.epoch && reserved > 0).then(|| pack(epoch, reserved - 1))
            })
            .is_ok()
    }

    /// Counts a reservation whose admission went through.
    pub(crate) fn complete(&self, _reservation: Reservation) {
        let _ = self
            .admitted
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |admitted| {
                Some(admitted.saturating_add(1))
            });
    }

    /// Starts a new period, returning how many admissions the previous one completed.
    pub(crate) fn reset(&self) -> u64 {
        let _ = self
            .quota
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |quota| {
                Some(pack(unpack(quota).0.wrapping_add(1), 0))
            });
        let previous = self.admitted.swap(0, Ordering::AcqRel);
        self.reset_signal.notify_waiters();
        previous
    }

    /// Admissions completed this period.
    pub(crate) fn current(&self) -> u64 {
        self.admitted.load(Ordering::Acquire)
    }

    /// Slots taken this period, including admissions still waiting on the pacer.
    pub(crate) fn reserved(&self) -> u64 {
        u64::from(unpack(self.quota.load(Ordering::Acquire)).1)
    }

    /// A future resolving on the next `reset()`.
    ///
    /// Callers must `enable()` it before re-checking the quota, otherwise a reset landing
    /// between the check and the first poll is missed.
    pub(crate) fn notified(&self) -> Notified<'_> {
        self.reset_signal.notified()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio_test::{assert_pending, assert_ready, task};

    use super::*;

    #[test]
    fn reserves_up_to_limit() {
        let counter = WindowCounter::new();

        assert!(counter.try_reserve(3).is_some());
        assert!(counter.try_reserve(3).is_some());
        assert!(counter.try_reserve(3).is_some());
        assert!(counter.try_reserve(3).is_none());
        assert_eq!(counter.reserved(), 3);
    }

    #[test]
    fn zero_limit_never_reserves() {
        let counter = WindowCounter::new();

        assert!(counter.try_reserve(0).is_none());
        assert_eq!(counter.reset(), 0);
        assert!(counter.try_reserve(0).is_none());
    }

    #[test]
    fn only_completed_admissions_are_counted() {
        let counter = WindowCounter::new();
        let first = counter.try_reserve(10).unwrap();
        let _pending = counter.try_reserve(10).unwrap();

        counter.complete(first);

        assert_eq!(counter.reserved(), 2);
        assert_eq!(counter.current(), 1);
    }

    #[test]
    fn reset_reports_previous_completions() {
        let counter = WindowCounter::new();
        for _ in 0..2 {
            let reservation = counter.try_reserve(10).unwrap();
            counter.complete(reservation);
        }

        assert_eq!(counter.reset(), 2);
        assert_eq!(counter.current(), 0);
        assert_eq!(counter.reserved(), 0);
        assert!(counter.try_reserve(10).is_some());
    }

    #[test]
    fn release_returns_slot_to_its_period() {
        let counter = WindowCounter::new();
        let reservation = counter.try_reserve(1).unwrap();
        assert!(counter.try_reserve(1).is_none());

        assert!(counter.release(reservation));

        assert_eq!(counter.reserved(), 0);
        assert!(counter.try_reserve(1).is_some());
    }

    #[test]
    fn release_after_reset_leaves_new_period_alone() {
        let counter = WindowCounter::new();
        let stale = counter.try_reserve(1).unwrap();

        counter.reset();
        let _fresh = counter.try_reserve(1).unwrap();

        assert!(!counter.release(stale));
        assert_eq!(counter.reserved(), 1);
        assert!(counter.try_reserve(1).is_none());
    }

    #[test]
    fn reset_wakes_enabled_waiters() {
        let counter = WindowCounter::new();
        let mut waiter = task::spawn(counter.notified());

        assert_pending!(waiter.poll());
        counter.reset();

        assert!(waiter.is_woken());
        assert_ready!(waiter.poll());
    }

    #[test]
    fn concurrent_reservations_never_overshoot() {
        let counter = Arc::new(WindowCounter::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let counter = Arc::clone(&counter);
                std::thread::spawn(move || {
                    (0..1000)
                        .filter(|_| counter.try_reserve(500).is_some())
                        .count()
                })
            })
            .collect();

        let granted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        assert_eq!(granted, 500);
        assert_eq!(counter.reserved(), 500);
    }
}
