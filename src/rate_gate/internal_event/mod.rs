//! Diagnostic events emitted by verbose rate gates.
//!
//! Each event writes a `tracing` record under the `rate_gate::stats` target and records the
//! matching `metrics` samples, labelled by gate identifier.

mod rate_gate;

pub(crate) use self::rate_gate::*;

pub(crate) trait InternalEvent: Sized {
    fn emit(self);
}

pub(crate) fn emit(event: impl InternalEvent) {
    event.emit();
}
