//! Dual-constraint rate gate for concurrent work.
//!
//! This crate admits units of work at a steady per-second pace while never letting more
//! than a fixed quota through within a one-minute period. It sits between a producer of
//! work items and the code that performs them (typically outbound network calls).
//!
//! # Algorithm Overview
//!
//! Every admission passes two gates:
//! 1. **Period quota**: an atomic counter that refuses admissions once `target_per_minute`
//!    is reached and is zeroed by a background task at every one-minute boundary
//! 2. **Pacer**: a uniform-spacing slot reserver that keeps admissions at least
//!    `1 / target_per_second` apart, smoothing bursts instead of releasing them at once
//!
//! # Safety & Concurrency
//! - Thread-safe: the counter and lifecycle flag are atomics, the pacer slot is lock-guarded
//! - Background tasks start lazily on the first admission, exactly once
//! - No unsafe code
//!
//! # Basic Usage
//! ```no_run
//! use rate_gate::rate_gate::{RateGate, RoundingMode};
//!
//! # async fn run() -> Result<(), rate_gate::Error> {
//! let gate = RateGate::new("crawler", 600, RoundingMode::Hasty, false);
//! for _ in 0..10 {
//!     gate.admit().await?;
//!     // perform the gated work here
//! }
//! gate.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//! See [`rate_gate::RateGateSettings`] for builder, file and environment based configuration.
//!
//! # Diagnostics
//! Verbose gates emit `tracing` records and `metrics` samples via the `InternalEvent` trait.
pub mod rate_gate;

#[macro_use]
extern crate tracing;

pub type Error = Box<dyn std::error::Error + Send + Sync + 'static>;
