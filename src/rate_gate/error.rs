use std::{num::ParseIntError, str::ParseBoolError};

use snafu::Snafu;

/// Reasons an admission can end without permission being granted.
///
/// A gate that is neither shut down nor cancelled never fails: it only blocks.
#[derive(Debug, Snafu, Clone, PartialEq, Eq)]
#[snafu(visibility(pub(crate)))]
pub enum RateGateError {
    /// The gate was shut down (explicitly or by being dropped) before admission was granted.
    #[snafu(display("Rate gate '{}' is closed", identifier))]
    Closed { identifier: String },

    /// The caller-supplied cancellation token fired before admission was granted.
    #[snafu(display("Admission to rate gate '{}' was cancelled", identifier))]
    Cancelled { identifier: String },
}

/// Errors raised while loading [`RateGateSettings`](super::RateGateSettings) from the
/// environment or parsing configuration values.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ConfigError {
    #[snafu(display("Missing required environment variable {}", name))]
    MissingVar { name: &'static str },

    #[snafu(display("Invalid number '{}' for {}: {}", value, name, source))]
    InvalidNumber {
        name: &'static str,
        value: String,
        source: ParseIntError,
    },

    #[snafu(display("Invalid boolean '{}' for {}: {}", value, name, source))]
    InvalidBool {
        name: &'static str,
        value: String,
        source: ParseBoolError,
    },

    #[snafu(display("Invalid rounding mode '{}', expected 'hasty' or 'strict'", value))]
    InvalidRoundingMode { value: String },
}
