//! Pace concurrent work under a per-second cadence and a per-minute quota.

mod diagnostics;
mod error;
mod gate;
mod internal_event;
pub mod layer;
mod pacer;
pub mod service;
mod window;

use std::{fmt, str::FromStr, time::Duration};

use bon::Builder;
use serde::Deserialize;
use snafu::{OptionExt, ResultExt};

pub use error::{ConfigError, RateGateError};
pub use gate::RateGate;
pub use layer::RateGateLayer;
pub use service::RateGateService;

/// Length of the quota period. The admissions counter is zeroed once per period.
pub const PERIOD: Duration = Duration::from_secs(60);

/// How often a verbose gate reports throughput for the last window.
pub const REPORT_INTERVAL: Duration = Duration::from_secs(5);

/// Selects how the per-second pace is derived from the per-minute target.
///
/// The per-minute target is divided by 60 with integer truncation *before* rounding is
/// applied, so for every integer target both modes currently produce the same pace.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundingMode {
    /// Round the pace up. Suited to work that takes long to complete.
    #[default]
    Hasty,
    /// Round the pace down, keeping the rate below the target.
    Strict,
}

impl RoundingMode {
    /// Admissions per second for a gate targeting `target_per_minute`.
    pub fn per_second(self, target_per_minute: u32) -> u32 {
        let whole_per_second = f64::from(target_per_minute / 60);
        let rounded = match self {
            RoundingMode::Hasty => whole_per_second.ceil(),
            RoundingMode::Strict => whole_per_second.floor(),
        };
        rounded as u32
    }
}

impl fmt::Display for RoundingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundingMode::Hasty => f.write_str("hasty"),
            RoundingMode::Strict => f.write_str("strict"),
        }
    }
}

impl FromStr for RoundingMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hasty" => Ok(RoundingMode::Hasty),
            "strict" => Ok(RoundingMode::Strict),
            _ => error::InvalidRoundingModeSnafu { value: s }.fail(),
        }
    }
}

/// Configuration of a [`RateGate`].
///
/// Every field is fixed for the lifetime of the gate built from it.
///
/// | Parameter | Default | Description |
/// |-----------|---------|-------------|
/// | `identifier` | required | Label attached to every diagnostic record |
/// | `target_per_minute` | required | Quota per one-minute period; also drives the pace |
/// | `rounding_mode` | `hasty` | Ceil or floor when deriving the per-second pace |
/// | `verbose` | `false` | Emit periodic throughput diagnostics |
///
/// A `target_per_minute` of zero is accepted and blocks every admission for good. Targets
/// below 60 derive a pace of zero, which leaves admissions unpaced (the quota still holds).
///
/// # Example
///
/// ```rust
/// use rate_gate::rate_gate::{RateGateSettings, RoundingMode};
///
/// let settings = RateGateSettings::builder()
///     .identifier("crawler")
///     .target_per_minute(1000)
///     .rounding_mode(RoundingMode::Strict)
///     .verbose(true)
///     .build();
/// assert_eq!(settings.target_per_second(), 16);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Builder, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateGateSettings {
    #[builder(into)]
    pub(super) identifier: String,

    pub(super) target_per_minute: u32,

    #[builder(default)]
    #[serde(default)]
    pub(super) rounding_mode: RoundingMode,

    #[builder(default)]
    #[serde(default)]
    pub(super) verbose: bool,
}

pub const ENV_IDENTIFIER: &str = "RATE_GATE_ID";
pub const ENV_TARGET_PER_MINUTE: &str = "RATE_GATE_TARGET_RPM";
pub const ENV_ROUNDING_MODE: &str = "RATE_GATE_ROUNDING";
pub const ENV_VERBOSE: &str = "RATE_GATE_VERBOSE";

impl RateGateSettings {
    /// Reads settings from `RATE_GATE_ID`, `RATE_GATE_TARGET_RPM`, `RATE_GATE_ROUNDING`
    /// and `RATE_GATE_VERBOSE`. The last two are optional.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&'static str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let identifier = lookup(ENV_IDENTIFIER).context(error::MissingVarSnafu {
            name: ENV_IDENTIFIER,
        })?;

        let raw_target = lookup(ENV_TARGET_PER_MINUTE).context(error::MissingVarSnafu {
            name: ENV_TARGET_PER_MINUTE,
        })?;
        let target_per_minute = raw_target
            .trim()
            .parse::<u32>()
            .context(error::InvalidNumberSnafu {
                name: ENV_TARGET_PER_MINUTE,
                value: raw_target.clone(),
            })?;

        let rounding_mode = match lookup(ENV_ROUNDING_MODE) {
            Some(raw) => raw.parse()?,
            None => RoundingMode::default(),
        };

        let verbose = match lookup(ENV_VERBOSE) {
            Some(raw) => raw
                .trim()
                .to_ascii_lowercase()
                .parse::<bool>()
                .context(error::InvalidBoolSnafu {
                    name: ENV_VERBOSE,
                    value: raw.clone(),
                })?,
            None => false,
        };

        Ok(Self {
            identifier,
            target_per_minute,
            rounding_mode,
            verbose,
        })
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn target_per_minute(&self) -> u32 {
        self.target_per_minute
    }

    pub fn rounding_mode(&self) -> RoundingMode {
        self.rounding_mode
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn target_per_second(&self) -> u32 {
        self.rounding_mode.per_second(self.target_per_minute)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from<'a>(
        vars: &'a [(&'static str, &'static str)],
    ) -> impl Fn(&'static str) -> Option<String> + 'a {
        let vars: HashMap<_, _> = vars.iter().copied().collect();
        move |name| vars.get(name).map(|v| v.to_string())
    }

    #[test]
    fn per_second_truncates_before_rounding() {
        assert_eq!(RoundingMode::Hasty.per_second(600), 10);
        assert_eq!(RoundingMode::Strict.per_second(600), 10);
        assert_eq!(RoundingMode::Hasty.per_second(1000), 16);
        assert_eq!(RoundingMode::Hasty.per_second(59), 0);
        assert_eq!(RoundingMode::Hasty.per_second(0), 0);
    }

    #[test]
    fn hasty_and_strict_agree_for_integer_targets() {
        let targets = (0..=1_000).chain([1_799, 59_999, 60_001, u32::MAX]);
        for target in targets {
            assert_eq!(
                RoundingMode::Hasty.per_second(target),
                RoundingMode::Strict.per_second(target),
                "target_per_minute = {}",
                target
            );
        }
    }

    #[test]
    fn rounding_mode_parses_case_insensitively() {
        assert_eq!("hasty".parse::<RoundingMode>().unwrap(), RoundingMode::Hasty);
        assert_eq!(" Strict ".parse::<RoundingMode>().unwrap(), RoundingMode::Strict);
        assert_eq!(RoundingMode::Strict.to_string(), "strict");

        let err = "eager".parse::<RoundingMode>().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRoundingMode { ref value } if value == "eager"));
    }

    #[test]
    fn builder_applies_defaults() {
        let settings = RateGateSettings::builder()
            .identifier("builder")
            .target_per_minute(120)
            .build();

        assert_eq!(settings.identifier(), "builder");
        assert_eq!(settings.rounding_mode(), RoundingMode::Hasty);
        assert!(!settings.verbose());
        assert_eq!(settings.target_per_second(), 2);
    }

    #[test]
    fn deserializes_from_json() {
        let settings: RateGateSettings = serde_json::from_str(
            r#"{ "identifier": "file", "target_per_minute": 900, "rounding_mode": "strict" }"#,
        )
        .unwrap();

        assert_eq!(
            settings,
            RateGateSettings::builder()
                .identifier("file")
                .target_per_minute(900)
                .rounding_mode(RoundingMode::Strict)
                .build()
        );
    }

    #[test]
    fn rejects_unknown_fields() {
        let result = serde_json::from_str::<RateGateSettings>(
            r#"{ "identifier": "file", "target_per_minute": 900, "target_per_hour": 1 }"#,
        );

        assert!(result.is_err());
    }

    #[test]
    fn loads_from_environment() {
        let settings = RateGateSettings::from_lookup(lookup_from(&[
            (ENV_IDENTIFIER, "env"),
            (ENV_TARGET_PER_MINUTE, " 1000 "),
            (ENV_ROUNDING_MODE, "strict"),
            (ENV_VERBOSE, "TRUE"),
        ]))
        .unwrap();

        assert_eq!(settings.identifier(), "env");
        assert_eq!(settings.target_per_minute(), 1000);
        assert_eq!(settings.rounding_mode(), RoundingMode::Strict);
        assert!(settings.verbose());
    }

    #[test]
    fn environment_errors_name_the_variable() {
        let missing = RateGateSettings::from_lookup(lookup_from(&[(ENV_IDENTIFIER, "env")]))
            .unwrap_err();
        assert!(matches!(missing, ConfigError::MissingVar { name } if name == ENV_TARGET_PER_MINUTE));

        let negative = RateGateSettings::from_lookup(lookup_from(&[
            (ENV_IDENTIFIER, "env"),
            (ENV_TARGET_PER_MINUTE, "-5"),
        ]))
        .unwrap_err();
        assert!(matches!(negative, ConfigError::InvalidNumber { ref value, .. } if value == "-5"));

        let verbose = RateGateSettings::from_lookup(lookup_from(&[
            (ENV_IDENTIFIER, "env"),
            (ENV_TARGET_PER_MINUTE, "60"),
            (ENV_VERBOSE, "loud"),
        ]))
        .unwrap_err();
        assert_eq!(
            verbose.to_string(),
            "Invalid boolean 'loud' for RATE_GATE_VERBOSE: provided string was not `true` or `false`"
        );
    }
}
