//! Runtime configuration.
//!
//! The core tolerates partially written data by default: unresolved
//! references, missing schema evolution steps and unknown buffer layouts
//! degrade to an empty result and a warning. Each of these can be switched
//! to strict mode, in which the same condition is returned as an error.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// How a degradable condition is reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradePolicy {
    /// Log a warning and continue with an empty/unset/unevolved result.
    #[default]
    Warn,
    /// Return an error to the caller.
    Strict,
}

impl DegradePolicy {
    /// Whether this policy raises errors.
    #[must_use]
    pub const fn is_strict(self) -> bool {
        matches!(self, Self::Strict)
    }
}

impl FromStr for DegradePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "warn" | "0" | "false" => Ok(Self::Warn),
            "strict" | "1" | "true" => Ok(Self::Strict),
            other => Err(format!("unknown degrade policy '{other}'")),
        }
    }
}

impl fmt::Display for DegradePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warn => f.write_str("warn"),
            Self::Strict => f.write_str("strict"),
        }
    }
}

/// Configuration shared by the registries and the collections they create.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdmConfig {
    /// Relation targets whose collection cannot be found while linking.
    pub unresolved_references: DegradePolicy,
    /// Stored schema versions without a registered evolution step.
    pub missing_evolution: DegradePolicy,
    /// `(type, version)` pairs the buffer factory does not know, and stored
    /// vector members their buffer layout does not know.
    pub unknown_buffers: DegradePolicy,
}

impl EdmConfig {
    /// Configuration with every concern in strict mode.
    #[must_use]
    pub const fn strict() -> Self {
        Self {
            unresolved_references: DegradePolicy::Strict,
            missing_evolution: DegradePolicy::Strict,
            unknown_buffers: DegradePolicy::Strict,
        }
    }

    /// Build a configuration from the environment.
    ///
    /// `EDM_STRICT` switches everything to strict mode; the per-concern
    /// variables `EDM_UNRESOLVED_REFERENCES`, `EDM_MISSING_EVOLUTION` and
    /// `EDM_UNKNOWN_BUFFERS` (`warn` or `strict`) override it.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let base: DegradePolicy = lookup("EDM_STRICT")
            .and_then(|v| v.parse().ok())
            .unwrap_or_default();

        let policy = |key: &str| {
            lookup(key)
                .and_then(|v| v.parse().ok())
                .unwrap_or(base)
        };

        Self {
            unresolved_references: policy("EDM_UNRESOLVED_REFERENCES"),
            missing_evolution: policy("EDM_MISSING_EVOLUTION"),
            unknown_buffers: policy("EDM_UNKNOWN_BUFFERS"),
        }
    }
}
