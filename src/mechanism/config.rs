//! Session configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{NegotiationError, Result};
use crate::negotiator::Requirements;

/// Budgets and requirements of one session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MechanismConfig {
    pub name: Option<String>,
    /// Maximum number of rounds
    pub n_steps: Option<usize>,
    /// Wall-clock budget for the whole session, in seconds when serialized
    #[serde(with = "optional_seconds")]
    pub time_limit: Option<Duration>,
    /// Wall-clock budget for a single round, in seconds when serialized
    #[serde(with = "optional_seconds")]
    pub step_time_limit: Option<Duration>,
    pub max_n_negotiators: Option<usize>,
    pub requirements: Requirements,
    /// Seed for the session's random source
    pub seed: Option<u64>,
}

impl MechanismConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_n_steps(mut self, n_steps: usize) -> Self {
        self.n_steps = Some(n_steps);
        self
    }

    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    pub fn with_step_time_limit(mut self, limit: Duration) -> Self {
        self.step_time_limit = Some(limit);
        self
    }

    pub fn with_max_negotiators(mut self, max: usize) -> Self {
        self.max_n_negotiators = Some(max);
        self
    }

    pub fn with_requirement(mut self, capability: impl Into<String>, value: Value) -> Self {
        self.requirements.insert(capability.into(), value);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Reject budgets that could never allow a round to run
    pub fn validate(&self) -> Result<()> {
        if self.n_steps == Some(0) {
            return Err(NegotiationError::configuration("n_steps must be positive"));
        }
        if self.time_limit.is_some_and(|d| d.is_zero()) {
            return Err(NegotiationError::configuration("time_limit must be positive"));
        }
        if self.step_time_limit.is_some_and(|d| d.is_zero()) {
            return Err(NegotiationError::configuration(
                "step_time_limit must be positive",
            ));
        }
        if self.max_n_negotiators == Some(0) {
            return Err(NegotiationError::configuration(
                "max_n_negotiators must be positive",
            ));
        }
        Ok(())
    }
}

mod optional_seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        value.map(|d| d.as_secs_f64()).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<f64>::deserialize(deserializer)?
            .map(|secs| Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom))
            .transpose()
    }
}
