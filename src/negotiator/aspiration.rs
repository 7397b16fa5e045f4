//! Time-decaying aspiration levels

use serde::{Deserialize, Serialize};

use crate::error::{NegotiationError, Result};

/// Shape of the concession curve
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AspirationType {
    /// Holds out until late
    Boulware,
    Linear,
    /// Concedes early
    Conceder,
    Exponent(f64),
}

impl AspirationType {
    pub fn exponent(&self) -> f64 {
        match self {
            AspirationType::Boulware => 4.0,
            AspirationType::Linear => 1.0,
            AspirationType::Conceder => 0.25,
            AspirationType::Exponent(e) => *e,
        }
    }
}

impl std::str::FromStr for AspirationType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "boulware" => Ok(AspirationType::Boulware),
            "linear" => Ok(AspirationType::Linear),
            "conceder" => Ok(AspirationType::Conceder),
            other => other
                .parse::<f64>()
                .ok()
                .filter(|e| e.is_finite() && *e > 0.0)
                .map(AspirationType::Exponent)
                .ok_or_else(|| format!("Invalid aspiration type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aspiration {
    pub max_aspiration: f64,
    pub aspiration_type: AspirationType,
}

impl Aspiration {
    pub fn new(max_aspiration: f64, aspiration_type: AspirationType) -> Self {
        Self {
            max_aspiration,
            aspiration_type,
        }
    }

    pub fn exponent(&self) -> f64 {
        self.aspiration_type.exponent()
    }

    /// `max * (1 - t^e)` at relative time `t`
    pub fn level(&self, relative_time: Option<f64>) -> Result<f64> {
        let t = relative_time.ok_or_else(|| {
            NegotiationError::configuration(
                "aspiration needs a session with a step or time limit",
            )
        })?;
        Ok(self.max_aspiration * (1.0 - t.powf(self.exponent())))
    }
}

impl Default for Aspiration {
    fn default() -> Self {
        Self::new(1.0, AspirationType::Boulware)
    }
}
