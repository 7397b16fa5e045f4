//! Capability model for negotiators
//!
//! Negotiators advertise what they can do through a string-keyed capability map.
//! Sessions declare requirements against the same keys and check them once, at join.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Well-known capability names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    /// Can enter a running negotiation
    Enter,
    /// Can leave a running negotiation
    Leave,
    /// Can answer ultimatum-style offers
    Ultimatum,
    /// Can report the utility of an outcome
    Evaluate,
    /// Can report a real-valued utility difference
    CompareReal,
    /// Can say whether one outcome is better than another
    CompareBinary,
    /// Can grade a utility difference on a discrete scale
    #[serde(rename = "compare-nlevels")]
    CompareNLevels,
    /// Can rank outcomes with weights
    RankWeighted,
    /// Can rank outcomes
    Rank,
    /// Can sort outcomes in place
    Sort,
    /// Tracks a time-decaying aspiration level
    Aspiration,
}

impl Capability {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Enter => "enter",
            Capability::Leave => "leave",
            Capability::Ultimatum => "ultimatum",
            Capability::Evaluate => "evaluate",
            Capability::CompareReal => "compare-real",
            Capability::CompareBinary => "compare-binary",
            Capability::CompareNLevels => "compare-nlevels",
            Capability::RankWeighted => "rank-weighted",
            Capability::Rank => "rank",
            Capability::Sort => "sort",
            Capability::Aspiration => "aspiration",
        }
    }

    /// Capabilities every negotiator starts with
    pub fn defaults() -> [Capability; 3] {
        [Capability::Enter, Capability::Leave, Capability::Ultimatum]
    }
}

impl std::str::FromStr for Capability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "enter" => Ok(Capability::Enter),
            "leave" => Ok(Capability::Leave),
            "ultimatum" => Ok(Capability::Ultimatum),
            "evaluate" => Ok(Capability::Evaluate),
            "compare-real" => Ok(Capability::CompareReal),
            "compare-binary" => Ok(Capability::CompareBinary),
            "compare-nlevels" => Ok(Capability::CompareNLevels),
            "rank-weighted" => Ok(Capability::RankWeighted),
            "rank" => Ok(Capability::Rank),
            "sort" => Ok(Capability::Sort),
            "aspiration" => Ok(Capability::Aspiration),
            _ => Err(format!("Invalid capability: {}", s)),
        }
    }
}

/// Capability name to required value, as declared by a session
pub type Requirements = BTreeMap<String, Value>;

/// A capability map that only grows
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet {
    entries: BTreeMap<String, Value>,
}

impl CapabilitySet {
    /// Create a new empty capability set
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// The set every negotiator starts with
    pub fn with_defaults() -> Self {
        let mut caps = Self::new();
        for cap in Capability::defaults() {
            caps.add(cap);
        }
        caps
    }

    /// Check if a well-known capability is advertised as `true`
    pub fn has(&self, cap: Capability) -> bool {
        self.has_named(cap.as_str())
    }

    /// Check if a named capability is advertised as `true`
    pub fn has_named(&self, name: &str) -> bool {
        matches!(self.entries.get(name), Some(Value::Bool(true)))
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.get(name)
    }

    /// Advertise a well-known capability
    pub fn add(&mut self, cap: Capability) {
        self.entries.insert(cap.as_str().to_string(), Value::Bool(true));
    }

    /// Advertise a capability with arbitrary metadata.
    ///
    /// A capability already advertised as `true` keeps that value.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        if self.has_named(&name) {
            return;
        }
        self.entries.insert(name, value);
    }

    /// Merge another map into this one, never revoking a `true` entry
    pub fn extend(&mut self, other: &CapabilitySet) {
        for (name, value) in &other.entries {
            self.insert(name.clone(), value.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    /// The first requirement this set does not meet, if any.
    ///
    /// A requirement is met when the capability is present with an equal value, or
    /// when the required value is an array containing the advertised value.
    pub fn unmet_requirement<'a>(&self, requirements: &'a Requirements) -> Option<&'a str> {
        requirements
            .iter()
            .find(|(name, required)| !self.meets(name, required))
            .map(|(name, _)| name.as_str())
    }

    /// Whether every requirement is met
    pub fn satisfies(&self, requirements: &Requirements) -> bool {
        self.unmet_requirement(requirements).is_none()
    }

    fn meets(&self, name: &str, required: &Value) -> bool {
        match (self.entries.get(name), required) {
            (None, _) => false,
            (Some(have), Value::Array(options)) => have == required || options.contains(have),
            (Some(have), _) => have == required,
        }
    }
}

impl From<Vec<Capability>> for CapabilitySet {
    fn from(capabilities: Vec<Capability>) -> Self {
        let mut caps = Self::new();
        for cap in capabilities {
            caps.add(cap);
        }
        caps
    }
}
