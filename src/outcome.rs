//! Issues, outcomes and outcome spaces
//!
//! The engine treats outcomes as opaque comparable values. This module only provides
//! enough of an issue model to enumerate and sample them.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use rand::seq::{index, SliceRandom};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{NegotiationError, Result};

/// Spaces larger than this are sampled issue by issue instead of being enumerated
pub const MAX_ENUMERATED_OUTCOMES: usize = 1 << 20;

/// A single value assigned to an issue
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IssueValue {
    Int(i64),
    Text(String),
}

impl fmt::Display for IssueValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueValue::Int(v) => write!(f, "{}", v),
            IssueValue::Text(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for IssueValue {
    fn from(v: i64) -> Self {
        IssueValue::Int(v)
    }
}

impl From<&str> for IssueValue {
    fn from(v: &str) -> Self {
        IssueValue::Text(v.to_string())
    }
}

impl From<String> for IssueValue {
    fn from(v: String) -> Self {
        IssueValue::Text(v)
    }
}

/// An assignment of one value to every issue, in issue order
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Outcome(Vec<IssueValue>);

impl Outcome {
    pub fn new<V: Into<IssueValue>>(values: impl IntoIterator<Item = V>) -> Self {
        Self(values.into_iter().map(Into::into).collect())
    }

    pub fn values(&self) -> &[IssueValue] {
        &self.0
    }

    pub fn get(&self, index: usize) -> Option<&IssueValue> {
        self.0.get(index)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, value) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", value)?;
        }
        write!(f, ")")
    }
}

/// The values an issue can take
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum IssueValues {
    /// An explicit list of values
    Discrete { values: Vec<IssueValue> },
    /// An inclusive integer range
    Range { min: i64, max: i64 },
}

/// A negotiation issue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub name: String,
    pub values: IssueValues,
}

impl Issue {
    /// Create an issue with an explicit list of values
    pub fn discrete<V: Into<IssueValue>>(
        name: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self {
            name: name.into(),
            values: IssueValues::Discrete {
                values: values.into_iter().map(Into::into).collect(),
            },
        }
    }

    /// Create an issue over the inclusive range `min..=max`
    pub fn range(name: impl Into<String>, min: i64, max: i64) -> Self {
        Self {
            name: name.into(),
            values: IssueValues::Range { min, max },
        }
    }

    /// Number of values this issue can take
    pub fn cardinality(&self) -> usize {
        match &self.values {
            IssueValues::Discrete { values } => values.len(),
            IssueValues::Range { min, max } if max >= min => {
                usize::try_from(max.abs_diff(*min).saturating_add(1)).unwrap_or(usize::MAX)
            }
            IssueValues::Range { .. } => 0,
        }
    }

    /// The value at a position in this issue's value order
    pub fn value_at(&self, position: usize) -> Option<IssueValue> {
        match &self.values {
            IssueValues::Discrete { values } => values.get(position).cloned(),
            IssueValues::Range { min, .. } => {
                if position < self.cardinality() {
                    min.checked_add_unsigned(position as u64).map(IssueValue::Int)
                } else {
                    None
                }
            }
        }
    }

    /// Draw one value uniformly
    pub fn random_value<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<IssueValue> {
        match self.cardinality() {
            0 => None,
            n => self.value_at(rng.gen_range(0..n)),
        }
    }

    /// Size of the cartesian product of all issues
    pub fn total_cardinality(issues: &[Issue]) -> usize {
        issues
            .iter()
            .fold(1usize, |acc, issue| acc.saturating_mul(issue.cardinality()))
    }

    /// The outcome at a position of the cartesian product (last issue varies fastest)
    fn outcome_at(issues: &[Issue], mut position: usize) -> Option<Outcome> {
        let mut values = vec![IssueValue::Int(0); issues.len()];
        for (slot, issue) in issues.iter().enumerate().rev() {
            let n = issue.cardinality();
            if n == 0 {
                return None;
            }
            values[slot] = issue.value_at(position % n)?;
            position /= n;
        }
        Some(Outcome(values))
    }

    /// Enumerate every outcome of the cartesian product
    pub fn enumerate(issues: &[Issue]) -> Vec<Outcome> {
        let total = Self::total_cardinality(issues);
        (0..total)
            .filter_map(|position| Self::outcome_at(issues, position))
            .collect()
    }

    /// Sample `n` outcomes.
    ///
    /// Without replacement, asking for more outcomes than exist either fails or
    /// returns every outcome, depending on `fail_if_not_enough`.
    pub fn sample<R: Rng + ?Sized>(
        issues: &[Issue],
        n: usize,
        with_replacement: bool,
        fail_if_not_enough: bool,
        rng: &mut R,
    ) -> Result<Vec<Outcome>> {
        let total = Self::total_cardinality(issues);
        let not_enough = NegotiationError::NotEnoughOutcomes {
            requested: n,
            available: total,
        };

        if with_replacement {
            if total == 0 {
                return if n > 0 && fail_if_not_enough {
                    Err(not_enough)
                } else {
                    Ok(Vec::new())
                };
            }
            return Ok((0..n)
                .filter_map(|_| {
                    issues
                        .iter()
                        .map(|issue| issue.random_value(&mut *rng))
                        .collect::<Option<Vec<_>>>()
                        .map(Outcome)
                })
                .collect());
        }

        if n > total && fail_if_not_enough {
            return Err(not_enough);
        }
        let n = n.min(total);

        if total <= MAX_ENUMERATED_OUTCOMES {
            return Ok(index::sample(rng, total, n)
                .into_iter()
                .filter_map(|position| Self::outcome_at(issues, position))
                .collect());
        }

        let mut seen = HashSet::with_capacity(n);
        let mut sampled = Vec::with_capacity(n);
        while sampled.len() < n {
            let position = rng.gen_range(0..total);
            if seen.insert(position) {
                if let Some(outcome) = Self::outcome_at(issues, position) {
                    sampled.push(outcome);
                }
            }
        }
        Ok(sampled)
    }
}

/// The set of outcomes a session negotiates over
#[derive(Debug, Clone)]
pub struct OutcomeSpace {
    issues: Arc<Vec<Issue>>,
    outcomes: Option<Arc<Vec<Outcome>>>,
}

impl OutcomeSpace {
    /// Build a space from issues, enumerating it when small enough
    pub fn from_issues(issues: Vec<Issue>) -> Self {
        let outcomes = if Issue::total_cardinality(&issues) <= MAX_ENUMERATED_OUTCOMES {
            Some(Arc::new(Issue::enumerate(&issues)))
        } else {
            None
        };
        Self {
            issues: Arc::new(issues),
            outcomes,
        }
    }

    /// Build a space from an explicit outcome list
    pub fn from_outcomes(outcomes: Vec<Outcome>) -> Self {
        Self {
            issues: Arc::new(Vec::new()),
            outcomes: Some(Arc::new(outcomes)),
        }
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    /// All outcomes, if the space was enumerated
    pub fn outcomes(&self) -> Option<&[Outcome]> {
        self.outcomes.as_deref().map(Vec::as_slice)
    }

    pub fn cardinality(&self) -> usize {
        match &self.outcomes {
            Some(outcomes) => outcomes.len(),
            None => Issue::total_cardinality(&self.issues),
        }
    }

    /// Draw one outcome uniformly
    pub fn random_outcome<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Outcome> {
        match &self.outcomes {
            Some(outcomes) => outcomes.choose(rng).cloned(),
            None => Issue::sample(&self.issues, 1, true, false, &mut *rng)
                .ok()
                .and_then(|mut sampled| sampled.pop()),
        }
    }

    /// Draw up to `n` distinct outcomes
    pub fn random_outcomes<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Vec<Outcome> {
        match &self.outcomes {
            Some(outcomes) => outcomes.choose_multiple(rng, n).cloned().collect(),
            None => Issue::sample(&self.issues, n, false, false, rng).unwrap_or_default(),
        }
    }
}
