//! Utility functions consumed by negotiators
//!
//! The engine never interprets utility values itself; it only asks utility functions to
//! evaluate, compare and rank outcomes. `None` stands for the null outcome (no agreement)
//! on input and for an undefined utility on output.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::outcome::{Outcome, OutcomeSpace};

/// A utility function shared between a negotiator and whoever configured it
pub type SharedUtility = Arc<dyn UtilityFunction>;

/// Result of a binary comparison between two outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    /// The first outcome is better by more than epsilon
    Better,
    /// The first outcome is worse by more than epsilon
    Worse,
    /// Within epsilon, or at least one utility is undefined
    Unknown,
}

impl Comparison {
    pub fn as_str(&self) -> &'static str {
        match self {
            Comparison::Better => "better",
            Comparison::Worse => "worse",
            Comparison::Unknown => "unknown",
        }
    }

    /// Classify a utility difference `u(first) - u(second)`
    pub fn from_difference(diff: Option<f64>, epsilon: f64) -> Self {
        match diff {
            Some(d) if d > epsilon => Comparison::Better,
            Some(d) if d < -epsilon => Comparison::Worse,
            _ => Comparison::Unknown,
        }
    }

    /// Anything but an explicit `Worse`
    pub fn is_not_worse(&self) -> bool {
        !matches!(self, Comparison::Worse)
    }
}

impl std::str::FromStr for Comparison {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "better" => Ok(Comparison::Better),
            "worse" => Ok(Comparison::Worse),
            "unknown" => Ok(Comparison::Unknown),
            _ => Err(format!("Invalid comparison: {}", s)),
        }
    }
}

/// Maps outcomes to utility values
pub trait UtilityFunction: Send + Sync + fmt::Debug {
    /// Utility of an outcome; `None` input is the null outcome
    fn eval(&self, outcome: Option<&Outcome>) -> Option<f64>;

    /// Utility of failing to agree, when declared
    fn reserved_value(&self) -> Option<f64> {
        None
    }

    /// Signed utility difference `u(first) - u(second)`
    fn compare_real(&self, first: Option<&Outcome>, second: Option<&Outcome>) -> Option<f64> {
        Some(self.eval(first)? - self.eval(second)?)
    }

    fn is_better(
        &self,
        first: Option<&Outcome>,
        second: Option<&Outcome>,
        epsilon: f64,
    ) -> Comparison {
        Comparison::from_difference(self.compare_real(first, second), epsilon)
    }

    /// `(index, utility)` pairs ordered by utility. Ties keep input order and
    /// undefined utilities come last with a weight of negative infinity.
    fn rank_with_weights(&self, outcomes: &[Option<Outcome>], descending: bool) -> Vec<(usize, f64)> {
        let mut weighted: Vec<(usize, Option<f64>)> = outcomes
            .iter()
            .enumerate()
            .map(|(i, outcome)| (i, self.eval(outcome.as_ref())))
            .collect();
        weighted.sort_by(|a, b| order_weights(a.1, b.1, descending));
        weighted
            .into_iter()
            .map(|(i, w)| (i, w.unwrap_or(f64::NEG_INFINITY)))
            .collect()
    }

    fn rank(&self, outcomes: &[Option<Outcome>], descending: bool) -> Vec<usize> {
        self.rank_with_weights(outcomes, descending)
            .into_iter()
            .map(|(i, _)| i)
            .collect()
    }

    /// Reorder `outcomes` in place by utility
    fn sort(&self, outcomes: &mut [Option<Outcome>], descending: bool) {
        let order = self.rank(outcomes, descending);
        let sorted: Vec<Option<Outcome>> = order.iter().map(|&i| outcomes[i].clone()).collect();
        outcomes.clone_from_slice(&sorted);
    }
}

fn order_weights(a: Option<f64>, b: Option<f64>, descending: bool) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) if descending => y.total_cmp(&x),
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// A utility function backed by a lookup table
#[derive(Debug, Clone, Default)]
pub struct MappingUtilityFunction {
    values: HashMap<Outcome, f64>,
    default: Option<f64>,
    null_utility: Option<f64>,
    reserved_value: Option<f64>,
}

impl MappingUtilityFunction {
    pub fn new(values: impl IntoIterator<Item = (Outcome, f64)>) -> Self {
        Self {
            values: values.into_iter().collect(),
            ..Default::default()
        }
    }

    /// Uniform random utilities in `[0, 1)` for every enumerated outcome of `space`
    pub fn random<R: Rng + ?Sized>(space: &OutcomeSpace, rng: &mut R) -> Self {
        let values = space
            .outcomes()
            .unwrap_or_default()
            .iter()
            .map(|outcome| (outcome.clone(), rng.gen::<f64>()))
            .collect::<Vec<_>>();
        Self::new(values)
    }

    /// Utility for outcomes missing from the table
    pub fn with_default(mut self, default: f64) -> Self {
        self.default = Some(default);
        self
    }

    /// Utility of the null outcome
    pub fn with_null_utility(mut self, utility: f64) -> Self {
        self.null_utility = Some(utility);
        self
    }

    pub fn with_reserved_value(mut self, reserved_value: f64) -> Self {
        self.reserved_value = Some(reserved_value);
        self
    }

    pub fn set(&mut self, outcome: Outcome, value: f64) {
        self.values.insert(outcome, value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl UtilityFunction for MappingUtilityFunction {
    fn eval(&self, outcome: Option<&Outcome>) -> Option<f64> {
        match outcome {
            None => self.null_utility,
            Some(outcome) => self.values.get(outcome).copied().or(self.default),
        }
    }

    fn reserved_value(&self) -> Option<f64> {
        self.reserved_value
    }
}
