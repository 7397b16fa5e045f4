//! Comparison strategies a negotiator can be composed from
//!
//! Each strategy advertises capability flags. The entry points on [`NegotiatorCore`] check
//! the flag, then answer through the bound utility function, or return an undefined answer
//! when none is bound.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::capability::Capability;
use super::core::NegotiatorCore;
use crate::error::{NegotiationError, Result};
use crate::outcome::{Outcome, OutcomeSpace};
use crate::utility::{Comparison, UtilityFunction};

/// Upper bound on partners drawn per sample when estimating thresholds
const MAX_PAIRS_PER_SAMPLE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComparisonStrategy {
    Evaluator,
    RealComparator,
    BinaryComparator,
    #[serde(rename = "nlevels-comparator")]
    NLevelsComparator,
    RankerWithWeights,
    Ranker,
    Sorter,
}

impl ComparisonStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonStrategy::Evaluator => "evaluator",
            ComparisonStrategy::RealComparator => "real-comparator",
            ComparisonStrategy::BinaryComparator => "binary-comparator",
            ComparisonStrategy::NLevelsComparator => "nlevels-comparator",
            ComparisonStrategy::RankerWithWeights => "ranker-with-weights",
            ComparisonStrategy::Ranker => "ranker",
            ComparisonStrategy::Sorter => "sorter",
        }
    }

    /// Capability flags this strategy turns on
    pub fn capabilities(&self) -> &'static [Capability] {
        match self {
            ComparisonStrategy::Evaluator => &[Capability::Evaluate],
            ComparisonStrategy::RealComparator => {
                &[Capability::CompareReal, Capability::CompareBinary]
            }
            ComparisonStrategy::BinaryComparator => &[Capability::CompareBinary],
            ComparisonStrategy::NLevelsComparator => {
                &[Capability::CompareNLevels, Capability::CompareBinary]
            }
            ComparisonStrategy::RankerWithWeights => {
                &[Capability::RankWeighted, Capability::CompareBinary]
            }
            ComparisonStrategy::Ranker => &[Capability::Rank, Capability::CompareBinary],
            ComparisonStrategy::Sorter => &[Capability::Sort],
        }
    }

    pub fn all() -> [ComparisonStrategy; 7] {
        [
            ComparisonStrategy::Evaluator,
            ComparisonStrategy::RealComparator,
            ComparisonStrategy::BinaryComparator,
            ComparisonStrategy::NLevelsComparator,
            ComparisonStrategy::RankerWithWeights,
            ComparisonStrategy::Ranker,
            ComparisonStrategy::Sorter,
        ]
    }
}

impl std::str::FromStr for ComparisonStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ComparisonStrategy::all()
            .into_iter()
            .find(|strategy| strategy.as_str() == s)
            .ok_or_else(|| format!("Invalid comparison strategy: {}", s))
    }
}

impl NegotiatorCore {
    pub fn evaluate(&self, outcome: Option<&Outcome>) -> Result<Option<f64>> {
        self.require(Capability::Evaluate)?;
        Ok(self.ufun.as_ref().and_then(|u| u.eval(outcome)))
    }

    pub fn compare_real(
        &self,
        first: Option<&Outcome>,
        second: Option<&Outcome>,
    ) -> Result<Option<f64>> {
        self.require(Capability::CompareReal)?;
        Ok(self.ufun.as_ref().and_then(|u| u.compare_real(first, second)))
    }

    pub fn is_better(
        &self,
        first: Option<&Outcome>,
        second: Option<&Outcome>,
        epsilon: f64,
    ) -> Result<Comparison> {
        self.require(Capability::CompareBinary)?;
        Ok(match &self.ufun {
            Some(u) => u.is_better(first, second, epsilon),
            None => Comparison::Unknown,
        })
    }

    /// Grade `u(first) - u(second)` on a signed scale of `n` levels
    pub fn compare_nlevels(
        &self,
        first: Option<&Outcome>,
        second: Option<&Outcome>,
        n: usize,
    ) -> Result<Option<i32>> {
        self.require(Capability::CompareNLevels)?;
        let Some(ufun) = &self.ufun else {
            return Ok(None);
        };
        let thresholds = match self.thresholds.as_deref() {
            Some(t) if t.len() >= n => t,
            Some(t) => {
                return Err(NegotiationError::configuration(format!(
                    "{} thresholds set, {} levels requested",
                    t.len(),
                    n
                )))
            }
            None => {
                return Err(NegotiationError::configuration(format!(
                    "no thresholds set for {}",
                    self.name
                )))
            }
        };
        Ok(ufun
            .compare_real(first, second)
            .map(|diff| nlevel(diff, &thresholds[..n])))
    }

    pub fn rank_with_weights(
        &self,
        outcomes: &[Option<Outcome>],
        descending: bool,
    ) -> Result<Option<Vec<(usize, f64)>>> {
        self.require(Capability::RankWeighted)?;
        Ok(self
            .ufun
            .as_ref()
            .map(|u| u.rank_with_weights(outcomes, descending)))
    }

    pub fn rank(&self, outcomes: &[Option<Outcome>], descending: bool) -> Result<Option<Vec<usize>>> {
        self.require(Capability::Rank)?;
        Ok(self.ufun.as_ref().map(|u| u.rank(outcomes, descending)))
    }

    /// Sort in place; leaves `outcomes` untouched without a utility function
    pub fn sort(&self, outcomes: &mut [Option<Outcome>], descending: bool) -> Result<()> {
        self.require(Capability::Sort)?;
        if let Some(u) = &self.ufun {
            u.sort(outcomes, descending);
        }
        Ok(())
    }
}

/// Signed level of `diff`: the first threshold its magnitude stays under, or the
/// number of thresholds when it exceeds them all.
pub fn nlevel(diff: f64, thresholds: &[f64]) -> i32 {
    let sign = if diff > 0.0 { 1 } else { -1 };
    let magnitude = thresholds
        .iter()
        .position(|threshold| diff.abs() < *threshold)
        .unwrap_or(thresholds.len());
    sign * magnitude as i32
}

/// Spacing of generated thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdScale {
    Linear,
    Log,
    Exp,
}

impl ThresholdScale {
    fn apply(&self, x: f64) -> f64 {
        match self {
            ThresholdScale::Linear => x,
            ThresholdScale::Log => x.ln(),
            ThresholdScale::Exp => x.exp(),
        }
    }
}

impl std::str::FromStr for ThresholdScale {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "linear" => Ok(ThresholdScale::Linear),
            "log" => Ok(ThresholdScale::Log),
            "exp" => Ok(ThresholdScale::Exp),
            _ => Err(format!("Invalid threshold scale: {}", s)),
        }
    }
}

/// `n` evenly spaced points strictly between `min` and `max`, then scaled
pub fn generate_thresholds(n: usize, min: f64, max: f64, scale: ThresholdScale) -> Vec<f64> {
    let step = (max - min) / (n + 1) as f64;
    (1..=n)
        .map(|i| scale.apply(min + step * i as f64))
        .collect()
}

/// Thresholds at the inner histogram edges of sampled utility differences.
///
/// Each of `n_samples` random outcomes is paired with up to ten later samples.
pub fn equiprobable_thresholds<R: Rng + ?Sized>(
    n: usize,
    ufun: &dyn UtilityFunction,
    space: &OutcomeSpace,
    n_samples: usize,
    rng: &mut R,
) -> Vec<f64> {
    let samples = space.random_outcomes(n_samples, &mut *rng);
    let mut diffs = Vec::new();
    for (i, first) in samples.iter().enumerate() {
        let later = &samples[i + 1..];
        for second in later.choose_multiple(&mut *rng, later.len().min(MAX_PAIRS_PER_SAMPLE)) {
            if let Some(diff) = ufun.compare_real(Some(first), Some(second)) {
                diffs.push(diff.abs());
            }
        }
    }

    let (lo, hi) = match diffs.iter().copied().reduce(f64::min) {
        None => (0.0, 1.0),
        Some(lo) => {
            let hi = diffs.iter().copied().fold(lo, f64::max);
            if hi > lo {
                (lo, hi)
            } else {
                (lo - 0.5, hi + 0.5)
            }
        }
    };
    generate_thresholds(n, lo, hi, ThresholdScale::Linear)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::Issue;
    use crate::utility::MappingUtilityFunction;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Arc;

    fn o(v: i64) -> Outcome {
        Outcome::new([v])
    }

    fn ufun() -> Arc<MappingUtilityFunction> {
        Arc::new(MappingUtilityFunction::new([
            (o(0), 0.0),
            (o(1), 0.05),
            (o(2), 0.2),
            (o(3), 0.5),
        ]))
    }

    fn core_with(strategy: ComparisonStrategy) -> NegotiatorCore {
        NegotiatorCore::new(None)
            .with_strategy(strategy)
            .with_utility_function(ufun())
    }

    #[test]
    fn test_strategy_names_roundtrip() {
        for strategy in ComparisonStrategy::all() {
            assert_eq!(strategy.as_str().parse::<ComparisonStrategy>().unwrap(), strategy);
            let json = serde_json::to_value(strategy).unwrap();
            assert_eq!(json, strategy.as_str());
        }
        assert!("oracle".parse::<ComparisonStrategy>().is_err());
    }

    #[test]
    fn test_strategies_advertise_capabilities() {
        let core = core_with(ComparisonStrategy::Ranker);
        assert!(core.capabilities().has(Capability::Rank));
        assert!(core.capabilities().has(Capability::CompareBinary));
        assert!(!core.capabilities().has(Capability::Sort));
        assert_eq!(core.strategies(), &[ComparisonStrategy::Ranker]);
    }

    #[test]
    fn test_missing_capability_gates_entry_points() {
        let core = core_with(ComparisonStrategy::Sorter);
        assert!(matches!(
            core.is_better(Some(&o(1)), Some(&o(2)), 0.0),
            Err(NegotiationError::MissingCapability { ref capability, .. }) if capability == "compare-binary"
        ));
        assert!(core.evaluate(Some(&o(1))).is_err());
        assert!(core.rank(&[], true).is_err());

        let core = core_with(ComparisonStrategy::BinaryComparator);
        assert!(core.is_better(Some(&o(1)), Some(&o(2)), 0.0).is_ok());
    }

    #[test]
    fn test_entry_points_without_ufun() {
        let core = NegotiatorCore::new(None)
            .with_strategy(ComparisonStrategy::Evaluator)
            .with_strategy(ComparisonStrategy::RealComparator)
            .with_strategy(ComparisonStrategy::RankerWithWeights)
            .with_strategy(ComparisonStrategy::Sorter);

        assert_eq!(core.evaluate(Some(&o(1))).unwrap(), None);
        assert_eq!(core.compare_real(Some(&o(1)), None).unwrap(), None);
        assert_eq!(
            core.is_better(Some(&o(1)), Some(&o(2)), 0.0).unwrap(),
            Comparison::Unknown
        );
        assert_eq!(core.rank_with_weights(&[Some(o(1))], true).unwrap(), None);

        let mut outcomes = vec![Some(o(1)), Some(o(3))];
        core.sort(&mut outcomes, true).unwrap();
        assert_eq!(outcomes, vec![Some(o(1)), Some(o(3))]);
    }

    #[test]
    fn test_evaluate_and_compare_real() {
        let core = core_with(ComparisonStrategy::Evaluator)
            .with_strategy(ComparisonStrategy::RealComparator);
        assert_eq!(core.evaluate(Some(&o(3))).unwrap(), Some(0.5));
        let diff = core.compare_real(Some(&o(3)), Some(&o(2))).unwrap().unwrap();
        assert!((diff - 0.3).abs() < 1e-12);
        assert_eq!(
            core.is_better(Some(&o(2)), Some(&o(3)), 1e-6).unwrap(),
            Comparison::Worse
        );
    }

    #[test]
    fn test_nlevels_table() {
        let core = core_with(ComparisonStrategy::NLevelsComparator).with_thresholds(vec![0.1, 0.3]);
        // differences 0.05, 0.2, 0.5 and -0.2
        assert_eq!(core.compare_nlevels(Some(&o(1)), Some(&o(0)), 2).unwrap(), Some(0));
        assert_eq!(core.compare_nlevels(Some(&o(2)), Some(&o(0)), 2).unwrap(), Some(1));
        assert_eq!(core.compare_nlevels(Some(&o(3)), Some(&o(0)), 2).unwrap(), Some(2));
        assert_eq!(core.compare_nlevels(Some(&o(0)), Some(&o(2)), 2).unwrap(), Some(-1));
    }

    #[test]
    fn test_nlevels_uses_only_first_n_thresholds() {
        let core =
            core_with(ComparisonStrategy::NLevelsComparator).with_thresholds(vec![0.1, 0.3, 0.6]);
        assert_eq!(core.compare_nlevels(Some(&o(3)), Some(&o(0)), 1).unwrap(), Some(1));
        assert_eq!(core.compare_nlevels(Some(&o(3)), Some(&o(0)), 3).unwrap(), Some(2));
    }

    #[test]
    fn test_nlevels_requires_thresholds() {
        let core = core_with(ComparisonStrategy::NLevelsComparator);
        assert!(matches!(
            core.compare_nlevels(Some(&o(1)), Some(&o(0)), 2),
            Err(NegotiationError::Configuration(_))
        ));

        let core = core.with_thresholds(vec![0.1]);
        assert!(matches!(
            core.compare_nlevels(Some(&o(1)), Some(&o(0)), 2),
            Err(NegotiationError::Configuration(_))
        ));
    }

    #[test]
    fn test_nlevel_zero_difference_is_level_zero() {
        assert_eq!(nlevel(0.0, &[0.1, 0.3]), 0);
        assert_eq!(nlevel(-0.0, &[0.1]), 0);
        assert_eq!(nlevel(5.0, &[]), 0);
    }

    #[test]
    fn test_rank_and_sort() {
        let core = core_with(ComparisonStrategy::Ranker)
            .with_strategy(ComparisonStrategy::RankerWithWeights)
            .with_strategy(ComparisonStrategy::Sorter);
        let outcomes = vec![Some(o(2)), None, Some(o(3)), Some(o(0))];

        assert_eq!(core.rank(&outcomes, true).unwrap(), Some(vec![2, 0, 3, 1]));
        let weighted = core.rank_with_weights(&outcomes, false).unwrap().unwrap();
        assert_eq!(weighted[0], (3, 0.0));
        assert_eq!(weighted[3].0, 1);

        let mut sorted = outcomes.clone();
        core.sort(&mut sorted, true).unwrap();
        assert_eq!(sorted, vec![Some(o(3)), Some(o(2)), Some(o(0)), None]);
    }

    #[test]
    fn test_generate_thresholds_linear() {
        let thresholds = generate_thresholds(3, 0.0, 1.0, ThresholdScale::Linear);
        let expected = [0.25, 0.5, 0.75];
        assert_eq!(thresholds.len(), 3);
        for (got, want) in thresholds.iter().zip(expected) {
            assert!((got - want).abs() < 1e-12);
        }
    }

    #[test]
    fn test_generate_thresholds_scaled() {
        let log = generate_thresholds(1, 0.0, 2.0, ThresholdScale::Log);
        assert!((log[0] - 0.0).abs() < 1e-12);
        let exp = generate_thresholds(1, 0.0, 2.0, ThresholdScale::Exp);
        assert!((exp[0] - std::f64::consts::E).abs() < 1e-12);
        assert!("cubic".parse::<ThresholdScale>().is_err());
    }

    #[test]
    fn test_equiprobable_thresholds_within_observed_range() {
        let space = OutcomeSpace::from_issues(vec![Issue::range("x", 0, 3)]);
        let u = ufun();
        let mut rng = StdRng::seed_from_u64(3);

        let thresholds = equiprobable_thresholds(2, u.as_ref(), &space, 4, &mut rng);
        assert_eq!(thresholds.len(), 2);
        assert!(thresholds[0] < thresholds[1]);
        assert!(thresholds.iter().all(|t| *t > 0.0 && *t < 0.5));
    }

    #[test]
    fn test_equiprobable_thresholds_without_samples() {
        let space = OutcomeSpace::from_outcomes(vec![o(0)]);
        let u = ufun();
        let mut rng = StdRng::seed_from_u64(3);
        let thresholds = equiprobable_thresholds(1, u.as_ref(), &space, 5, &mut rng);
        assert_eq!(thresholds, vec![0.5]);
    }
}
