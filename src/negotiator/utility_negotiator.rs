use super::aspiration::Aspiration;
use super::capability::CapabilitySet;
use super::comparator::ComparisonStrategy;
use super::core::{Negotiator, NegotiatorCore};
use crate::utility::SharedUtility;

/// A negotiator that answers every query from its utility function and composed strategies
#[derive(Debug, Clone)]
pub struct UtilityNegotiator {
    core: NegotiatorCore,
}

impl UtilityNegotiator {
    pub fn new(name: Option<&str>) -> Self {
        Self {
            core: NegotiatorCore::new(name),
        }
    }

    /// Negotiator composed of a single strategy
    pub fn of_strategy(
        strategy: ComparisonStrategy,
        name: Option<&str>,
        ufun: Option<SharedUtility>,
    ) -> Self {
        let negotiator = Self::new(name).with_strategy(strategy);
        match ufun {
            Some(ufun) => negotiator.with_utility_function(ufun),
            None => negotiator,
        }
    }

    pub fn with_utility_function(mut self, ufun: SharedUtility) -> Self {
        self.core = self.core.with_utility_function(ufun);
        self
    }

    pub fn with_strategy(mut self, strategy: ComparisonStrategy) -> Self {
        self.core = self.core.with_strategy(strategy);
        self
    }

    pub fn with_thresholds(mut self, thresholds: Vec<f64>) -> Self {
        self.core = self.core.with_thresholds(thresholds);
        self
    }

    pub fn with_aspiration(mut self, aspiration: Aspiration) -> Self {
        self.core = self.core.with_aspiration(aspiration);
        self
    }

    pub fn with_capabilities(mut self, capabilities: &CapabilitySet) -> Self {
        self.core.add_capabilities(capabilities);
        self
    }
}

impl Negotiator for UtilityNegotiator {
    fn core(&self) -> &NegotiatorCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut NegotiatorCore {
        &mut self.core
    }
}
