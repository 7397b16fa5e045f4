//! Random negotiation scenarios

use std::sync::Arc;

use anyhow::{Context, Result};
use concord::controller::NegotiatorParams;
use concord::mechanism::MechanismConfig;
use concord::st::{VetoSTMechanism, VetoSingleText};
use concord::{
    ComparisonStrategy, Controller, Issue, LocalNegotiator, MappingUtilityFunction, Mechanism,
    OutcomeSpace, UtilityNegotiator,
};
use rand::rngs::StdRng;
use rand::Rng;
use serde_json::json;

/// Shape of a generated scenario
#[derive(Debug, Clone)]
pub struct Scenario {
    pub n_negotiators: usize,
    pub n_issues: usize,
    pub n_values: i64,
    /// Upper bound for the random reserved values
    pub max_reserved: f64,
    pub epsilon: f64,
}

impl Scenario {
    pub fn outcome_space(&self) -> OutcomeSpace {
        let issues = (0..self.n_issues)
            .map(|i| Issue::range(format!("issue{}", i), 1, self.n_values))
            .collect();
        OutcomeSpace::from_issues(issues)
    }

    fn utility(&self, space: &OutcomeSpace, rng: &mut StdRng) -> MappingUtilityFunction {
        let reserved = if self.max_reserved > 0.0 {
            rng.gen_range(0.0..self.max_reserved)
        } else {
            0.0
        };
        MappingUtilityFunction::random(space, rng).with_reserved_value(reserved)
    }

    fn session(&self, config: &MechanismConfig) -> Result<VetoSTMechanism> {
        let protocol = VetoSingleText::new().with_epsilon(self.epsilon);
        Mechanism::new(self.outcome_space(), config.clone(), protocol)
            .context("invalid session configuration")
    }

    /// A session whose negotiators it owns outright
    pub fn local_session(
        &self,
        config: &MechanismConfig,
        rng: &mut StdRng,
    ) -> Result<VetoSTMechanism> {
        let mut session = self.session(config)?;
        let space = session.outcome_space().clone();
        for i in 0..self.n_negotiators {
            let negotiator = UtilityNegotiator::new(Some(&format!("agent{}", i)))
                .with_strategy(ComparisonStrategy::BinaryComparator)
                .with_utility_function(Arc::new(self.utility(&space, rng)));
            let added = session.add(LocalNegotiator::new(negotiator).into_participant(), None, None)?;
            anyhow::ensure!(added, "session refused agent{}", i);
        }
        Ok(session)
    }

    /// A session whose negotiators are owned by `controller`
    pub fn controlled_session(
        &self,
        controller: &Arc<Controller>,
        index: usize,
        config: &MechanismConfig,
        rng: &mut StdRng,
    ) -> Result<VetoSTMechanism> {
        let mut session = self.session(config)?;
        let space = session.outcome_space().clone();
        for i in 0..self.n_negotiators {
            let params = NegotiatorParams::new().with_ufun(Arc::new(self.utility(&space, rng)));
            let proxy = controller.create_negotiator(
                None,
                Some(&format!("s{}-agent{}", index, i)),
                json!({ "session": index }),
                params,
            )?;
            let added = session.add(proxy, None, None)?;
            anyhow::ensure!(added, "session {} refused agent{}", index, i);
        }
        Ok(session)
    }
}
