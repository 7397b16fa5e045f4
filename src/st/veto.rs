//! Single-text veto protocol
//!
//! Every round a new text is proposed. Each participant, in join order, says whether the
//! proposal is at least as good as the current text; a single objection keeps the current
//! text. When the session ends the current text becomes the agreement only if everyone
//! still finds it acceptable.

use std::collections::VecDeque;
use std::sync::Arc;

use serde_json::json;
use tracing::{debug, warn};

use crate::error::Result;
use crate::mechanism::{
    Mechanism, MechanismConfig, Protocol, ProtocolState, RoundContext, RoundResult,
    SingleTextState,
};
use crate::negotiator::{Capability, Participant, Requirements};
use crate::outcome::{Outcome, OutcomeSpace};

pub const DEFAULT_EPSILON: f64 = 1e-6;

/// Produces the next proposal; `None` ends the session
pub trait OutcomeGenerator: Send {
    fn next_outcome(&mut self, current: Option<&Outcome>, ctx: &mut RoundContext<'_>)
        -> Option<Outcome>;
}

/// Uniform draws from the session's outcome space
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomOutcomes;

impl OutcomeGenerator for RandomOutcomes {
    fn next_outcome(
        &mut self,
        _current: Option<&Outcome>,
        ctx: &mut RoundContext<'_>,
    ) -> Option<Outcome> {
        ctx.random_outcome()
    }
}

/// Proposes a fixed list of outcomes, then ends the session
#[derive(Debug, Clone, Default)]
pub struct FixedSequence {
    outcomes: VecDeque<Outcome>,
}

impl FixedSequence {
    pub fn new(outcomes: impl IntoIterator<Item = Outcome>) -> Self {
        Self {
            outcomes: outcomes.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.outcomes.len()
    }
}

impl OutcomeGenerator for FixedSequence {
    fn next_outcome(
        &mut self,
        _current: Option<&Outcome>,
        _ctx: &mut RoundContext<'_>,
    ) -> Option<Outcome> {
        self.outcomes.pop_front()
    }
}

pub struct VetoSingleText {
    epsilon: f64,
    initial_outcome: Option<Outcome>,
    initial_responses: Vec<bool>,
    random_initial: bool,
    current_offer: Option<Outcome>,
    new_offer: Option<Outcome>,
    last_responses: Vec<bool>,
    generator: Box<dyn OutcomeGenerator>,
}

impl VetoSingleText {
    pub fn new() -> Self {
        Self {
            epsilon: DEFAULT_EPSILON,
            initial_outcome: None,
            initial_responses: Vec::new(),
            random_initial: false,
            current_offer: None,
            new_offer: None,
            last_responses: Vec::new(),
            generator: Box::new(RandomOutcomes),
        }
    }

    /// Tolerance for the better-or-not question asked each round
    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    /// Text on the table before the first round
    pub fn with_initial_outcome(mut self, outcome: Outcome) -> Self {
        self.initial_outcome = Some(outcome.clone());
        self.new_offer = Some(outcome.clone());
        self.current_offer = Some(outcome);
        self
    }

    /// Draw the initial text at random on the first round
    pub fn with_random_initial_outcome(mut self) -> Self {
        self.random_initial = true;
        self
    }

    pub fn with_initial_responses(mut self, responses: Vec<bool>) -> Self {
        self.initial_responses = responses.clone();
        self.last_responses = responses;
        self
    }

    pub fn with_generator(mut self, generator: impl OutcomeGenerator + 'static) -> Self {
        self.generator = Box::new(generator);
        self
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn current_offer(&self) -> Option<&Outcome> {
        self.current_offer.as_ref()
    }

    pub fn new_offer(&self) -> Option<&Outcome> {
        self.new_offer.as_ref()
    }

    pub fn last_responses(&self) -> &[bool] {
        &self.last_responses
    }

    pub fn initial_outcome(&self) -> Option<&Outcome> {
        self.initial_outcome.as_ref()
    }

    pub fn initial_responses(&self) -> &[bool] {
        &self.initial_responses
    }
}

impl Default for VetoSingleText {
    fn default() -> Self {
        Self::new()
    }
}

impl Protocol for VetoSingleText {
    fn name(&self) -> &str {
        "veto-st"
    }

    fn requirements(&self) -> Requirements {
        let mut requirements = Requirements::new();
        requirements.insert(Capability::CompareBinary.as_str().to_string(), json!(true));
        requirements
    }

    fn round(&mut self, ctx: &mut RoundContext<'_>) -> RoundResult {
        if self.random_initial && self.current_offer.is_none() && ctx.step() == 0 {
            self.current_offer = ctx.random_outcome();
            self.initial_outcome = self.current_offer.clone();
        }

        let Some(proposal) = self
            .generator
            .next_outcome(self.current_offer.as_ref(), ctx)
        else {
            debug!(session = %ctx.session_id(), step = ctx.step(), "no more proposals");
            return RoundResult::finished();
        };

        let participants = ctx.participants();
        let mut votes = Vec::with_capacity(participants.len());
        for participant in participants {
            if ctx.is_cancelled() {
                return RoundResult::broken();
            }
            let vote = match participant.is_better(
                Some(&proposal),
                self.current_offer.as_ref(),
                self.epsilon,
            ) {
                Ok(comparison) => comparison.is_not_worse(),
                Err(e) => {
                    warn!(
                        session = %ctx.session_id(),
                        negotiator = %participant.name(),
                        error = %e,
                        "vote failed, counting it as a veto"
                    );
                    ctx.record_error(participant.id(), e);
                    false
                }
            };
            votes.push(vote);
            if ctx.is_timed_out() {
                debug!(session = %ctx.session_id(), step = ctx.step(), "round budget exceeded while voting");
                return RoundResult::timed_out();
            }
        }

        let accepted = votes.iter().all(|vote| *vote);
        self.last_responses = votes;
        self.new_offer = Some(proposal.clone());
        if accepted {
            self.current_offer = Some(proposal);
        }
        RoundResult::proceed()
    }

    fn extra_state(&self) -> ProtocolState {
        ProtocolState::SingleText(SingleTextState {
            current_offer: self.current_offer.clone(),
            new_offer: self.new_offer.clone(),
            last_responses: self.last_responses.clone(),
        })
    }

    fn resolve_agreement(&mut self, participants: &[Arc<dyn Participant>]) -> Option<Outcome> {
        let offer = self.current_offer.as_ref()?;
        let unanimous = participants.iter().all(|participant| {
            match participant.is_acceptable_as_agreement(offer) {
                Ok(acceptable) => acceptable,
                Err(e) => {
                    warn!(negotiator = %participant.name(), error = %e, "acceptance check failed");
                    false
                }
            }
        });
        unanimous.then(|| offer.clone())
    }
}

/// Single-text veto session
pub type VetoSTMechanism = Mechanism<VetoSingleText>;

impl Mechanism<VetoSingleText> {
    /// Veto session with random proposals and the default epsilon
    pub fn veto(space: OutcomeSpace, config: MechanismConfig) -> Result<Self> {
        Mechanism::new(space, config, VetoSingleText::new())
    }

    pub fn current_offer(&self) -> Option<&Outcome> {
        self.protocol().current_offer()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NegotiationError;
    use crate::mechanism::SessionStatus;
    use crate::negotiator::{
        ComparisonStrategy, LocalNegotiator, Negotiator, NegotiatorCore, UtilityNegotiator,
    };
    use crate::outcome::Issue;
    use crate::utility::{Comparison, MappingUtilityFunction};

    fn o(v: i64) -> Outcome {
        Outcome::new([v])
    }

    fn space() -> OutcomeSpace {
        OutcomeSpace::from_issues(vec![Issue::range("x", 1, 3)])
    }

    fn voter(values: &[(i64, f64)]) -> Arc<dyn Participant> {
        let ufun = MappingUtilityFunction::new(values.iter().map(|(k, v)| (o(*k), *v)));
        LocalNegotiator::new(
            UtilityNegotiator::new(None)
                .with_strategy(ComparisonStrategy::BinaryComparator)
                .with_utility_function(Arc::new(ufun)),
        )
        .into_participant()
    }

    /// Advertises compare-binary but fails every vote
    struct Broken {
        core: NegotiatorCore,
    }

    impl Negotiator for Broken {
        fn core(&self) -> &NegotiatorCore {
            &self.core
        }
        fn core_mut(&mut self) -> &mut NegotiatorCore {
            &mut self.core
        }
        fn is_better(
            &mut self,
            _first: Option<&Outcome>,
            _second: Option<&Outcome>,
            _epsilon: f64,
        ) -> Result<Comparison> {
            Err(NegotiationError::Negotiator("cannot compare".to_string()))
        }
    }

    #[test]
    fn test_requires_compare_binary() {
        let mut m = VetoSTMechanism::veto(space(), MechanismConfig::new()).unwrap();
        let plain = LocalNegotiator::new(UtilityNegotiator::new(None)).into_participant();
        assert!(!m.add(plain, None, None).unwrap());
        assert!(m.add(voter(&[]), None, None).unwrap());
        assert_eq!(m.requirements().get("compare-binary"), Some(&json!(true)));
    }

    #[test]
    fn test_generator_exhaustion_ends_session() {
        let protocol = VetoSingleText::new().with_generator(FixedSequence::new([o(1), o(2)]));
        let mut m = Mechanism::new(space(), MechanismConfig::new(), protocol).unwrap();
        m.add(voter(&[(1, 0.5), (2, 0.7)]), None, None).unwrap();

        let state = m.run();
        assert_eq!(m.history().len(), 3);
        assert_eq!(state.status, SessionStatus::AgreementReached);
        assert_eq!(state.agreement, Some(o(2)));
    }

    #[test]
    fn test_failed_vote_counts_as_veto() {
        let protocol = VetoSingleText::new().with_generator(FixedSequence::new([o(1)]));
        let mut m = Mechanism::new(space(), MechanismConfig::new().with_n_steps(1), protocol)
            .unwrap();
        let mut broken = NegotiatorCore::new(Some("broken"));
        broken.add_capabilities(&vec![Capability::CompareBinary].into());
        m.add(voter(&[(1, 0.5)]), None, None).unwrap();
        m.add(
            LocalNegotiator::new(Broken { core: broken }).into_participant(),
            None,
            None,
        )
        .unwrap();

        let state = m.step();
        let st = state.single_text().unwrap();
        assert_eq!(st.last_responses, vec![true, false]);
        assert_eq!(st.new_offer, Some(o(1)));
        assert_eq!(st.current_offer, None);
        assert!(state.has_error);
        assert_eq!(state.status, SessionStatus::Exhausted);
        assert_eq!(state.agreement, None);
    }

    #[test]
    fn test_initial_outcome_and_responses() {
        let protocol = VetoSingleText::new()
            .with_initial_outcome(o(2))
            .with_initial_responses(vec![true, true])
            .with_epsilon(0.01);
        assert_eq!(protocol.current_offer(), Some(&o(2)));
        assert_eq!(protocol.new_offer(), Some(&o(2)));
        assert_eq!(protocol.initial_outcome(), Some(&o(2)));
        assert_eq!(protocol.initial_responses(), &[true, true]);
        assert_eq!(protocol.last_responses(), &[true, true]);
        assert_eq!(protocol.epsilon(), 0.01);

        let ProtocolState::SingleText(st) = protocol.extra_state() else {
            panic!("expected single-text state");
        };
        assert_eq!(st.current_offer, Some(o(2)));
    }

    #[test]
    fn test_worse_proposal_keeps_current_text() {
        let protocol = VetoSingleText::new()
            .with_initial_outcome(o(2))
            .with_generator(FixedSequence::new([o(1), o(3)]));
        let mut m = Mechanism::new(space(), MechanismConfig::new().with_n_steps(2), protocol)
            .unwrap();
        m.add(voter(&[(1, 0.1), (2, 0.5), (3, 0.9)]), None, None).unwrap();

        m.step();
        assert_eq!(m.current_offer(), Some(&o(2)));
        m.step();
        assert_eq!(m.current_offer(), Some(&o(3)));
        assert_eq!(m.agreement(), Some(&o(3)));
    }

    #[test]
    fn test_random_initial_outcome() {
        let protocol = VetoSingleText::new()
            .with_random_initial_outcome()
            .with_generator(FixedSequence::new([]));
        let mut m = Mechanism::new(space(), MechanismConfig::new().with_seed(4), protocol).unwrap();
        m.step();
        assert!(m.protocol().initial_outcome().is_some());
        assert_eq!(m.protocol().initial_outcome(), m.current_offer());
    }

    #[test]
    fn test_no_text_means_no_agreement() {
        let mut protocol = VetoSingleText::new();
        assert_eq!(protocol.resolve_agreement(&[]), None);
    }
}
