//! Single-text veto sessions end to end

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use concord::mechanism::{MechanismConfig, SessionStatus};
use concord::negotiator::{Capability, Negotiator, NegotiatorCore, Participant};
use concord::st::{FixedSequence, VetoSTMechanism, VetoSingleText};
use concord::{
    Comparison, ComparisonStrategy, Issue, LocalNegotiator, MappingUtilityFunction, Mechanism,
    NegotiationError, Outcome, OutcomeSpace, Result, UtilityFunction, UtilityNegotiator,
};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn o(v: i64) -> Outcome {
    Outcome::new([v])
}

fn space() -> OutcomeSpace {
    OutcomeSpace::from_issues(vec![Issue::range("deal", 1, 3)])
}

fn binary(name: &str, ufun: Option<MappingUtilityFunction>) -> Arc<dyn Participant> {
    let mut negotiator =
        UtilityNegotiator::new(Some(name)).with_strategy(ComparisonStrategy::BinaryComparator);
    if let Some(ufun) = ufun {
        negotiator = negotiator.with_utility_function(Arc::new(ufun));
    }
    LocalNegotiator::new(negotiator).into_participant()
}

/// A accepts everything; B likes O1 and O3 but not O2
fn o1_o2_o3_session(b_reserved: Option<f64>) -> VetoSTMechanism {
    let protocol = VetoSingleText::new().with_generator(FixedSequence::new([o(1), o(2), o(3)]));
    let mut m = Mechanism::new(space(), MechanismConfig::new().with_n_steps(3), protocol).unwrap();

    let mut b = MappingUtilityFunction::new([(o(1), 0.5), (o(2), 0.2), (o(3), 0.6)]);
    if let Some(reserved) = b_reserved {
        b = b.with_reserved_value(reserved);
    }
    assert!(m.add(binary("A", None), None, None).unwrap());
    assert!(m.add(binary("B", Some(b)), None, None).unwrap());
    m
}

#[test]
fn test_o1_o2_o3_reaches_agreement() {
    let mut m = o1_o2_o3_session(None);
    let state = m.run();

    let offers: Vec<_> = m
        .history()
        .iter()
        .map(|s| s.current_offer().cloned())
        .collect();
    assert_eq!(offers, vec![Some(o(1)), Some(o(1)), Some(o(3))]);
    assert_eq!(
        m.history()[1].single_text().unwrap().last_responses,
        vec![true, false]
    );
    assert_eq!(state.status, SessionStatus::AgreementReached);
    assert_eq!(state.agreement, Some(o(3)));
    assert_eq!(m.history().last().unwrap().status, SessionStatus::AgreementReached);
}

#[test]
fn test_o1_o2_o3_final_veto() {
    let mut m = o1_o2_o3_session(Some(0.7));
    let state = m.run();

    assert_eq!(m.current_offer(), Some(&o(3)));
    assert_eq!(state.current_offer(), Some(&o(3)));
    assert_eq!(state.agreement, None);
    assert_eq!(state.status, SessionStatus::Exhausted);
}

/// Takes longer to vote than a round may last
struct Slow {
    core: NegotiatorCore,
    delay: Duration,
}

impl Negotiator for Slow {
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
        thread::sleep(self.delay);
        Ok(Comparison::Better)
    }
}

/// Counts how often it is asked to vote
struct Counting {
    core: NegotiatorCore,
    votes: Arc<AtomicUsize>,
}

impl Negotiator for Counting {
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
        self.votes.fetch_add(1, Ordering::SeqCst);
        Ok(Comparison::Better)
    }
}

fn comparing_core(name: &str) -> NegotiatorCore {
    let mut core = NegotiatorCore::new(Some(name));
    core.add_capabilities(&vec![Capability::CompareBinary].into());
    core
}

#[test]
fn test_round_timeout_skips_remaining_votes() {
    let votes = Arc::new(AtomicUsize::new(0));
    let protocol = VetoSingleText::new().with_generator(FixedSequence::new([o(1), o(2)]));
    let mut m = Mechanism::new(
        space(),
        MechanismConfig::new()
            .with_n_steps(5)
            .with_step_time_limit(Duration::from_millis(10)),
        protocol,
    )
    .unwrap();
    m.add(
        LocalNegotiator::new(Slow {
            core: comparing_core("slow"),
            delay: Duration::from_millis(40),
        })
        .into_participant(),
        None,
        None,
    )
    .unwrap();
    m.add(
        LocalNegotiator::new(Counting {
            core: comparing_core("eager"),
            votes: votes.clone(),
        })
        .into_participant(),
        None,
        None,
    )
    .unwrap();

    let state = m.run();
    assert_eq!(state.status, SessionStatus::TimedOut);
    assert!(state.timed_out);
    assert_eq!(state.agreement, None);
    assert_eq!(m.history().len(), 1);
    assert_eq!(votes.load(Ordering::SeqCst), 0);
    // the interrupted round left the text untouched
    let st = state.single_text().unwrap();
    assert_eq!(st.current_offer, None);
    assert_eq!(st.new_offer, None);
    assert!(st.last_responses.is_empty());
}

#[test]
fn test_session_time_limit() {
    let mut m = VetoSTMechanism::veto(
        space(),
        MechanismConfig::new().with_time_limit(Duration::from_millis(50)),
    )
    .unwrap();
    m.add(
        LocalNegotiator::new(Slow {
            core: comparing_core("slow"),
            delay: Duration::from_millis(5),
        })
        .into_participant(),
        None,
        None,
    )
    .unwrap();

    let state = m.run();
    assert_eq!(state.status, SessionStatus::TimedOut);
    assert_eq!(state.agreement, None);
    assert!(m.history().len() >= 2);
    assert!(m.history().last().unwrap().timed_out);
}

fn random_session(seed: u64, n_steps: usize) -> (VetoSTMechanism, Vec<MappingUtilityFunction>) {
    let space = OutcomeSpace::from_issues(vec![
        Issue::range("price", 1, 6),
        Issue::discrete("delivery", ["fast", "slow"]),
    ]);
    let mut rng = StdRng::seed_from_u64(seed);
    let ufuns: Vec<_> = (0..3)
        .map(|i| {
            MappingUtilityFunction::random(&space, &mut rng).with_reserved_value(0.1 * i as f64)
        })
        .collect();

    let mut m = VetoSTMechanism::veto(
        space,
        MechanismConfig::new().with_n_steps(n_steps).with_seed(seed),
    )
    .unwrap();
    for (i, ufun) in ufuns.iter().enumerate() {
        let name = format!("n{}", i);
        assert!(m.add(binary(&name, Some(ufun.clone())), None, None).unwrap());
    }
    (m, ufuns)
}

#[test]
fn test_terminates_within_step_budget() {
    for seed in 0..5 {
        let (mut m, _) = random_session(seed, 7);
        let state = m.run();
        assert!(!state.is_running());
        assert!(m.history().len() <= 7);
        assert_eq!(m.history().last().unwrap().status, state.status);
    }
}

#[test]
fn test_text_changes_only_on_unanimity() {
    let (mut m, _) = random_session(42, 20);
    m.run();

    let mut previous = None;
    for snapshot in m.history() {
        let st = snapshot.single_text().unwrap();
        if st.current_offer != previous {
            assert!(st.last_responses.iter().all(|v| *v));
            assert_eq!(st.current_offer, st.new_offer);
        }
        previous = st.current_offer.clone();
    }
}

#[test]
fn test_agreement_is_acceptable_to_everyone() {
    for seed in 0..10 {
        let (mut m, ufuns) = random_session(seed, 15);
        let state = m.run();
        match state.agreement {
            Some(agreement) => {
                assert_eq!(state.status, SessionStatus::AgreementReached);
                for ufun in &ufuns {
                    let utility = ufun.eval(Some(&agreement)).unwrap();
                    assert!(utility >= ufun.reserved_value().unwrap());
                }
            }
            None => assert_ne!(state.status, SessionStatus::AgreementReached),
        }
    }
}

#[test]
fn test_cancel_from_another_thread() {
    let (mut m, _) = random_session(1, 1_000_000);
    let cancel = m.cancel_handle();
    m.step();
    let handle = thread::spawn(move || cancel.cancel());
    handle.join().unwrap();

    let state = m.run();
    assert_eq!(state.status, SessionStatus::Broken);
    assert!(state.broken);
    assert_eq!(state.agreement, None);
    assert_eq!(m.history().len(), 2);
}

/// Cannot vote at all
struct Failing {
    core: NegotiatorCore,
}

impl Negotiator for Failing {
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
        Err(NegotiationError::Negotiator("no opinion".to_string()))
    }
}

/// Votes at once but is slow to hear about errors
struct SlowListener {
    core: NegotiatorCore,
}

impl Negotiator for SlowListener {
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
        Ok(Comparison::Better)
    }
    fn on_mechanism_error(&mut self, _state: &concord::MechanismState) {
        thread::sleep(Duration::from_millis(60));
    }
}

#[test]
fn test_error_reports_do_not_count_against_round_budget() {
    let protocol = VetoSingleText::new().with_generator(FixedSequence::new([o(1), o(2)]));
    let mut m = Mechanism::new(
        space(),
        MechanismConfig::new()
            .with_n_steps(5)
            .with_step_time_limit(Duration::from_millis(30)),
        protocol,
    )
    .unwrap();
    m.add(
        LocalNegotiator::new(Failing {
            core: comparing_core("failing"),
        })
        .into_participant(),
        None,
        None,
    )
    .unwrap();
    m.add(
        LocalNegotiator::new(SlowListener {
            core: comparing_core("listener"),
        })
        .into_participant(),
        None,
        None,
    )
    .unwrap();

    let state = m.step();
    assert_eq!(state.status, SessionStatus::Running);
    assert!(!state.timed_out);
    assert!(state.has_error);
    assert_eq!(
        state.single_text().unwrap().last_responses,
        vec![false, true]
    );
}
