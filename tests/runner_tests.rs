//! Concurrent session runner tests

use std::sync::Arc;
use std::time::Duration;

use concord::controller::{NegotiatorParams, NegotiatorRegistry};
use concord::mechanism::{MechanismConfig, SessionStatus};
use concord::negotiator::{Capability, Participant};
use concord::st::VetoSTMechanism;
use concord::{
    run_sessions, Comparison, Controller, ControllerConfig, Issue, LocalNegotiator,
    MappingUtilityFunction, Negotiator, NegotiatorCore, Outcome, OutcomeSpace, Result, Session,
    UtilityNegotiator,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::json;

fn space() -> OutcomeSpace {
    OutcomeSpace::from_issues(vec![
        Issue::range("quantity", 1, 5),
        Issue::discrete("color", ["red", "green", "blue"]),
    ])
}

fn random_session(seed: u64) -> VetoSTMechanism {
    let space = space();
    let mut rng = StdRng::seed_from_u64(seed);
    let mut m = VetoSTMechanism::veto(
        space.clone(),
        MechanismConfig::new().with_n_steps(25).with_seed(seed),
    )
    .unwrap();
    for i in 0..3 {
        let ufun = MappingUtilityFunction::random(&space, &mut rng);
        let negotiator = UtilityNegotiator::new(Some(&format!("n{}", i)))
            .with_strategy(concord::ComparisonStrategy::BinaryComparator)
            .with_utility_function(Arc::new(ufun));
        m.add(LocalNegotiator::new(negotiator).into_participant(), None, None)
            .unwrap();
    }
    m
}

#[tokio::test]
async fn test_run_sessions_in_input_order() {
    let sessions: Vec<VetoSTMechanism> = (0..6).map(random_session).collect();
    let ids: Vec<_> = sessions.iter().map(|s| s.id()).collect();
    let boxed = sessions
        .into_iter()
        .map(|s| Box::new(s) as Box<dyn Session>)
        .collect();

    let results = run_sessions(boxed, Some(2)).await;
    assert_eq!(results.len(), 6);
    for (result, id) in results.into_iter().zip(ids) {
        let state = result.unwrap();
        assert_eq!(state.session_id, id);
        assert!(!state.is_running());
        assert!(state.step <= 25);
    }
}

#[tokio::test]
async fn test_same_seed_same_outcome() {
    let first = run_sessions(vec![Box::new(random_session(7)) as Box<dyn Session>], None).await;
    let second = run_sessions(vec![Box::new(random_session(7)) as Box<dyn Session>], None).await;

    let first = first.into_iter().next().unwrap().unwrap();
    let second = second.into_iter().next().unwrap().unwrap();
    assert_eq!(first.status, second.status);
    assert_eq!(first.agreement, second.agreement);
    assert_eq!(first.step, second.step);
}

#[tokio::test]
async fn test_shared_controller_across_sessions() {
    let controller = Controller::new(
        ControllerConfig::new()
            .with_default_type("binary-comparator")
            .with_default_param("aspiration", json!("linear")),
        NegotiatorRegistry::with_builtins(),
    );
    let space = space();
    let mut rng = StdRng::seed_from_u64(3);

    let mut sessions: Vec<Box<dyn Session>> = Vec::new();
    for s in 0..4 {
        let mut m = VetoSTMechanism::veto(space.clone(), MechanismConfig::new().with_n_steps(10))
            .unwrap();
        for i in 0..2 {
            let ufun = MappingUtilityFunction::random(&space, &mut rng);
            let proxy = controller
                .create_negotiator(
                    None,
                    Some(&format!("s{}-n{}", s, i)),
                    json!({ "session": s }),
                    NegotiatorParams::new().with_ufun(Arc::new(ufun)),
                )
                .unwrap();
            assert!(m.add(proxy, None, None).unwrap());
        }
        sessions.push(Box::new(m));
    }
    assert_eq!(controller.len(), 8);
    assert_eq!(controller.states().len(), 8);

    let results = run_sessions(sessions, None).await;
    assert!(results.iter().all(|r| r.as_ref().is_ok_and(|s| !s.is_running())));
    assert!(controller.states().is_empty());
    assert_eq!(controller.len(), 8);
}

/// Vetoes everything, so the session never ends on its own
struct Contrarian {
    core: NegotiatorCore,
}

impl Negotiator for Contrarian {
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
        std::thread::sleep(Duration::from_millis(1));
        Ok(Comparison::Worse)
    }
}

#[tokio::test]
async fn test_cancel_unbounded_session() {
    let mut m = VetoSTMechanism::veto(space(), MechanismConfig::new()).unwrap();
    let mut core = NegotiatorCore::new(Some("contrarian"));
    core.add_capabilities(&vec![Capability::CompareBinary].into());
    let contrarian: Arc<dyn Participant> =
        LocalNegotiator::new(Contrarian { core }).into_participant();
    m.add(contrarian, None, None).unwrap();
    let cancel = m.cancel_handle();

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();
    });
    let sessions: Vec<Box<dyn Session>> = vec![Box::new(m), Box::new(random_session(1))];
    let results = run_sessions(sessions, Some(1)).await;
    canceller.await.unwrap();

    let cancelled = results[0].as_ref().unwrap();
    assert_eq!(cancelled.status, SessionStatus::Broken);
    assert!(cancelled.step > 0);
    assert_eq!(cancelled.agreement, None);
    assert!(!results[1].as_ref().unwrap().is_running());
}
