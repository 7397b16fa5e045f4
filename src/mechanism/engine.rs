//! The generic round-based session engine
//!
//! A [`Mechanism`] owns the participants, budgets, history and notification fan-out of one
//! session. What happens inside a round is decided by its [`Protocol`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::config::MechanismConfig;
use super::events::MechanismEvent;
use super::info::{CancelHandle, SessionInfo};
use super::state::{
    MechanismState, Notification, NotificationKind, ProtocolState, RoundResult, SessionId,
    SessionStatus,
};
use crate::error::{NegotiationError, Result};
use crate::negotiator::{Capability, NegotiatorId, Participant, Requirements};
use crate::outcome::{Outcome, OutcomeSpace};
use crate::utility::SharedUtility;

const DEFAULT_ROLE: &str = "negotiator";

/// The rules of one kind of negotiation
pub trait Protocol: Send {
    /// Used to name sessions that were not given a name
    fn name(&self) -> &str {
        "mechanism"
    }

    /// Capabilities every participant must advertise
    fn requirements(&self) -> Requirements {
        Requirements::new()
    }

    /// Run one round
    fn round(&mut self, ctx: &mut RoundContext<'_>) -> RoundResult;

    /// Protocol fields recorded in every snapshot
    fn extra_state(&self) -> ProtocolState {
        ProtocolState::Generic
    }

    /// Final agreement when the session ends without one
    fn resolve_agreement(&mut self, _participants: &[Arc<dyn Participant>]) -> Option<Outcome> {
        None
    }

    /// Protocol-imposed participant limit
    fn max_negotiators(&self) -> Option<usize> {
        None
    }
}

/// What a protocol may see and touch during a round
pub struct RoundContext<'a> {
    session_id: SessionId,
    step: usize,
    participants: &'a [Arc<dyn Participant>],
    space: &'a OutcomeSpace,
    rng: &'a mut StdRng,
    cancel: &'a CancelHandle,
    started: Instant,
    step_time_limit: Option<Duration>,
    errors: Vec<(NegotiatorId, NegotiationError)>,
}

impl<'a> RoundContext<'a> {
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Index of the round being run, starting at zero
    pub fn step(&self) -> usize {
        self.step
    }

    /// Participants in join order
    pub fn participants(&self) -> &'a [Arc<dyn Participant>] {
        self.participants
    }

    pub fn outcome_space(&self) -> &'a OutcomeSpace {
        self.space
    }

    pub fn rng(&mut self) -> &mut StdRng {
        self.rng
    }

    /// Draw one outcome from the session's space
    pub fn random_outcome(&mut self) -> Option<Outcome> {
        self.space.random_outcome(&mut *self.rng)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// The round has used up its budget
    pub fn is_timed_out(&self) -> bool {
        self.step_time_limit
            .is_some_and(|limit| self.started.elapsed() > limit)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Note a participant failure; it is reported to everyone once the round ends
    pub fn record_error(&mut self, negotiator: NegotiatorId, error: NegotiationError) {
        self.errors.push((negotiator, error));
    }

    pub fn errors(&self) -> &[(NegotiatorId, NegotiationError)] {
        &self.errors
    }
}

/// A negotiation session driven by protocol `P`
pub struct Mechanism<P: Protocol> {
    id: SessionId,
    config: MechanismConfig,
    requirements: Requirements,
    info: SessionInfo,
    space: OutcomeSpace,
    protocol: P,
    participants: Vec<Arc<dyn Participant>>,
    history: Vec<MechanismState>,
    status: SessionStatus,
    step: usize,
    started_at: Option<Instant>,
    agreement: Option<Outcome>,
    last_error: Option<String>,
    rng: StdRng,
    cancel: CancelHandle,
    event_tx: broadcast::Sender<MechanismEvent>,
}

impl<P: Protocol> Mechanism<P> {
    pub fn new(space: OutcomeSpace, config: MechanismConfig, protocol: P) -> Result<Self> {
        config.validate()?;
        let id = Uuid::new_v4();
        let name = config
            .name
            .clone()
            .unwrap_or_else(|| format!("{}-{}", protocol.name(), &id.simple().to_string()[..8]));

        let mut requirements = protocol.requirements();
        requirements.extend(config.requirements.clone());

        let info = SessionInfo::new(
            id,
            name,
            config.n_steps,
            config.time_limit,
            config.step_time_limit,
            space.clone(),
            requirements.clone(),
        );
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let (event_tx, _) = broadcast::channel(256);

        let mechanism = Self {
            id,
            config,
            requirements,
            info,
            space,
            protocol,
            participants: Vec::new(),
            history: Vec::new(),
            status: SessionStatus::Running,
            step: 0,
            started_at: None,
            agreement: None,
            last_error: None,
            rng,
            cancel: CancelHandle::new(),
            event_tx,
        };
        mechanism.info.publish(mechanism.state());
        Ok(mechanism)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn name(&self) -> &str {
        self.info.name()
    }

    /// Read-only view handed to negotiators
    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    pub fn config(&self) -> &MechanismConfig {
        &self.config
    }

    pub fn protocol(&self) -> &P {
        &self.protocol
    }

    pub fn protocol_mut(&mut self) -> &mut P {
        &mut self.protocol
    }

    pub fn outcome_space(&self) -> &OutcomeSpace {
        &self.space
    }

    pub fn participants(&self) -> &[Arc<dyn Participant>] {
        &self.participants
    }

    pub fn n_negotiators(&self) -> usize {
        self.participants.len()
    }

    pub fn requirements(&self) -> &Requirements {
        &self.requirements
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn is_running(&self) -> bool {
        !self.status.is_terminal()
    }

    pub fn agreement(&self) -> Option<&Outcome> {
        self.agreement.as_ref()
    }

    /// One snapshot per executed step
    pub fn history(&self) -> &[MechanismState] {
        &self.history
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<MechanismEvent> {
        self.event_tx.subscribe()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Up to `n` distinct outcomes drawn with the session's random source
    pub fn random_outcomes(&mut self, n: usize) -> Vec<Outcome> {
        self.space.random_outcomes(n, &mut self.rng)
    }

    pub fn add_requirements(&mut self, requirements: Requirements) {
        self.requirements.extend(requirements.clone());
        self.info.update_requirements(|reqs| reqs.extend(requirements));
    }

    pub fn remove_requirements<S: AsRef<str>>(&mut self, names: impl IntoIterator<Item = S>) {
        let names: Vec<S> = names.into_iter().collect();
        for name in &names {
            self.requirements.remove(name.as_ref());
        }
        self.info.update_requirements(|reqs| {
            for name in &names {
                reqs.remove(name.as_ref());
            }
        });
    }

    /// Progress through the session, the larger of the step and time fractions
    pub fn relative_time(&self) -> Option<f64> {
        let by_steps = self
            .config
            .n_steps
            .map(|n| self.step as f64 / n as f64);
        let by_time = self
            .config
            .time_limit
            .map(|limit| self.elapsed().as_secs_f64() / limit.as_secs_f64());
        match (by_steps, by_time) {
            (None, None) => None,
            (steps, time) => Some(
                steps
                    .unwrap_or(0.0)
                    .max(time.unwrap_or(0.0))
                    .clamp(0.0, 1.0),
            ),
        }
    }

    fn elapsed(&self) -> Duration {
        self.started_at
            .map(|started| started.elapsed())
            .unwrap_or_default()
    }

    /// Snapshot of the session as it is now
    pub fn state(&self) -> MechanismState {
        MechanismState {
            session_id: self.id,
            status: self.status,
            started: self.started_at.is_some(),
            step: self.step,
            time: self.elapsed().as_secs_f64(),
            relative_time: self.relative_time(),
            broken: self.status == SessionStatus::Broken,
            timed_out: self.status == SessionStatus::TimedOut,
            agreement: self.agreement.clone(),
            n_negotiators: self.participants.len(),
            has_error: self.last_error.is_some(),
            error_details: self.last_error.clone(),
            protocol: self.protocol.extra_state(),
            recorded_at: Utc::now(),
        }
    }

    /// Add a participant. Returns false when the session refuses it or it refuses the session.
    pub fn add(
        &mut self,
        participant: Arc<dyn Participant>,
        ufun: Option<SharedUtility>,
        role: Option<&str>,
    ) -> Result<bool> {
        if !self.is_running() {
            debug!(session = %self.id, negotiator = %participant.name(), "session is over, join refused");
            return Ok(false);
        }
        if self.participants.iter().any(|p| p.id() == participant.id()) {
            return Ok(false);
        }
        let limit = match (self.config.max_n_negotiators, self.protocol.max_negotiators()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        if limit.is_some_and(|max| self.participants.len() >= max) {
            debug!(session = %self.id, negotiator = %participant.name(), "session is full");
            return Ok(false);
        }

        let capabilities = participant.capabilities()?;
        if let Some(unmet) = capabilities.unmet_requirement(&self.requirements) {
            info!(
                session = %self.id,
                negotiator = %participant.name(),
                requirement = unmet,
                "negotiator does not meet requirement"
            );
            return Ok(false);
        }

        let role = role.unwrap_or(DEFAULT_ROLE);
        let state = self.state();
        if !participant.join(&self.info, &state, ufun, role)? {
            debug!(session = %self.id, negotiator = %participant.name(), "negotiator declined to join");
            return Ok(false);
        }

        info!(session = %self.id, negotiator = %participant.name(), role, "negotiator joined");
        let _ = self.event_tx.send(MechanismEvent::NegotiatorJoined {
            session_id: self.id,
            negotiator_id: participant.id(),
            name: participant.name().to_string(),
            role: role.to_string(),
        });
        self.participants.push(participant);
        self.info.publish(self.state());
        Ok(true)
    }

    /// Take a participant out of a running session
    pub fn remove(&mut self, negotiator: NegotiatorId) -> Result<bool> {
        if !self.is_running() {
            return Ok(false);
        }
        let Some(index) = self.participants.iter().position(|p| p.id() == negotiator) else {
            return Ok(false);
        };
        if !self.participants[index]
            .capabilities()?
            .has(Capability::Leave)
        {
            return Ok(false);
        }

        let participant = self.participants.remove(index);
        let state = self.state();
        participant.leave(&state)?;
        info!(session = %self.id, negotiator = %participant.name(), "negotiator left");
        let _ = self.event_tx.send(MechanismEvent::NegotiatorLeft {
            session_id: self.id,
            negotiator_id: negotiator,
        });
        self.info.publish(state);
        Ok(true)
    }

    /// Run one step and return its snapshot. A finished session just reports its last state.
    pub fn step(&mut self) -> MechanismState {
        if !self.is_running() {
            return self.state();
        }

        if self.started_at.is_none() {
            self.started_at = Some(Instant::now());
            info!(
                session = %self.id,
                name = %self.info.name(),
                negotiators = self.participants.len(),
                "negotiation started"
            );
            let _ = self.event_tx.send(MechanismEvent::NegotiationStarted {
                session_id: self.id,
                n_negotiators: self.participants.len(),
            });
            let state = self.state();
            self.fan_out(NotificationKind::NegotiationStart, &state);
        }

        let result = if self.cancel.is_cancelled() {
            RoundResult::broken()
        } else if self
            .config
            .time_limit
            .is_some_and(|limit| self.elapsed() > limit)
        {
            RoundResult::timed_out()
        } else {
            self.run_round()
        };

        self.step += 1;
        self.apply(result);

        let state = self.state();
        self.history.push(state.clone());
        self.info.publish(state.clone());
        debug!(session = %self.id, step = state.step, status = state.status.as_str(), "round completed");
        let _ = self.event_tx.send(MechanismEvent::RoundCompleted {
            session_id: self.id,
            step: state.step,
            status: state.status,
        });
        self.fan_out(NotificationKind::RoundEnd, &state);

        if !self.is_running() {
            self.finish(&state);
        }
        state
    }

    /// Step until the session ends
    pub fn run(&mut self) -> MechanismState {
        while self.is_running() {
            self.step();
        }
        self.state()
    }

    fn run_round(&mut self) -> RoundResult {
        let state = self.state();
        self.fan_out(NotificationKind::RoundStart, &state);

        let started = Instant::now();
        let mut ctx = RoundContext {
            session_id: self.id,
            step: self.step,
            participants: &self.participants,
            space: &self.space,
            rng: &mut self.rng,
            cancel: &self.cancel,
            started,
            step_time_limit: self.config.step_time_limit,
            errors: Vec::new(),
        };
        let mut result = self.protocol.round(&mut ctx);
        let round_time = started.elapsed();
        let errors = ctx.errors;

        // failure reports do not count against the round budget
        if !errors.is_empty() {
            self.report_failures(errors);
        }
        if !result.broken
            && self
                .config
                .step_time_limit
                .is_some_and(|limit| round_time > limit)
        {
            result.timed_out = true;
            result.agreement = None;
        }
        result
    }

    fn apply(&mut self, result: RoundResult) {
        let steps_used = self.config.n_steps.is_some_and(|n| self.step >= n);
        self.status = if result.broken {
            SessionStatus::Broken
        } else if result.timed_out {
            SessionStatus::TimedOut
        } else if let Some(agreement) = result.agreement {
            self.agreement = Some(agreement);
            SessionStatus::AgreementReached
        } else if result.finished || steps_used {
            SessionStatus::Exhausted
        } else {
            SessionStatus::Running
        };

        if self.status == SessionStatus::Exhausted {
            if let Some(agreement) = self.protocol.resolve_agreement(&self.participants) {
                self.agreement = Some(agreement);
                self.status = SessionStatus::AgreementReached;
            }
        }
    }

    fn finish(&mut self, state: &MechanismState) {
        info!(
            session = %self.id,
            status = state.status.as_str(),
            steps = state.step,
            agreement = ?state.agreement.as_ref().map(ToString::to_string),
            "negotiation ended"
        );
        self.fan_out(NotificationKind::NegotiationEnd, state);
        for participant in &self.participants {
            if let Err(e) = participant.leave(state) {
                warn!(session = %self.id, negotiator = %participant.name(), error = %e, "participant failed to leave");
            }
        }
        let _ = self.event_tx.send(MechanismEvent::NegotiationEnded {
            session_id: self.id,
            status: state.status,
            agreement: state.agreement.clone(),
            steps: state.step,
        });
    }

    /// Deliver a notification to every participant in join order
    fn fan_out(&mut self, kind: NotificationKind, state: &MechanismState) {
        let notification = Notification::new(kind, state.clone());
        let mut failures = Vec::new();
        for participant in &self.participants {
            if let Err(e) = participant.on_notification(&notification, self.id) {
                warn!(
                    session = %self.id,
                    negotiator = %participant.name(),
                    notification = kind.as_str(),
                    error = %e,
                    "participant failed to handle notification"
                );
                failures.push((participant.id(), e));
            }
        }
        if !failures.is_empty() {
            self.report_failures(failures);
        }
    }

    /// Record failures and tell every participant about them
    fn report_failures(&mut self, failures: Vec<(NegotiatorId, NegotiationError)>) {
        let details = failures
            .iter()
            .map(|(id, e)| format!("{}: {}", id, e))
            .collect::<Vec<_>>()
            .join("; ");
        for (negotiator_id, error) in &failures {
            let _ = self.event_tx.send(MechanismEvent::ParticipantFailed {
                session_id: self.id,
                negotiator_id: *negotiator_id,
                error: error.to_string(),
            });
        }
        self.last_error = Some(details);

        let state = self.state();
        for participant in &self.participants {
            if let Err(e) = participant.on_mechanism_error(&state) {
                warn!(session = %self.id, negotiator = %participant.name(), error = %e, "participant failed to handle mechanism error");
            }
        }
    }
}
