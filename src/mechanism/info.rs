//! Read-only session view handed to negotiators, and the cancellation handle

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use super::state::{MechanismState, SessionId};
use crate::negotiator::Requirements;
use crate::outcome::{Issue, Outcome, OutcomeSpace};

struct SessionInfoInner {
    id: SessionId,
    name: String,
    n_steps: Option<usize>,
    time_limit: Option<Duration>,
    step_time_limit: Option<Duration>,
    space: OutcomeSpace,
    requirements: RwLock<Requirements>,
    state: RwLock<MechanismState>,
}

/// Shared, read-only view of a running session.
///
/// Cloning is cheap; every clone observes the latest state published by the session.
#[derive(Clone)]
pub struct SessionInfo {
    inner: Arc<SessionInfoInner>,
}

impl SessionInfo {
    pub(crate) fn new(
        id: SessionId,
        name: String,
        n_steps: Option<usize>,
        time_limit: Option<Duration>,
        step_time_limit: Option<Duration>,
        space: OutcomeSpace,
        requirements: Requirements,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInfoInner {
                id,
                name,
                n_steps,
                time_limit,
                step_time_limit,
                space,
                requirements: RwLock::new(requirements),
                state: RwLock::new(MechanismState::initial(id)),
            }),
        }
    }

    pub fn id(&self) -> SessionId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn n_steps(&self) -> Option<usize> {
        self.inner.n_steps
    }

    pub fn time_limit(&self) -> Option<Duration> {
        self.inner.time_limit
    }

    pub fn step_time_limit(&self) -> Option<Duration> {
        self.inner.step_time_limit
    }

    pub fn issues(&self) -> &[Issue] {
        self.inner.space.issues()
    }

    pub fn outcomes(&self) -> Option<&[Outcome]> {
        self.inner.space.outcomes()
    }

    pub fn outcome_space(&self) -> &OutcomeSpace {
        &self.inner.space
    }

    /// Latest published state
    pub fn state(&self) -> MechanismState {
        self.inner.state.read().clone()
    }

    pub fn step(&self) -> usize {
        self.inner.state.read().step
    }

    pub fn relative_time(&self) -> Option<f64> {
        self.inner.state.read().relative_time
    }

    pub fn agreement(&self) -> Option<Outcome> {
        self.inner.state.read().agreement.clone()
    }

    pub fn current_offer(&self) -> Option<Outcome> {
        self.inner.state.read().current_offer().cloned()
    }

    pub fn requirements(&self) -> Requirements {
        self.inner.requirements.read().clone()
    }

    pub(crate) fn publish(&self, state: MechanismState) {
        *self.inner.state.write() = state;
    }

    pub(crate) fn update_requirements(&self, f: impl FnOnce(&mut Requirements)) {
        f(&mut self.inner.requirements.write());
    }
}

impl fmt::Debug for SessionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionInfo")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("n_steps", &self.inner.n_steps)
            .field("time_limit", &self.inner.time_limit)
            .finish()
    }
}

/// Requests that a session stop at the next check
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
