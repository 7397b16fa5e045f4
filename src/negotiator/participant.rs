//! The interface a session uses to talk to a negotiator
//!
//! Sessions never touch a [`Negotiator`] directly. They hold `Arc<dyn Participant>`, which is
//! either a [`LocalNegotiator`] owning the negotiator, or a controller proxy that routes the
//! same calls through its controller.

use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::Mutex;

use super::capability::CapabilitySet;
use super::core::{leave_session, Negotiator, NegotiatorId};
use crate::error::{NegotiationError, Result};
use crate::mechanism::{MechanismState, Notification, SessionId, SessionInfo};
use crate::outcome::Outcome;
use crate::utility::{Comparison, SharedUtility};

pub trait Participant: Send + Sync {
    fn id(&self) -> NegotiatorId;
    fn name(&self) -> &str;
    fn capabilities(&self) -> Result<CapabilitySet>;

    fn join(
        &self,
        info: &SessionInfo,
        state: &MechanismState,
        ufun: Option<SharedUtility>,
        role: &str,
    ) -> Result<bool>;

    /// Run the leave hook and clear the session binding
    fn leave(&self, state: &MechanismState) -> Result<()>;

    fn on_notification(&self, notification: &Notification, sender: SessionId) -> Result<()>;
    fn on_mechanism_error(&self, state: &MechanismState) -> Result<()>;
    fn is_acceptable_as_agreement(&self, outcome: &Outcome) -> Result<bool>;

    fn evaluate(&self, outcome: Option<&Outcome>) -> Result<Option<f64>>;
    fn compare_real(&self, first: Option<&Outcome>, second: Option<&Outcome>)
        -> Result<Option<f64>>;
    fn is_better(
        &self,
        first: Option<&Outcome>,
        second: Option<&Outcome>,
        epsilon: f64,
    ) -> Result<Comparison>;
    fn compare_nlevels(
        &self,
        first: Option<&Outcome>,
        second: Option<&Outcome>,
        n: usize,
    ) -> Result<Option<i32>>;
    fn rank_with_weights(
        &self,
        outcomes: &[Option<Outcome>],
        descending: bool,
    ) -> Result<Option<Vec<(usize, f64)>>>;
    fn rank(&self, outcomes: &[Option<Outcome>], descending: bool) -> Result<Option<Vec<usize>>>;
    fn sort(&self, outcomes: &mut [Option<Outcome>], descending: bool) -> Result<()>;
}

/// Exclusive cell around one negotiator.
///
/// Calls from other threads wait for the cell; a nested call from the thread already
/// inside it fails with [`NegotiationError::Reentrancy`] instead of deadlocking.
pub struct LocalNegotiator<N: ?Sized = dyn Negotiator> {
    id: NegotiatorId,
    name: String,
    holder: Mutex<Option<ThreadId>>,
    inner: Mutex<Box<N>>,
}

struct HolderReset<'a>(&'a Mutex<Option<ThreadId>>);

impl Drop for HolderReset<'_> {
    fn drop(&mut self) {
        *self.0.lock() = None;
    }
}

impl<N: Negotiator> LocalNegotiator<N> {
    pub fn new(negotiator: N) -> Self {
        Self::from_box(Box::new(negotiator))
    }
}

impl<N: Negotiator + ?Sized> LocalNegotiator<N> {
    pub fn from_box(negotiator: Box<N>) -> Self {
        Self {
            id: negotiator.id(),
            name: negotiator.name().to_string(),
            holder: Mutex::new(None),
            inner: Mutex::new(negotiator),
        }
    }

    /// Run `f` with exclusive access to the negotiator
    pub fn with<R>(&self, f: impl FnOnce(&mut N) -> R) -> Result<R> {
        let me = thread::current().id();
        if *self.holder.lock() == Some(me) {
            return Err(NegotiationError::Reentrancy(self.id));
        }
        let mut negotiator = self.inner.lock();
        *self.holder.lock() = Some(me);
        let _release = HolderReset(&self.holder);
        Ok(f(&mut **negotiator))
    }

    /// Whether some thread is currently inside the cell
    pub fn is_busy(&self) -> bool {
        self.holder.lock().is_some()
    }

    /// Whether the calling thread is the one inside the cell
    pub fn is_held_by_current_thread(&self) -> bool {
        *self.holder.lock() == Some(thread::current().id())
    }
}

impl<N: Negotiator + ?Sized + 'static> LocalNegotiator<N> {
    pub fn into_participant(self) -> Arc<dyn Participant> {
        Arc::new(self)
    }
}

impl<N: Negotiator + ?Sized> Participant for LocalNegotiator<N> {
    fn id(&self) -> NegotiatorId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Result<CapabilitySet> {
        self.with(|n| n.capabilities())
    }

    fn join(
        &self,
        info: &SessionInfo,
        state: &MechanismState,
        ufun: Option<SharedUtility>,
        role: &str,
    ) -> Result<bool> {
        self.with(|n| n.join(info, state, ufun, role))
    }

    fn leave(&self, state: &MechanismState) -> Result<()> {
        self.with(|n| leave_session(n, state))
    }

    fn on_notification(&self, notification: &Notification, sender: SessionId) -> Result<()> {
        self.with(|n| n.on_notification(notification, sender))?
    }

    fn on_mechanism_error(&self, state: &MechanismState) -> Result<()> {
        self.with(|n| n.on_mechanism_error(state))
    }

    fn is_acceptable_as_agreement(&self, outcome: &Outcome) -> Result<bool> {
        self.with(|n| n.is_acceptable_as_agreement(outcome))?
    }

    fn evaluate(&self, outcome: Option<&Outcome>) -> Result<Option<f64>> {
        self.with(|n| n.evaluate(outcome))?
    }

    fn compare_real(
        &self,
        first: Option<&Outcome>,
        second: Option<&Outcome>,
    ) -> Result<Option<f64>> {
        self.with(|n| n.compare_real(first, second))?
    }

    fn is_better(
        &self,
        first: Option<&Outcome>,
        second: Option<&Outcome>,
        epsilon: f64,
    ) -> Result<Comparison> {
        self.with(|n| n.is_better(first, second, epsilon))?
    }

    fn compare_nlevels(
        &self,
        first: Option<&Outcome>,
        second: Option<&Outcome>,
        n: usize,
    ) -> Result<Option<i32>> {
        self.with(|neg| neg.compare_nlevels(first, second, n))?
    }

    fn rank_with_weights(
        &self,
        outcomes: &[Option<Outcome>],
        descending: bool,
    ) -> Result<Option<Vec<(usize, f64)>>> {
        self.with(|n| n.rank_with_weights(outcomes, descending))?
    }

    fn rank(&self, outcomes: &[Option<Outcome>], descending: bool) -> Result<Option<Vec<usize>>> {
        self.with(|n| n.rank(outcomes, descending))?
    }

    fn sort(&self, outcomes: &mut [Option<Outcome>], descending: bool) -> Result<()> {
        self.with(|n| n.sort(outcomes, descending))?
    }
}
