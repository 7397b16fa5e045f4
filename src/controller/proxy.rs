//! Per-session stand-ins for controller-owned negotiators

use std::sync::{Arc, Weak};

use super::manager::Controller;
use crate::error::Result;
use crate::mechanism::{MechanismState, Notification, SessionId, SessionInfo};
use crate::negotiator::{
    CapabilitySet, LocalNegotiator, Negotiator, NegotiatorId, Participant,
};
use crate::outcome::Outcome;
use crate::utility::{Comparison, SharedUtility};

/// A negotiator owned by a controller.
///
/// Every call a session makes is routed through the controller, which consults its policy
/// and then enters the negotiator with [`Controller::call`]. The proxy counts as detached
/// only for the thread inside such a call; that thread's calls go straight to the
/// negotiator while every other thread still goes through the controller.
pub struct NegotiatorProxy {
    id: NegotiatorId,
    name: String,
    parent: Weak<Controller>,
    inner: LocalNegotiator,
}

impl NegotiatorProxy {
    pub(crate) fn new(negotiator: Box<dyn Negotiator>, parent: Weak<Controller>) -> Self {
        let inner = LocalNegotiator::from_box(negotiator);
        Self {
            id: inner.id(),
            name: inner.name().to_string(),
            parent,
            inner,
        }
    }

    /// The controlling controller, unless it was dropped
    pub fn parent(&self) -> Option<Arc<Controller>> {
        self.parent.upgrade()
    }

    /// Whether calls from this thread are routed through the controller
    pub fn is_attached(&self) -> bool {
        self.route().is_some()
    }

    fn route(&self) -> Option<Arc<Controller>> {
        if self.inner.is_held_by_current_thread() {
            None
        } else {
            self.parent()
        }
    }

    pub(crate) fn cell(&self) -> &LocalNegotiator {
        &self.inner
    }
}

impl Participant for NegotiatorProxy {
    fn id(&self) -> NegotiatorId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Result<CapabilitySet> {
        match self.route() {
            Some(controller) => controller.capabilities(self.id),
            None => self.inner.capabilities(),
        }
    }

    fn join(
        &self,
        info: &SessionInfo,
        state: &MechanismState,
        ufun: Option<SharedUtility>,
        role: &str,
    ) -> Result<bool> {
        match self.route() {
            Some(controller) => controller.join(self.id, info, state, ufun, role),
            None => self.inner.join(info, state, ufun, role),
        }
    }

    fn leave(&self, state: &MechanismState) -> Result<()> {
        match self.route() {
            Some(controller) => controller.leave(self.id, state),
            None => self.inner.leave(state),
        }
    }

    fn on_notification(&self, notification: &Notification, sender: SessionId) -> Result<()> {
        match self.route() {
            Some(controller) => controller.on_notification(self.id, notification, sender),
            None => self.inner.on_notification(notification, sender),
        }
    }

    fn on_mechanism_error(&self, state: &MechanismState) -> Result<()> {
        match self.route() {
            Some(controller) => controller.on_mechanism_error(self.id, state),
            None => self.inner.on_mechanism_error(state),
        }
    }

    fn is_acceptable_as_agreement(&self, outcome: &Outcome) -> Result<bool> {
        match self.route() {
            Some(controller) => controller.is_acceptable_as_agreement(self.id, outcome),
            None => self.inner.is_acceptable_as_agreement(outcome),
        }
    }

    fn evaluate(&self, outcome: Option<&Outcome>) -> Result<Option<f64>> {
        match self.route() {
            Some(controller) => controller.evaluate(self.id, outcome),
            None => self.inner.evaluate(outcome),
        }
    }

    fn compare_real(
        &self,
        first: Option<&Outcome>,
        second: Option<&Outcome>,
    ) -> Result<Option<f64>> {
        match self.route() {
            Some(controller) => controller.compare_real(self.id, first, second),
            None => self.inner.compare_real(first, second),
        }
    }

    fn is_better(
        &self,
        first: Option<&Outcome>,
        second: Option<&Outcome>,
        epsilon: f64,
    ) -> Result<Comparison> {
        match self.route() {
            Some(controller) => controller.is_better(self.id, first, second, epsilon),
            None => self.inner.is_better(first, second, epsilon),
        }
    }

    fn compare_nlevels(
        &self,
        first: Option<&Outcome>,
        second: Option<&Outcome>,
        n: usize,
    ) -> Result<Option<i32>> {
        match self.route() {
            Some(controller) => controller.compare_nlevels(self.id, first, second, n),
            None => self.inner.compare_nlevels(first, second, n),
        }
    }

    fn rank_with_weights(
        &self,
        outcomes: &[Option<Outcome>],
        descending: bool,
    ) -> Result<Option<Vec<(usize, f64)>>> {
        match self.route() {
            Some(controller) => controller.rank_with_weights(self.id, outcomes, descending),
            None => self.inner.rank_with_weights(outcomes, descending),
        }
    }

    fn rank(&self, outcomes: &[Option<Outcome>], descending: bool) -> Result<Option<Vec<usize>>> {
        match self.route() {
            Some(controller) => controller.rank(self.id, outcomes, descending),
            None => self.inner.rank(outcomes, descending),
        }
    }

    fn sort(&self, outcomes: &mut [Option<Outcome>], descending: bool) -> Result<()> {
        match self.route() {
            Some(controller) => controller.sort(self.id, outcomes, descending),
            None => self.inner.sort(outcomes, descending),
        }
    }
}
