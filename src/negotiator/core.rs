//! Negotiator identity, session binding and lifecycle hooks

use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use super::aspiration::Aspiration;
use super::capability::{Capability, CapabilitySet};
use super::comparator::ComparisonStrategy;
use crate::error::{NegotiationError, Result};
use crate::mechanism::{MechanismState, Notification, NotificationKind, SessionId, SessionInfo};
use crate::outcome::Outcome;
use crate::utility::{Comparison, SharedUtility};

pub type NegotiatorId = Uuid;

/// Where a negotiator currently takes part
#[derive(Debug, Clone)]
pub struct SessionBinding {
    pub info: SessionInfo,
    pub initial_state: MechanismState,
    pub role: String,
}

/// State shared by every negotiator implementation.
///
/// Concrete negotiators embed a core and expose it through [`Negotiator::core`]; the
/// provided trait methods do the rest.
#[derive(Debug, Clone)]
pub struct NegotiatorCore {
    pub(super) id: NegotiatorId,
    pub(super) name: String,
    pub(super) ufun: Option<SharedUtility>,
    pub(super) initial_ufun: Option<SharedUtility>,
    pub(super) ufun_modified: bool,
    pub(super) capabilities: CapabilitySet,
    pub(super) strategies: Vec<ComparisonStrategy>,
    pub(super) thresholds: Option<Vec<f64>>,
    pub(super) aspiration: Option<Aspiration>,
    pub(super) binding: Option<SessionBinding>,
}

impl NegotiatorCore {
    pub fn new(name: Option<&str>) -> Self {
        let id = Uuid::new_v4();
        let name = match name {
            Some(name) => name.to_string(),
            None => format!("negotiator-{}", &id.simple().to_string()[..8]),
        };
        Self {
            id,
            name,
            ufun: None,
            initial_ufun: None,
            ufun_modified: false,
            capabilities: CapabilitySet::with_defaults(),
            strategies: Vec::new(),
            thresholds: None,
            aspiration: None,
            binding: None,
        }
    }

    /// Install the utility function this negotiator falls back to after leaving a session
    pub fn with_utility_function(mut self, ufun: SharedUtility) -> Self {
        self.initial_ufun = Some(ufun.clone());
        self.ufun = Some(ufun);
        self.ufun_modified = true;
        self
    }

    /// Compose a comparison strategy, advertising its capabilities
    pub fn with_strategy(mut self, strategy: ComparisonStrategy) -> Self {
        for cap in strategy.capabilities() {
            self.capabilities.add(*cap);
        }
        if !self.strategies.contains(&strategy) {
            self.strategies.push(strategy);
        }
        self
    }

    /// Thresholds used by n-levels comparison
    pub fn with_thresholds(mut self, thresholds: Vec<f64>) -> Self {
        self.thresholds = Some(thresholds);
        self
    }

    pub fn with_aspiration(mut self, aspiration: Aspiration) -> Self {
        self.capabilities.add(Capability::Aspiration);
        self.aspiration = Some(aspiration);
        self
    }

    pub fn id(&self) -> NegotiatorId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    pub fn add_capabilities(&mut self, capabilities: &CapabilitySet) {
        self.capabilities.extend(capabilities);
    }

    pub fn strategies(&self) -> &[ComparisonStrategy] {
        &self.strategies
    }

    pub fn thresholds(&self) -> Option<&[f64]> {
        self.thresholds.as_deref()
    }

    pub fn set_thresholds(&mut self, thresholds: Vec<f64>) {
        self.thresholds = Some(thresholds);
    }

    pub fn utility_function(&self) -> Option<&SharedUtility> {
        self.ufun.as_ref()
    }

    pub fn has_ufun(&self) -> bool {
        self.ufun.is_some()
    }

    /// Replace the utility function and mark it changed
    pub fn set_utility_function(&mut self, ufun: Option<SharedUtility>) {
        self.ufun = ufun;
        self.ufun_modified = true;
    }

    pub fn ufun_modified(&self) -> bool {
        self.ufun_modified
    }

    /// Clear the changed flag, returning whether it was set
    pub fn take_ufun_modified(&mut self) -> bool {
        std::mem::take(&mut self.ufun_modified)
    }

    pub fn session(&self) -> Option<&SessionInfo> {
        self.binding.as_ref().map(|b| &b.info)
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session().map(SessionInfo::id)
    }

    pub fn role(&self) -> Option<&str> {
        self.binding.as_ref().map(|b| b.role.as_str())
    }

    pub fn initial_state(&self) -> Option<&MechanismState> {
        self.binding.as_ref().map(|b| &b.initial_state)
    }

    /// Bound to `session`, or to any session when `session` is `None`
    pub fn isin(&self, session: Option<SessionId>) -> bool {
        match session {
            Some(id) => self.session_id() == Some(id),
            None => self.binding.is_some(),
        }
    }

    /// Bind to a session. Returns false if already bound.
    pub fn bind(
        &mut self,
        info: &SessionInfo,
        state: &MechanismState,
        ufun: Option<SharedUtility>,
        role: &str,
    ) -> bool {
        if self.binding.is_some() {
            return false;
        }
        self.binding = Some(SessionBinding {
            info: info.clone(),
            initial_state: state.clone(),
            role: role.to_string(),
        });
        if let Some(ufun) = ufun {
            self.set_utility_function(Some(ufun));
        }
        debug!(negotiator = %self.name, session = %info.id(), role, "bound to session");
        true
    }

    /// Forget the session and go back to the initial utility function
    pub fn dissociate(&mut self) {
        if let Some(binding) = self.binding.take() {
            debug!(negotiator = %self.name, session = %binding.info.id(), "left session");
        }
        self.ufun = self.initial_ufun.clone();
    }

    /// The declared reserved value, else the utility of the null outcome
    pub fn reserved_value(&self) -> Option<f64> {
        let ufun = self.ufun.as_ref()?;
        ufun.reserved_value().or_else(|| ufun.eval(None))
    }

    pub fn is_acceptable_as_agreement(&self, outcome: &Outcome) -> bool {
        let Some(reserved) = self.reserved_value() else {
            return true;
        };
        match self.ufun.as_ref().and_then(|u| u.eval(Some(outcome))) {
            Some(utility) => utility >= reserved,
            None => false,
        }
    }

    /// Current aspiration level, driven by the bound session's relative time
    pub fn aspiration_level(&self) -> Result<f64> {
        let aspiration = self.aspiration.ok_or_else(|| self.missing(Capability::Aspiration))?;
        aspiration.level(self.session().and_then(SessionInfo::relative_time))
    }

    pub(super) fn require(&self, capability: Capability) -> Result<()> {
        if self.capabilities.has(capability) {
            Ok(())
        } else {
            Err(self.missing(capability))
        }
    }

    fn missing(&self, capability: Capability) -> NegotiationError {
        NegotiationError::MissingCapability {
            negotiator: self.id,
            capability: capability.as_str().to_string(),
        }
    }
}

/// A party in a negotiation.
///
/// Implementors only provide access to their [`NegotiatorCore`]; hooks default to no-ops and
/// comparison entry points default to the composed strategies.
pub trait Negotiator: Send {
    fn core(&self) -> &NegotiatorCore;
    fn core_mut(&mut self) -> &mut NegotiatorCore;

    fn id(&self) -> NegotiatorId {
        self.core().id()
    }

    fn name(&self) -> &str {
        self.core().name()
    }

    fn capabilities(&self) -> CapabilitySet {
        self.core().capabilities().clone()
    }

    fn join(
        &mut self,
        info: &SessionInfo,
        state: &MechanismState,
        ufun: Option<SharedUtility>,
        role: &str,
    ) -> bool {
        self.core_mut().bind(info, state, ufun, role)
    }

    fn is_acceptable_as_agreement(&mut self, outcome: &Outcome) -> Result<bool> {
        Ok(self.core().is_acceptable_as_agreement(outcome))
    }

    fn on_negotiation_start(&mut self, _state: &MechanismState) {}

    fn on_round_start(&mut self, _state: &MechanismState) {}

    fn on_round_end(&mut self, _state: &MechanismState) {}

    fn on_mechanism_error(&mut self, _state: &MechanismState) {}

    fn on_negotiation_end(&mut self, _state: &MechanismState) {}

    /// Runs before the binding is cleared
    fn on_leave(&mut self, _state: &MechanismState) {}

    fn on_ufun_changed(&mut self) {}

    fn on_notification(&mut self, notification: &Notification, sender: SessionId) -> Result<()> {
        dispatch_notification(self, notification, sender)
    }

    /// Asked before a controller removes this negotiator
    fn before_death(&mut self, _context: &Value) -> bool {
        true
    }

    fn evaluate(&mut self, outcome: Option<&Outcome>) -> Result<Option<f64>> {
        self.core().evaluate(outcome)
    }

    fn compare_real(
        &mut self,
        first: Option<&Outcome>,
        second: Option<&Outcome>,
    ) -> Result<Option<f64>> {
        self.core().compare_real(first, second)
    }

    fn is_better(
        &mut self,
        first: Option<&Outcome>,
        second: Option<&Outcome>,
        epsilon: f64,
    ) -> Result<Comparison> {
        self.core().is_better(first, second, epsilon)
    }

    fn compare_nlevels(
        &mut self,
        first: Option<&Outcome>,
        second: Option<&Outcome>,
        n: usize,
    ) -> Result<Option<i32>> {
        self.core().compare_nlevels(first, second, n)
    }

    fn rank_with_weights(
        &mut self,
        outcomes: &[Option<Outcome>],
        descending: bool,
    ) -> Result<Option<Vec<(usize, f64)>>> {
        self.core().rank_with_weights(outcomes, descending)
    }

    fn rank(&mut self, outcomes: &[Option<Outcome>], descending: bool) -> Result<Option<Vec<usize>>> {
        self.core().rank(outcomes, descending)
    }

    fn sort(&mut self, outcomes: &mut [Option<Outcome>], descending: bool) -> Result<()> {
        self.core().sort(outcomes, descending)
    }
}

/// Default notification handling: check the sender, then route to the lifecycle hooks
pub fn dispatch_notification<N: Negotiator + ?Sized>(
    negotiator: &mut N,
    notification: &Notification,
    sender: SessionId,
) -> Result<()> {
    let bound = negotiator.core().session_id();
    if bound != Some(sender) {
        return Err(NegotiationError::ProtocolViolation(format!(
            "{} notification from session {} sent to {}, which is bound to {}",
            notification.kind.as_str(),
            sender,
            negotiator.name(),
            bound.map_or_else(|| "no session".to_string(), |id| id.to_string()),
        )));
    }

    let state = &notification.state;
    match notification.kind {
        NotificationKind::NegotiationStart => {
            if negotiator.core_mut().take_ufun_modified() {
                negotiator.on_ufun_changed();
            }
            negotiator.on_negotiation_start(state);
        }
        NotificationKind::RoundStart => negotiator.on_round_start(state),
        NotificationKind::RoundEnd => negotiator.on_round_end(state),
        NotificationKind::NegotiationEnd => negotiator.on_negotiation_end(state),
        NotificationKind::UfunModified => {
            if negotiator.core_mut().take_ufun_modified() {
                negotiator.on_ufun_changed();
            }
        }
    }
    Ok(())
}

/// Run the leave hook, then clear the binding whatever the hook did
pub fn leave_session<N: Negotiator + ?Sized>(negotiator: &mut N, state: &MechanismState) {
    negotiator.on_leave(state);
    negotiator.core_mut().dissociate();
}
