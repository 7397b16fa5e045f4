//! Controller for driving many negotiators from one place
//!
//! The controller handles:
//! - Creating negotiators from the registry and keeping their contexts
//! - Routing session callbacks through its policy
//! - Exclusive, re-entrancy-checked access to each negotiator
//! - Removing negotiators on request

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::policy::{Callback, ControllerPolicy, PassivePolicy};
use super::proxy::NegotiatorProxy;
use super::registry::{NegotiatorParams, NegotiatorRegistry};
use crate::error::{NegotiationError, Result};
use crate::mechanism::{MechanismState, Notification, SessionId, SessionInfo};
use crate::negotiator::{leave_session, CapabilitySet, Negotiator, NegotiatorId};
use crate::outcome::Outcome;
use crate::utility::{Comparison, SharedUtility};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub name: Option<String>,
    /// Registry type used when `create_negotiator` is given none
    pub default_negotiator_type: Option<String>,
    /// Parameters every created negotiator receives unless the caller overrides them
    pub default_negotiator_params: Map<String, Value>,
}

impl ControllerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_default_type(mut self, negotiator_type: impl Into<String>) -> Self {
        self.default_negotiator_type = Some(negotiator_type.into());
        self
    }

    pub fn with_default_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.default_negotiator_params.insert(key.into(), value);
        self
    }
}

struct Controlled {
    proxy: Arc<NegotiatorProxy>,
    context: Arc<Value>,
}

pub struct Controller {
    id: Uuid,
    name: String,
    config: ControllerConfig,
    registry: NegotiatorRegistry,
    policy: Box<dyn ControllerPolicy>,
    negotiators: RwLock<HashMap<NegotiatorId, Controlled>>,
}

impl Controller {
    pub fn new(config: ControllerConfig, registry: NegotiatorRegistry) -> Arc<Self> {
        Self::with_policy(config, registry, PassivePolicy)
    }

    pub fn with_policy(
        config: ControllerConfig,
        registry: NegotiatorRegistry,
        policy: impl ControllerPolicy + 'static,
    ) -> Arc<Self> {
        let id = Uuid::new_v4();
        let name = config
            .name
            .clone()
            .unwrap_or_else(|| format!("controller-{}", &id.simple().to_string()[..8]));
        Arc::new(Self {
            id,
            name,
            config,
            registry,
            policy: Box::new(policy),
            negotiators: RwLock::new(HashMap::new()),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn registry(&self) -> &NegotiatorRegistry {
        &self.registry
    }

    /// Build a negotiator and register a proxy for it
    pub fn create_negotiator(
        self: &Arc<Self>,
        negotiator_type: Option<&str>,
        name: Option<&str>,
        context: Value,
        mut params: NegotiatorParams,
    ) -> Result<Arc<NegotiatorProxy>> {
        let negotiator_type = negotiator_type
            .or(self.config.default_negotiator_type.as_deref())
            .ok_or_else(|| {
                NegotiationError::configuration(
                    "no negotiator type given and no default type configured",
                )
            })?;
        params.merge_defaults(&self.config.default_negotiator_params);

        let negotiator = self.registry.build(negotiator_type, name, params)?;
        let proxy = Arc::new(NegotiatorProxy::new(negotiator, Arc::downgrade(self)));
        let id = crate::negotiator::Participant::id(proxy.as_ref());

        self.negotiators.write().insert(
            id,
            Controlled {
                proxy: proxy.clone(),
                context: Arc::new(context),
            },
        );
        info!(controller = %self.name, negotiator = %id, negotiator_type, "created negotiator");
        Ok(proxy)
    }

    /// Run `f` on the negotiator behind `proxy`.
    ///
    /// While `f` runs the proxy is detached for the calling thread only. Fails with
    /// [`NegotiationError::Reentrancy`] when called from inside a call on the same proxy;
    /// calls from other threads wait their turn.
    pub fn call<R>(
        &self,
        proxy: &NegotiatorProxy,
        f: impl FnOnce(&mut dyn Negotiator) -> R,
    ) -> Result<R> {
        proxy.cell().with(|negotiator| f(negotiator))
    }

    /// Ask the negotiator to agree to its removal; `force` removes it regardless.
    ///
    /// Returns whether the negotiator was removed. Unknown ids are ignored.
    pub fn kill_negotiator(&self, id: NegotiatorId, force: bool) -> Result<bool> {
        let Ok((proxy, context)) = self.lookup(id) else {
            return Ok(false);
        };
        let agreed = match self.call(&proxy, |n| n.before_death(&context)) {
            Ok(agreed) => agreed,
            Err(e) if force => {
                warn!(controller = %self.name, negotiator = %id, error = %e, "before_death failed, removing anyway");
                false
            }
            Err(e) => return Err(e),
        };
        if !(agreed || force) {
            debug!(controller = %self.name, negotiator = %id, "negotiator refused to die");
            return Ok(false);
        }
        self.negotiators.write().remove(&id);
        info!(controller = %self.name, negotiator = %id, forced = !agreed, "negotiator removed");
        Ok(true)
    }

    pub fn contains(&self, id: NegotiatorId) -> bool {
        self.negotiators.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.negotiators.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.negotiators.read().is_empty()
    }

    pub fn negotiator_ids(&self) -> Vec<NegotiatorId> {
        self.negotiators.read().keys().copied().collect()
    }

    pub fn proxy(&self, id: NegotiatorId) -> Option<Arc<NegotiatorProxy>> {
        self.negotiators.read().get(&id).map(|c| c.proxy.clone())
    }

    pub fn context(&self, id: NegotiatorId) -> Option<Arc<Value>> {
        self.negotiators.read().get(&id).map(|c| c.context.clone())
    }

    /// Latest state of every session a controlled negotiator is in
    pub fn states(&self) -> HashMap<NegotiatorId, MechanismState> {
        let proxies: Vec<(NegotiatorId, Arc<NegotiatorProxy>)> = self
            .negotiators
            .read()
            .iter()
            .map(|(id, c)| (*id, c.proxy.clone()))
            .collect();
        proxies
            .into_iter()
            .filter_map(|(id, proxy)| {
                self.call(&proxy, |n| n.core().session().map(SessionInfo::state))
                    .ok()
                    .flatten()
                    .map(|state| (id, state))
            })
            .collect()
    }

    fn lookup(&self, id: NegotiatorId) -> Result<(Arc<NegotiatorProxy>, Arc<Value>)> {
        self.negotiators
            .read()
            .get(&id)
            .map(|c| (c.proxy.clone(), c.context.clone()))
            .ok_or(NegotiationError::UnknownNegotiator(id))
    }

    fn observe_then_call<R>(
        &self,
        id: NegotiatorId,
        callback: Callback<'_>,
        f: impl FnOnce(&mut dyn Negotiator) -> R,
    ) -> Result<R> {
        let (proxy, context) = self.lookup(id)?;
        self.policy.observe(self, id, &context, callback);
        self.call(&proxy, f)
    }

    pub fn capabilities(&self, id: NegotiatorId) -> Result<CapabilitySet> {
        let (proxy, _) = self.lookup(id)?;
        self.call(&proxy, |n| n.capabilities())
    }

    pub fn join(
        &self,
        id: NegotiatorId,
        info: &SessionInfo,
        state: &MechanismState,
        ufun: Option<SharedUtility>,
        role: &str,
    ) -> Result<bool> {
        let (proxy, context) = self.lookup(id)?;
        if !self.policy.on_join(self, id, &context, info, role) {
            debug!(controller = %self.name, negotiator = %id, session = %info.id(), "policy refused join");
            return Ok(false);
        }
        self.call(&proxy, |n| n.join(info, state, ufun, role))
    }

    /// Leave the bound session: the leave hook runs, then the binding is cleared
    pub fn leave(&self, id: NegotiatorId, state: &MechanismState) -> Result<()> {
        self.observe_then_call(id, Callback::Leave(state), |n| leave_session(n, state))
    }

    pub fn on_notification(
        &self,
        id: NegotiatorId,
        notification: &Notification,
        sender: SessionId,
    ) -> Result<()> {
        self.observe_then_call(id, Callback::Notification(notification), |n| {
            n.on_notification(notification, sender)
        })?
    }

    pub fn on_negotiation_start(&self, id: NegotiatorId, state: &MechanismState) -> Result<()> {
        self.observe_then_call(id, Callback::NegotiationStart(state), |n| {
            n.on_negotiation_start(state)
        })
    }

    pub fn on_round_start(&self, id: NegotiatorId, state: &MechanismState) -> Result<()> {
        self.observe_then_call(id, Callback::RoundStart(state), |n| n.on_round_start(state))
    }

    pub fn on_round_end(&self, id: NegotiatorId, state: &MechanismState) -> Result<()> {
        self.observe_then_call(id, Callback::RoundEnd(state), |n| n.on_round_end(state))
    }

    pub fn on_mechanism_error(&self, id: NegotiatorId, state: &MechanismState) -> Result<()> {
        self.observe_then_call(id, Callback::MechanismError(state), |n| {
            n.on_mechanism_error(state)
        })
    }

    /// Only the leave hook; the binding stays. Sessions use [`Controller::leave`].
    pub fn on_leave(&self, id: NegotiatorId, state: &MechanismState) -> Result<()> {
        self.observe_then_call(id, Callback::Leave(state), |n| n.on_leave(state))
    }

    pub fn on_negotiation_end(&self, id: NegotiatorId, state: &MechanismState) -> Result<()> {
        self.observe_then_call(id, Callback::NegotiationEnd(state), |n| {
            n.on_negotiation_end(state)
        })
    }

    pub fn on_ufun_changed(&self, id: NegotiatorId) -> Result<()> {
        self.observe_then_call(id, Callback::UfunChanged, |n| {
            if n.core_mut().take_ufun_modified() {
                n.on_ufun_changed();
            }
        })
    }

    pub fn is_acceptable_as_agreement(&self, id: NegotiatorId, outcome: &Outcome) -> Result<bool> {
        let (proxy, context) = self.lookup(id)?;
        if let Some(answer) = self
            .policy
            .is_acceptable_as_agreement(self, id, &context, outcome)
        {
            return Ok(answer);
        }
        self.call(&proxy, |n| n.is_acceptable_as_agreement(outcome))?
    }

    pub fn is_better(
        &self,
        id: NegotiatorId,
        first: Option<&Outcome>,
        second: Option<&Outcome>,
        epsilon: f64,
    ) -> Result<Comparison> {
        let (proxy, context) = self.lookup(id)?;
        if let Some(answer) = self
            .policy
            .is_better(self, id, &context, first, second, epsilon)
        {
            return Ok(answer);
        }
        self.call(&proxy, |n| n.is_better(first, second, epsilon))?
    }

    pub fn evaluate(&self, id: NegotiatorId, outcome: Option<&Outcome>) -> Result<Option<f64>> {
        let (proxy, _) = self.lookup(id)?;
        self.call(&proxy, |n| n.evaluate(outcome))?
    }

    pub fn compare_real(
        &self,
        id: NegotiatorId,
        first: Option<&Outcome>,
        second: Option<&Outcome>,
    ) -> Result<Option<f64>> {
        let (proxy, _) = self.lookup(id)?;
        self.call(&proxy, |n| n.compare_real(first, second))?
    }

    pub fn compare_nlevels(
        &self,
        id: NegotiatorId,
        first: Option<&Outcome>,
        second: Option<&Outcome>,
        n: usize,
    ) -> Result<Option<i32>> {
        let (proxy, _) = self.lookup(id)?;
        self.call(&proxy, |neg| neg.compare_nlevels(first, second, n))?
    }

    pub fn rank_with_weights(
        &self,
        id: NegotiatorId,
        outcomes: &[Option<Outcome>],
        descending: bool,
    ) -> Result<Option<Vec<(usize, f64)>>> {
        let (proxy, _) = self.lookup(id)?;
        self.call(&proxy, |n| n.rank_with_weights(outcomes, descending))?
    }

    pub fn rank(
        &self,
        id: NegotiatorId,
        outcomes: &[Option<Outcome>],
        descending: bool,
    ) -> Result<Option<Vec<usize>>> {
        let (proxy, _) = self.lookup(id)?;
        self.call(&proxy, |n| n.rank(outcomes, descending))?
    }

    pub fn sort(
        &self,
        id: NegotiatorId,
        outcomes: &mut [Option<Outcome>],
        descending: bool,
    ) -> Result<()> {
        let (proxy, _) = self.lookup(id)?;
        self.call(&proxy, |n| n.sort(outcomes, descending))?
    }
}
