//! Controller-level decision making

use serde_json::Value;

use super::manager::Controller;
use crate::mechanism::{MechanismState, Notification, SessionInfo};
use crate::negotiator::NegotiatorId;
use crate::outcome::Outcome;
use crate::utility::Comparison;

/// A callback about to be routed to one of the controller's negotiators
#[derive(Debug, Clone, Copy)]
pub enum Callback<'a> {
    Notification(&'a Notification),
    NegotiationStart(&'a MechanismState),
    RoundStart(&'a MechanismState),
    RoundEnd(&'a MechanismState),
    NegotiationEnd(&'a MechanismState),
    MechanismError(&'a MechanismState),
    Leave(&'a MechanismState),
    UfunChanged,
}

impl Callback<'_> {
    pub fn as_str(&self) -> &'static str {
        match self {
            Callback::Notification(n) => n.kind.as_str(),
            Callback::NegotiationStart(_) => "negotiation_start",
            Callback::RoundStart(_) => "round_start",
            Callback::RoundEnd(_) => "round_end",
            Callback::NegotiationEnd(_) => "negotiation_end",
            Callback::MechanismError(_) => "mechanism_error",
            Callback::Leave(_) => "leave",
            Callback::UfunChanged => "ufun_changed",
        }
    }
}

/// Hooks a controller consults before routing a call to a negotiator.
///
/// Overrides returning `Some` answer on the negotiator's behalf; `None` lets the negotiator
/// answer. Hooks run outside the negotiator's cell, so they may use [`Controller::call`].
pub trait ControllerPolicy: Send + Sync {
    /// Return false to keep the negotiator out of the session
    fn on_join(
        &self,
        _controller: &Controller,
        _negotiator: NegotiatorId,
        _context: &Value,
        _info: &SessionInfo,
        _role: &str,
    ) -> bool {
        true
    }

    fn observe(
        &self,
        _controller: &Controller,
        _negotiator: NegotiatorId,
        _context: &Value,
        _callback: Callback<'_>,
    ) {
    }

    fn is_better(
        &self,
        _controller: &Controller,
        _negotiator: NegotiatorId,
        _context: &Value,
        _first: Option<&Outcome>,
        _second: Option<&Outcome>,
        _epsilon: f64,
    ) -> Option<Comparison> {
        None
    }

    fn is_acceptable_as_agreement(
        &self,
        _controller: &Controller,
        _negotiator: NegotiatorId,
        _context: &Value,
        _outcome: &Outcome,
    ) -> Option<bool> {
        None
    }
}

/// Lets every negotiator decide for itself
#[derive(Debug, Clone, Copy, Default)]
pub struct PassivePolicy;

impl ControllerPolicy for PassivePolicy {}
