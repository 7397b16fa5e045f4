//! Concord - multi-party negotiation protocol engine
//!
//! Sessions ([`Mechanism`]) run rounds of a [`Protocol`] between participants that
//! advertise capabilities. Participants are either negotiators owned by the session
//! ([`LocalNegotiator`]) or proxies of negotiators driven by a [`Controller`].

pub mod controller;
pub mod error;
pub mod mechanism;
pub mod negotiator;
pub mod outcome;
pub mod st;
pub mod utility;

pub use controller::{Controller, ControllerConfig, ControllerPolicy, NegotiatorProxy};
pub use error::{NegotiationError, Result};
pub use mechanism::{
    run_sessions, CancelHandle, Mechanism, MechanismConfig, MechanismEvent, MechanismState,
    Protocol, Session, SessionInfo, SessionStatus,
};
pub use negotiator::{
    Capability, CapabilitySet, ComparisonStrategy, LocalNegotiator, Negotiator, NegotiatorCore,
    Participant, UtilityNegotiator,
};
pub use outcome::{Issue, IssueValue, Outcome, OutcomeSpace};
pub use st::{VetoSTMechanism, VetoSingleText};
pub use utility::{Comparison, MappingUtilityFunction, SharedUtility, UtilityFunction};
