//! Negotiators: identity, capabilities, comparison strategies and the participant interface

pub mod aspiration;
pub mod capability;
pub mod comparator;
pub mod core;
pub mod participant;
pub mod utility_negotiator;

pub use aspiration::{Aspiration, AspirationType};
pub use capability::{Capability, CapabilitySet, Requirements};
pub use comparator::{
    equiprobable_thresholds, generate_thresholds, nlevel, ComparisonStrategy, ThresholdScale,
};
pub use self::core::{
    dispatch_notification, leave_session, Negotiator, NegotiatorCore, NegotiatorId,
    SessionBinding,
};
pub use participant::{LocalNegotiator, Participant};
pub use utility_negotiator::UtilityNegotiator;
