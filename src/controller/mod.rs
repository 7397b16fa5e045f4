//! One decision maker driving negotiators in many sessions
//!
//! A [`Controller`] owns its negotiators and hands sessions a [`NegotiatorProxy`] for each.
//! Session callbacks reach the negotiator only through the controller's policy and
//! [`Controller::call`].

pub mod manager;
pub mod policy;
pub mod proxy;
pub mod registry;

pub use manager::{Controller, ControllerConfig};
pub use policy::{Callback, ControllerPolicy, PassivePolicy};
pub use proxy::NegotiatorProxy;
pub use registry::{NegotiatorConstructor, NegotiatorParams, NegotiatorRegistry};
