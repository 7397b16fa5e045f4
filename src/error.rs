//! Error types for negotiation sessions and controllers

use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NegotiationError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unknown negotiator: {0}")]
    UnknownNegotiator(Uuid),

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Re-entrant call into negotiator {0}")]
    Reentrancy(Uuid),

    #[error("Negotiator {negotiator} lacks capability: {capability}")]
    MissingCapability { negotiator: Uuid, capability: String },

    #[error("Not enough outcomes: requested {requested}, available {available}")]
    NotEnoughOutcomes { requested: usize, available: usize },

    #[error("Negotiator error: {0}")]
    Negotiator(String),

    #[error("Session task failed: {0}")]
    SessionTask(String),
}

impl NegotiationError {
    /// Shorthand for a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        NegotiationError::Configuration(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, NegotiationError>;
