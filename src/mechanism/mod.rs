//! Negotiation sessions
//!
//! This module provides:
//! - The generic round engine and the protocol trait
//! - Session configuration and state snapshots
//! - The read-only session view handed to negotiators
//! - Concurrent execution of many sessions

pub mod config;
pub mod engine;
pub mod events;
pub mod info;
pub mod runner;
pub mod state;

pub use config::MechanismConfig;
pub use engine::{Mechanism, Protocol, RoundContext};
pub use events::MechanismEvent;
pub use info::{CancelHandle, SessionInfo};
pub use runner::{run_sessions, Session};
pub use state::{
    MechanismState, Notification, NotificationKind, ProtocolState, RoundResult, SessionId,
    SessionStatus, SingleTextState,
};
