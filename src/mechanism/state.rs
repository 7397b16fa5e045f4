//! Session state snapshots, round results and notifications

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::outcome::Outcome;

pub type SessionId = Uuid;

/// Termination status of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Rounds are still being executed
    Running,
    /// The session ended with an agreement
    AgreementReached,
    /// A participant or the caller broke off the negotiation
    Broken,
    /// A time budget was exceeded
    TimedOut,
    /// The step budget ran out, or the protocol finished without an agreement
    Exhausted,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Running => "running",
            SessionStatus::AgreementReached => "agreement_reached",
            SessionStatus::Broken => "broken",
            SessionStatus::TimedOut => "timed_out",
            SessionStatus::Exhausted => "exhausted",
        }
    }

    /// Check if this is a terminal status
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Running)
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(SessionStatus::Running),
            "agreement_reached" => Ok(SessionStatus::AgreementReached),
            "broken" => Ok(SessionStatus::Broken),
            "timed_out" => Ok(SessionStatus::TimedOut),
            "exhausted" => Ok(SessionStatus::Exhausted),
            _ => Err(format!("Invalid session status: {}", s)),
        }
    }
}

/// Extra state kept by the single-text protocol
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SingleTextState {
    /// The text every participant has accepted so far
    pub current_offer: Option<Outcome>,
    /// The most recent proposal
    pub new_offer: Option<Outcome>,
    /// Votes on the most recent proposal, in join order
    pub last_responses: Vec<bool>,
}

/// Protocol-specific part of a snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "protocol")]
pub enum ProtocolState {
    #[default]
    Generic,
    SingleText(SingleTextState),
}

/// Immutable snapshot of a session, recorded once per executed step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MechanismState {
    pub session_id: SessionId,
    pub status: SessionStatus,
    pub started: bool,
    pub step: usize,
    /// Seconds since the first step
    pub time: f64,
    /// Progress in `[0, 1]`; undefined for sessions with neither a step nor a time limit
    pub relative_time: Option<f64>,
    pub broken: bool,
    pub timed_out: bool,
    pub agreement: Option<Outcome>,
    pub n_negotiators: usize,
    pub has_error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_details: Option<String>,
    pub protocol: ProtocolState,
    pub recorded_at: DateTime<Utc>,
}

impl MechanismState {
    /// State of a session that has not executed any step yet
    pub fn initial(session_id: SessionId) -> Self {
        Self {
            session_id,
            status: SessionStatus::Running,
            started: false,
            step: 0,
            time: 0.0,
            relative_time: None,
            broken: false,
            timed_out: false,
            agreement: None,
            n_negotiators: 0,
            has_error: false,
            error_details: None,
            protocol: ProtocolState::Generic,
            recorded_at: Utc::now(),
        }
    }

    pub fn is_running(&self) -> bool {
        !self.status.is_terminal()
    }

    /// The accepted text, for single-text sessions
    pub fn current_offer(&self) -> Option<&Outcome> {
        match &self.protocol {
            ProtocolState::SingleText(st) => st.current_offer.as_ref(),
            ProtocolState::Generic => None,
        }
    }

    pub fn single_text(&self) -> Option<&SingleTextState> {
        match &self.protocol {
            ProtocolState::SingleText(st) => Some(st),
            ProtocolState::Generic => None,
        }
    }
}

/// What a protocol reports back after one round
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoundResult {
    pub broken: bool,
    pub timed_out: bool,
    /// The protocol has nothing more to do; the session ends normally
    pub finished: bool,
    pub agreement: Option<Outcome>,
}

impl RoundResult {
    /// Keep negotiating
    pub fn proceed() -> Self {
        Self::default()
    }

    pub fn broken() -> Self {
        Self {
            broken: true,
            ..Self::default()
        }
    }

    pub fn timed_out() -> Self {
        Self {
            timed_out: true,
            ..Self::default()
        }
    }

    pub fn finished() -> Self {
        Self {
            finished: true,
            ..Self::default()
        }
    }

    pub fn agreement(outcome: Outcome) -> Self {
        Self {
            agreement: Some(outcome),
            ..Self::default()
        }
    }
}

/// Kinds of lifecycle notifications a session sends to its participants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    NegotiationStart,
    RoundStart,
    RoundEnd,
    NegotiationEnd,
    UfunModified,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::NegotiationStart => "negotiation_start",
            NotificationKind::RoundStart => "round_start",
            NotificationKind::RoundEnd => "round_end",
            NotificationKind::NegotiationEnd => "negotiation_end",
            NotificationKind::UfunModified => "ufun_modified",
        }
    }
}

/// A lifecycle notification carrying the session state it refers to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub state: MechanismState,
}

impl Notification {
    pub fn new(kind: NotificationKind, state: MechanismState) -> Self {
        Self { kind, state }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_status_as_str() {
        assert_eq!(SessionStatus::Running.as_str(), "running");
        assert_eq!(SessionStatus::AgreementReached.as_str(), "agreement_reached");
        assert_eq!(SessionStatus::Broken.as_str(), "broken");
        assert_eq!(SessionStatus::TimedOut.as_str(), "timed_out");
        assert_eq!(SessionStatus::Exhausted.as_str(), "exhausted");
    }

    #[test]
    fn test_session_status_from_str() {
        assert_eq!(
            "timed_out".parse::<SessionStatus>().unwrap(),
            SessionStatus::TimedOut
        );
        assert!("paused".parse::<SessionStatus>().is_err());
    }

    #[test]
    fn test_session_status_is_terminal() {
        assert!(!SessionStatus::Running.is_terminal());
        assert!(SessionStatus::AgreementReached.is_terminal());
        assert!(SessionStatus::Broken.is_terminal());
        assert!(SessionStatus::TimedOut.is_terminal());
        assert!(SessionStatus::Exhausted.is_terminal());
    }

    #[test]
    fn test_initial_state() {
        let id = Uuid::new_v4();
        let state = MechanismState::initial(id);
        assert_eq!(state.session_id, id);
        assert!(state.is_running());
        assert!(!state.started);
        assert_eq!(state.current_offer(), None);
        assert!(state.single_text().is_none());
    }

    #[test]
    fn test_single_text_accessors() {
        let mut state = MechanismState::initial(Uuid::new_v4());
        state.protocol = ProtocolState::SingleText(SingleTextState {
            current_offer: Some(Outcome::new([3i64])),
            new_offer: Some(Outcome::new([4i64])),
            last_responses: vec![true, false],
        });
        assert_eq!(state.current_offer(), Some(&Outcome::new([3i64])));
        assert_eq!(state.single_text().unwrap().last_responses, vec![true, false]);
    }

    #[test]
    fn test_round_result_constructors() {
        assert_eq!(RoundResult::proceed(), RoundResult::default());
        assert!(RoundResult::broken().broken);
        assert!(RoundResult::timed_out().timed_out);
        assert!(RoundResult::finished().finished);
        assert_eq!(
            RoundResult::agreement(Outcome::new([1i64])).agreement,
            Some(Outcome::new([1i64]))
        );
    }

    #[test]
    fn test_state_serialization() {
        let mut state = MechanismState::initial(Uuid::new_v4());
        state.status = SessionStatus::Exhausted;
        state.protocol = ProtocolState::SingleText(SingleTextState::default());
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["status"], "exhausted");
        assert_eq!(json["protocol"]["protocol"], "single_text");
        assert!(json.get("error_details").is_none());

        let back: MechanismState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn test_notification_kind_names() {
        assert_eq!(NotificationKind::NegotiationStart.as_str(), "negotiation_start");
        assert_eq!(NotificationKind::UfunModified.as_str(), "ufun_modified");
        let json = serde_json::to_string(&NotificationKind::RoundEnd).unwrap();
        assert_eq!(json, "\"round_end\"");
    }
}
