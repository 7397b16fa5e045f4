use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::{SessionId, SessionStatus};
use crate::outcome::Outcome;

/// Events emitted by a running session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum MechanismEvent {
    /// A negotiator passed the requirement check and joined
    NegotiatorJoined {
        session_id: SessionId,
        negotiator_id: Uuid,
        name: String,
        role: String,
    },
    /// A negotiator left before the session ended
    NegotiatorLeft {
        session_id: SessionId,
        negotiator_id: Uuid,
    },
    /// The first step ran
    NegotiationStarted {
        session_id: SessionId,
        n_negotiators: usize,
    },
    /// A round finished and its snapshot was recorded
    RoundCompleted {
        session_id: SessionId,
        step: usize,
        status: SessionStatus,
    },
    /// A participant failed during a fan-out or a protocol call
    ParticipantFailed {
        session_id: SessionId,
        negotiator_id: Uuid,
        error: String,
    },
    /// The session reached a terminal status
    NegotiationEnded {
        session_id: SessionId,
        status: SessionStatus,
        agreement: Option<Outcome>,
        steps: usize,
    },
}

impl MechanismEvent {
    pub fn session_id(&self) -> SessionId {
        match self {
            MechanismEvent::NegotiatorJoined { session_id, .. }
            | MechanismEvent::NegotiatorLeft { session_id, .. }
            | MechanismEvent::NegotiationStarted { session_id, .. }
            | MechanismEvent::RoundCompleted { session_id, .. }
            | MechanismEvent::ParticipantFailed { session_id, .. }
            | MechanismEvent::NegotiationEnded { session_id, .. } => *session_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let id = Uuid::new_v4();
        let event = MechanismEvent::NegotiationEnded {
            session_id: id,
            status: SessionStatus::AgreementReached,
            agreement: Some(Outcome::new([2i64])),
            steps: 4,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "negotiation_ended");
        assert_eq!(json["status"], "agreement_reached");
        assert_eq!(json["agreement"], serde_json::json!([2]));
        assert_eq!(event.session_id(), id);
    }
}
