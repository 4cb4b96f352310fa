use serde::Serialize;

/// Negotiation phase of the single peer connection owned by a call.
///
/// Idle → Negotiating → Connected → Closed, with Closed terminal. The
/// responder may jump Idle → Connected in one step when the offer arrives
/// before local media is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    Idle,
    Negotiating,
    Connected,
    Closed,
}

impl NegotiationState {
    /// Legal successor check; Closed accepts nothing.
    pub fn can_advance(self, next: NegotiationState) -> bool {
        use NegotiationState::*;
        match (self, next) {
            (Closed, _) => false,
            (_, Idle) => false,
            (Idle, Negotiating) | (Idle, Connected) => true,
            (Negotiating, Connected) => true,
            (_, Closed) => true,
            _ => false,
        }
    }
}

/// Overall call status as shown to the user. Completed is terminal; there is
/// no resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CallStatus {
    Waiting,
    InCall,
    Completed,
}

impl CallStatus {
    pub fn can_advance(self, next: CallStatus) -> bool {
        use CallStatus::*;
        match (self, next) {
            (Waiting, InCall) => true,
            (Waiting, Completed) | (InCall, Completed) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_negotiation_is_terminal() {
        for next in [
            NegotiationState::Idle,
            NegotiationState::Negotiating,
            NegotiationState::Connected,
            NegotiationState::Closed,
        ] {
            assert!(!NegotiationState::Closed.can_advance(next));
        }
    }

    #[test]
    fn responder_may_connect_straight_from_idle() {
        assert!(NegotiationState::Idle.can_advance(NegotiationState::Connected));
    }

    #[test]
    fn completed_call_is_terminal() {
        assert!(!CallStatus::Completed.can_advance(CallStatus::Waiting));
        assert!(!CallStatus::Completed.can_advance(CallStatus::InCall));
        assert!(!CallStatus::Completed.can_advance(CallStatus::Completed));
    }

    #[test]
    fn waiting_to_in_call_to_completed() {
        assert!(CallStatus::Waiting.can_advance(CallStatus::InCall));
        assert!(CallStatus::InCall.can_advance(CallStatus::Completed));
        // teardown before the call ever started is still legal
        assert!(CallStatus::Waiting.can_advance(CallStatus::Completed));
    }
}
