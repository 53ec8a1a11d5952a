//! Per-endpoint session state machine
//!
//! Each of the two endpoints of a call holds its own [`SessionState`];
//! the two copies are causally linked only through relayed messages,
//! never shared memory. The transition function here is total and pure:
//! inputs that the table does not allow return `None` and the caller
//! logs a warning and moves on, so a duplicate or racing message can
//! never fault the machine.
//!
//! ```text
//! Idle --SendInvite--> Inviting
//! Idle --ReceiveInvite--> Ringing
//! Inviting --ReceiveAccept--> Negotiating
//! Ringing --LocalAccept--> Negotiating
//! Inviting --ReceiveDecline | InviteTimeout--> Idle
//! Ringing --LocalDecline | InviteTimeout--> Idle
//! Negotiating --NegotiationComplete--> Active
//! Active --ReceiveEndCall | LocalEndCall--> Ended
//! {Inviting,Ringing,Negotiating,Active} --PeerConnectionLost--> Ended
//! Ended --(terminal)
//! ```

use serde::{Deserialize, Serialize};

/// State of one endpoint's current call attempt.
///
/// Never regresses except through the explicit paths above; `Ended` is
/// terminal and a fresh call attempt requires a fresh instance.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    Inviting,
    Ringing,
    Negotiating,
    Active,
    Ended,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Ended)
    }

    /// Whether a call attempt exists in this state.
    pub fn in_call(&self) -> bool {
        !matches!(self, SessionState::Idle)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Normalized inputs driving session transitions. Local user actions
/// and relayed peer messages reduce to the same vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionInput {
    SendInvite,
    ReceiveInvite,
    ReceiveAccept,
    LocalAccept,
    ReceiveDecline,
    LocalDecline,
    InviteTimeout,
    NegotiationComplete,
    NegotiationFailed,
    ReceiveEndCall,
    LocalEndCall,
    PeerConnectionLost,
}

impl std::fmt::Display for SessionInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Outcome of applying an input to a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Move to the given state
    To(SessionState),
    /// Allowed but without effect (e.g. duplicate end-call in `Ended`)
    NoOp,
    /// Not allowed in this state; callers log and drop
    Invalid,
}

/// The transition table. Total over all (state, input) pairs.
pub fn next_state(state: SessionState, input: SessionInput) -> Transition {
    use SessionInput::*;
    use SessionState::*;
    use Transition::*;

    match (state, input) {
        (Idle, SendInvite) => To(Inviting),
        (Idle, ReceiveInvite) => To(Ringing),

        (Inviting, ReceiveAccept) => To(Negotiating),
        (Inviting, ReceiveDecline) => To(Idle),
        (Inviting, InviteTimeout) => To(Idle),
        (Inviting, LocalEndCall) => To(Ended),

        (Ringing, LocalAccept) => To(Negotiating),
        (Ringing, LocalDecline) => To(Idle),
        // the unanswered invite expires on the ringing side too
        (Ringing, InviteTimeout) => To(Idle),
        // the caller hung up before we answered
        (Ringing, ReceiveEndCall) => To(Ended),

        (Negotiating, NegotiationComplete) => To(Active),
        (Negotiating, NegotiationFailed) => To(Ended),
        // cancellation while negotiation is in flight
        (Negotiating, LocalEndCall) => To(Ended),
        (Negotiating, ReceiveEndCall) => To(Ended),

        (Active, ReceiveEndCall) => To(Ended),
        (Active, LocalEndCall) => To(Ended),

        (Inviting, PeerConnectionLost)
        | (Ringing, PeerConnectionLost)
        | (Negotiating, PeerConnectionLost)
        | (Active, PeerConnectionLost) => To(Ended),

        // termination messages may race or duplicate
        (Ended, ReceiveEndCall) => NoOp,
        (Ended, PeerConnectionLost) => NoOp,

        _ => Invalid,
    }
}

#[cfg(test)]
mod tests {
    use super::SessionInput::*;
    use super::SessionState::*;
    use super::*;

    fn to(state: SessionState) -> Transition {
        Transition::To(state)
    }

    #[test]
    fn caller_happy_path() {
        assert_eq!(next_state(Idle, SendInvite), to(Inviting));
        assert_eq!(next_state(Inviting, ReceiveAccept), to(Negotiating));
        assert_eq!(next_state(Negotiating, NegotiationComplete), to(Active));
        assert_eq!(next_state(Active, LocalEndCall), to(Ended));
    }

    #[test]
    fn callee_happy_path() {
        assert_eq!(next_state(Idle, ReceiveInvite), to(Ringing));
        assert_eq!(next_state(Ringing, LocalAccept), to(Negotiating));
        assert_eq!(next_state(Negotiating, NegotiationComplete), to(Active));
        assert_eq!(next_state(Active, ReceiveEndCall), to(Ended));
    }

    #[test]
    fn decline_and_timeout_return_to_idle() {
        assert_eq!(next_state(Inviting, ReceiveDecline), to(Idle));
        assert_eq!(next_state(Inviting, InviteTimeout), to(Idle));
        assert_eq!(next_state(Ringing, LocalDecline), to(Idle));
        assert_eq!(next_state(Ringing, InviteTimeout), to(Idle));
    }

    #[test]
    fn duplicate_end_call_is_a_no_op_not_an_error() {
        assert_eq!(next_state(Active, ReceiveEndCall), to(Ended));
        assert_eq!(next_state(Ended, ReceiveEndCall), Transition::NoOp);
        assert_eq!(next_state(Ended, ReceiveEndCall), Transition::NoOp);
    }

    #[test]
    fn ended_is_terminal() {
        for input in [
            SendInvite,
            ReceiveInvite,
            ReceiveAccept,
            LocalAccept,
            NegotiationComplete,
            LocalEndCall,
        ] {
            assert_eq!(next_state(Ended, input), Transition::Invalid, "{input}");
        }
    }

    #[test]
    fn second_invite_is_rejected_in_every_non_idle_state() {
        for state in [Inviting, Ringing, Negotiating, Active, Ended] {
            assert_eq!(next_state(state, SendInvite), Transition::Invalid, "{state}");
        }
    }

    #[test]
    fn peer_loss_ends_every_live_call_state() {
        for state in [Inviting, Ringing, Negotiating, Active] {
            assert_eq!(next_state(state, PeerConnectionLost), to(Ended), "{state}");
        }
        assert_eq!(next_state(Idle, PeerConnectionLost), Transition::Invalid);
    }
}
