//! Session states and the epoch token.

use std::fmt;

/// Lifecycle state of one session instance.
///
/// ```text
///  Off ─create─► Creating ─conok─► Created ─loop─► FirstPause ─timer─► FirstBinding
///                   │                                                     │ conok/data
///                   │ conok (recovery)                                    ▼
///                   └──────────────────────────────────────────────► Receiving ◄─┐
///                                                                     │  │ loop  │ data
///                                             silence ◄───────────────┘  ▼       │
///                                     Stalling ─► Stalled            Pause ─► Binding
///  any failure ─► Sleep (retry / recovery pending) or Off (closed for good)
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionState {
    Off,
    Creating,
    Created,
    FirstPause,
    FirstBinding,
    Pause,
    Binding,
    Receiving,
    Stalling,
    Stalled,
    Sleep,
}

impl SessionState {
    /// Whether the state accepts server events.
    pub fn is_active(self) -> bool {
        !matches!(self, SessionState::Off | SessionState::Sleep)
    }

    /// States where the session has worked at least once on this stream family.
    pub fn is_established(self) -> bool {
        matches!(
            self,
            SessionState::Receiving
                | SessionState::Stalling
                | SessionState::Stalled
                | SessionState::Binding
                | SessionState::Pause
        )
    }

    /// States of a session that has not delivered yet.
    pub fn is_establishing(self) -> bool {
        matches!(
            self,
            SessionState::Creating | SessionState::Created | SessionState::FirstBinding
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Off => "off",
            SessionState::Creating => "creating",
            SessionState::Created => "created",
            SessionState::FirstPause => "first_pause",
            SessionState::FirstBinding => "first_binding",
            SessionState::Pause => "pause",
            SessionState::Binding => "binding",
            SessionState::Receiving => "receiving",
            SessionState::Stalling => "stalling",
            SessionState::Stalled => "stalled",
            SessionState::Sleep => "sleep",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Epoch token. Bumped on every state change; a timer or callback carrying
/// an older phase is ignored.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Phase(u64);

impl Phase {
    #[must_use]
    pub fn next(self) -> Phase {
        Phase(self.0.wrapping_add(1))
    }

    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_classes_are_disjoint() {
        use SessionState::*;
        for s in [
            Off, Creating, Created, FirstPause, FirstBinding, Pause, Binding, Receiving, Stalling,
            Stalled, Sleep,
        ] {
            assert!(!(s.is_established() && s.is_establishing()), "{s}");
        }
        assert!(!Sleep.is_active());
        assert!(FirstPause.is_active());
    }

    #[test]
    fn test_phase_advances() {
        let p = Phase::default();
        assert!(p.next() > p);
        assert_ne!(p.next(), p);
    }
}
