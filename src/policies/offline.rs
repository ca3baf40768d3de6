//! # Offline create gate.
//!
//! While the host reports no network, creating sessions in a loop only burns
//! battery. [`OfflineGate`] lets one create attempt through per offline
//! period and defers the rest until a reset timer fires or the network
//! comes back.
//!
//! ```text
//! online            ─► Proceed (always)
//! offline, allowance 1 ─► allowance 0, ProceedAndArm(token)  (caller arms RESET_AFTER)
//! offline, allowance 0 ─► Defer
//! reset(token)      ─► allowance 1   (ignored if token is stale)
//! back online       ─► allowance 1, outstanding tokens invalidated
//! ```

use std::time::Duration;

/// Delay after which a consumed allowance is restored.
pub const RESET_AFTER: Duration = Duration::from_secs(20);

/// Identifies one armed reset timer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GateToken(u64);

/// Outcome of [`OfflineGate::check`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateDecision {
    /// Go ahead.
    Proceed,
    /// Go ahead; this attempt used up the allowance and the caller must
    /// schedule a reset after [`RESET_AFTER`].
    ProceedAndArm(GateToken),
    /// Postpone the attempt.
    Defer,
}

#[derive(Debug)]
pub struct OfflineGate {
    online: bool,
    allowance: u32,
    token: u64,
}

impl OfflineGate {
    pub fn new() -> Self {
        Self {
            online: true,
            allowance: 1,
            token: 0,
        }
    }

    #[inline]
    pub fn is_online(&self) -> bool {
        self.online
    }

    /// Records a network availability change reported by the host.
    pub fn set_online(&mut self, online: bool) {
        if online && !self.online {
            self.allowance = 1;
            self.token += 1;
        }
        self.online = online;
    }

    /// Consults the gate before a create attempt.
    pub fn check(&mut self) -> GateDecision {
        if self.online {
            return GateDecision::Proceed;
        }
        if self.allowance == 0 {
            return GateDecision::Defer;
        }
        self.allowance -= 1;
        if self.allowance == 0 {
            GateDecision::ProceedAndArm(GateToken(self.token))
        } else {
            GateDecision::Proceed
        }
    }

    /// Restores the allowance; returns `false` for a stale token.
    pub fn reset(&mut self, token: GateToken) -> bool {
        if token.0 != self.token {
            return false;
        }
        self.token += 1;
        self.allowance = 1;
        true
    }
}

impl Default for OfflineGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_online_always_proceeds() {
        let mut g = OfflineGate::new();
        for _ in 0..5 {
            assert_eq!(g.check(), GateDecision::Proceed);
        }
    }

    #[test]
    fn test_offline_lets_one_attempt_through() {
        let mut g = OfflineGate::new();
        g.set_online(false);
        let token = match g.check() {
            GateDecision::ProceedAndArm(t) => t,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(g.check(), GateDecision::Defer);
        assert!(g.reset(token));
        assert!(matches!(g.check(), GateDecision::ProceedAndArm(_)));
    }

    #[test]
    fn test_stale_token_is_ignored() {
        let mut g = OfflineGate::new();
        g.set_online(false);
        let GateDecision::ProceedAndArm(token) = g.check() else {
            panic!("expected armed decision");
        };
        g.set_online(true);
        g.set_online(false);
        assert!(!g.reset(token));
        assert!(matches!(g.check(), GateDecision::ProceedAndArm(_)));
    }

    #[test]
    fn test_back_online_restores_allowance() {
        let mut g = OfflineGate::new();
        g.set_online(false);
        let _ = g.check();
        assert_eq!(g.check(), GateDecision::Defer);
        g.set_online(true);
        assert_eq!(g.check(), GateDecision::Proceed);
    }
}
