//! # Fencing token for last-writer-wins requests.
//!
//! Requests such as bandwidth constraints or subscription reconfigurations
//! replace each other. Each one carries an increasing id; an acknowledgment
//! for id `N` implicitly resolves every earlier id, and an older
//! acknowledgment arriving late can never undo a newer one.

/// Last issued / last acknowledged pair for one resource.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Fence {
    last_sent: u64,
    last_acked: u64,
}

impl Fence {
    /// Allocates the next id.
    pub fn issue(&mut self) -> u64 {
        self.last_sent += 1;
        self.last_sent
    }

    /// Records an acknowledgment. Returns `true` if it advanced the fence,
    /// i.e. if its effect should be applied.
    pub fn acknowledge(&mut self, id: u64) -> bool {
        if id <= self.last_acked {
            return false;
        }
        self.last_acked = id;
        true
    }

    /// Whether a request with this id needs no further attempts.
    #[inline]
    pub fn is_resolved(&self, id: u64) -> bool {
        id <= self.last_acked
    }

    /// Whether this id is the newest one issued.
    #[inline]
    pub fn is_current(&self, id: u64) -> bool {
        id == self.last_sent
    }
}
