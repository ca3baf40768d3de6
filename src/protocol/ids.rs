//! Identifier newtypes.

use std::fmt;
use std::sync::Arc;

/// One physical stream request (create, bind or recover).
///
/// Every new stream gets a fresh id; inbound traffic tagged with an older id
/// is dropped as stale.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

/// One outgoing control request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

/// Caller-chosen subscription key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u32);

/// Server-assigned logical session id.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SessionId(Arc<str>);

impl ConnectionId {
    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl RequestId {
    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl SessionId {
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req#{}", self.0)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Monotonic allocator for connection and request ids.
#[derive(Debug, Default)]
pub struct IdSource {
    conn: u64,
    request: u64,
}

impl IdSource {
    pub fn connection(&mut self) -> ConnectionId {
        self.conn += 1;
        ConnectionId(self.conn)
    }

    pub fn request(&mut self) -> RequestId {
        self.request += 1;
        RequestId(self.request)
    }
}
