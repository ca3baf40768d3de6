//! Server-side session view shared with collaborators.
//!
//! A [`ServerSession`] outlives the session instances that carry it: a
//! switch or a recovery only repoints it to the new stream. A true create
//! replaces it.

use crate::protocol::{ConnectionId, SessionId};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerSession {
    generation: u64,
    session_id: SessionId,
    stream: ConnectionId,
    open: bool,
}

impl ServerSession {
    pub(crate) fn new(generation: u64, session_id: SessionId, stream: ConnectionId) -> Self {
        Self {
            generation,
            session_id,
            stream,
            open: true,
        }
    }

    /// Increases with every server session the client creates.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Stream currently delivering for the session.
    pub fn stream(&self) -> ConnectionId {
        self.stream
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub(crate) fn repoint(&mut self, stream: ConnectionId) {
        self.stream = stream;
    }

    pub(crate) fn close(&mut self) {
        self.open = false;
    }
}
