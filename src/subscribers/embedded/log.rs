//! # LogWriter: events rendered through `tracing`
//!
//! A minimal subscriber forwarding every [`Event`] to the `tracing`
//! macros, at a level matching its severity. Useful for demos and for
//! applications that already install a `tracing` subscriber.
//!
//! ## Example output (with a fmt subscriber)
//! ```text
//! INFO  status status="CONNECTING"
//! INFO  session created session="S7f1" conn=1
//! WARN  retry scheduled reason="socket.error" delay_ms=62
//! INFO  transport switched mode=HTTP-STREAMING reason="ws.unavailable"
//! ERROR server rejected reason="code 41: taken over"
//! ```

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;
use async_trait::async_trait;
use tracing::{debug, error, info, warn};

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let reason = e.reason.as_deref().unwrap_or("");
        let session = e.session.as_deref().unwrap_or("-");
        match e.kind {
            EventKind::StatusChanged => info!(status = reason, "status"),
            EventKind::SessionCreated => {
                info!(session, conn = ?e.connection, "session created")
            }
            EventKind::SessionBound => {
                info!(session, conn = ?e.connection, mode = ?e.mode, "stream bound")
            }
            EventKind::SessionRecovered => {
                info!(session, conn = ?e.connection, "session recovered")
            }
            EventKind::SessionClosed => info!(session, reason, "session closed"),
            EventKind::TransportSwitched => {
                info!(mode = ?e.mode, reason, "transport switched")
            }
            EventKind::RetryScheduled => {
                warn!(reason, delay_ms = ?e.delay_ms, "retry scheduled")
            }
            EventKind::RecoveryScheduled => {
                warn!(reason, delay_ms = ?e.delay_ms, "recovery scheduled")
            }
            EventKind::SlowDetected => warn!(lag_ms = ?e.delay_ms, "stream is slow"),
            EventKind::RequestSent => {
                debug!(request = ?e.request, conn = ?e.connection, kind = reason, "request sent")
            }
            EventKind::RequestRetransmitted => {
                debug!(request = ?e.request, attempt = ?e.attempt, kind = reason, "request retransmitted")
            }
            EventKind::RequestAborted => {
                debug!(request = ?e.request, kind = reason, "request aborted")
            }
            EventKind::ServerRejected => error!(reason, "server rejected"),
            EventKind::ProtocolViolation => {
                error!(conn = ?e.connection, reason, "protocol violation")
            }
            EventKind::SubscriberOverflow => warn!(
                subscriber = e.subscriber.as_deref().unwrap_or("unknown"),
                reason,
                "subscriber overflow"
            ),
            EventKind::SubscriberPanicked => error!(
                subscriber = e.subscriber.as_deref().unwrap_or("unknown"),
                info = reason,
                "subscriber panicked"
            ),
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }

    fn queue_capacity(&self) -> usize {
        1024
    }
}
