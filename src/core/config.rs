//! # Client configuration.
//!
//! Provides [`Config`], the timing and transport settings of one client.
//! A copy is frozen into the runtime when the client is built; the
//! session machine reads it through a shared `Arc`.
//!
//! ## Sentinel values
//! - `keepalive_interval = 0s` → let the server choose (local fallback 5s)
//! - `polling_interval = 0s`   → poll again as soon as the server allows
//! - `session_recovery_timeout = 0s` → never recover, always recreate
//! - `reverse_heartbeat_interval = 0s` → no reverse heartbeats

use std::time::Duration;

use crate::orchestrator::ForcedTransport;
use crate::policies::JitterPolicy;
use crate::protocol::Bandwidth;

/// Keepalive assumed when neither the server nor the configuration sets one.
pub const DEFAULT_KEEPALIVE: Duration = Duration::from_secs(5);

/// Client configuration.
///
/// ## Field semantics
/// - `retry_delay`: floor of the retry counter; also the initial connect timeout
/// - `first_retry_max_delay`: upper bound of the jittered first retry after a broken session
/// - `session_recovery_timeout`: time budget to recover a broken stream
/// - `stalled_timeout`: silence tolerated after the keepalive before reporting `STALLED`
/// - `reconnect_timeout`: silence tolerated in `STALLED` before giving up on the stream;
///   also the bind timeout of a streaming transport that worked before
/// - `idle_timeout`: how long a polling request may wait for data
/// - `switch_check_timeout`: how long an in-place switch may take before a fresh session is forced
/// - `tutor_timeout`: first wait before an unconfirmed control request is retransmitted
///
/// ## Notes
/// All fields are public. Prefer the helper accessors over sentinel checks.
#[derive(Clone, Debug)]
pub struct Config {
    /// Address create requests are sent to.
    pub server_address: String,
    pub retry_delay: Duration,
    pub first_retry_max_delay: Duration,
    pub first_retry_jitter: JitterPolicy,
    pub session_recovery_timeout: Duration,
    /// Keepalive requested from the server (`0s` = server default).
    pub keepalive_interval: Duration,
    pub stalled_timeout: Duration,
    pub reconnect_timeout: Duration,
    pub idle_timeout: Duration,
    /// Pause between polls (`0s` = as suggested by the server).
    pub polling_interval: Duration,
    pub switch_check_timeout: Duration,
    pub tutor_timeout: Duration,
    /// Restricts transport selection (`None` = free choice with fallback).
    pub forced_transport: Option<ForcedTransport>,
    /// Whether a lagging stream may be downgraded to polling.
    pub slowing_enabled: bool,
    /// Bandwidth requested when a session is created.
    pub requested_bandwidth: Bandwidth,
    /// Reverse heartbeat interval (`0s` = disabled).
    pub reverse_heartbeat_interval: Duration,
    /// Capacity of the event bus ring buffer (min 1).
    pub bus_capacity: usize,
}

impl Config {
    /// Default configuration targeting `address`.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            server_address: address.into(),
            ..Self::default()
        }
    }

    /// Keepalive interval to request, if any.
    #[inline]
    pub fn keepalive_hint(&self) -> Option<Duration> {
        non_zero(self.keepalive_interval)
    }

    /// Keepalive to assume when the server did not announce one.
    #[inline]
    pub fn keepalive_fallback(&self) -> Duration {
        self.keepalive_hint().unwrap_or(DEFAULT_KEEPALIVE)
    }

    #[inline]
    pub fn polling_hint(&self) -> Option<Duration> {
        non_zero(self.polling_interval)
    }

    #[inline]
    pub fn recovery_enabled(&self) -> bool {
        !self.session_recovery_timeout.is_zero()
    }

    #[inline]
    pub fn reverse_heartbeat(&self) -> Option<Duration> {
        non_zero(self.reverse_heartbeat_interval)
    }

    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `retry_delay = 4s`, `first_retry_max_delay = 100ms` with full jitter
    /// - `session_recovery_timeout = 15s`
    /// - `stalled_timeout = 2s`, `reconnect_timeout = 3s`
    /// - `idle_timeout = 19s`, `polling_interval = 0s`
    /// - `switch_check_timeout = 4s`, `tutor_timeout = 4s`
    /// - no forced transport, slowing disabled, unlimited bandwidth
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            server_address: String::new(),
            retry_delay: Duration::from_secs(4),
            first_retry_max_delay: Duration::from_millis(100),
            first_retry_jitter: JitterPolicy::Full,
            session_recovery_timeout: Duration::from_secs(15),
            keepalive_interval: Duration::ZERO,
            stalled_timeout: Duration::from_secs(2),
            reconnect_timeout: Duration::from_secs(3),
            idle_timeout: Duration::from_secs(19),
            polling_interval: Duration::ZERO,
            switch_check_timeout: Duration::from_secs(4),
            tutor_timeout: Duration::from_secs(4),
            forced_transport: None,
            slowing_enabled: false,
            requested_bandwidth: Bandwidth::Unlimited,
            reverse_heartbeat_interval: Duration::ZERO,
            bus_capacity: 1024,
        }
    }
}

#[inline]
fn non_zero(d: Duration) -> Option<Duration> {
    if d.is_zero() { None } else { Some(d) }
}
