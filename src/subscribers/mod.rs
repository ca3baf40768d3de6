//! # Event subscribers for the pushvisor runtime.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`]
//! fan-out, and the built-in [`LogWriter`].
//!
//! ```text
//! Session / Orchestrator ── publish(Event) ──► Bus ──► subscriber listener
//!                                                            │
//!                                                      SubscriberSet
//!                                                 ┌──────────┼──────────┐
//!                                                 ▼          ▼          ▼
//!                                             LogWriter   Metrics    Custom
//! ```

#[cfg(feature = "logging")]
mod embedded;
mod set;
mod subscribe;

#[cfg(feature = "logging")]
pub use embedded::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
