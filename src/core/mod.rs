//! Runtime core: configuration and the async shell around the client core.
//!
//! The public API from this module is [`Client`], built with
//! [`ClientBuilder`] from a [`Config`].
//!
//! Internal modules:
//! - `actor`: serializes every input and executes the effects of the core;
//! - `command`: the messages the actor consumes;
//! - `builder`: wires bus, subscribers, transport and actor together;
//! - `client`: the application handle.

mod actor;
mod builder;
mod client;
mod command;
mod config;

pub use builder::ClientBuilder;
pub use client::{Client, ClientSnapshot};
pub(crate) use command::Command;
pub use config::{Config, DEFAULT_KEEPALIVE};
