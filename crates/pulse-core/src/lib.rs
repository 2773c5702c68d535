//! # pulse-core
//!
//! Foundation types shared by every Pulse crate:
//!
//! - **Branded IDs**: [`ids::Identity`] (externally issued user id) and
//!   [`ids::ConnectionId`] (one per live transport connection)
//! - **Wire vocabulary**: [`events::ClientEvent`] (inbound) and
//!   [`events::ServerEvent`] (outbound), both framed as `{event, data}` envelopes
//! - **Errors**: [`errors::ProtocolError`] for frames that cannot be decoded
//! - **Logging**: [`logging::init_subscriber`] for the `tracing` subscriber
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by all other pulse crates.

#![deny(unsafe_code)]

pub mod errors;
pub mod events;
pub mod ids;
pub mod logging;
