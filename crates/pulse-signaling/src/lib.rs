//! # pulse-signaling
//!
//! The call-signaling and presence coordinator.
//!
//! - [`registry::ConnectionRegistry`]: identity → live connection, last-write-wins
//! - [`presence::PresencePublisher`]: full online-set broadcast on membership change
//! - [`coordinator::CallCoordinator`]: call lifecycle over a per-pair [`session::SessionTable`]
//! - [`relay::SignalRelay`]: offer/answer/candidate forwarding, stamped with the sender
//! - [`fanout::MessageFanout`]: push of persisted chat messages to online recipients
//! - [`hub::SignalingHub`]: dispatches decoded client events to the above
//!
//! Nothing here touches a socket. Each [`connection::ClientConnection`] is a
//! bounded channel into a transport-owned writer task, so a slow peer can
//! never stall the connection that is sending to it.
//!
//! ## Crate Position
//!
//! Depends on: pulse-core.
//! Depended on by: pulse-server, pulse-gateway.

#![deny(unsafe_code)]

pub mod connection;
pub mod coordinator;
pub mod error;
pub mod fanout;
pub mod hub;
pub mod presence;
pub mod profile;
pub mod registry;
pub mod relay;
pub mod session;

pub use connection::ClientConnection;
pub use coordinator::{CallCoordinator, CoordinatorConfig};
pub use error::SignalingError;
pub use hub::SignalingHub;
pub use profile::{HttpProfileLookup, Profile, ProfileError, ProfileLookup, StaticProfileDirectory};
pub use registry::{BindOutcome, ConnectionRegistry};
