//! # pulse-server
//!
//! Axum HTTP + `WebSocket` gateway in front of the signaling hub.
//!
//! - `GET /ws?userId=<identity>`: one session per client (read loop + writer task)
//! - `POST /api/messages/deliver`: push a persisted chat message to its recipient
//! - `GET /health`, `GET /metrics`: operational endpoints
//! - Graceful shutdown via a shared `CancellationToken`
//!
//! ## Crate Position
//!
//! Depends on: pulse-core, pulse-settings, pulse-signaling.
//! Depended on by: pulse-gateway.

#![deny(unsafe_code)]

pub mod config;
pub mod delivery;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use server::PulseServer;
