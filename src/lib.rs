//! Library crate for sanity-board-back, exposing modules for the binaries and integration tests.

pub mod config;
/// Persistence model and room store backends.
pub mod dao;
/// Wire types exchanged over WebSocket and HTTP.
pub mod dto;
/// Service and HTTP error types.
pub mod error;
/// HTTP route definitions.
pub mod routes;
/// Business logic between the transport and the room state.
pub mod services;
/// In-memory rooms, sessions and the turn engine.
pub mod state;
