use std::time::SystemTime;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// Health endpoint payloads.
pub mod health;
/// Client-facing rendering of the turn phase.
pub mod phase;
/// Room listing payloads.
pub mod public;
/// Room, player and board views.
pub mod room;
pub mod validation;
/// WebSocket commands and server messages.
pub mod ws;

fn format_system_time(time: SystemTime) -> String {
    OffsetDateTime::from(time)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}
