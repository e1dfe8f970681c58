/// Idle room eviction.
pub mod cleanup;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Seat assignment for joining sessions.
pub mod matchmaking;
/// Dirty-room flushing and startup restoration.
pub mod persistence;
/// Read-only room projections.
pub mod public_service;
/// Command dispatch, outcome delivery and scheduled continuations.
pub mod room_service;
/// Storage connection supervision and degraded mode.
pub mod storage_supervisor;
/// WebSocket connection and message handling service.
pub mod websocket_service;
