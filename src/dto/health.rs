use serde::Serialize;
use utoipa::ToSchema;

/// Whether a room store is currently installed and healthy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Storage reachable.
    Ok,
    /// Running without storage.
    Degraded,
}

/// Payload returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: HealthStatus,
    /// Rooms currently held in memory.
    pub rooms: usize,
    /// Live player connections.
    pub connections: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_lowercase() {
        let body = HealthResponse {
            status: HealthStatus::Degraded,
            rooms: 2,
            connections: 3,
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({"status": "degraded", "rooms": 2, "connections": 3})
        );
    }
}
