use tracing::warn;

use crate::{
    dto::health::{HealthResponse, HealthStatus},
    state::SharedState,
};

/// Report degraded mode and registry sizes, probing the store on the way.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.room_store().await {
        Some(store) => {
            if let Err(err) = store.health_check().await {
                warn!(error = %err, "storage health check failed");
            }
        }
        None => warn!("storage unavailable (degraded mode)"),
    }

    let status = if state.is_degraded() {
        HealthStatus::Degraded
    } else {
        HealthStatus::Ok
    };

    HealthResponse {
        status,
        rooms: state.rooms().read().await.len(),
        connections: state.connections().len(),
    }
}
