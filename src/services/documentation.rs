use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI document for Sanity Board Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::rooms::list_rooms,
        crate::routes::rooms::get_room,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::health::HealthStatus,
            crate::dto::public::RoomsResponse,
            crate::dto::public::RoomSummary,
            crate::dto::room::RoomView,
            crate::dto::room::PlayerView,
            crate::dto::room::TradeView,
            crate::dto::room::TileView,
            crate::dto::room::TileType,
            crate::dto::phase::VisibleTurnPhase,
            crate::dto::ws::ClientCommand,
            crate::dto::ws::JoinPayload,
            crate::dto::ws::DecisionChoice,
            crate::dto::ws::ServerMessage,
            crate::dto::ws::EventPolarity,
            crate::dto::ws::LogSeverity,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "rooms", description = "Read-only room listing for operators"),
        (name = "players", description = "WebSocket game transport for players"),
    )
)]
pub struct ApiDoc;
