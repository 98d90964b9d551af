use axum::extract::State;
use axum::Json;
use chrono::Utc;

use ia_protocol::rpc::{HealthResponse, HealthStats};

use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        timestamp: Utc::now(),
        service: "interaction-server".into(),
        stats: HealthStats {
            rooms: state.rooms.room_count(),
            subscriptions: state.broadcaster.total_subscriptions(),
        },
    })
}
