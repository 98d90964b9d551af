//! HTTP + WebSocket router and the RPC handlers behind it.

mod chat;
mod health;
mod rooms;
mod turns;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};

use ia_protocol::error::{ApiError, ErrorCode};

use crate::auth::{extract_bearer, token_eq};
use crate::state::AppState;
use crate::ws;

/// Newtype so `ApiError` (defined in `ia-protocol`, which stays free of
/// web-framework dependencies) can implement axum's `IntoResponse` here.
pub struct ApiErrorResponse(pub ApiError);

impl From<ApiError> for ApiErrorResponse {
    fn from(err: ApiError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiErrorResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.0)).into_response()
    }
}

pub type ApiResult<T> = Result<Json<T>, ApiErrorResponse>;

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/rooms/:interactionId/join", post(rooms::join_room))
        .route("/rooms/:interactionId/leave", post(rooms::leave_room))
        .route("/rooms/:interactionId/state", get(rooms::get_room_state))
        .route("/rooms/:interactionId/pause", post(rooms::pause_interaction))
        .route("/rooms/:interactionId/resume", post(rooms::resume_interaction))
        .route("/rooms/:interactionId/turn", post(turns::take_turn))
        .route("/rooms/:interactionId/turn/skip", post(turns::skip_turn))
        .route("/rooms/:interactionId/turn/backtrack", post(turns::backtrack_turn))
        .route("/rooms/:interactionId/chat", post(chat::send_chat_message))
        .route("/rooms/:interactionId/chat", get(chat::get_chat_history))
        .route("/rooms/:interactionId/updates", get(ws::room_updates))
        .route_layer(axum::middleware::from_fn_with_state(state, require_auth))
}

/// Map an infrastructure error to the wire error envelope.
pub(crate) fn domain_err(err: ia_domain::Error) -> ApiErrorResponse {
    let code = match &err {
        ia_domain::Error::RoomNotFound(_) => ErrorCode::RoomNotFound,
        ia_domain::Error::CapacityExceeded(_) => ErrorCode::CapacityExceeded,
        ia_domain::Error::Auth(_) => ErrorCode::Unauthenticated,
        ia_domain::Error::Io(_) | ia_domain::Error::Json(_) | ia_domain::Error::Config(_) | ia_domain::Error::Other(_) => {
            ErrorCode::PersistenceFailed
        }
    };
    ApiErrorResponse(ApiError::new(code, err.to_string()))
}

/// There's no dedicated wire code for lock contention on a single room; it
/// is treated as an infrastructure hiccup rather than a client mistake.
pub(crate) fn busy_err(_: ia_engine::RoomBusy) -> ApiErrorResponse {
    ApiErrorResponse(ApiError::new(ErrorCode::PersistenceFailed, "room is busy, try again"))
}

/// Identity is resolved upstream of this crate's auth (the bearer token
/// gates the API as a whole; it does not carry a user identity). Callers
/// supply the acting user explicitly via this header.
pub(crate) fn require_user_id(headers: &HeaderMap) -> Result<String, ApiErrorResponse> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiErrorResponse(ApiError::new(ErrorCode::Unauthenticated, "missing X-User-Id header")))
}

/// Bearer-token auth applied to every route except `/health`.
async fn require_auth(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    if request.uri().path() == "/health" {
        return next.run(request).await;
    }
    let Some(expected) = &state.api_token_hash else {
        return next.run(request).await;
    };

    let header = headers.get(axum::http::header::AUTHORIZATION).and_then(|v| v.to_str().ok());
    match extract_bearer(header) {
        Some(token) if token_eq(token, expected) => next.run(request).await,
        _ => ApiErrorResponse(ApiError::new(ErrorCode::Unauthenticated, "missing or invalid bearer token")).into_response(),
    }
}
