use axum::{
    extract::{Path, Query, State, WebSocketUpgrade},
    http::{header, HeaderMap, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::{error::ApiError, state::AppState, ws_connection::ChannelConnection};
use domain::{Message, MessageDraft, UserId};

#[derive(Debug, Deserialize)]
struct WsQuery {
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SendMessagePayload {
    recipient_id: Uuid,
    content: Option<String>,
    attachment_ref: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/chat", chat_routes())
        .route("/ws", get(websocket_upgrade))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn chat_routes() -> Router<AppState> {
    Router::new()
        .route("/messages", post(send_message))
        .route("/messages/{user_id}", get(get_conversation))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

/// 从 Authorization 头解析身份。
async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<UserId, ApiError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::unauthorized("missing bearer token"))?;

    state
        .sessions
        .resolve(token)
        .await
        .ok_or_else(|| ApiError::unauthorized("invalid session token"))
}

/// REST 发送私信；与 WebSocket 路径共用同一个中继，
/// 持久化并推送到收件人房间。
async fn send_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<SendMessagePayload>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let sender_id = authenticate(&state, &headers).await?;
    let draft = MessageDraft {
        content: payload.content,
        attachment_ref: payload.attachment_ref,
    };
    let message = state
        .relay
        .relay(sender_id, UserId::from(payload.recipient_id), draft)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// 拉取与指定用户的会话历史，按时间升序。
/// 离线期间收到的消息靠这里补齐。
async fn get_conversation(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<Vec<Message>>, ApiError> {
    let me = authenticate(&state, &headers).await?;
    let other = UserId::from(user_id);

    if !state.directory.user_exists(other).await? {
        return Err(ApiError::not_found("user not found"));
    }

    let messages = state.store.find_conversation(me, other).await?;
    Ok(Json(messages))
}

/// WebSocket 升级。令牌有效则绑定身份；缺失或无效时连接保持
/// 未绑定，可以收广播但不能加入房间或发送。
async fn websocket_upgrade(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let identity = match query.token.as_deref() {
        Some(token) => state.sessions.resolve(token).await,
        None => None,
    };

    ws.on_upgrade(move |socket| ChannelConnection::new(socket, state, identity).run())
}
