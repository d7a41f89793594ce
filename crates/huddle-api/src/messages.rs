use axum::{
    Extension, Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{Local, SecondsFormat, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use huddle_db::models::MessageRow;
use huddle_types::api::{Claims, HistoryResponse, SendMessageRequest, SendMessageResponse};
use huddle_types::events::GatewayEvent;
use huddle_types::models::{ChatMessage, UserRecord};

use crate::auth::{ADMIN_DISPLAY_NAME, AppState, AppStateInner};
use crate::error::ApiError;
use crate::moderation;
use crate::store::blocking;

pub const DEFAULT_HISTORY_LIMIT: u32 = 50;
const MAX_HISTORY_LIMIT: u32 = 200;

/// Most messages a single clear call removes.
pub const CLEAR_BATCH_LIMIT: u32 = 500;

const USER_ROLE: &str = "user";

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    DEFAULT_HISTORY_LIMIT
}

/// Submit a message on behalf of an already-verified identity.
///
/// Persistence happens before broadcast, so anyone who sees the
/// `new_message` event can already find it in history. A failed persist is
/// surfaced as `Unavailable`; broadcast never fails the call.
pub async fn submit(
    state: &AppStateInner,
    claims: &Claims,
    content: String,
) -> Result<ChatMessage, ApiError> {
    // Admin tokens never resolve to a stored record.
    let record = if claims.is_admin {
        None
    } else {
        state.identities.get_by_username(&claims.sub).await
    };

    if !moderation::can_submit(claims.is_admin, record.as_ref()) {
        return Err(ApiError::Forbidden(
            "You are banned from sending messages".into(),
        ));
    }

    let message = ChatMessage {
        message_id: Uuid::new_v4().to_string(),
        user_id: claims.sub.clone(),
        user_name: display_name(claims, record.as_ref()),
        role: USER_ROLE.to_string(),
        content,
        timestamp: Local::now().format("%H:%M:%S").to_string(),
        created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    };

    let row = message.clone();
    blocking(&state.db, move |db| db.insert_message(&row)).await?;

    let delivered = state
        .registry
        .broadcast(GatewayEvent::NewMessage {
            message: message.clone(),
        })
        .await;
    debug!(
        "Message {} from {} delivered to {} live channels",
        message.message_id, message.user_id, delivered
    );

    Ok(message)
}

fn display_name(claims: &Claims, record: Option<&UserRecord>) -> String {
    if claims.is_admin {
        return ADMIN_DISPLAY_NAME.to_string();
    }
    match record {
        Some(record) => record.name.clone(),
        None => "Anonymous".to_string(),
    }
}

/// The newest `limit` messages, oldest first. Empty when the store fails.
pub async fn history(state: &AppStateInner, limit: u32) -> Vec<ChatMessage> {
    let limit = limit.min(MAX_HISTORY_LIMIT);
    match blocking(&state.db, move |db| db.recent_messages(limit)).await {
        Ok(rows) => rows.into_iter().map(MessageRow::into_message).collect(),
        Err(e) => {
            warn!("Fetching message history failed: {}", e);
            Vec::new()
        }
    }
}

/// Delete up to [`CLEAR_BATCH_LIMIT`] messages and tell live channels to
/// reset. Larger histories need repeated calls.
pub async fn clear(state: &AppStateInner) -> Result<usize, ApiError> {
    let deleted = blocking(&state.db, |db| db.delete_messages(CLEAR_BATCH_LIMIT)).await?;

    state.registry.broadcast(GatewayEvent::MessagesCleared).await;
    info!("Cleared {} messages", deleted);

    Ok(deleted)
}

pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = submit(&state, &claims, req.content).await?;

    Ok((
        StatusCode::CREATED,
        Json(SendMessageResponse {
            success: true,
            message,
        }),
    ))
}

pub async fn get_messages(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
    Extension(_claims): Extension<Claims>,
) -> Json<HistoryResponse> {
    Json(HistoryResponse {
        messages: history(&state, query.limit).await,
    })
}
