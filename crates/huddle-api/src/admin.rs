use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use tracing::{info, warn};

use huddle_db::models::UserUpdate;
use huddle_types::api::{
    ClearMessagesResponse, StatsResponse, UpdateSettingsRequest, UpdateSettingsResponse,
    UpdateUserRequest, UpdateUserResponse, UsersResponse,
};
use huddle_types::models::Settings;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::messages;
use crate::store::blocking;

pub async fn list_users(State(state): State<AppState>) -> Json<UsersResponse> {
    Json(UsersResponse {
        users: state.identities.list().await,
    })
}

pub async fn update_user_status(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<UpdateUserResponse>, ApiError> {
    state
        .identities
        .update(
            &username,
            UserUpdate {
                status: Some(req.status),
                ..Default::default()
            },
        )
        .await?;
    info!("User {} status set to {}", username, req.status);

    let user = state
        .identities
        .get_by_username(&username)
        .await
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    Ok(Json(UpdateUserResponse {
        success: true,
        user,
    }))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.identities.delete(&username).await?;
    info!("User {} deleted", username);

    Ok(Json(serde_json::json!({ "success": true })))
}

/// Falls back to defaults when the store cannot be read.
pub async fn get_settings(State(state): State<AppState>) -> Json<Settings> {
    let settings = blocking(&state.db, |db| db.get_or_init_settings())
        .await
        .unwrap_or_else(|e| {
            warn!("Reading settings failed: {}", e);
            Settings::default()
        });
    Json(settings)
}

pub async fn update_settings(
    State(state): State<AppState>,
    Json(req): Json<UpdateSettingsRequest>,
) -> Result<Json<UpdateSettingsResponse>, ApiError> {
    if req.auto_refresh_interval == 0 {
        return Err(ApiError::BadRequest(
            "auto_refresh_interval must be a positive number of seconds".into(),
        ));
    }

    let settings = Settings {
        auto_refresh_interval: req.auto_refresh_interval,
    };
    blocking(&state.db, move |db| db.put_settings(&settings)).await?;
    info!("Auto-refresh interval set to {}s", settings.auto_refresh_interval);

    Ok(Json(UpdateSettingsResponse {
        success: true,
        settings,
    }))
}

pub async fn clear_messages(
    State(state): State<AppState>,
) -> Result<Json<ClearMessagesResponse>, ApiError> {
    let deleted = messages::clear(&state).await?;
    Ok(Json(ClearMessagesResponse {
        success: true,
        deleted,
    }))
}

/// Aggregate counts. Store counts read as zero when the store fails.
pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let counts = blocking(&state.db, |db| Ok((db.count_users()?, db.count_messages()?))).await;
    let (total_users, total_messages) = counts.unwrap_or_else(|e| {
        warn!("Reading stats failed: {}", e);
        (0, 0)
    });

    Json(StatsResponse {
        total_users,
        total_messages,
        active_connections: state.registry.len().await,
    })
}
