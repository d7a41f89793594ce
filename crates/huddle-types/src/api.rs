use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::{ChatMessage, Settings, UserRecord, UserStatus};

// -- Session token claims --

/// Claims carried by a session token. Shared by the REST middleware and
/// anything else that needs to read a verified identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub is_admin: bool,
    pub iat: usize,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderLoginRequest {
    pub credential: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdminLoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionUser {
    pub username: String,
    pub name: String,
    pub email: String,
    pub is_admin: bool,
}

/// Returned by every successful login path.
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub token_type: String,
    pub user: SessionUser,
}

impl AuthResponse {
    pub fn bearer(access_token: String, user: SessionUser) -> Self {
        Self {
            access_token,
            token_type: "bearer".to_string(),
            user,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfigResponse {
    pub google_client_id: Option<String>,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SendMessageResponse {
    pub success: bool,
    pub message: ChatMessage,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub messages: Vec<ChatMessage>,
}

// -- Admin --

#[derive(Debug, Serialize, Deserialize)]
pub struct UsersResponse {
    pub users: BTreeMap<String, UserRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateUserRequest {
    pub status: UserStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateUserResponse {
    pub success: bool,
    pub user: UserRecord,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateSettingsRequest {
    pub auto_refresh_interval: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateSettingsResponse {
    pub success: bool,
    pub settings: Settings,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClearMessagesResponse {
    pub success: bool,
    pub deleted: usize,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct StatsResponse {
    pub total_users: u64,
    pub total_messages: u64,
    pub active_connections: usize,
}
