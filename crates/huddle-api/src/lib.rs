pub mod admin;
pub mod auth;
pub mod error;
pub mod identity;
pub mod messages;
pub mod middleware;
pub mod moderation;
pub mod provider;
pub mod session;
mod store;


use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    middleware::{from_fn, from_fn_with_state},
    response::IntoResponse,
    routing::{delete, get, post, put},
};

use huddle_gateway::connection;

use crate::auth::AppState;
use crate::middleware::{require_admin, require_auth};

/// All HTTP and live-channel routes, without transport layers (CORS, tracing).
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/", get(auth::root))
        .route("/api/auth/config", get(auth::auth_config))
        .route("/api/auth/google", post(auth::provider_login))
        .route("/api/auth/signup", post(auth::signup))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/admin-login", post(auth::admin_login));

    let protected_routes = Router::new()
        .route(
            "/api/messages",
            get(messages::get_messages).post(messages::send_message),
        )
        .layer(from_fn_with_state(state.clone(), require_auth));

    let admin_routes = Router::new()
        .route("/api/admin/users", get(admin::list_users))
        .route(
            "/api/admin/users/{username}",
            put(admin::update_user_status).delete(admin::delete_user),
        )
        .route(
            "/api/admin/settings",
            get(admin::get_settings).put(admin::update_settings),
        )
        .route("/api/admin/messages", delete(admin::clear_messages))
        .route("/api/stats", get(admin::stats))
        .layer(from_fn(require_admin))
        .layer(from_fn_with_state(state.clone(), require_auth));

    let live_routes = Router::new().route("/ws/chat", get(ws_upgrade));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(admin_routes)
        .merge(live_routes)
        .with_state(state)
}

async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    let registry = state.registry.clone();
    ws.on_upgrade(move |socket| connection::handle_connection(socket, registry))
}
