mod config;

use std::sync::Arc;

use axum::http::HeaderValue;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use huddle_api::auth::{AdminCredentials, AppStateInner};
use huddle_api::provider::GoogleProvider;
use huddle_api::session::SessionAuthority;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "huddle=debug,huddle_api=debug,huddle_gateway=debug,tower_http=debug".into()
            }),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = huddle_db::Database::open(&config.db_path)?;
    info!("Database ready at {}", config.db_path.display());

    let provider = GoogleProvider::new(config.google_client_id.clone());
    if config.google_client_id.is_none() {
        info!("GOOGLE_CLIENT_ID unset; external login is disabled");
    }

    let state = AppStateInner::new(
        db,
        SessionAuthority::new(&config.jwt_secret, config.token_ttl),
        Arc::new(provider),
        AdminCredentials {
            username: config.admin_username.clone(),
            password: config.admin_password.clone(),
        },
    );

    let app = huddle_api::router(state)
        .layer(cors_layer(config.cors_origins.as_deref()))
        .layer(TraceLayer::new_for_http());

    info!("Huddle server listening on {}", config.addr);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn cors_layer(origins: Option<&[String]>) -> CorsLayer {
    let Some(origins) = origins else {
        return CorsLayer::permissive();
    };

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(Any)
        .allow_headers(Any)
}
