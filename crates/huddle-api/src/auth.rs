use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::{SecondsFormat, Utc};
use tracing::{error, info, warn};

use huddle_db::models::UserUpdate;
use huddle_db::{Database, StoreError};
use huddle_gateway::ConnectionRegistry;
use huddle_types::api::{
    AdminLoginRequest, AuthConfigResponse, AuthResponse, LoginRequest, ProviderLoginRequest,
    SessionUser, SignupRequest,
};
use huddle_types::models::{UserRecord, UserStatus};

use crate::error::ApiError;
use crate::identity::IdentityStore;
use crate::moderation;
use crate::provider::IdentityProvider;
use crate::session::SessionAuthority;

pub const ADMIN_DISPLAY_NAME: &str = "Administrator";
pub const ADMIN_EMAIL: &str = "admin@huddle.local";
const GOOGLE_PROVIDER: &str = "google";

/// Upper bound on `base`, `base1`, `base2`, ... probes for a free username.
const MAX_USERNAME_PROBES: u32 = 1000;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub identities: IdentityStore,
    pub sessions: SessionAuthority,
    pub registry: ConnectionRegistry,
    pub provider: Arc<dyn IdentityProvider>,
    pub admin: AdminCredentials,
}

impl AppStateInner {
    pub fn new(
        db: Database,
        sessions: SessionAuthority,
        provider: Arc<dyn IdentityProvider>,
        admin: AdminCredentials,
    ) -> AppState {
        let db = Arc::new(db);
        Arc::new(Self {
            identities: IdentityStore::new(db.clone()),
            db,
            sessions,
            registry: ConnectionRegistry::new(),
            provider,
            admin,
        })
    }
}

/// The fixed, out-of-band administrator credential pair.
/// Admin login is refused outright while no password is configured.
#[derive(Clone)]
pub struct AdminCredentials {
    pub username: String,
    pub password: Option<String>,
}

impl AdminCredentials {
    /// The admin username can never belong to a stored user, in any letter case.
    pub fn is_reserved(&self, username: &str) -> bool {
        username.eq_ignore_ascii_case(&self.username)
    }
}

pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub async fn root() -> impl IntoResponse {
    Json(serde_json::json!({
        "message": "Huddle chat API",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn auth_config(State(state): State<AppState>) -> Json<AuthConfigResponse> {
    Json(AuthConfigResponse {
        google_client_id: state.provider.client_id().map(str::to_string),
    })
}

/// External-provider login. Creates the user on first sight.
pub async fn provider_login(
    State(state): State<AppState>,
    Json(req): Json<ProviderLoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let identity = state.provider.verify(&req.credential).await?;

    let (username, record) = match state.identities.get_by_email(&identity.email).await {
        Some((username, record)) => {
            moderation::enforce_login_eligibility(record.status)?;
            state.identities.update_in_background(
                &username,
                UserUpdate {
                    last_login: Some(now_rfc3339()),
                    auth_provider: Some(GOOGLE_PROVIDER.to_string()),
                    ..Default::default()
                },
            );
            (username, record)
        }
        None => {
            let name = identity
                .name
                .unwrap_or_else(|| email_local_part(&identity.email).to_string());
            create_provider_user(&state, &identity.email, name).await?
        }
    };

    let token = state.sessions.issue(&username, false)?;
    info!("{} logged in via {}", username, GOOGLE_PROVIDER);

    Ok(Json(AuthResponse::bearer(
        token,
        SessionUser {
            username,
            name: record.name,
            email: record.email,
            is_admin: false,
        },
    )))
}

/// Allocate a username for a new provider user by conditional insert,
/// probing `base`, `base1`, `base2`, ... only when the store reports the
/// candidate as taken.
async fn create_provider_user(
    state: &AppStateInner,
    email: &str,
    name: String,
) -> Result<(String, UserRecord), ApiError> {
    let base = email_local_part(email);
    let base = if base.is_empty() { "user" } else { base };
    let now = now_rfc3339();
    let record = UserRecord {
        name,
        email: email.to_string(),
        password: String::new(),
        auth_provider: Some(GOOGLE_PROVIDER.to_string()),
        status: UserStatus::Active,
        created_at: now.clone(),
        last_login: now,
    };

    for attempt in 0..MAX_USERNAME_PROBES {
        let candidate = if attempt == 0 {
            base.to_string()
        } else {
            format!("{base}{attempt}")
        };
        if state.admin.is_reserved(&candidate) {
            continue;
        }

        match state.identities.create(&candidate, &record).await {
            Ok(()) => {
                info!("Created user {} for {}", candidate, email);
                return Ok((candidate, record));
            }
            Err(StoreError::UsernameTaken) => continue,
            Err(StoreError::EmailTaken) => {
                // A concurrent first login for the same email won the race.
                let (username, existing) = state
                    .identities
                    .get_by_email(email)
                    .await
                    .ok_or_else(|| ApiError::Unavailable("Database unavailable".into()))?;
                moderation::enforce_login_eligibility(existing.status)?;
                return Ok((username, existing));
            }
            Err(e) => return Err(e.into()),
        }
    }

    warn!("No free username for base '{}' after {} probes", base, MAX_USERNAME_PROBES);
    Err(ApiError::Conflict("Could not allocate a username".into()))
}

pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_signup(&req)?;
    if state.admin.is_reserved(&req.username) {
        return Err(ApiError::BadRequest("Username is reserved".into()));
    }

    if state.identities.get_by_username(&req.username).await.is_some() {
        return Err(ApiError::Conflict("Username already exists".into()));
    }
    if state.identities.get_by_email(&req.email).await.is_some() {
        return Err(ApiError::Conflict("Email already exists".into()));
    }

    let password_hash = hash_password(req.password).await?;
    let now = now_rfc3339();
    let record = UserRecord {
        name: req.name,
        email: req.email,
        password: password_hash,
        auth_provider: None,
        status: UserStatus::Active,
        created_at: now.clone(),
        last_login: now,
    };

    // The pre-checks above are advisory; this insert is the real uniqueness gate.
    state.identities.create(&req.username, &record).await?;

    let token = state.sessions.issue(&req.username, false)?;
    info!("{} signed up", req.username);

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse::bearer(
            token,
            SessionUser {
                username: req.username,
                name: record.name,
                email: record.email,
                is_admin: false,
            },
        )),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let (username, record) = state
        .identities
        .get_by_email(&req.email)
        .await
        .ok_or(ApiError::Unauthenticated)?;

    if !verify_password(req.password, record.password.clone()).await? {
        return Err(ApiError::Unauthenticated);
    }

    moderation::enforce_login_eligibility(record.status)?;

    state.identities.update_in_background(
        &username,
        UserUpdate {
            last_login: Some(now_rfc3339()),
            ..Default::default()
        },
    );

    let token = state.sessions.issue(&username, false)?;
    info!("{} logged in", username);

    Ok(Json(AuthResponse::bearer(
        token,
        SessionUser {
            username,
            name: record.name,
            email: record.email,
            is_admin: false,
        },
    )))
}

pub async fn admin_login(
    State(state): State<AppState>,
    Json(req): Json<AdminLoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let Some(expected_password) = state.admin.password.as_deref() else {
        warn!("Admin login attempted but no admin password is configured");
        return Err(ApiError::Unauthenticated);
    };

    if req.username != state.admin.username || req.password != expected_password {
        warn!("Rejected admin login for '{}'", req.username);
        return Err(ApiError::Unauthenticated);
    }

    let token = state.sessions.issue(&req.username, true)?;
    info!("Administrator {} logged in", req.username);

    Ok(Json(AuthResponse::bearer(
        token,
        SessionUser {
            username: req.username,
            name: ADMIN_DISPLAY_NAME.to_string(),
            email: ADMIN_EMAIL.to_string(),
            is_admin: true,
        },
    )))
}

fn email_local_part(email: &str) -> &str {
    email.split('@').next().unwrap_or_default()
}

fn validate_signup(req: &SignupRequest) -> Result<(), ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::BadRequest("Name must not be empty".into()));
    }
    match req.email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {}
        _ => return Err(ApiError::BadRequest("Invalid email address".into())),
    }
    let len = req.username.chars().count();
    if !(3..=32).contains(&len)
        || !req
            .username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return Err(ApiError::BadRequest(
            "Username must be 3-32 characters of letters, digits, '_', '.' or '-'".into(),
        ));
    }
    if req.password.len() < 8 {
        return Err(ApiError::BadRequest(
            "Password must be at least 8 characters".into(),
        ));
    }
    Ok(())
}

// Argon2 work runs on the blocking pool.

async fn hash_password(password: String) -> Result<String, ApiError> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| ApiError::Internal(format!("password hashing failed: {e}")))
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::Internal("password hashing failed".into())
    })?
}

/// `false` for a wrong password, and for provider-only users with no digest.
async fn verify_password(password: String, stored: String) -> Result<bool, ApiError> {
    if stored.is_empty() {
        return Ok(false);
    }

    tokio::task::spawn_blocking(move || {
        let Ok(parsed) = PasswordHash::new(&stored) else {
            warn!("Stored password digest is not a valid PHC string");
            return false;
        };
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::Internal("password verification failed".into())
    })
}
