use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};
use tracing::warn;

const PLACEHOLDER_SECRET: &str = "dev-secret-change-me";

/// Longest accepted session lifetime: 30 days.
const MAX_TOKEN_TTL_MINUTES: u64 = 30 * 24 * 60;

/// Process configuration, read once from the environment at startup.
pub struct Config {
    pub addr: SocketAddr,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub token_ttl: Duration,
    pub admin_username: String,
    pub admin_password: Option<String>,
    pub google_client_id: Option<String>,
    /// `None` means any origin is allowed.
    pub cors_origins: Option<Vec<String>>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let host = var_or("HUDDLE_HOST", "0.0.0.0");
        let port: u16 = var_or("HUDDLE_PORT", "8001")
            .parse()
            .context("HUDDLE_PORT must be a port number")?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .context("HUDDLE_HOST must be an IP address")?;

        let jwt_secret = var_or("HUDDLE_JWT_SECRET", PLACEHOLDER_SECRET);
        if jwt_secret == PLACEHOLDER_SECRET || jwt_secret.is_empty() {
            warn!("HUDDLE_JWT_SECRET is unset or a placeholder; tokens are forgeable");
        }

        let token_ttl = parse_token_ttl(&var_or("HUDDLE_TOKEN_TTL_MINUTES", "30"))?;

        let admin_password = non_empty_var("HUDDLE_ADMIN_PASSWORD");
        if admin_password.is_none() {
            warn!("HUDDLE_ADMIN_PASSWORD is unset; admin login is disabled");
        }

        let cors_origins = non_empty_var("HUDDLE_CORS_ORIGINS").map(|list| {
            list.split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(str::to_string)
                .collect()
        });

        Ok(Self {
            addr,
            db_path: PathBuf::from(var_or("HUDDLE_DB_PATH", "huddle.db")),
            jwt_secret,
            token_ttl,
            admin_username: var_or("HUDDLE_ADMIN_USERNAME", "Admin"),
            admin_password,
            google_client_id: non_empty_var("GOOGLE_CLIENT_ID"),
            cors_origins,
        })
    }
}

fn parse_token_ttl(raw: &str) -> anyhow::Result<Duration> {
    let minutes: u64 = raw
        .trim()
        .parse()
        .context("HUDDLE_TOKEN_TTL_MINUTES must be a whole number of minutes")?;
    if !(1..=MAX_TOKEN_TTL_MINUTES).contains(&minutes) {
        bail!(
            "HUDDLE_TOKEN_TTL_MINUTES must be between 1 and {}, got {}",
            MAX_TOKEN_TTL_MINUTES,
            minutes
        );
    }
    let secs = minutes
        .checked_mul(60)
        .context("HUDDLE_TOKEN_TTL_MINUTES is out of range")?;
    Ok(Duration::from_secs(secs))
}

fn var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}
