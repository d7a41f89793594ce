use std::time::Duration;

use chrono::{TimeDelta, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};

use huddle_types::api::Claims;

use crate::error::ApiError;

/// Default session lifetime.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(30 * 60);

/// Issues and verifies self-contained HS256 session tokens.
///
/// Stateless: nothing about issued tokens is stored, so a token stays valid
/// until it expires regardless of later account changes.
pub struct SessionAuthority {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: TimeDelta,
}

impl SessionAuthority {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl: TimeDelta::from_std(ttl).unwrap_or(TimeDelta::minutes(30)),
        }
    }

    /// Issue a token with the configured lifetime.
    pub fn issue(&self, subject: &str, is_admin: bool) -> Result<String, ApiError> {
        self.issue_for(subject, is_admin, self.ttl)
    }

    /// Issue a token expiring `ttl` from now.
    pub fn issue_for(&self, subject: &str, is_admin: bool, ttl: TimeDelta) -> Result<String, ApiError> {
        let now = Utc::now();
        let expires = now
            .checked_add_signed(ttl)
            .ok_or_else(|| ApiError::Internal("token lifetime out of range".into()))?;
        let claims = Claims {
            sub: subject.to_string(),
            is_admin,
            iat: now.timestamp().max(0) as usize,
            exp: expires.timestamp().max(0) as usize,
        };

        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    /// Check signature, shape and expiry. Every failure is `Unauthenticated`.
    pub fn verify(&self, token: &str) -> Result<Claims, ApiError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|_| ApiError::Unauthenticated)
    }
}
