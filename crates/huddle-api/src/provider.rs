use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

const GOOGLE_TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";

/// What an external identity provider vouches for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderIdentity {
    pub email: String,
    pub name: Option<String>,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Google Client ID not configured")]
    NotConfigured,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("provider unreachable: {0}")]
    Unreachable(String),
}

/// Verifies credentials issued by an external identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Public client id handed to browsers, if external login is enabled.
    fn client_id(&self) -> Option<&str>;

    async fn verify(&self, credential: &str) -> Result<ProviderIdentity, ProviderError>;
}

/// Google ID tokens, checked through Google's `tokeninfo` endpoint.
pub struct GoogleProvider {
    http: reqwest::Client,
    client_id: Option<String>,
}

impl GoogleProvider {
    pub fn new(client_id: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            client_id: client_id.filter(|id| !id.is_empty()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenInfo {
    aud: String,
    email: Option<String>,
    /// Google sends this as the string "true"; accept a JSON bool too.
    #[serde(default)]
    email_verified: serde_json::Value,
    name: Option<String>,
}

impl TokenInfo {
    fn into_identity(self, client_id: &str) -> Result<ProviderIdentity, ProviderError> {
        if self.aud != client_id {
            return Err(ProviderError::InvalidToken("audience mismatch".into()));
        }

        let verified = match &self.email_verified {
            serde_json::Value::Bool(b) => *b,
            serde_json::Value::String(s) => s == "true",
            _ => false,
        };
        if !verified {
            return Err(ProviderError::InvalidToken("email not verified".into()));
        }

        let email = self
            .email
            .filter(|e| !e.is_empty())
            .ok_or_else(|| ProviderError::InvalidToken("no email claim".into()))?;

        Ok(ProviderIdentity {
            email,
            name: self.name.filter(|n| !n.is_empty()),
        })
    }
}

#[async_trait]
impl IdentityProvider for GoogleProvider {
    fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    async fn verify(&self, credential: &str) -> Result<ProviderIdentity, ProviderError> {
        let client_id = self.client_id.as_deref().ok_or(ProviderError::NotConfigured)?;

        let response = self
            .http
            .get(GOOGLE_TOKENINFO_URL)
            .query(&[("id_token", credential)])
            .send()
            .await
            .map_err(|e| ProviderError::Unreachable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ProviderError::InvalidToken(format!(
                "tokeninfo returned {}",
                response.status()
            )));
        }

        let info: TokenInfo = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidToken(e.to_string()))?;

        info.into_identity(client_id)
    }
}
