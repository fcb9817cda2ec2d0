use async_trait::async_trait;

use crate::models::UserId;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing credential")]
    Missing,
    #[error("Credential expired")]
    Expired,
    #[error("Invalid credential: {0}")]
    Invalid(String),
}

#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    /// Verify a bearer credential and extract the user it was issued to
    async fn validate_credential(&self, token: &str) -> Result<UserId, AuthError>;
}
