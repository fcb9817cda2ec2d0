use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, errors::ErrorKind as JwtErrorKind, DecodingKey, Validation};
use marquee_core::identity::{AuthError, CredentialVerifier};
use marquee_core::UserId;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AppState;

// ============================================================================
// JWT Claims
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub user_id: UserId,
    pub exp: usize,
}

/// The caller, as established by the credential verifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser(pub UserId);

/// HS256 bearer tokens signed with a shared secret.
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::default(),
        }
    }
}

#[async_trait]
impl CredentialVerifier for JwtVerifier {
    async fn validate_credential(&self, token: &str) -> Result<UserId, AuthError> {
        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| match e.kind() {
            JwtErrorKind::ExpiredSignature => AuthError::Expired,
            _ => AuthError::Invalid(e.to_string()),
        })?;
        Ok(data.claims.user_id)
    }
}

// ============================================================================
// Authentication Middleware
// ============================================================================

pub async fn require_user(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(AuthError::Missing)?;

    let user_id = state.verifier.validate_credential(token).await?;

    req.extensions_mut().insert(AuthenticatedUser(user_id));

    Ok(next.run(req).await)
}
