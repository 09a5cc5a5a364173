//! Bearer-token authentication at the HTTP boundary.
//!
//! Users and sessions are managed elsewhere; this module only verifies the
//! HS256 JWTs they are issued and exposes the caller as an [`AuthUser`].

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::errors::{ErrorResponse, ServiceError};

pub const ADMIN_ROLE: &str = "admin";
pub const CUSTOMER_ROLE: &str = "customer";

/// JWT claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,        // Subject (user ID)
    pub roles: Vec<String>, // User's roles
    pub jti: String,        // JWT ID
    pub iat: i64,           // Issued at time
    pub exp: i64,           // Expiration time
    pub iss: String,        // Issuer
    pub aud: String,        // Audience
}

/// Authenticated caller extracted from the bearer token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub roles: Vec<String>,
    pub token_id: String,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(|r| r.eq_ignore_ascii_case(ADMIN_ROLE))
    }

    /// Owner-or-admin check for a resource belonging to `owner`
    pub fn can_access(&self, owner: Uuid) -> bool {
        self.user_id == owner || self.is_admin()
    }

    pub fn require_admin(&self) -> Result<(), ServiceError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(
                "Administrator privileges required".to_string(),
            ))
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing token")]
    MissingToken,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Token creation failed: {0}")]
    TokenCreation(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::MissingToken => (
                StatusCode::UNAUTHORIZED,
                "No authentication token provided".to_string(),
            ),
            Self::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                "Invalid authentication token".to_string(),
            ),
            Self::TokenExpired => (StatusCode::UNAUTHORIZED, "Token has expired".to_string()),
            Self::TokenCreation(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        let body = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message,
            details: None,
            request_id: crate::tracing::current_request_id().map(|rid| rid.to_string()),
            timestamp: Utc::now().to_rfc3339(),
        };
        (status, Json(body)).into_response()
    }
}

/// Issues and verifies access tokens
#[derive(Clone)]
pub struct AuthService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    audience: String,
    token_ttl: Duration,
}

impl std::fmt::Debug for AuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .finish_non_exhaustive()
    }
}

impl AuthService {
    pub fn new(config: &AppConfig) -> Self {
        let secret = config.jwt_secret.as_bytes();
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            issuer: config.auth_issuer.clone(),
            audience: config.auth_audience.clone(),
            token_ttl: Duration::seconds(config.jwt_expiration as i64),
        }
    }

    /// Issues an access token for `user_id` with the given roles
    pub fn issue_token(&self, user_id: Uuid, roles: &[&str]) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: (now + self.token_ttl).timestamp(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::TokenCreation(e.to_string()))
    }

    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_audience(&[self.audience.as_str()]);

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => {
                    debug!("Rejected token: {}", e);
                    AuthError::InvalidToken
                }
            })
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    Arc<AuthService>: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth_service = Arc::<AuthService>::from_ref(state);

        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::MissingToken)?;

        let claims = auth_service.validate_token(token)?;
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)?;

        Ok(AuthUser {
            user_id,
            roles: claims.roles,
            token_id: claims.jti,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn service(secret: &str) -> AuthService {
        AuthService::new(&AppConfig::new(
            "sqlite::memory:".into(),
            secret.into(),
            "127.0.0.1".into(),
            8080,
            "test".into(),
        ))
    }

    #[test]
    fn issued_tokens_round_trip_claims() {
        let auth = service("unit_test_secret_with_enough_entropy_0123456789");
        let user_id = Uuid::new_v4();
        let token = auth.issue_token(user_id, &[ADMIN_ROLE]).unwrap();

        let claims = auth.validate_token(&token).unwrap();
        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.roles, vec![ADMIN_ROLE.to_string()]);
    }

    #[test]
    fn tokens_signed_with_another_secret_are_rejected() {
        let issuer = service("unit_test_secret_with_enough_entropy_0123456789");
        let verifier = service("a_completely_different_secret_abcdefghijklmnop");
        let token = issuer.issue_token(Uuid::new_v4(), &[CUSTOMER_ROLE]).unwrap();

        assert_matches!(verifier.validate_token(&token), Err(AuthError::InvalidToken));
    }

    #[test]
    fn admin_can_access_any_owner() {
        let admin = AuthUser {
            user_id: Uuid::new_v4(),
            roles: vec!["admin".into()],
            token_id: "t".into(),
        };
        let customer = AuthUser {
            user_id: Uuid::new_v4(),
            roles: vec![CUSTOMER_ROLE.into()],
            token_id: "t".into(),
        };
        let other = Uuid::new_v4();

        assert!(admin.can_access(other));
        assert!(!customer.can_access(other));
        assert!(customer.can_access(customer.user_id));
        assert!(customer.require_admin().is_err());
    }
}
