//! Authentication and authorization.
//!
//! Token issuance lives in an external identity service; this module only
//! validates bearer credentials (JWT, HS256) and attaches the verified
//! identity to requests and socket connections. `generate_token` mirrors the
//! identity provider's claim layout and exists for the test suites.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Claim structure for JWT tokens.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub name: String,
    pub role: Role,
    pub active: bool,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
}

/// The two user classes the storefront recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Admin => "admin",
        }
    }
}

/// Verified identity extracted from a validated token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    pub name: String,
    pub role: Role,
    pub active: bool,
    pub token_id: String,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Authentication configuration.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub issuer: String,
    pub audience: String,
    pub expiration_secs: u64,
}

impl AuthConfig {
    pub fn new(jwt_secret: String, expiration_secs: u64) -> Self {
        Self {
            jwt_secret,
            issuer: "boutique-auth".to_string(),
            audience: "boutique-api".to_string(),
            expiration_secs,
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing authentication credentials")]
    MissingAuth,
    #[error("Invalid token: {0}")]
    InvalidToken(String),
    #[error("Token has expired")]
    ExpiredToken,
    #[error("User account is inactive")]
    InactiveUser,
    #[error("Insufficient permissions")]
    InsufficientPermissions,
    #[error("Token creation failed: {0}")]
    TokenCreation(String),
}

impl AuthError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::MissingAuth => (StatusCode::UNAUTHORIZED, "AUTH_MISSING"),
            Self::InvalidToken(_) => (StatusCode::UNAUTHORIZED, "AUTH_INVALID_TOKEN"),
            Self::ExpiredToken => (StatusCode::UNAUTHORIZED, "AUTH_EXPIRED_TOKEN"),
            Self::InactiveUser => (StatusCode::UNAUTHORIZED, "AUTH_INACTIVE_USER"),
            Self::InsufficientPermissions => (StatusCode::FORBIDDEN, "AUTH_FORBIDDEN"),
            Self::TokenCreation(_) => (StatusCode::INTERNAL_SERVER_ERROR, "AUTH_INTERNAL"),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let body = Json(serde_json::json!({
            "error": {
                "code": code,
                "message": self.to_string(),
            }
        }));
        (status, body).into_response()
    }
}

/// Validates bearer tokens.
#[derive(Debug, Clone)]
pub struct AuthService {
    config: AuthConfig,
}

impl AuthService {
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    /// Issue a signed token. Production deployments receive tokens from the
    /// identity provider; this mirrors its claim layout.
    pub fn generate_token(
        &self,
        user_id: Uuid,
        name: &str,
        role: Role,
        active: bool,
    ) -> Result<String, AuthError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            name: name.to_string(),
            role,
            active,
            jti: Uuid::new_v4().to_string(),
            iat: now,
            exp: now + self.config.expiration_secs as i64,
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| AuthError::TokenCreation(e.to_string()))
    }

    /// Validate a bearer token and return the verified identity.
    pub fn validate_token(&self, token: &str) -> Result<AuthUser, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_audience(&[&self.config.audience]);

        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &validation,
        )
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
            _ => AuthError::InvalidToken(e.to_string()),
        })?;

        let claims = data.claims;
        if !claims.active {
            return Err(AuthError::InactiveUser);
        }

        let id = Uuid::parse_str(&claims.sub)
            .map_err(|_| AuthError::InvalidToken("subject is not a valid id".to_string()))?;

        Ok(AuthUser {
            id,
            name: claims.name,
            role: claims.role,
            active: claims.active,
            token_id: claims.jti,
        })
    }
}

/// Extract and validate the bearer token, attaching the identity to the
/// request for downstream extractors.
pub async fn auth_middleware(
    Extension(auth_service): Extension<Arc<AuthService>>,
    mut request: Request,
    next: Next,
) -> Response {
    match bearer_from_headers(request.headers()).and_then(|t| auth_service.validate_token(&t)) {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

/// Reject requests whose verified identity lacks the required role.
pub async fn role_middleware(
    State(required_role): State<String>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let user = request
        .extensions()
        .get::<AuthUser>()
        .cloned()
        .ok_or(AuthError::MissingAuth)?;

    if user.role.as_str() != required_role {
        return Err(AuthError::InsufficientPermissions);
    }

    Ok(next.run(request).await)
}

fn bearer_from_headers(headers: &HeaderMap) -> Result<String, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingAuth)?
        .to_str()
        .map_err(|_| AuthError::MissingAuth)?;

    value
        .strip_prefix("Bearer ")
        .map(|t| t.trim().to_string())
        .ok_or(AuthError::MissingAuth)
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or(AuthError::MissingAuth)
    }
}

/// Extension methods for Router to add auth middleware.
pub trait AuthRouterExt {
    fn with_auth(self) -> Self;
    fn with_role(self, role: &str) -> Self;
}

impl<S> AuthRouterExt for axum::Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_auth(self) -> Self {
        self.layer(axum::middleware::from_fn(auth_middleware))
    }

    fn with_role(self, role: &str) -> Self {
        self.layer(axum::middleware::from_fn_with_state(
            role.to_string(),
            role_middleware,
        ))
        .with_auth()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn service() -> AuthService {
        AuthService::new(AuthConfig::new("test_secret_key_0123456789abcdef".into(), 3600))
    }

    #[test]
    fn round_trip_preserves_identity() {
        let svc = service();
        let id = Uuid::new_v4();
        let token = svc.generate_token(id, "Ana", Role::Customer, true).unwrap();
        let user = svc.validate_token(&token).unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.name, "Ana");
        assert_eq!(user.role, Role::Customer);
        assert!(!user.is_admin());
    }

    #[test]
    fn inactive_users_are_rejected() {
        let svc = service();
        let token = svc
            .generate_token(Uuid::new_v4(), "Ghost", Role::Customer, false)
            .unwrap();
        assert_matches!(svc.validate_token(&token), Err(AuthError::InactiveUser));
    }

    #[test]
    fn garbage_tokens_are_rejected() {
        let svc = service();
        assert_matches!(
            svc.validate_token("not-a-token"),
            Err(AuthError::InvalidToken(_))
        );
    }

    #[test]
    fn tokens_signed_with_another_secret_are_rejected() {
        let svc = service();
        let other = AuthService::new(AuthConfig::new(
            "another_secret_key_0123456789abcdef".into(),
            3600,
        ));
        let token = other
            .generate_token(Uuid::new_v4(), "Eve", Role::Admin, true)
            .unwrap();
        assert_matches!(svc.validate_token(&token), Err(AuthError::InvalidToken(_)));
    }
}
