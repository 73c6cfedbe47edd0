//! Bearer-token authentication extractors.
//!
//! Each service validates the JWT independently; there is no shared session
//! store. Internal service-to-service routes use a shared token header
//! instead of user credentials.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: Role,
    pub exp: usize,
}

/// The authenticated caller of a user-facing route.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: Role,
}

pub fn decode_token(secret: &str, token: &str) -> Result<AuthUser> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
            AppError::Auth("Not authorized, token expired.".to_string())
        }
        _ => AppError::Auth("Not authorized, token failed.".to_string()),
    })?;
    Ok(AuthUser { id: data.claims.sub, role: data.claims.role })
}

fn bearer_token(parts: &Parts) -> Result<&str> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Auth("Not authorized, no token.".to_string()))
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        decode_token(&state.config.jwt_secret, bearer_token(parts)?)
    }
}

/// Admin-only routes: wraps [`AuthUser`] and rejects non-admin roles.
#[derive(Debug, Clone, Copy)]
pub struct AdminUser(pub AuthUser);

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if user.role != Role::Admin {
            return Err(AppError::Forbidden("Admin access required.".to_string()));
        }
        Ok(AdminUser(user))
    }
}

/// Guard for service-to-service routes: requires the shared internal token.
#[derive(Debug, Clone, Copy)]
pub struct Internal;

#[async_trait]
impl FromRequestParts<AppState> for Internal {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let supplied = parts
            .headers
            .get("x-internal-token")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Auth("Not authorized, internal token required.".to_string()))?;
        if supplied != state.config.internal_api_token {
            return Err(AppError::Auth("Not authorized, internal token invalid.".to_string()));
        }
        Ok(Internal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token_for(role: Role, exp: usize) -> String {
        let claims = Claims { sub: Uuid::new_v4(), role, exp };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(b"test-secret")).unwrap()
    }

    // Far enough out that the exp check passes for the lifetime of the suite.
    const FUTURE_EXP: usize = 4_102_444_800;

    #[test]
    fn test_token_round_trip() {
        let token = token_for(Role::Admin, FUTURE_EXP);
        let user = decode_token("test-secret", &token).unwrap();
        assert_eq!(user.role, Role::Admin);
    }

    #[test]
    fn test_expired_token_rejected() {
        let token = token_for(Role::User, 1);
        let err = decode_token("test-secret", &token).unwrap_err();
        assert!(matches!(err, AppError::Auth(m) if m.contains("expired")));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = token_for(Role::User, FUTURE_EXP);
        assert!(decode_token("other-secret", &token).is_err());
    }
}
