//! Access tokens: HS256 JWTs carrying the user id and platform role.

use std::{collections::HashSet, sync::Arc};

use chrono::{DateTime, Duration, TimeZone, Utc};
use db::models::user::{User, UserRole};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub const TOKEN_AUDIENCE: &str = "garden-api";
const LEEWAY_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("invalid token")]
    InvalidToken,
    #[error("token expired")]
    TokenExpired,
    #[error("jwt error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub sub: Uuid,
    pub role: UserRole,
    pub iat: i64,
    pub exp: i64,
    pub aud: String,
}

/// Decoded token with parsed claims.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub user_id: Uuid,
    pub role: UserRole,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct JwtService {
    secret: Arc<SecretString>,
    ttl: Duration,
}

impl JwtService {
    pub fn new(secret: Arc<SecretString>, ttl: Duration) -> Self {
        Self { secret, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, user: &User) -> Result<String, JwtError> {
        self.issue_at(user.id, user.role, Utc::now())
    }

    fn issue_at(
        &self,
        user_id: Uuid,
        role: UserRole,
        issued_at: DateTime<Utc>,
    ) -> Result<String, JwtError> {
        let claims = AccessTokenClaims {
            sub: user_id,
            role,
            iat: issued_at.timestamp(),
            exp: (issued_at + self.ttl).timestamp(),
            aud: TOKEN_AUDIENCE.to_string(),
        };
        let key = EncodingKey::from_secret(self.secret.expose_secret().as_bytes());
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &key)?)
    }

    pub fn decode(&self, token: &str) -> Result<AccessToken, JwtError> {
        if token.trim().is_empty() {
            return Err(JwtError::InvalidToken);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.validate_nbf = false;
        validation.set_audience(&[TOKEN_AUDIENCE]);
        validation.required_spec_claims = HashSet::from([
            "sub".to_string(),
            "exp".to_string(),
            "aud".to_string(),
        ]);
        validation.leeway = LEEWAY_SECS;

        let key = DecodingKey::from_secret(self.secret.expose_secret().as_bytes());
        let data = decode::<AccessTokenClaims>(token, &key, &validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::TokenExpired,
                _ => JwtError::Jwt(e),
            }
        })?;

        let expires_at = Utc
            .timestamp_opt(data.claims.exp, 0)
            .single()
            .ok_or(JwtError::InvalidToken)?;

        Ok(AccessToken {
            user_id: data.claims.sub,
            role: data.claims.role,
            expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(secret: &str) -> JwtService {
        JwtService::new(
            Arc::new(SecretString::from(secret.to_string())),
            Duration::hours(1),
        )
    }

    #[test]
    fn issued_tokens_round_trip() {
        let jwt = service("a-test-secret-that-is-long-enough-123");
        let user_id = Uuid::new_v4();
        let token = jwt.issue_at(user_id, UserRole::Admin, Utc::now()).unwrap();

        let decoded = jwt.decode(&token).unwrap();
        assert_eq!(decoded.user_id, user_id);
        assert_eq!(decoded.role, UserRole::Admin);
        assert!(decoded.expires_at > Utc::now());
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let jwt = service("a-test-secret-that-is-long-enough-123");
        let token = jwt
            .issue_at(Uuid::new_v4(), UserRole::User, Utc::now() - Duration::hours(3))
            .unwrap();
        assert!(matches!(jwt.decode(&token), Err(JwtError::TokenExpired)));
    }

    #[test]
    fn tokens_signed_with_another_secret_are_rejected() {
        let token = service("first-secret-first-secret-first-secret")
            .issue_at(Uuid::new_v4(), UserRole::User, Utc::now())
            .unwrap();
        let other = service("second-secret-second-secret-second-secret");
        assert!(matches!(other.decode(&token), Err(JwtError::Jwt(_))));
    }

    #[test]
    fn blank_and_garbage_tokens_are_invalid() {
        let jwt = service("a-test-secret-that-is-long-enough-123");
        assert!(matches!(jwt.decode("  "), Err(JwtError::InvalidToken)));
        assert!(jwt.decode("not.a.jwt").is_err());
    }
}
