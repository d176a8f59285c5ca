use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::{
    extract::cookie::CookieJar,
    headers::{Authorization, HeaderMapExt, authorization::Bearer},
};
use db::models::user::User;
use tracing::{debug, warn};
use uuid::Uuid;

use super::jwt::JwtError;
use crate::{AppState, error::ApiError};

pub const TOKEN_COOKIE: &str = "token";

/// The authenticated caller, attached to request extensions by [`require_auth`].
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub user: User,
}

impl RequestContext {
    pub fn user_id(&self) -> Uuid {
        self.user.id
    }

    pub fn is_admin(&self) -> bool {
        self.user.is_admin()
    }
}

/// Bearer header first, then the `token` cookie.
pub fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    if let Some(Authorization(bearer)) = headers.typed_get::<Authorization<Bearer>>() {
        return Some(bearer.token().to_owned());
    }
    CookieJar::from_headers(headers)
        .get(TOKEN_COOKIE)
        .map(|cookie| cookie.value().to_owned())
        .filter(|value| !value.is_empty())
}

/// Resolve a raw token to a live user.
pub async fn authenticate(state: &AppState, token: &str) -> Result<User, ApiError> {
    let identity = state.jwt.decode(token).map_err(|error| {
        match &error {
            JwtError::TokenExpired => debug!("access token expired"),
            _ => warn!(?error, "failed to decode access token"),
        }
        ApiError::Unauthorized("Invalid or expired token".to_string())
    })?;

    match User::find_by_id(state.pool(), identity.user_id).await? {
        Some(user) => Ok(user),
        None => {
            warn!("user `{}` missing", identity.user_id);
            Err(ApiError::Unauthorized(
                "User for this token no longer exists".to_string(),
            ))
        }
    }
}

pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let Some(token) = token_from_headers(req.headers()) else {
        return ApiError::Unauthorized("Authentication required".to_string()).into_response();
    };

    let user = match authenticate(&state, &token).await {
        Ok(user) => user,
        Err(error) => return error.into_response(),
    };

    req.extensions_mut().insert(RequestContext { user });
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use axum::http::header;

    use super::*;

    #[test]
    fn bearer_header_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer from-header".parse().unwrap());
        headers.insert(header::COOKIE, "token=from-cookie".parse().unwrap());
        assert_eq!(token_from_headers(&headers).as_deref(), Some("from-header"));
    }

    #[test]
    fn cookie_is_used_without_header() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, "theme=dark; token=abc".parse().unwrap());
        assert_eq!(token_from_headers(&headers).as_deref(), Some("abc"));
    }

    #[test]
    fn missing_credentials_yield_none() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, "token=".parse().unwrap());
        assert_eq!(token_from_headers(&headers), None);
    }
}
