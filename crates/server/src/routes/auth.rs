use axum::{
    Extension, Router,
    extract::State,
    http::StatusCode,
    response::Json as ResponseJson,
    routing::{get, post},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use db::models::{
    garden::{GardenMember, Membership},
    notification::Notification,
    user::{CreateUser, User, UserRole},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use utils::response::ApiResponse;

use crate::{
    AppState,
    auth::{
        RequestContext, TOKEN_COOKIE,
        password::{hash_password, verify_password},
    },
    error::ApiError,
    middleware::Validated,
    routes::activity::record_audit,
    validation::{FieldRules, Validate, field},
};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl Validate for RegisterRequest {
    const RAW_FIELDS: &'static [&'static str] = &["password"];

    fn rules() -> Vec<FieldRules> {
        vec![
            field("name").required().string().length(2, 100),
            field("email").required().string().email(),
            field("password").required().string().length(8, 128),
        ]
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl Validate for LoginRequest {
    const RAW_FIELDS: &'static [&'static str] = &["password"];

    fn rules() -> Vec<FieldRules> {
        vec![
            field("email").required().string().email(),
            field("password").required().string().max_length(128),
        ]
    }
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

/// The signed-in user plus what their dashboards should offer.
#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: User,
    pub memberships: Vec<Membership>,
    pub capabilities: Vec<&'static str>,
    pub unread_notifications: i64,
}

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
}

pub fn protected_router() -> Router<AppState> {
    Router::new().route("/auth/me", get(me))
}

fn token_cookie(state: &AppState, token: String) -> Cookie<'static> {
    let max_age = time::Duration::seconds(state.jwt.ttl().num_seconds());
    Cookie::build((TOKEN_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(state.config().is_production())
        .max_age(max_age)
        .build()
}

#[instrument(name = "auth.register", skip(state, jar, payload), fields(email = %payload.email))]
pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    Validated(payload): Validated<RegisterRequest>,
) -> Result<(StatusCode, CookieJar, ResponseJson<ApiResponse<AuthResponse>>), ApiError> {
    let pool = state.pool();

    if User::find_by_email(pool, &payload.email).await?.is_some() {
        return Err(ApiError::Conflict("Email is already registered".to_string()));
    }

    let password_hash = hash_password(&payload.password)?;
    let user = User::create(
        pool,
        &CreateUser {
            name: payload.name,
            email: payload.email,
            password_hash,
            role: UserRole::User,
        },
    )
    .await?;

    let token = state.jwt.issue(&user)?;
    record_audit(pool, user.id, "user.register", "user", user.id, serde_json::json!({})).await;
    tracing::info!(user_id = %user.id, "user registered");

    let jar = jar.add(token_cookie(&state, token.clone()));
    Ok((
        StatusCode::CREATED,
        jar,
        ResponseJson(ApiResponse::success(AuthResponse { token, user })),
    ))
}

#[instrument(name = "auth.login", skip(state, jar, payload), fields(email = %payload.email))]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Validated(payload): Validated<LoginRequest>,
) -> Result<(CookieJar, ResponseJson<ApiResponse<AuthResponse>>), ApiError> {
    let invalid = || ApiError::Unauthorized("Invalid email or password".to_string());

    let user = User::find_by_email(state.pool(), &payload.email)
        .await?
        .ok_or_else(invalid)?;

    let matches = verify_password(&payload.password, &user.password_hash).unwrap_or_else(|error| {
        tracing::warn!(?error, user_id = %user.id, "stored password hash is unreadable");
        false
    });
    if !matches {
        return Err(invalid());
    }

    let token = state.jwt.issue(&user)?;
    let jar = jar.add(token_cookie(&state, token.clone()));
    Ok((
        jar,
        ResponseJson(ApiResponse::success(AuthResponse { token, user })),
    ))
}

pub async fn logout(jar: CookieJar) -> (CookieJar, ResponseJson<ApiResponse<()>>) {
    let jar = jar.remove(Cookie::build(TOKEN_COOKIE).path("/"));
    (jar, ResponseJson(ApiResponse::message("Logged out")))
}

#[instrument(name = "auth.me", skip(state, ctx), fields(user_id = %ctx.user.id))]
pub async fn me(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<ResponseJson<ApiResponse<MeResponse>>, ApiError> {
    let pool = state.pool();
    let memberships = GardenMember::memberships_for_user(pool, ctx.user.id).await?;
    let unread_notifications = Notification::unread_count(pool, ctx.user.id).await?;
    let capabilities = capabilities_for(&ctx.user, &memberships);

    Ok(ResponseJson(ApiResponse::success(MeResponse {
        user: ctx.user,
        memberships,
        capabilities,
        unread_notifications,
    })))
}

/// Navigation sections a user can reach.
fn capabilities_for(user: &User, memberships: &[Membership]) -> Vec<&'static str> {
    let mut capabilities = vec![
        "dashboard",
        "gardens",
        "tasks",
        "events",
        "plant_guides",
        "posts",
        "chat",
        "payments",
        "notifications",
    ];
    if user.is_admin() || memberships.iter().any(|m| m.role.can_manage()) {
        capabilities.extend(["manage_gardens", "documents"]);
    }
    if user.is_admin() {
        capabilities.extend(["users", "audit_logs", "plant_guides_admin"]);
    }
    capabilities
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use db::models::garden::GardenRole;
    use uuid::Uuid;

    use super::*;

    fn user(role: UserRole) -> User {
        User {
            id: Uuid::new_v4(),
            name: "Ada".to_string(),
            email: "ada@example.test".to_string(),
            password_hash: String::new(),
            role,
            phone: None,
            avatar_url: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn managers_see_management_sections() {
        let memberships = vec![Membership {
            garden_id: Uuid::new_v4(),
            garden_name: "Riverside".to_string(),
            role: GardenRole::SecondAdmin,
        }];
        let caps = capabilities_for(&user(UserRole::User), &memberships);
        assert!(caps.contains(&"manage_gardens"));
        assert!(!caps.contains(&"audit_logs"));
    }

    #[test]
    fn admins_see_everything() {
        let caps = capabilities_for(&user(UserRole::Admin), &[]);
        assert!(caps.contains(&"manage_gardens"));
        assert!(caps.contains(&"users"));
        assert!(caps.contains(&"audit_logs"));
    }
}
