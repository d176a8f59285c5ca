use axum::{
    Extension, Router,
    extract::State,
    response::Json as ResponseJson,
    routing::{get, patch},
};
use db::models::user::{self, UpdateUser, User, UserRole};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;
use utils::{
    pagination::{Page, PageParams},
    response::ApiResponse,
};
use uuid::Uuid;

use crate::{
    AppState,
    auth::RequestContext,
    error::ApiError,
    middleware::{ApiPath, ApiQuery, Validated},
    routes::{
        access::{ensure_admin, ensure_self_or_admin},
        activity::record_audit,
    },
    validation::{FieldRules, HTTP_URL_RE, PHONE_RE, Validate, field},
};

impl Validate for UpdateUser {
    const RAW_FIELDS: &'static [&'static str] = &["avatar_url"];

    fn rules() -> Vec<FieldRules> {
        vec![
            field("name").string().length(2, 100),
            field("phone")
                .string()
                .matches(&PHONE_RE, "must be a valid phone number"),
            field("avatar_url")
                .string()
                .max_length(2048)
                .matches(&HTTP_URL_RE, "must be an http(s) URL"),
        ]
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub role: UserRole,
}

impl Validate for UpdateRoleRequest {
    fn rules() -> Vec<FieldRules> {
        vec![field("role").required().string().one_of(&["user", "admin"])]
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route(
            "/users/{user_id}",
            get(get_user).put(update_user).delete(delete_user),
        )
        .route("/users/{user_id}/role", patch(update_role))
}

async fn find_user(state: &AppState, user_id: Uuid) -> Result<User, ApiError> {
    User::find_by_id(state.pool(), user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))
}

#[instrument(name = "users.list", skip(state, ctx, params), fields(user_id = %ctx.user.id))]
pub async fn list_users(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiQuery(params): ApiQuery<PageParams>,
) -> Result<ResponseJson<ApiResponse<Page<User>>>, ApiError> {
    ensure_admin(&ctx)?;
    let pagination = params.resolve(user::SORTABLE)?;
    let page = User::list(state.pool(), &pagination).await?;
    Ok(ResponseJson(ApiResponse::success(page)))
}

pub async fn get_user(
    State(state): State<AppState>,
    ApiPath(user_id): ApiPath<Uuid>,
) -> Result<ResponseJson<ApiResponse<User>>, ApiError> {
    let user = find_user(&state, user_id).await?;
    Ok(ResponseJson(ApiResponse::success(user)))
}

#[instrument(name = "users.update", skip(state, ctx, payload), fields(user_id = %ctx.user.id, target = %user_id))]
pub async fn update_user(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(user_id): ApiPath<Uuid>,
    Validated(payload): Validated<UpdateUser>,
) -> Result<ResponseJson<ApiResponse<User>>, ApiError> {
    ensure_self_or_admin(&ctx, user_id)?;
    let user = User::update(state.pool(), user_id, &payload).await?;
    Ok(ResponseJson(ApiResponse::success(user)))
}

#[instrument(name = "users.update_role", skip(state, ctx, payload), fields(user_id = %ctx.user.id, target = %user_id))]
pub async fn update_role(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(user_id): ApiPath<Uuid>,
    Validated(payload): Validated<UpdateRoleRequest>,
) -> Result<ResponseJson<ApiResponse<User>>, ApiError> {
    ensure_admin(&ctx)?;
    if user_id == ctx.user_id() && payload.role != UserRole::Admin {
        return Err(ApiError::BadRequest(
            "Admins cannot remove their own admin role".to_string(),
        ));
    }

    let user = User::update_role(state.pool(), user_id, payload.role).await?;
    record_audit(
        state.pool(),
        ctx.user_id(),
        "user.role_change",
        "user",
        user.id,
        json!({ "role": user.role }),
    )
    .await;
    Ok(ResponseJson(ApiResponse::success(user)))
}

#[instrument(name = "users.delete", skip(state, ctx), fields(user_id = %ctx.user.id, target = %user_id))]
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(user_id): ApiPath<Uuid>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    ensure_admin(&ctx)?;
    if user_id == ctx.user_id() {
        return Err(ApiError::BadRequest(
            "Admins cannot delete their own account".to_string(),
        ));
    }

    let rows_affected = User::delete(state.pool(), user_id).await?;
    if rows_affected == 0 {
        return Err(ApiError::not_found("User"));
    }
    record_audit(state.pool(), ctx.user_id(), "user.delete", "user", user_id, json!({})).await;
    Ok(ResponseJson(ApiResponse::message("User deleted")))
}
