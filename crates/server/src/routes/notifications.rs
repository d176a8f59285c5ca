use axum::{
    Extension, Router,
    extract::State,
    http::StatusCode,
    response::Json as ResponseJson,
    routing::{delete, get, patch, post},
};
use db::models::{
    notification::{self, CreateNotification, Notification},
    user::User,
};
use serde::{Deserialize, Serialize};
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
    routes::access::ensure_admin,
    validation::{FieldRules, Validate, field, pagination_rules},
};

impl Validate for CreateNotification {
    const RAW_FIELDS: &'static [&'static str] = &["link"];

    fn rules() -> Vec<FieldRules> {
        vec![
            field("user_id").required().string().uuid(),
            field("title").required().string().length(1, 200),
            field("message").required().string().length(1, 2000),
            field("kind")
                .string()
                .one_of(&["info", "task", "event", "payment", "system"]),
            field("link").string().max_length(500),
        ]
    }
}

#[derive(Debug, Deserialize)]
pub struct NotificationListQuery {
    #[serde(flatten)]
    pub page: PageParams,
    pub unread: Option<bool>,
}

impl Validate for NotificationListQuery {
    fn rules() -> Vec<FieldRules> {
        let mut rules = pagination_rules();
        rules.push(field("unread").boolean());
        rules
    }
}

#[derive(Debug, Serialize)]
pub struct ReadAllResponse {
    pub updated: u64,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/notifications",
            get(list_notifications).post(create_notification),
        )
        .route("/notifications/read-all", post(mark_all_read))
        .route("/notifications/{notification_id}/read", patch(mark_read))
        .route("/notifications/{notification_id}", delete(delete_notification))
}

/// Fetch a notification the caller received.
async fn own_notification(
    state: &AppState,
    ctx: &RequestContext,
    notification_id: Uuid,
) -> Result<Notification, ApiError> {
    let notification = Notification::find_by_id(state.pool(), notification_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Notification"))?;
    if notification.user_id != ctx.user_id() {
        return Err(ApiError::forbidden(
            "You can only manage your own notifications",
        ));
    }
    Ok(notification)
}

pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiQuery(query): ApiQuery<NotificationListQuery>,
) -> Result<ResponseJson<ApiResponse<Page<Notification>>>, ApiError> {
    let pagination = query.page.resolve(notification::SORTABLE)?;
    let page = Notification::list_for_user(
        state.pool(),
        ctx.user_id(),
        query.unread.unwrap_or(false),
        &pagination,
    )
    .await?;
    Ok(ResponseJson(ApiResponse::success(page)))
}

#[instrument(name = "notifications.create", skip(state, ctx, payload), fields(user_id = %ctx.user.id, recipient = %payload.user_id))]
pub async fn create_notification(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Validated(payload): Validated<CreateNotification>,
) -> Result<(StatusCode, ResponseJson<ApiResponse<Notification>>), ApiError> {
    ensure_admin(&ctx)?;
    if User::find_by_id(state.pool(), payload.user_id)
        .await?
        .is_none()
    {
        return Err(ApiError::not_found("User"));
    }
    let notification = Notification::create(state.pool(), &payload).await?;
    Ok((
        StatusCode::CREATED,
        ResponseJson(ApiResponse::success(notification)),
    ))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(notification_id): ApiPath<Uuid>,
) -> Result<ResponseJson<ApiResponse<Notification>>, ApiError> {
    let notification = own_notification(&state, &ctx, notification_id).await?;
    let notification = Notification::mark_read(state.pool(), notification.id).await?;
    Ok(ResponseJson(ApiResponse::success(notification)))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<ResponseJson<ApiResponse<ReadAllResponse>>, ApiError> {
    let updated = Notification::mark_all_read(state.pool(), ctx.user_id()).await?;
    Ok(ResponseJson(ApiResponse::success(ReadAllResponse {
        updated,
    })))
}

pub async fn delete_notification(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(notification_id): ApiPath<Uuid>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    let notification = own_notification(&state, &ctx, notification_id).await?;
    Notification::delete(state.pool(), notification.id).await?;
    Ok(ResponseJson(ApiResponse::message("Notification deleted")))
}
