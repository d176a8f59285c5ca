use axum::{
    Extension, Router,
    extract::State,
    http::StatusCode,
    middleware::from_fn_with_state,
    response::Json as ResponseJson,
    routing::get,
};
use db::models::{
    chat_message::ChatMessage,
    garden::{
        self, CreateGarden, Garden, GardenFilter, GardenMember, GardenMemberProfile, GardenRole,
        UpdateGarden,
    },
    notification::NotificationKind,
    user::User,
};
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
    middleware::{ApiPath, ApiQuery, Validated, load_garden_middleware},
    routes::{
        access::{
            ensure_garden_manager, ensure_garden_member, ensure_garden_owner,
            ensure_garden_reader,
        },
        activity::{notify, record_audit},
    },
    validation::{FieldRules, Validate, field, pagination_rules},
};

const CHAT_SORTABLE: &[&str] = &["created_at"];
const ASSIGNABLE_ROLES: &[&str] = &["member", "second_admin"];

impl Validate for CreateGarden {
    fn rules() -> Vec<FieldRules> {
        vec![
            field("name").required().string().length(2, 120),
            field("description").string().max_length(2000),
            field("location").required().string().length(2, 200),
            field("size_sqm").number().range(0.0, 10_000_000.0),
            field("is_public").boolean(),
        ]
    }
}

impl Validate for UpdateGarden {
    fn rules() -> Vec<FieldRules> {
        vec![
            field("name").string().length(2, 120),
            field("description").string().max_length(2000),
            field("location").string().length(2, 200),
            field("size_sqm").number().range(0.0, 10_000_000.0),
            field("is_public").boolean(),
        ]
    }
}

#[derive(Debug, Deserialize)]
pub struct GardenListQuery {
    #[serde(flatten)]
    pub page: PageParams,
    pub search: Option<String>,
    pub owner_id: Option<Uuid>,
}

impl Validate for GardenListQuery {
    fn rules() -> Vec<FieldRules> {
        let mut rules = pagination_rules();
        rules.push(field("search").string().max_length(100));
        rules.push(field("owner_id").uuid());
        rules
    }
}

#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    pub user_id: Uuid,
    pub role: Option<GardenRole>,
}

impl Validate for AddMemberRequest {
    fn rules() -> Vec<FieldRules> {
        vec![
            field("user_id").required().string().uuid(),
            field("role").string().one_of(ASSIGNABLE_ROLES),
        ]
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateMemberRequest {
    pub role: GardenRole,
}

impl Validate for UpdateMemberRequest {
    fn rules() -> Vec<FieldRules> {
        vec![field("role").required().string().one_of(ASSIGNABLE_ROLES)]
    }
}

#[derive(Debug, Deserialize)]
pub struct MemberParams {
    pub garden_id: Uuid,
    pub user_id: Uuid,
}

pub fn router(state: &AppState) -> Router<AppState> {
    let garden_router = Router::new()
        .route(
            "/gardens/{garden_id}",
            get(get_garden).put(update_garden).delete(delete_garden),
        )
        .route(
            "/gardens/{garden_id}/members",
            get(list_members).post(add_member),
        )
        .route(
            "/gardens/{garden_id}/members/{user_id}",
            axum::routing::patch(update_member).delete(remove_member),
        )
        .route("/gardens/{garden_id}/messages", get(list_messages))
        .route_layer(from_fn_with_state(state.clone(), load_garden_middleware));

    Router::new()
        .route("/gardens", get(list_gardens).post(create_garden))
        .merge(garden_router)
}

#[instrument(name = "gardens.list", skip(state, ctx, query), fields(user_id = %ctx.user.id))]
pub async fn list_gardens(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiQuery(query): ApiQuery<GardenListQuery>,
) -> Result<ResponseJson<ApiResponse<Page<Garden>>>, ApiError> {
    let pagination = query.page.resolve(garden::SORTABLE)?;
    let filter = GardenFilter {
        visible_to: (!ctx.is_admin()).then(|| ctx.user_id()),
        owner_id: query.owner_id,
        search: query.search,
    };
    let page = Garden::list(state.pool(), &filter, &pagination).await?;
    Ok(ResponseJson(ApiResponse::success(page)))
}

#[instrument(name = "gardens.create", skip(state, ctx, payload), fields(user_id = %ctx.user.id))]
pub async fn create_garden(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Validated(payload): Validated<CreateGarden>,
) -> Result<(StatusCode, ResponseJson<ApiResponse<Garden>>), ApiError> {
    let garden = Garden::create(state.pool(), ctx.user_id(), &payload).await?;
    record_audit(
        state.pool(),
        ctx.user_id(),
        "garden.create",
        "garden",
        garden.id,
        json!({ "name": garden.name }),
    )
    .await;
    tracing::info!(garden_id = %garden.id, "garden created");
    Ok((
        StatusCode::CREATED,
        ResponseJson(ApiResponse::success(garden)),
    ))
}

pub async fn get_garden(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Extension(garden): Extension<Garden>,
) -> Result<ResponseJson<ApiResponse<Garden>>, ApiError> {
    ensure_garden_reader(state.pool(), &garden, &ctx.user).await?;
    Ok(ResponseJson(ApiResponse::success(garden)))
}

#[instrument(name = "gardens.update", skip_all, fields(user_id = %ctx.user.id, garden_id = %garden.id))]
pub async fn update_garden(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Extension(garden): Extension<Garden>,
    Validated(payload): Validated<UpdateGarden>,
) -> Result<ResponseJson<ApiResponse<Garden>>, ApiError> {
    ensure_garden_manager(state.pool(), &garden, &ctx.user).await?;
    let updated = Garden::update(state.pool(), garden.id, &payload).await?;
    record_audit(
        state.pool(),
        ctx.user_id(),
        "garden.update",
        "garden",
        garden.id,
        json!({}),
    )
    .await;
    Ok(ResponseJson(ApiResponse::success(updated)))
}

#[instrument(name = "gardens.delete", skip_all, fields(user_id = %ctx.user.id, garden_id = %garden.id))]
pub async fn delete_garden(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Extension(garden): Extension<Garden>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    ensure_garden_owner(&garden, &ctx.user)?;

    let rows_affected = Garden::delete(state.pool(), garden.id).await?;
    if rows_affected == 0 {
        return Err(ApiError::not_found("Garden"));
    }
    record_audit(
        state.pool(),
        ctx.user_id(),
        "garden.delete",
        "garden",
        garden.id,
        json!({ "name": garden.name }),
    )
    .await;
    Ok(ResponseJson(ApiResponse::message("Garden deleted")))
}

pub async fn list_members(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Extension(garden): Extension<Garden>,
) -> Result<ResponseJson<ApiResponse<Vec<GardenMemberProfile>>>, ApiError> {
    ensure_garden_member(state.pool(), &garden, &ctx.user).await?;
    let members = GardenMember::list_profiles(state.pool(), garden.id).await?;
    Ok(ResponseJson(ApiResponse::success(members)))
}

#[instrument(name = "gardens.add_member", skip_all, fields(user_id = %ctx.user.id, garden_id = %garden.id))]
pub async fn add_member(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Extension(garden): Extension<Garden>,
    Validated(payload): Validated<AddMemberRequest>,
) -> Result<(StatusCode, ResponseJson<ApiResponse<GardenMember>>), ApiError> {
    let pool = state.pool();
    ensure_garden_manager(pool, &garden, &ctx.user).await?;

    if User::find_by_id(pool, payload.user_id).await?.is_none() {
        return Err(ApiError::not_found("User"));
    }
    if GardenMember::find(pool, garden.id, payload.user_id)
        .await?
        .is_some()
    {
        return Err(ApiError::Conflict(
            "User is already a member of this garden".to_string(),
        ));
    }

    let role = payload.role.unwrap_or_default();
    let member = GardenMember::add(pool, garden.id, payload.user_id, role).await?;

    notify(
        pool,
        member.user_id,
        NotificationKind::Info,
        "Added to garden",
        format!("You were added to {} as {}", garden.name, role),
        Some(format!("/gardens/{}", garden.id)),
    )
    .await;
    record_audit(
        pool,
        ctx.user_id(),
        "garden.member_add",
        "garden",
        garden.id,
        json!({ "user_id": member.user_id, "role": role }),
    )
    .await;

    Ok((
        StatusCode::CREATED,
        ResponseJson(ApiResponse::success(member)),
    ))
}

#[instrument(name = "gardens.update_member", skip_all, fields(user_id = %ctx.user.id, garden_id = %garden.id))]
pub async fn update_member(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Extension(garden): Extension<Garden>,
    ApiPath(params): ApiPath<MemberParams>,
    Validated(payload): Validated<UpdateMemberRequest>,
) -> Result<ResponseJson<ApiResponse<GardenMember>>, ApiError> {
    ensure_garden_owner(&garden, &ctx.user)?;
    if params.user_id == garden.owner_id {
        return Err(ApiError::BadRequest(
            "The owner's role cannot be changed".to_string(),
        ));
    }

    let member =
        GardenMember::update_role(state.pool(), garden.id, params.user_id, payload.role).await?;
    record_audit(
        state.pool(),
        ctx.user_id(),
        "garden.member_role",
        "garden",
        garden.id,
        json!({ "user_id": member.user_id, "role": member.role }),
    )
    .await;
    Ok(ResponseJson(ApiResponse::success(member)))
}

/// Managers remove anyone but the owner; members may remove themselves.
#[instrument(name = "gardens.remove_member", skip_all, fields(user_id = %ctx.user.id, garden_id = %garden.id))]
pub async fn remove_member(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Extension(garden): Extension<Garden>,
    ApiPath(params): ApiPath<MemberParams>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    let pool = state.pool();
    if params.user_id == garden.owner_id {
        return Err(ApiError::BadRequest(
            "The garden owner cannot be removed".to_string(),
        ));
    }
    if params.user_id != ctx.user_id() {
        ensure_garden_manager(pool, &garden, &ctx.user).await?;
    }

    let rows_affected = GardenMember::remove(pool, garden.id, params.user_id).await?;
    if rows_affected == 0 {
        return Err(ApiError::not_found("Membership"));
    }
    record_audit(
        pool,
        ctx.user_id(),
        "garden.member_remove",
        "garden",
        garden.id,
        json!({ "user_id": params.user_id }),
    )
    .await;
    Ok(ResponseJson(ApiResponse::message("Member removed")))
}

pub async fn list_messages(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Extension(garden): Extension<Garden>,
    ApiQuery(params): ApiQuery<PageParams>,
) -> Result<ResponseJson<ApiResponse<Page<ChatMessage>>>, ApiError> {
    ensure_garden_reader(state.pool(), &garden, &ctx.user).await?;
    let pagination = params.resolve(CHAT_SORTABLE)?;
    let page = ChatMessage::list_for_garden(state.pool(), garden.id, &pagination).await?;
    Ok(ResponseJson(ApiResponse::success(page)))
}
