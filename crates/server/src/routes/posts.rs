use axum::{
    Extension, Router,
    extract::State,
    http::StatusCode,
    middleware::from_fn_with_state,
    response::Json as ResponseJson,
    routing::get,
};
use db::models::{
    garden::Garden,
    post::{self, CreatePost, Post, PostFilter, UpdatePost},
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
    middleware::{ApiQuery, Validated, load_post_middleware},
    routes::{
        access::{ensure_garden_member, ensure_garden_reader},
        activity::record_audit,
    },
    validation::{FieldRules, Rule, Validate, field, pagination_rules},
};

fn tag_rules() -> FieldRules {
    field("tags")
        .array()
        .length(0, 10)
        .each(Rule::String)
        .each(Rule::Length { min: 1, max: 30 })
}

impl Validate for CreatePost {
    fn rules() -> Vec<FieldRules> {
        vec![
            field("garden_id").string().uuid(),
            field("title").required().string().length(3, 200),
            field("content").required().string().length(1, 10_000),
            tag_rules(),
        ]
    }
}

impl Validate for UpdatePost {
    fn rules() -> Vec<FieldRules> {
        vec![
            field("title").string().length(3, 200),
            field("content").string().length(1, 10_000),
            tag_rules(),
        ]
    }
}

#[derive(Debug, Deserialize)]
pub struct PostListQuery {
    #[serde(flatten)]
    pub page: PageParams,
    pub garden_id: Option<Uuid>,
    pub author_id: Option<Uuid>,
    pub tag: Option<String>,
}

impl Validate for PostListQuery {
    fn rules() -> Vec<FieldRules> {
        let mut rules = pagination_rules();
        rules.extend([
            field("garden_id").uuid(),
            field("author_id").uuid(),
            field("tag").string().max_length(30),
        ]);
        rules
    }
}

pub fn router(state: &AppState) -> Router<AppState> {
    let post_router = Router::new()
        .route(
            "/posts/{post_id}",
            get(get_post).put(update_post).delete(delete_post),
        )
        .route_layer(from_fn_with_state(state.clone(), load_post_middleware));

    Router::new()
        .route("/posts", get(list_posts).post(create_post))
        .merge(post_router)
}

async fn find_garden(state: &AppState, garden_id: Uuid) -> Result<Garden, ApiError> {
    Garden::find_by_id(state.pool(), garden_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Garden"))
}

pub async fn list_posts(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiQuery(query): ApiQuery<PostListQuery>,
) -> Result<ResponseJson<ApiResponse<Page<Post>>>, ApiError> {
    if let Some(garden_id) = query.garden_id {
        let garden = find_garden(&state, garden_id).await?;
        ensure_garden_reader(state.pool(), &garden, &ctx.user).await?;
    }

    let pagination = query.page.resolve(post::SORTABLE)?;
    let filter = PostFilter {
        garden_id: query.garden_id,
        author_id: query.author_id,
        tag: query.tag,
        visible_to: (!ctx.is_admin()).then(|| ctx.user_id()),
    };
    let page = Post::list(state.pool(), &filter, &pagination).await?;
    Ok(ResponseJson(ApiResponse::success(page)))
}

#[instrument(name = "posts.create", skip(state, ctx, payload), fields(user_id = %ctx.user.id))]
pub async fn create_post(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Validated(payload): Validated<CreatePost>,
) -> Result<(StatusCode, ResponseJson<ApiResponse<Post>>), ApiError> {
    if let Some(garden_id) = payload.garden_id {
        let garden = find_garden(&state, garden_id).await?;
        ensure_garden_member(state.pool(), &garden, &ctx.user).await?;
    }
    let post = Post::create(state.pool(), ctx.user_id(), &payload).await?;
    Ok((StatusCode::CREATED, ResponseJson(ApiResponse::success(post))))
}

pub async fn get_post(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Extension(post): Extension<Post>,
) -> Result<ResponseJson<ApiResponse<Post>>, ApiError> {
    if let Some(garden_id) = post.garden_id {
        let garden = find_garden(&state, garden_id).await?;
        ensure_garden_reader(state.pool(), &garden, &ctx.user).await?;
    }
    Ok(ResponseJson(ApiResponse::success(post)))
}

#[instrument(name = "posts.update", skip_all, fields(user_id = %ctx.user.id, post_id = %post.id))]
pub async fn update_post(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Extension(post): Extension<Post>,
    Validated(payload): Validated<UpdatePost>,
) -> Result<ResponseJson<ApiResponse<Post>>, ApiError> {
    if post.author_id != ctx.user_id() {
        return Err(ApiError::forbidden("Only the author can edit this post"));
    }
    let updated = Post::update(state.pool(), post.id, &payload).await?;
    Ok(ResponseJson(ApiResponse::success(updated)))
}

#[instrument(name = "posts.delete", skip_all, fields(user_id = %ctx.user.id, post_id = %post.id))]
pub async fn delete_post(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Extension(post): Extension<Post>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    if post.author_id != ctx.user_id() && !ctx.is_admin() {
        return Err(ApiError::forbidden(
            "Only the author or an admin can delete this post",
        ));
    }

    let rows_affected = Post::delete(state.pool(), post.id).await?;
    if rows_affected == 0 {
        return Err(ApiError::not_found("Post"));
    }
    if post.author_id != ctx.user_id() {
        record_audit(
            state.pool(),
            ctx.user_id(),
            "post.moderate_delete",
            "post",
            post.id,
            json!({ "author_id": post.author_id, "title": post.title }),
        )
        .await;
    }
    Ok(ResponseJson(ApiResponse::message("Post deleted")))
}
