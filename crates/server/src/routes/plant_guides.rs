use axum::{
    Extension, Router,
    extract::State,
    http::StatusCode,
    response::Json as ResponseJson,
    routing::get,
};
use db::models::plant_guide::{self, CreatePlantGuide, PlantGuide, UpdatePlantGuide};
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
    routes::{access::ensure_admin, activity::record_audit},
    validation::{FieldRules, Validate, field, pagination_rules},
};

const WATER_NEEDS: &[&str] = &["low", "medium", "high"];

impl Validate for CreatePlantGuide {
    fn rules() -> Vec<FieldRules> {
        vec![
            field("name").required().string().length(2, 100),
            field("scientific_name").string().max_length(150),
            field("description").string().max_length(5000),
            field("sunlight").string().max_length(100),
            field("water_needs").string().one_of(WATER_NEEDS),
            field("planting_season").string().max_length(100),
            field("days_to_harvest").integer().range(1.0, 1000.0),
        ]
    }
}

impl Validate for UpdatePlantGuide {
    fn rules() -> Vec<FieldRules> {
        vec![
            field("name").string().length(2, 100),
            field("scientific_name").string().max_length(150),
            field("description").string().max_length(5000),
            field("sunlight").string().max_length(100),
            field("water_needs").string().one_of(WATER_NEEDS),
            field("planting_season").string().max_length(100),
            field("days_to_harvest").integer().range(1.0, 1000.0),
        ]
    }
}

#[derive(Debug, Deserialize)]
pub struct PlantGuideQuery {
    #[serde(flatten)]
    pub page: PageParams,
    pub q: Option<String>,
}

impl Validate for PlantGuideQuery {
    fn rules() -> Vec<FieldRules> {
        let mut rules = pagination_rules();
        rules.push(field("q").string().max_length(100));
        rules
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/plant-guides", get(search_guides).post(create_guide))
        .route(
            "/plant-guides/{guide_id}",
            get(get_guide).put(update_guide).delete(delete_guide),
        )
}

pub async fn search_guides(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<PlantGuideQuery>,
) -> Result<ResponseJson<ApiResponse<Page<PlantGuide>>>, ApiError> {
    let pagination = query.page.resolve(plant_guide::SORTABLE)?;
    let page = PlantGuide::search(state.pool(), query.q.as_deref(), &pagination).await?;
    Ok(ResponseJson(ApiResponse::success(page)))
}

pub async fn get_guide(
    State(state): State<AppState>,
    ApiPath(guide_id): ApiPath<Uuid>,
) -> Result<ResponseJson<ApiResponse<PlantGuide>>, ApiError> {
    let guide = PlantGuide::find_by_id(state.pool(), guide_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Plant guide"))?;
    Ok(ResponseJson(ApiResponse::success(guide)))
}

#[instrument(name = "plant_guides.create", skip(state, ctx, payload), fields(user_id = %ctx.user.id))]
pub async fn create_guide(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Validated(payload): Validated<CreatePlantGuide>,
) -> Result<(StatusCode, ResponseJson<ApiResponse<PlantGuide>>), ApiError> {
    ensure_admin(&ctx)?;
    let guide = PlantGuide::create(state.pool(), &payload).await?;
    record_audit(
        state.pool(),
        ctx.user_id(),
        "plant_guide.create",
        "plant_guide",
        guide.id,
        json!({ "name": guide.name }),
    )
    .await;
    Ok((StatusCode::CREATED, ResponseJson(ApiResponse::success(guide))))
}

#[instrument(name = "plant_guides.update", skip(state, ctx, payload), fields(user_id = %ctx.user.id, guide_id = %guide_id))]
pub async fn update_guide(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(guide_id): ApiPath<Uuid>,
    Validated(payload): Validated<UpdatePlantGuide>,
) -> Result<ResponseJson<ApiResponse<PlantGuide>>, ApiError> {
    ensure_admin(&ctx)?;
    let guide = PlantGuide::update(state.pool(), guide_id, &payload).await?;
    Ok(ResponseJson(ApiResponse::success(guide)))
}

#[instrument(name = "plant_guides.delete", skip(state, ctx), fields(user_id = %ctx.user.id, guide_id = %guide_id))]
pub async fn delete_guide(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(guide_id): ApiPath<Uuid>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    ensure_admin(&ctx)?;
    let rows_affected = PlantGuide::delete(state.pool(), guide_id).await?;
    if rows_affected == 0 {
        return Err(ApiError::not_found("Plant guide"));
    }
    record_audit(
        state.pool(),
        ctx.user_id(),
        "plant_guide.delete",
        "plant_guide",
        guide_id,
        json!({}),
    )
    .await;
    Ok(ResponseJson(ApiResponse::message("Plant guide deleted")))
}
