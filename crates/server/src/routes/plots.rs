use axum::{
    Extension, Router,
    extract::State,
    http::StatusCode,
    middleware::from_fn_with_state,
    response::Json as ResponseJson,
    routing::{delete, get, post},
};
use db::models::{
    garden::{Garden, GardenMember},
    notification::NotificationKind,
    plot::{self, CreatePlot, Plot, PlotStatus, UpdatePlot},
    qr_code::QrCode,
    water_log::{self, CreateWaterLog, WaterLog},
};
use rand::{Rng, distr::Alphanumeric};
use serde::{Deserialize, Serialize};
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
    middleware::{ApiPath, ApiQuery, Validated, load_garden_middleware, load_plot_middleware},
    routes::{
        access::{can_manage_garden, ensure_garden_manager, ensure_garden_member},
        activity::{notify, record_audit},
    },
    validation::{FieldRules, Validate, field, pagination_rules},
};

const PLOT_STATUSES: &[&str] = &["available", "assigned", "maintenance"];
const WATERING_METHODS: &[&str] = &["manual", "sprinkler", "drip", "rain"];
const QR_CODE_LEN: usize = 12;

impl Validate for CreatePlot {
    fn rules() -> Vec<FieldRules> {
        vec![
            field("name").required().string().length(1, 100),
            field("size_sqm").number().range(0.0, 1_000_000.0),
            field("soil_type").string().max_length(100),
        ]
    }
}

impl Validate for UpdatePlot {
    fn rules() -> Vec<FieldRules> {
        vec![
            field("name").string().length(1, 100),
            field("size_sqm").number().range(0.0, 1_000_000.0),
            field("soil_type").string().max_length(100),
            field("status").string().one_of(PLOT_STATUSES),
        ]
    }
}

impl Validate for CreateWaterLog {
    fn rules() -> Vec<FieldRules> {
        vec![
            field("amount_liters").required().number().range(0.0, 100_000.0),
            field("method").string().one_of(WATERING_METHODS),
            field("notes").string().max_length(1000),
            field("watered_at").string().datetime(),
        ]
    }
}

#[derive(Debug, Deserialize)]
pub struct PlotListQuery {
    #[serde(flatten)]
    pub page: PageParams,
    pub status: Option<PlotStatus>,
}

impl Validate for PlotListQuery {
    fn rules() -> Vec<FieldRules> {
        let mut rules = pagination_rules();
        rules.push(field("status").string().one_of(PLOT_STATUSES));
        rules
    }
}

#[derive(Debug, Deserialize)]
pub struct AssignPlotRequest {
    pub user_id: Uuid,
}

impl Validate for AssignPlotRequest {
    fn rules() -> Vec<FieldRules> {
        vec![field("user_id").required().string().uuid()]
    }
}

#[derive(Debug, Serialize)]
pub struct QrCodeLookup {
    pub qr_code: QrCode,
    pub plot: Plot,
}

pub fn router(state: &AppState) -> Router<AppState> {
    let garden_router = Router::new()
        .route("/gardens/{garden_id}/plots", get(list_plots).post(create_plot))
        .route_layer(from_fn_with_state(state.clone(), load_garden_middleware));

    let plot_router = Router::new()
        .route(
            "/plots/{plot_id}",
            get(get_plot).put(update_plot).delete(delete_plot),
        )
        .route("/plots/{plot_id}/assign", post(assign_plot))
        .route("/plots/{plot_id}/release", post(release_plot))
        .route(
            "/plots/{plot_id}/water-logs",
            get(list_water_logs).post(create_water_log),
        )
        .route("/plots/{plot_id}/qr-code", post(create_qr_code))
        .route_layer(from_fn_with_state(state.clone(), load_plot_middleware));

    Router::new()
        .merge(garden_router)
        .merge(plot_router)
        .route("/water-logs/{water_log_id}", delete(delete_water_log))
        .route("/qr-codes/{code}", get(resolve_qr_code))
}

pub async fn list_plots(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Extension(garden): Extension<Garden>,
    ApiQuery(query): ApiQuery<PlotListQuery>,
) -> Result<ResponseJson<ApiResponse<Page<Plot>>>, ApiError> {
    ensure_garden_member(state.pool(), &garden, &ctx.user).await?;
    let pagination = query.page.resolve(plot::SORTABLE)?;
    let page = Plot::list_for_garden(state.pool(), garden.id, query.status, &pagination).await?;
    Ok(ResponseJson(ApiResponse::success(page)))
}

#[instrument(name = "plots.create", skip_all, fields(user_id = %ctx.user.id, garden_id = %garden.id))]
pub async fn create_plot(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Extension(garden): Extension<Garden>,
    Validated(payload): Validated<CreatePlot>,
) -> Result<(StatusCode, ResponseJson<ApiResponse<Plot>>), ApiError> {
    ensure_garden_manager(state.pool(), &garden, &ctx.user).await?;
    let plot = Plot::create(state.pool(), garden.id, &payload).await?;
    record_audit(
        state.pool(),
        ctx.user_id(),
        "plot.create",
        "plot",
        plot.id,
        json!({ "garden_id": garden.id, "name": plot.name }),
    )
    .await;
    Ok((StatusCode::CREATED, ResponseJson(ApiResponse::success(plot))))
}

pub async fn get_plot(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Extension(garden): Extension<Garden>,
    Extension(plot): Extension<Plot>,
) -> Result<ResponseJson<ApiResponse<Plot>>, ApiError> {
    ensure_garden_member(state.pool(), &garden, &ctx.user).await?;
    Ok(ResponseJson(ApiResponse::success(plot)))
}

#[instrument(name = "plots.update", skip_all, fields(user_id = %ctx.user.id, plot_id = %plot.id))]
pub async fn update_plot(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Extension(garden): Extension<Garden>,
    Extension(plot): Extension<Plot>,
    Validated(payload): Validated<UpdatePlot>,
) -> Result<ResponseJson<ApiResponse<Plot>>, ApiError> {
    ensure_garden_manager(state.pool(), &garden, &ctx.user).await?;
    let updated = Plot::update(state.pool(), plot.id, &payload).await?;
    Ok(ResponseJson(ApiResponse::success(updated)))
}

#[instrument(name = "plots.delete", skip_all, fields(user_id = %ctx.user.id, plot_id = %plot.id))]
pub async fn delete_plot(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Extension(garden): Extension<Garden>,
    Extension(plot): Extension<Plot>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    ensure_garden_manager(state.pool(), &garden, &ctx.user).await?;
    let rows_affected = Plot::delete(state.pool(), plot.id).await?;
    if rows_affected == 0 {
        return Err(ApiError::not_found("Plot"));
    }
    record_audit(
        state.pool(),
        ctx.user_id(),
        "plot.delete",
        "plot",
        plot.id,
        json!({ "garden_id": garden.id }),
    )
    .await;
    Ok(ResponseJson(ApiResponse::message("Plot deleted")))
}

/// Only garden members can hold a plot.
#[instrument(name = "plots.assign", skip_all, fields(user_id = %ctx.user.id, plot_id = %plot.id))]
pub async fn assign_plot(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Extension(garden): Extension<Garden>,
    Extension(plot): Extension<Plot>,
    Validated(payload): Validated<AssignPlotRequest>,
) -> Result<ResponseJson<ApiResponse<Plot>>, ApiError> {
    let pool = state.pool();
    ensure_garden_manager(pool, &garden, &ctx.user).await?;

    if GardenMember::find(pool, garden.id, payload.user_id)
        .await?
        .is_none()
    {
        return Err(ApiError::BadRequest(
            "Plots can only be assigned to garden members".to_string(),
        ));
    }

    let assigned = Plot::assign(pool, plot.id, payload.user_id).await?;
    notify(
        pool,
        payload.user_id,
        NotificationKind::Info,
        "Plot assigned",
        format!("You have been assigned plot {} in {}", assigned.name, garden.name),
        Some(format!("/plots/{}", assigned.id)),
    )
    .await;
    record_audit(
        pool,
        ctx.user_id(),
        "plot.assign",
        "plot",
        plot.id,
        json!({ "assigned_to": payload.user_id }),
    )
    .await;
    Ok(ResponseJson(ApiResponse::success(assigned)))
}

#[instrument(name = "plots.release", skip_all, fields(user_id = %ctx.user.id, plot_id = %plot.id))]
pub async fn release_plot(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Extension(garden): Extension<Garden>,
    Extension(plot): Extension<Plot>,
) -> Result<ResponseJson<ApiResponse<Plot>>, ApiError> {
    let pool = state.pool();
    if plot.assigned_to != Some(ctx.user_id()) {
        ensure_garden_manager(pool, &garden, &ctx.user).await?;
    }

    let released = Plot::release(pool, plot.id).await?;
    record_audit(
        pool,
        ctx.user_id(),
        "plot.release",
        "plot",
        plot.id,
        json!({ "previous_assignee": plot.assigned_to }),
    )
    .await;
    Ok(ResponseJson(ApiResponse::success(released)))
}

pub async fn list_water_logs(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Extension(garden): Extension<Garden>,
    Extension(plot): Extension<Plot>,
    ApiQuery(params): ApiQuery<PageParams>,
) -> Result<ResponseJson<ApiResponse<Page<WaterLog>>>, ApiError> {
    ensure_garden_member(state.pool(), &garden, &ctx.user).await?;
    let pagination = params.resolve(water_log::SORTABLE)?;
    let page = WaterLog::list_for_plot(state.pool(), plot.id, &pagination).await?;
    Ok(ResponseJson(ApiResponse::success(page)))
}

#[instrument(name = "plots.water", skip_all, fields(user_id = %ctx.user.id, plot_id = %plot.id))]
pub async fn create_water_log(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Extension(garden): Extension<Garden>,
    Extension(plot): Extension<Plot>,
    Validated(payload): Validated<CreateWaterLog>,
) -> Result<(StatusCode, ResponseJson<ApiResponse<WaterLog>>), ApiError> {
    ensure_garden_member(state.pool(), &garden, &ctx.user).await?;
    let log = WaterLog::create(state.pool(), plot.id, ctx.user_id(), &payload).await?;
    tracing::debug!(water_log_id = %log.id, amount = log.amount_liters, "watering recorded");
    Ok((StatusCode::CREATED, ResponseJson(ApiResponse::success(log))))
}

#[instrument(name = "water_logs.delete", skip(state, ctx), fields(user_id = %ctx.user.id))]
pub async fn delete_water_log(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(water_log_id): ApiPath<Uuid>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    let pool = state.pool();
    let log = WaterLog::find_by_id(pool, water_log_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Water log"))?;

    if log.user_id != ctx.user_id() {
        let plot = Plot::find_by_id(pool, log.plot_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Plot"))?;
        let garden = Garden::find_by_id(pool, plot.garden_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Garden"))?;
        if !can_manage_garden(pool, &garden, &ctx.user).await? {
            return Err(ApiError::forbidden(
                "Only the author or a garden manager can delete this log",
            ));
        }
    }

    WaterLog::delete(pool, log.id).await?;
    Ok(ResponseJson(ApiResponse::message("Water log deleted")))
}

fn generate_code() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(QR_CODE_LEN)
        .map(char::from)
        .collect()
}

#[instrument(name = "plots.qr_code", skip_all, fields(user_id = %ctx.user.id, plot_id = %plot.id))]
pub async fn create_qr_code(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Extension(garden): Extension<Garden>,
    Extension(plot): Extension<Plot>,
) -> Result<(StatusCode, ResponseJson<ApiResponse<QrCode>>), ApiError> {
    ensure_garden_manager(state.pool(), &garden, &ctx.user).await?;
    let code = generate_code();
    let qr_code = QrCode::create(state.pool(), plot.id, ctx.user_id(), &code).await?;
    Ok((
        StatusCode::CREATED,
        ResponseJson(ApiResponse::success(qr_code)),
    ))
}

pub async fn resolve_qr_code(
    State(state): State<AppState>,
    ApiPath(code): ApiPath<String>,
) -> Result<ResponseJson<ApiResponse<QrCodeLookup>>, ApiError> {
    let pool = state.pool();
    let qr_code = QrCode::record_scan(pool, &code)
        .await?
        .ok_or_else(|| ApiError::not_found("QR code"))?;
    let plot = Plot::find_by_id(pool, qr_code.plot_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Plot"))?;
    Ok(ResponseJson(ApiResponse::success(QrCodeLookup {
        qr_code,
        plot,
    })))
}
