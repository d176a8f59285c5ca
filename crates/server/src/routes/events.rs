use axum::{
    Extension, Router,
    extract::State,
    http::StatusCode,
    middleware::from_fn_with_state,
    response::Json as ResponseJson,
    routing::{get, post},
};
use chrono::Utc;
use db::models::{
    event::{self, CreateEvent, Event, EventFilter, UpdateEvent},
    garden::Garden,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::SqlitePool;
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
    middleware::{ApiQuery, Validated, load_event_middleware},
    routes::{
        access::{can_manage_garden, ensure_admin, ensure_garden_member, ensure_garden_reader},
        activity::record_audit,
    },
    validation::{FieldRules, Validate, field, pagination_rules},
};

impl Validate for CreateEvent {
    fn rules() -> Vec<FieldRules> {
        vec![
            field("garden_id").string().uuid(),
            field("title").required().string().length(3, 200),
            field("description").string().max_length(5000),
            field("location").string().max_length(200),
            field("starts_at").required().string().datetime(),
            field("ends_at").string().datetime(),
            field("capacity").integer().range(1.0, 100_000.0),
        ]
    }
}

impl Validate for UpdateEvent {
    fn rules() -> Vec<FieldRules> {
        vec![
            field("title").string().length(3, 200),
            field("description").string().max_length(5000),
            field("location").string().max_length(200),
            field("starts_at").string().datetime(),
            field("ends_at").string().datetime(),
            field("capacity").integer().range(1.0, 100_000.0),
        ]
    }
}

#[derive(Debug, Deserialize)]
pub struct EventListQuery {
    #[serde(flatten)]
    pub page: PageParams,
    pub garden_id: Option<Uuid>,
    /// Only events that have not started yet.
    pub upcoming: Option<bool>,
    /// Only events the caller has RSVP'd to.
    pub attending: Option<bool>,
}

impl Validate for EventListQuery {
    fn rules() -> Vec<FieldRules> {
        let mut rules = pagination_rules();
        rules.extend([
            field("garden_id").uuid(),
            field("upcoming").boolean(),
            field("attending").boolean(),
        ]);
        rules
    }
}

#[derive(Debug, Serialize)]
pub struct EventDetail {
    #[serde(flatten)]
    pub event: Event,
    pub attendees: Vec<Uuid>,
}

pub fn router(state: &AppState) -> Router<AppState> {
    let event_router = Router::new()
        .route(
            "/events/{event_id}",
            get(get_event).put(update_event).delete(delete_event),
        )
        .route("/events/{event_id}/rsvp", post(rsvp).delete(cancel_rsvp))
        .route_layer(from_fn_with_state(state.clone(), load_event_middleware));

    Router::new()
        .route("/events", get(list_events).post(create_event))
        .merge(event_router)
}

async fn garden_for(pool: &SqlitePool, event: &Event) -> Result<Option<Garden>, ApiError> {
    match event.garden_id {
        Some(garden_id) => Ok(Some(
            Garden::find_by_id(pool, garden_id)
                .await?
                .ok_or_else(|| ApiError::not_found("Garden"))?,
        )),
        None => Ok(None),
    }
}

/// Creator, a manager of the event's garden, or an admin.
async fn ensure_event_editor(
    pool: &SqlitePool,
    event: &Event,
    ctx: &RequestContext,
) -> Result<(), ApiError> {
    if event.created_by == ctx.user_id() || ctx.is_admin() {
        return Ok(());
    }
    if let Some(garden) = garden_for(pool, event).await? {
        if can_manage_garden(pool, &garden, &ctx.user).await? {
            return Ok(());
        }
    }
    Err(ApiError::forbidden(
        "Only the organiser or a garden manager can change this event",
    ))
}

fn check_schedule(
    starts_at: chrono::DateTime<Utc>,
    ends_at: Option<chrono::DateTime<Utc>>,
) -> Result<(), ApiError> {
    match ends_at {
        Some(ends_at) if ends_at < starts_at => Err(ApiError::validation(
            "ends_at",
            "ends_at must not be before starts_at",
            json!(ends_at),
        )),
        _ => Ok(()),
    }
}

pub async fn list_events(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiQuery(query): ApiQuery<EventListQuery>,
) -> Result<ResponseJson<ApiResponse<Page<Event>>>, ApiError> {
    if let Some(garden_id) = query.garden_id {
        let garden = Garden::find_by_id(state.pool(), garden_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Garden"))?;
        ensure_garden_reader(state.pool(), &garden, &ctx.user).await?;
    }

    let pagination = query.page.resolve(event::SORTABLE)?;
    let filter = EventFilter {
        garden_id: query.garden_id,
        starts_after: query.upcoming.unwrap_or(false).then(Utc::now),
        attendee_id: query.attending.unwrap_or(false).then(|| ctx.user_id()),
        visible_to: (!ctx.is_admin()).then(|| ctx.user_id()),
    };
    let page = Event::list(state.pool(), &filter, &pagination).await?;
    Ok(ResponseJson(ApiResponse::success(page)))
}

/// Garden events need a member; platform-wide events need an admin.
#[instrument(name = "events.create", skip(state, ctx, payload), fields(user_id = %ctx.user.id))]
pub async fn create_event(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Validated(payload): Validated<CreateEvent>,
) -> Result<(StatusCode, ResponseJson<ApiResponse<Event>>), ApiError> {
    let pool = state.pool();
    match payload.garden_id {
        Some(garden_id) => {
            let garden = Garden::find_by_id(pool, garden_id)
                .await?
                .ok_or_else(|| ApiError::not_found("Garden"))?;
            ensure_garden_member(pool, &garden, &ctx.user).await?;
        }
        None => ensure_admin(&ctx)?,
    }
    check_schedule(payload.starts_at, payload.ends_at)?;

    let event = Event::create(pool, ctx.user_id(), &payload).await?;
    record_audit(
        pool,
        ctx.user_id(),
        "event.create",
        "event",
        event.id,
        json!({ "garden_id": event.garden_id, "title": event.title }),
    )
    .await;
    Ok((
        StatusCode::CREATED,
        ResponseJson(ApiResponse::success(event)),
    ))
}

pub async fn get_event(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Extension(event): Extension<Event>,
) -> Result<ResponseJson<ApiResponse<EventDetail>>, ApiError> {
    let pool = state.pool();
    if let Some(garden) = garden_for(pool, &event).await? {
        ensure_garden_reader(pool, &garden, &ctx.user).await?;
    }
    let attendees = Event::attendees(pool, event.id).await?;
    Ok(ResponseJson(ApiResponse::success(EventDetail {
        event,
        attendees,
    })))
}

#[instrument(name = "events.update", skip_all, fields(user_id = %ctx.user.id, event_id = %event.id))]
pub async fn update_event(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Extension(event): Extension<Event>,
    Validated(payload): Validated<UpdateEvent>,
) -> Result<ResponseJson<ApiResponse<Event>>, ApiError> {
    let pool = state.pool();
    ensure_event_editor(pool, &event, &ctx).await?;
    check_schedule(
        payload.starts_at.unwrap_or(event.starts_at),
        payload.ends_at.or(event.ends_at),
    )?;

    let updated = Event::update(pool, event.id, &payload).await?;
    Ok(ResponseJson(ApiResponse::success(updated)))
}

#[instrument(name = "events.delete", skip_all, fields(user_id = %ctx.user.id, event_id = %event.id))]
pub async fn delete_event(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Extension(event): Extension<Event>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    let pool = state.pool();
    ensure_event_editor(pool, &event, &ctx).await?;

    let rows_affected = Event::delete(pool, event.id).await?;
    if rows_affected == 0 {
        return Err(ApiError::not_found("Event"));
    }
    record_audit(
        pool,
        ctx.user_id(),
        "event.delete",
        "event",
        event.id,
        json!({ "title": event.title }),
    )
    .await;
    Ok(ResponseJson(ApiResponse::message("Event deleted")))
}

#[instrument(name = "events.rsvp", skip_all, fields(user_id = %ctx.user.id, event_id = %event.id))]
pub async fn rsvp(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Extension(event): Extension<Event>,
) -> Result<ResponseJson<ApiResponse<Event>>, ApiError> {
    let pool = state.pool();
    if let Some(garden) = garden_for(pool, &event).await? {
        ensure_garden_reader(pool, &garden, &ctx.user).await?;
    }
    let event = Event::rsvp(pool, event.id, ctx.user_id()).await?;
    Ok(ResponseJson(ApiResponse::success(event)))
}

pub async fn cancel_rsvp(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Extension(event): Extension<Event>,
) -> Result<ResponseJson<ApiResponse<Event>>, ApiError> {
    let event = Event::cancel_rsvp(state.pool(), event.id, ctx.user_id()).await?;
    Ok(ResponseJson(ApiResponse::success(event)))
}
