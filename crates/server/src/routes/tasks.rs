use axum::{
    Extension, Router,
    extract::State,
    http::StatusCode,
    middleware::from_fn_with_state,
    response::Json as ResponseJson,
    routing::{get, patch},
};
use db::models::{
    garden::{Garden, GardenMember},
    notification::NotificationKind,
    plot::Plot,
    task::{
        self, CreateTask, Task, TaskFilter, TaskPriority, TaskStatus, TaskWithAssignees,
        UpdateTask,
    },
};
use serde::Deserialize;
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
    middleware::{ApiQuery, Validated, load_task_middleware},
    routes::{
        access::{can_manage_garden, ensure_garden_member},
        activity::{notify, record_audit},
    },
    validation::{FieldRules, Rule, Validate, field, pagination_rules},
};

const TASK_STATUSES: &[&str] = &["pending", "in_progress", "completed", "cancelled"];
const TASK_PRIORITIES: &[&str] = &["low", "medium", "high", "urgent"];

impl Validate for CreateTask {
    fn rules() -> Vec<FieldRules> {
        vec![
            field("garden_id").required().string().uuid(),
            field("plot_id").string().uuid(),
            field("title").required().string().length(3, 200),
            field("description").string().max_length(2000),
            field("status").string().one_of(TASK_STATUSES),
            field("priority").string().one_of(TASK_PRIORITIES),
            field("due_date").string().datetime(),
            field("assignee_ids").array().each(Rule::Uuid),
        ]
    }
}

impl Validate for UpdateTask {
    fn rules() -> Vec<FieldRules> {
        vec![
            field("plot_id").string().uuid(),
            field("title").string().length(3, 200),
            field("description").string().max_length(2000),
            field("status").string().one_of(TASK_STATUSES),
            field("priority").string().one_of(TASK_PRIORITIES),
            field("due_date").string().datetime(),
            field("assignee_ids").array().each(Rule::Uuid),
        ]
    }
}

#[derive(Debug, Deserialize)]
pub struct TaskListQuery {
    #[serde(flatten)]
    pub page: PageParams,
    pub garden_id: Option<Uuid>,
    pub plot_id: Option<Uuid>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub assignee_id: Option<Uuid>,
}

impl Validate for TaskListQuery {
    fn rules() -> Vec<FieldRules> {
        let mut rules = pagination_rules();
        rules.extend([
            field("garden_id").uuid(),
            field("plot_id").uuid(),
            field("status").one_of(TASK_STATUSES),
            field("priority").one_of(TASK_PRIORITIES),
            field("assignee_id").uuid(),
        ]);
        rules
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: TaskStatus,
}

impl Validate for UpdateStatusRequest {
    fn rules() -> Vec<FieldRules> {
        vec![field("status").required().string().one_of(TASK_STATUSES)]
    }
}

pub fn router(state: &AppState) -> Router<AppState> {
    let task_router = Router::new()
        .route(
            "/tasks/{task_id}",
            get(get_task).put(update_task).delete(delete_task),
        )
        .route("/tasks/{task_id}/status", patch(update_status))
        .route_layer(from_fn_with_state(state.clone(), load_task_middleware));

    Router::new()
        .route("/tasks", get(list_tasks).post(create_task))
        .merge(task_router)
}

/// A task's plot must sit in the task's garden.
async fn ensure_plot_in_garden(
    pool: &SqlitePool,
    plot_id: Option<Uuid>,
    garden_id: Uuid,
) -> Result<(), ApiError> {
    let Some(plot_id) = plot_id else {
        return Ok(());
    };
    match Plot::find_by_id(pool, plot_id).await? {
        Some(plot) if plot.garden_id == garden_id => Ok(()),
        Some(_) => Err(ApiError::BadRequest(
            "Plot does not belong to this garden".to_string(),
        )),
        None => Err(ApiError::not_found("Plot")),
    }
}

async fn ensure_assignees_are_members(
    pool: &SqlitePool,
    garden_id: Uuid,
    assignee_ids: &[Uuid],
) -> Result<(), ApiError> {
    for user_id in assignee_ids {
        if GardenMember::find(pool, garden_id, *user_id).await?.is_none() {
            return Err(ApiError::BadRequest(format!(
                "Assignee {user_id} is not a member of this garden"
            )));
        }
    }
    Ok(())
}

async fn notify_assignees(pool: &SqlitePool, task: &Task, user_ids: &[Uuid], actor: Uuid) {
    for user_id in user_ids.iter().filter(|id| **id != actor) {
        notify(
            pool,
            *user_id,
            NotificationKind::Task,
            "New task assigned",
            format!("You were assigned \"{}\"", task.title),
            Some(format!("/tasks/{}", task.id)),
        )
        .await;
    }
}

#[instrument(name = "tasks.list", skip(state, ctx, query), fields(user_id = %ctx.user.id))]
pub async fn list_tasks(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiQuery(query): ApiQuery<TaskListQuery>,
) -> Result<ResponseJson<ApiResponse<Page<TaskWithAssignees>>>, ApiError> {
    let pagination = query.page.resolve(task::SORTABLE)?;
    let filter = TaskFilter {
        garden_id: query.garden_id,
        plot_id: query.plot_id,
        status: query.status,
        priority: query.priority,
        assignee_id: query.assignee_id,
        member_id: (!ctx.is_admin()).then(|| ctx.user_id()),
    };
    let page = Task::list(state.pool(), &filter, &pagination).await?;
    Ok(ResponseJson(ApiResponse::success(page)))
}

#[instrument(name = "tasks.create", skip(state, ctx, payload), fields(user_id = %ctx.user.id, garden_id = %payload.garden_id))]
pub async fn create_task(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Validated(payload): Validated<CreateTask>,
) -> Result<(StatusCode, ResponseJson<ApiResponse<TaskWithAssignees>>), ApiError> {
    let pool = state.pool();
    let garden = Garden::find_by_id(pool, payload.garden_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Garden"))?;
    ensure_garden_member(pool, &garden, &ctx.user).await?;
    ensure_plot_in_garden(pool, payload.plot_id, garden.id).await?;
    ensure_assignees_are_members(pool, garden.id, &payload.assignee_ids).await?;

    let created = Task::create(pool, ctx.user_id(), &payload).await?;
    notify_assignees(pool, &created.task, &created.assignees, ctx.user_id()).await;
    record_audit(
        pool,
        ctx.user_id(),
        "task.create",
        "task",
        created.id,
        json!({ "garden_id": garden.id, "title": created.title }),
    )
    .await;

    Ok((
        StatusCode::CREATED,
        ResponseJson(ApiResponse::success(created)),
    ))
}

pub async fn get_task(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Extension(garden): Extension<Garden>,
    Extension(task): Extension<TaskWithAssignees>,
) -> Result<ResponseJson<ApiResponse<TaskWithAssignees>>, ApiError> {
    ensure_garden_member(state.pool(), &garden, &ctx.user).await?;
    Ok(ResponseJson(ApiResponse::success(task)))
}

#[instrument(name = "tasks.update", skip_all, fields(user_id = %ctx.user.id, task_id = %task.id))]
pub async fn update_task(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Extension(garden): Extension<Garden>,
    Extension(task): Extension<TaskWithAssignees>,
    Validated(payload): Validated<UpdateTask>,
) -> Result<ResponseJson<ApiResponse<TaskWithAssignees>>, ApiError> {
    let pool = state.pool();
    ensure_garden_member(pool, &garden, &ctx.user).await?;
    ensure_plot_in_garden(pool, payload.plot_id, garden.id).await?;

    let new_assignees: Vec<Uuid> = match &payload.assignee_ids {
        Some(ids) => {
            ensure_assignees_are_members(pool, garden.id, ids).await?;
            ids.iter()
                .filter(|id| !task.assignees.contains(id))
                .copied()
                .collect()
        }
        None => Vec::new(),
    };

    let updated = Task::update(pool, task.id, &payload).await?;
    notify_assignees(pool, &updated.task, &new_assignees, ctx.user_id()).await;
    Ok(ResponseJson(ApiResponse::success(updated)))
}

#[instrument(name = "tasks.update_status", skip_all, fields(user_id = %ctx.user.id, task_id = %task.id))]
pub async fn update_status(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Extension(garden): Extension<Garden>,
    Extension(task): Extension<TaskWithAssignees>,
    Validated(payload): Validated<UpdateStatusRequest>,
) -> Result<ResponseJson<ApiResponse<Task>>, ApiError> {
    ensure_garden_member(state.pool(), &garden, &ctx.user).await?;
    let updated = Task::update_status(state.pool(), task.id, payload.status).await?;

    if updated.status != task.status && task.created_by != ctx.user_id() {
        notify(
            state.pool(),
            task.created_by,
            NotificationKind::Task,
            "Task status changed",
            format!("\"{}\" is now {}", updated.title, updated.status),
            Some(format!("/tasks/{}", updated.id)),
        )
        .await;
    }
    Ok(ResponseJson(ApiResponse::success(updated)))
}

#[instrument(name = "tasks.delete", skip_all, fields(user_id = %ctx.user.id, task_id = %task.id))]
pub async fn delete_task(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Extension(garden): Extension<Garden>,
    Extension(task): Extension<TaskWithAssignees>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    let pool = state.pool();
    if task.created_by != ctx.user_id() && !can_manage_garden(pool, &garden, &ctx.user).await? {
        return Err(ApiError::forbidden(
            "Only the creator or a garden manager can delete this task",
        ));
    }

    let rows_affected = Task::delete(pool, task.id).await?;
    if rows_affected == 0 {
        return Err(ApiError::not_found("Task"));
    }
    record_audit(
        pool,
        ctx.user_id(),
        "task.delete",
        "task",
        task.id,
        json!({ "garden_id": garden.id, "title": task.title }),
    )
    .await;
    Ok(ResponseJson(ApiResponse::message("Task deleted")))
}
