use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use db::models::{
    document::Document, event::Event, garden::Garden, plot::Plot, post::Post, task::Task,
};
use serde::Deserialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::ApiPath;
use crate::{AppState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct GardenParams {
    pub garden_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct PlotParams {
    pub plot_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct TaskParams {
    pub task_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct EventParams {
    pub event_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct DocumentParams {
    pub document_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct PostParams {
    pub post_id: Uuid,
}

/// Turn a lookup result into a 404 when the row is missing.
fn found<T>(
    result: Result<Option<T>, sqlx::Error>,
    resource: &str,
    id: Uuid,
) -> Result<T, ApiError> {
    match result {
        Ok(Some(model)) => Ok(model),
        Ok(None) => {
            tracing::debug!("{} {} not found", resource, id);
            Err(ApiError::not_found(resource))
        }
        Err(e) => {
            tracing::error!("Failed to fetch {} {}: {}", resource, id, e);
            Err(ApiError::Database(e))
        }
    }
}

async fn garden_of(pool: &SqlitePool, garden_id: Uuid) -> Result<Garden, ApiError> {
    found(Garden::find_by_id(pool, garden_id).await, "Garden", garden_id)
}

pub async fn load_garden_middleware(
    State(state): State<AppState>,
    ApiPath(params): ApiPath<GardenParams>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let garden = garden_of(state.pool(), params.garden_id).await?;
    request.extensions_mut().insert(garden);
    Ok(next.run(request).await)
}

/// Loads the plot and the garden it belongs to.
pub async fn load_plot_middleware(
    State(state): State<AppState>,
    ApiPath(params): ApiPath<PlotParams>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let pool = state.pool();
    let plot = found(Plot::find_by_id(pool, params.plot_id).await, "Plot", params.plot_id)?;
    let garden = garden_of(pool, plot.garden_id).await?;

    request.extensions_mut().insert(plot);
    request.extensions_mut().insert(garden);
    Ok(next.run(request).await)
}

/// Loads the task with its assignees, plus its garden.
pub async fn load_task_middleware(
    State(state): State<AppState>,
    ApiPath(params): ApiPath<TaskParams>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let pool = state.pool();
    let task = found(
        Task::find_with_assignees(pool, params.task_id).await,
        "Task",
        params.task_id,
    )?;
    let garden = garden_of(pool, task.garden_id).await?;

    request.extensions_mut().insert(task);
    request.extensions_mut().insert(garden);
    Ok(next.run(request).await)
}

/// Events may be platform-wide, so no garden is attached here.
pub async fn load_event_middleware(
    State(state): State<AppState>,
    ApiPath(params): ApiPath<EventParams>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let event = found(
        Event::find_by_id(state.pool(), params.event_id).await,
        "Event",
        params.event_id,
    )?;
    request.extensions_mut().insert(event);
    Ok(next.run(request).await)
}

pub async fn load_document_middleware(
    State(state): State<AppState>,
    ApiPath(params): ApiPath<DocumentParams>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let pool = state.pool();
    let document = found(
        Document::find_by_id(pool, params.document_id).await,
        "Document",
        params.document_id,
    )?;
    let garden = garden_of(pool, document.garden_id).await?;

    request.extensions_mut().insert(document);
    request.extensions_mut().insert(garden);
    Ok(next.run(request).await)
}

pub async fn load_post_middleware(
    State(state): State<AppState>,
    ApiPath(params): ApiPath<PostParams>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let post = found(
        Post::find_by_id(state.pool(), params.post_id).await,
        "Post",
        params.post_id,
    )?;
    request.extensions_mut().insert(post);
    Ok(next.run(request).await)
}
