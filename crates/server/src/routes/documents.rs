use axum::{
    Extension, Router,
    extract::State,
    http::StatusCode,
    middleware::from_fn_with_state,
    response::Json as ResponseJson,
    routing::get,
};
use db::models::{
    document::{self, CreateDocument, Document, DocumentCategory},
    garden::Garden,
};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;
use utils::{
    pagination::{Page, PageParams},
    response::ApiResponse,
};

use crate::{
    AppState,
    auth::RequestContext,
    error::ApiError,
    middleware::{ApiQuery, Validated, load_document_middleware, load_garden_middleware},
    routes::{
        access::{can_manage_garden, ensure_garden_manager, ensure_garden_member},
        activity::record_audit,
    },
    validation::{FieldRules, HTTP_URL_RE, Validate, field, pagination_rules},
};

const CATEGORIES: &[&str] = &["rules", "minutes", "guide", "form", "media", "other"];

impl Validate for CreateDocument {
    const RAW_FIELDS: &'static [&'static str] = &["url"];

    fn rules() -> Vec<FieldRules> {
        vec![
            field("title").required().string().length(2, 200),
            field("url")
                .required()
                .string()
                .max_length(2048)
                .matches(&HTTP_URL_RE, "must be an http(s) URL"),
            field("category").string().one_of(CATEGORIES),
            field("mime_type").string().max_length(100),
        ]
    }
}

#[derive(Debug, Deserialize)]
pub struct DocumentListQuery {
    #[serde(flatten)]
    pub page: PageParams,
    pub category: Option<DocumentCategory>,
}

impl Validate for DocumentListQuery {
    fn rules() -> Vec<FieldRules> {
        let mut rules = pagination_rules();
        rules.push(field("category").one_of(CATEGORIES));
        rules
    }
}

pub fn router(state: &AppState) -> Router<AppState> {
    let garden_router = Router::new()
        .route(
            "/gardens/{garden_id}/documents",
            get(list_documents).post(create_document),
        )
        .route_layer(from_fn_with_state(state.clone(), load_garden_middleware));

    let document_router = Router::new()
        .route(
            "/documents/{document_id}",
            get(get_document).delete(delete_document),
        )
        .route_layer(from_fn_with_state(state.clone(), load_document_middleware));

    Router::new().merge(garden_router).merge(document_router)
}

pub async fn list_documents(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Extension(garden): Extension<Garden>,
    ApiQuery(query): ApiQuery<DocumentListQuery>,
) -> Result<ResponseJson<ApiResponse<Page<Document>>>, ApiError> {
    ensure_garden_member(state.pool(), &garden, &ctx.user).await?;
    let pagination = query.page.resolve(document::SORTABLE)?;
    let page =
        Document::list_for_garden(state.pool(), garden.id, query.category, &pagination).await?;
    Ok(ResponseJson(ApiResponse::success(page)))
}

#[instrument(name = "documents.create", skip_all, fields(user_id = %ctx.user.id, garden_id = %garden.id))]
pub async fn create_document(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Extension(garden): Extension<Garden>,
    Validated(payload): Validated<CreateDocument>,
) -> Result<(StatusCode, ResponseJson<ApiResponse<Document>>), ApiError> {
    ensure_garden_manager(state.pool(), &garden, &ctx.user).await?;
    let document = Document::create(state.pool(), garden.id, ctx.user_id(), &payload).await?;
    record_audit(
        state.pool(),
        ctx.user_id(),
        "document.create",
        "document",
        document.id,
        json!({ "garden_id": garden.id, "title": document.title }),
    )
    .await;
    Ok((
        StatusCode::CREATED,
        ResponseJson(ApiResponse::success(document)),
    ))
}

pub async fn get_document(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Extension(garden): Extension<Garden>,
    Extension(document): Extension<Document>,
) -> Result<ResponseJson<ApiResponse<Document>>, ApiError> {
    ensure_garden_member(state.pool(), &garden, &ctx.user).await?;
    Ok(ResponseJson(ApiResponse::success(document)))
}

#[instrument(name = "documents.delete", skip_all, fields(user_id = %ctx.user.id, document_id = %document.id))]
pub async fn delete_document(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Extension(garden): Extension<Garden>,
    Extension(document): Extension<Document>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    let pool = state.pool();
    if document.uploaded_by != ctx.user_id() && !can_manage_garden(pool, &garden, &ctx.user).await?
    {
        return Err(ApiError::forbidden(
            "Only the uploader or a garden manager can delete this document",
        ));
    }

    let rows_affected = Document::delete(pool, document.id).await?;
    if rows_affected == 0 {
        return Err(ApiError::not_found("Document"));
    }
    record_audit(
        pool,
        ctx.user_id(),
        "document.delete",
        "document",
        document.id,
        json!({ "garden_id": garden.id }),
    )
    .await;
    Ok(ResponseJson(ApiResponse::message("Document deleted")))
}
