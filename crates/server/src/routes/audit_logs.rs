use axum::{Extension, Router, extract::State, response::Json as ResponseJson, routing::get};
use db::models::audit_log::{self, AuditLog, AuditLogFilter};
use serde::Deserialize;
use utils::{
    pagination::{Page, PageParams},
    response::ApiResponse,
};
use uuid::Uuid;

use crate::{
    AppState,
    auth::RequestContext,
    error::ApiError,
    middleware::ApiQuery,
    routes::access::ensure_admin,
    validation::{FieldRules, Validate, field, pagination_rules},
};

#[derive(Debug, Deserialize)]
pub struct AuditLogQuery {
    #[serde(flatten)]
    pub page: PageParams,
    pub actor_id: Option<Uuid>,
    pub entity_type: Option<String>,
    pub entity_id: Option<Uuid>,
    pub action: Option<String>,
}

impl Validate for AuditLogQuery {
    fn rules() -> Vec<FieldRules> {
        let mut rules = pagination_rules();
        rules.extend([
            field("actor_id").uuid(),
            field("entity_type").string().max_length(50),
            field("entity_id").uuid(),
            field("action").string().max_length(100),
        ]);
        rules
    }
}

pub fn router() -> Router<AppState> {
    Router::new().route("/audit-logs", get(list_audit_logs))
}

pub async fn list_audit_logs(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiQuery(query): ApiQuery<AuditLogQuery>,
) -> Result<ResponseJson<ApiResponse<Page<AuditLog>>>, ApiError> {
    ensure_admin(&ctx)?;
    let pagination = query.page.resolve(audit_log::SORTABLE)?;
    let filter = AuditLogFilter {
        actor_id: query.actor_id,
        entity_type: query.entity_type,
        entity_id: query.entity_id,
        action: query.action,
    };
    let page = AuditLog::list(state.pool(), &filter, &pagination).await?;
    Ok(ResponseJson(ApiResponse::success(page)))
}
