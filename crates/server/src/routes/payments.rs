use axum::{
    Extension, Router,
    extract::State,
    http::StatusCode,
    response::Json as ResponseJson,
    routing::{get, patch},
};
use db::models::{
    garden::Garden,
    notification::NotificationKind,
    payment::{self, CreatePayment, Payment, PaymentFilter, PaymentStatus},
    plot::Plot,
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
    middleware::{ApiPath, ApiQuery, Validated},
    routes::{
        access::{ensure_garden_member, ensure_garden_owner},
        activity::{notify, record_audit},
    },
    validation::{FieldRules, Validate, field, pagination_rules},
};

const CURRENCIES: &[&str] = &["usd", "eur", "gbp", "cad", "aud"];
const PURPOSES: &[&str] = &["plot_fee", "membership", "donation", "event", "other"];
const STATUSES: &[&str] = &["pending", "completed", "failed", "refunded"];

impl Validate for CreatePayment {
    fn rules() -> Vec<FieldRules> {
        vec![
            field("garden_id").string().uuid(),
            field("plot_id").string().uuid(),
            field("amount_cents")
                .required()
                .integer()
                .range(1.0, 100_000_000.0),
            field("currency").string().one_of(CURRENCIES),
            field("purpose").required().string().one_of(PURPOSES),
            field("reference").string().max_length(200),
        ]
    }
}

#[derive(Debug, Deserialize)]
pub struct PaymentListQuery {
    #[serde(flatten)]
    pub page: PageParams,
    pub user_id: Option<Uuid>,
    pub garden_id: Option<Uuid>,
    pub status: Option<PaymentStatus>,
}

impl Validate for PaymentListQuery {
    fn rules() -> Vec<FieldRules> {
        let mut rules = pagination_rules();
        rules.extend([
            field("user_id").uuid(),
            field("garden_id").uuid(),
            field("status").one_of(STATUSES),
        ]);
        rules
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdatePaymentStatus {
    pub status: PaymentStatus,
}

impl Validate for UpdatePaymentStatus {
    fn rules() -> Vec<FieldRules> {
        vec![field("status").required().string().one_of(STATUSES)]
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/payments", get(list_payments).post(create_payment))
        .route("/payments/{payment_id}", get(get_payment))
        .route("/payments/{payment_id}/status", patch(update_status))
}

async fn find_payment(state: &AppState, payment_id: Uuid) -> Result<Payment, ApiError> {
    Payment::find_by_id(state.pool(), payment_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Payment"))
}

/// Non-admins only ever see their own payments.
pub async fn list_payments(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiQuery(query): ApiQuery<PaymentListQuery>,
) -> Result<ResponseJson<ApiResponse<Page<Payment>>>, ApiError> {
    let pagination = query.page.resolve(payment::SORTABLE)?;
    let filter = PaymentFilter {
        user_id: if ctx.is_admin() {
            query.user_id
        } else {
            Some(ctx.user_id())
        },
        garden_id: query.garden_id,
        status: query.status,
    };
    let page = Payment::list(state.pool(), &filter, &pagination).await?;
    Ok(ResponseJson(ApiResponse::success(page)))
}

#[instrument(name = "payments.create", skip(state, ctx, payload), fields(user_id = %ctx.user.id))]
pub async fn create_payment(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Validated(payload): Validated<CreatePayment>,
) -> Result<(StatusCode, ResponseJson<ApiResponse<Payment>>), ApiError> {
    let pool = state.pool();

    if let Some(garden_id) = payload.garden_id {
        let garden = Garden::find_by_id(pool, garden_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Garden"))?;
        ensure_garden_member(pool, &garden, &ctx.user).await?;
    }
    if let Some(plot_id) = payload.plot_id {
        let plot = Plot::find_by_id(pool, plot_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Plot"))?;
        if payload.garden_id.is_some_and(|garden_id| garden_id != plot.garden_id) {
            return Err(ApiError::BadRequest(
                "Plot does not belong to this garden".to_string(),
            ));
        }
    }

    let payment = Payment::create(pool, ctx.user_id(), &payload).await?;
    record_audit(
        pool,
        ctx.user_id(),
        "payment.create",
        "payment",
        payment.id,
        json!({ "amount_cents": payment.amount_cents, "currency": payment.currency }),
    )
    .await;
    tracing::info!(
        payment_id = %payment.id,
        amount_cents = payment.amount_cents,
        "payment recorded"
    );

    Ok((
        StatusCode::CREATED,
        ResponseJson(ApiResponse::success(payment)),
    ))
}

pub async fn get_payment(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(payment_id): ApiPath<Uuid>,
) -> Result<ResponseJson<ApiResponse<Payment>>, ApiError> {
    let payment = find_payment(&state, payment_id).await?;
    if payment.user_id != ctx.user_id() && !ctx.is_admin() {
        return Err(ApiError::forbidden("You can only view your own payments"));
    }
    Ok(ResponseJson(ApiResponse::success(payment)))
}

/// Admins settle any payment; garden owners settle payments made to their garden.
#[instrument(name = "payments.update_status", skip(state, ctx, payload), fields(user_id = %ctx.user.id, payment_id = %payment_id))]
pub async fn update_status(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(payment_id): ApiPath<Uuid>,
    Validated(payload): Validated<UpdatePaymentStatus>,
) -> Result<ResponseJson<ApiResponse<Payment>>, ApiError> {
    let pool = state.pool();
    let existing = find_payment(&state, payment_id).await?;

    if !ctx.is_admin() {
        let Some(garden_id) = existing.garden_id else {
            return Err(ApiError::forbidden("Admin access required"));
        };
        let garden = Garden::find_by_id(pool, garden_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Garden"))?;
        ensure_garden_owner(&garden, &ctx.user)?;
    }

    let payment = Payment::update_status(pool, existing.id, payload.status).await?;

    notify(
        pool,
        payment.user_id,
        NotificationKind::Payment,
        "Payment updated",
        format!(
            "Your payment of {} {} is now {}",
            payment.amount_cents, payment.currency, payment.status
        ),
        Some(format!("/payments/{}", payment.id)),
    )
    .await;
    record_audit(
        pool,
        ctx.user_id(),
        "payment.status_change",
        "payment",
        payment.id,
        json!({ "from": existing.status, "to": payment.status }),
    )
    .await;
    Ok(ResponseJson(ApiResponse::success(payment)))
}
