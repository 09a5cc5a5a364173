use axum::{
    extract::{Query, State},
    response::Response,
    routing::post,
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use super::common::{created_response, PaginatedResponse, PaginationParams, ValidatedJson};
use crate::auth::AuthUser;
use crate::entities::coupon::DiscountType;
use crate::errors::ServiceError;
use crate::services::coupons::{CouponSummary, CreateCouponRequest};
use crate::AppState;

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ValidateCouponRequest {
    #[validate(length(min = 1, max = 32))]
    pub code: String,
    #[validate(custom = "validate_order_amount")]
    pub order_amount: Decimal,
}

fn validate_order_amount(value: &Decimal) -> Result<(), validator::ValidationError> {
    if value.is_sign_negative() {
        return Err(validator::ValidationError::new("negative_amount"));
    }
    Ok(())
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CouponValidationResponse {
    pub valid: bool,
    pub code: String,
    pub discount: Decimal,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub description: Option<String>,
}

pub fn coupon_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_coupon).get(list_coupons))
        .route("/validate", post(validate_coupon))
}

#[utoipa::path(
    post,
    path = "/api/coupons/validate",
    summary = "Validate coupon",
    description = "Checks whether the caller can apply a coupon to an order amount and returns the discount",
    request_body = ValidateCouponRequest,
    responses(
        (status = 200, description = "Coupon applies", body = CouponValidationResponse),
        (status = 400, description = "Coupon expired, exhausted, already used or below minimum", body = crate::errors::ErrorResponse),
        (status = 404, description = "Coupon not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "coupons"
)]
pub async fn validate_coupon(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(request): ValidatedJson<ValidateCouponRequest>,
) -> Result<Json<CouponValidationResponse>, ServiceError> {
    let quote = state
        .services
        .coupons
        .quote(&request.code, user.user_id, request.order_amount)
        .await?;

    Ok(Json(CouponValidationResponse {
        valid: true,
        code: quote.coupon.code,
        discount: quote.discount,
        discount_type: quote.coupon.discount_type,
        discount_value: quote.coupon.discount_value,
        description: quote.coupon.description,
    }))
}

#[utoipa::path(
    post,
    path = "/api/coupons",
    summary = "Create coupon",
    description = "Administrators only",
    request_body = CreateCouponRequest,
    responses(
        (status = 201, description = "Coupon created", body = CouponSummary),
        (status = 400, description = "Invalid coupon or duplicate code", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "coupons"
)]
pub async fn create_coupon(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(request): ValidatedJson<CreateCouponRequest>,
) -> Result<Response, ServiceError> {
    user.require_admin()?;
    let coupon = state.services.coupons.create_coupon(request).await?;
    Ok(created_response(CouponSummary::from(coupon)))
}

#[utoipa::path(
    get,
    path = "/api/coupons",
    summary = "List coupons",
    description = "Administrators only",
    params(PaginationParams),
    responses(
        (status = 200, description = "Coupons, newest first", body = PaginatedResponse<CouponSummary>),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "coupons"
)]
pub async fn list_coupons(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<PaginationParams>,
) -> Result<Json<PaginatedResponse<CouponSummary>>, ServiceError> {
    user.require_admin()?;
    let (page, limit) = params.resolve(&state.config);
    let (coupons, total) = state.services.coupons.list_coupons(page, limit).await?;

    Ok(Json(PaginatedResponse::new(
        coupons.into_iter().map(CouponSummary::from).collect(),
        page,
        limit,
        total,
    )))
}
