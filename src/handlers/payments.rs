use axum::{extract::State, routing::post, Json, Router};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use super::common::ValidatedJson;
use crate::auth::AuthUser;
use crate::entities::order::OrderStatus;
use crate::errors::ServiceError;
use crate::services::payments::{ConfirmPaymentRequest, CreateIntentRequest, IntentCreated};
use crate::AppState;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentConfirmationResponse {
    pub message: String,
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub is_paid: bool,
    pub receipt_url: Option<String>,
}

pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/create-payment-intent", post(create_payment_intent))
        .route("/confirm", post(confirm_payment))
}

#[utoipa::path(
    post,
    path = "/api/payments/create-payment-intent",
    summary = "Create payment intent",
    description = "Starts payment for a pending order owned by the caller",
    request_body = CreateIntentRequest,
    responses(
        (status = 200, description = "Intent created", body = IntentCreated),
        (status = 400, description = "Order is not awaiting payment", body = crate::errors::ErrorResponse),
        (status = 401, description = "Not the owner of the order", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 503, description = "Payment provider unavailable", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "payments"
)]
pub async fn create_payment_intent(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(request): ValidatedJson<CreateIntentRequest>,
) -> Result<Json<IntentCreated>, ServiceError> {
    let created = state
        .services
        .payments
        .create_intent(request.order_id, &user)
        .await?;
    Ok(Json(created))
}

#[utoipa::path(
    post,
    path = "/api/payments/confirm",
    summary = "Confirm payment",
    description = "Re-checks the intent with the provider and marks the order paid; repeating the call is a no-op",
    request_body = ConfirmPaymentRequest,
    responses(
        (status = 200, description = "Payment confirmed or already processed", body = PaymentConfirmationResponse),
        (status = 400, description = "Payment has not succeeded yet", body = crate::errors::ErrorResponse),
        (status = 403, description = "Not the payer", body = crate::errors::ErrorResponse),
        (status = 404, description = "Payment record not found", body = crate::errors::ErrorResponse),
        (status = 503, description = "Payment provider unavailable", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "payments"
)]
pub async fn confirm_payment(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(request): ValidatedJson<ConfirmPaymentRequest>,
) -> Result<Json<PaymentConfirmationResponse>, ServiceError> {
    let confirmation = state
        .services
        .payments
        .confirm(&request.payment_intent_id, &user)
        .await?;

    let message = if confirmation.already_processed {
        "Payment already processed"
    } else {
        "Payment confirmed"
    };

    Ok(Json(PaymentConfirmationResponse {
        message: message.to_string(),
        order_id: confirmation.order.order.id,
        status: confirmation.order.order.status,
        is_paid: confirmation.order.order.is_paid(),
        receipt_url: confirmation.payment.receipt_url,
    }))
}
