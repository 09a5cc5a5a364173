use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::common::{
    created_response, OptionalValidatedJson, PaginatedResponse, PaginationParams, ValidatedJson,
};
use crate::auth::AuthUser;
use crate::entities::order::OrderStatus;
use crate::entities::order_item;
use crate::errors::ServiceError;
use crate::services::orders::{OrderDetails, PlaceOrderRequest};
use crate::AppState;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemResponse {
    pub product: Uuid,
    pub name: String,
    pub image: Option<String>,
    pub quantity: i32,
    pub price: Decimal,
}

impl From<order_item::Model> for OrderItemResponse {
    fn from(item: order_item::Model) -> Self {
        Self {
            product: item.product_id,
            name: item.name,
            image: item.image,
            quantity: item.quantity,
            price: item.unit_price,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddressResponse {
    pub address: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub user: Uuid,
    pub order_items: Vec<OrderItemResponse>,
    pub shipping_address: ShippingAddressResponse,
    pub coupon_code: Option<String>,
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub shipping_cost: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
    pub status: OrderStatus,
    pub is_paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
    pub payment_reference: Option<String>,
    pub is_delivered: bool,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<OrderDetails> for OrderResponse {
    fn from(details: OrderDetails) -> Self {
        let OrderDetails { order, items } = details;
        Self {
            is_paid: order.is_paid(),
            is_delivered: order.is_delivered(),
            id: order.id,
            user: order.user_id,
            order_items: items.into_iter().map(OrderItemResponse::from).collect(),
            shipping_address: ShippingAddressResponse {
                address: order.shipping_address,
                city: order.shipping_city,
                postal_code: order.shipping_postal_code,
                country: order.shipping_country,
            },
            coupon_code: order.coupon_code,
            subtotal: order.subtotal,
            discount_amount: order.discount_amount,
            shipping_cost: order.shipping_cost,
            tax_amount: order.tax_amount,
            total_amount: order.total_amount,
            status: order.status,
            paid_at: order.paid_at,
            payment_reference: order.payment_reference,
            delivered_at: order.delivered_at,
            cancelled_at: order.cancelled_at,
            cancellation_reason: order.cancellation_reason,
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct OrderListQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateStatusRequest {
    #[validate(length(min = 1, max = 20))]
    pub status: String,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CancelOrderRequest {
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PayOrderRequest {
    #[validate(length(min = 1, max = 255))]
    pub payment_intent_id: String,
}

pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(place_order).get(list_orders))
        .route("/myorders", get(list_my_orders))
        .route("/:id", get(get_order))
        .route("/:id/status", put(update_order_status))
        .route("/:id/pay", put(pay_order))
        .route("/:id/cancel", put(cancel_order))
}

#[utoipa::path(
    post,
    path = "/api/orders",
    summary = "Place order",
    description = "Reserve stock, price the cart, redeem the coupon and create a pending order",
    request_body = PlaceOrderRequest,
    responses(
        (status = 201, description = "Order placed", body = OrderResponse),
        (status = 400, description = "Invalid items, insufficient stock or rejected coupon", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Coupon not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn place_order(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(request): ValidatedJson<PlaceOrderRequest>,
) -> Result<Response, ServiceError> {
    let details = state
        .services
        .orders
        .place_order(user.user_id, request)
        .await?;
    Ok(created_response(OrderResponse::from(details)))
}

#[utoipa::path(
    get,
    path = "/api/orders/myorders",
    summary = "List my orders",
    params(PaginationParams),
    responses(
        (status = 200, description = "Orders of the caller, newest first", body = PaginatedResponse<OrderResponse>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn list_my_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<PaginationParams>,
) -> Result<Json<PaginatedResponse<OrderResponse>>, ServiceError> {
    let (page, limit) = params.resolve(&state.config);
    let (orders, total) = state
        .services
        .orders
        .list_user_orders(user.user_id, page, limit)
        .await?;

    Ok(Json(PaginatedResponse::new(
        orders.into_iter().map(OrderResponse::from).collect(),
        page,
        limit,
        total,
    )))
}

#[utoipa::path(
    get,
    path = "/api/orders",
    summary = "List all orders",
    description = "Administrators only; optionally filtered by status",
    params(OrderListQuery),
    responses(
        (status = 200, description = "Orders, newest first", body = PaginatedResponse<OrderResponse>),
        (status = 400, description = "Unknown status filter", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<OrderListQuery>,
) -> Result<Json<PaginatedResponse<OrderResponse>>, ServiceError> {
    user.require_admin()?;

    let status = query
        .status
        .as_deref()
        .map(str::parse::<OrderStatus>)
        .transpose()?;
    let page = query.page.unwrap_or(1).max(1);
    let limit = state.config.page_size(query.limit);

    let (orders, total) = state
        .services
        .orders
        .list_orders(status, page, limit)
        .await?;

    Ok(Json(PaginatedResponse::new(
        orders.into_iter().map(OrderResponse::from).collect(),
        page,
        limit,
        total,
    )))
}

#[utoipa::path(
    get,
    path = "/api/orders/{id}",
    summary = "Get order",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order found", body = OrderResponse),
        (status = 403, description = "Not the owner", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderResponse>, ServiceError> {
    let details = state.services.orders.get_order(order_id).await?;
    if !user.can_access(details.order.user_id) {
        return Err(ServiceError::Forbidden(
            "Not authorized to view this order".to_string(),
        ));
    }
    Ok(Json(details.into()))
}

#[utoipa::path(
    put,
    path = "/api/orders/{id}/status",
    summary = "Update order status",
    description = "Administrators only. Cancelling returns the order's stock",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = OrderResponse),
        (status = 400, description = "Invalid status or transition", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order changed concurrently", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(order_id): Path<Uuid>,
    ValidatedJson(request): ValidatedJson<UpdateStatusRequest>,
) -> Result<Json<OrderResponse>, ServiceError> {
    user.require_admin()?;
    let status: OrderStatus = request.status.parse()?;

    let details = state
        .services
        .orders
        .update_status(order_id, status)
        .await?;
    Ok(Json(details.into()))
}

#[utoipa::path(
    put,
    path = "/api/orders/{id}/pay",
    summary = "Mark order paid",
    description = "Confirms the given payment intent with the provider and marks the order paid",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = PayOrderRequest,
    responses(
        (status = 200, description = "Order paid", body = OrderResponse),
        (status = 400, description = "Payment not completed", body = crate::errors::ErrorResponse),
        (status = 403, description = "Not the owner", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order or payment not found", body = crate::errors::ErrorResponse),
        (status = 503, description = "Payment provider unavailable", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn pay_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(order_id): Path<Uuid>,
    ValidatedJson(request): ValidatedJson<PayOrderRequest>,
) -> Result<Json<OrderResponse>, ServiceError> {
    let confirmation = state
        .services
        .payments
        .pay_order(order_id, &request.payment_intent_id, &user)
        .await?;
    Ok(Json(confirmation.order.into()))
}

#[utoipa::path(
    put,
    path = "/api/orders/{id}/cancel",
    summary = "Cancel order",
    description = "Owner or administrator. Only pending and processing orders can be cancelled",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body(content = CancelOrderRequest, description = "Optional cancellation reason"),
    responses(
        (status = 200, description = "Order cancelled", body = OrderResponse),
        (status = 400, description = "Order cannot be cancelled", body = crate::errors::ErrorResponse),
        (status = 403, description = "Not the owner", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(order_id): Path<Uuid>,
    OptionalValidatedJson(body): OptionalValidatedJson<CancelOrderRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let existing = state.services.orders.get_order(order_id).await?;
    if !user.can_access(existing.order.user_id) {
        return Err(ServiceError::Forbidden(
            "Not authorized to cancel this order".to_string(),
        ));
    }

    let reason = body.and_then(|request| request.reason);
    let details = state
        .services
        .orders
        .cancel_order(order_id, reason)
        .await?;
    Ok(Json(OrderResponse::from(details)))
}
