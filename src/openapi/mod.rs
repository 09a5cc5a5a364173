use axum::Json;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Fragrance Storefront API",
        version = "0.1.0",
        description = r#"
Order fulfillment and inventory engine for the fragrance storefront.

## Authentication

Every `/api` endpoint requires a bearer JWT:

```
Authorization: Bearer <your-jwt-token>
```

Administrative endpoints additionally require the `admin` role.

## Errors

Failures share one body shape:

```json
{
  "error": "Bad Request",
  "message": "Insufficient stock for Lavender Dream, available: 3",
  "requestId": "6f1c...",
  "timestamp": "2025-01-01T00:00:00Z"
}
```
        "#
    ),
    tags(
        (name = "orders", description = "Order placement and lifecycle"),
        (name = "coupons", description = "Coupon validation and administration"),
        (name = "payments", description = "Payment intents and confirmation"),
        (name = "health", description = "Service health")
    ),
    paths(
        crate::handlers::orders::place_order,
        crate::handlers::orders::list_my_orders,
        crate::handlers::orders::list_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::update_order_status,
        crate::handlers::orders::pay_order,
        crate::handlers::orders::cancel_order,
        crate::handlers::coupons::validate_coupon,
        crate::handlers::coupons::create_coupon,
        crate::handlers::coupons::list_coupons,
        crate::handlers::payments::create_payment_intent,
        crate::handlers::payments::confirm_payment,
        crate::handlers::health::health_check,
    ),
    components(
        schemas(
            crate::handlers::orders::OrderResponse,
            crate::handlers::orders::OrderItemResponse,
            crate::handlers::orders::ShippingAddressResponse,
            crate::handlers::orders::UpdateStatusRequest,
            crate::handlers::orders::CancelOrderRequest,
            crate::handlers::orders::PayOrderRequest,
            crate::services::orders::PlaceOrderRequest,
            crate::services::orders::LineItemRequest,
            crate::services::orders::ShippingAddress,
            crate::entities::order::OrderStatus,
            crate::handlers::coupons::ValidateCouponRequest,
            crate::handlers::coupons::CouponValidationResponse,
            crate::services::coupons::CreateCouponRequest,
            crate::services::coupons::CouponSummary,
            crate::entities::coupon::DiscountType,
            crate::services::payments::CreateIntentRequest,
            crate::services::payments::ConfirmPaymentRequest,
            crate::services::payments::IntentCreated,
            crate::handlers::payments::PaymentConfirmationResponse,
            crate::handlers::health::HealthResponse,
            crate::errors::ErrorResponse
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "Bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Serves the generated OpenAPI document
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_engine_routes() {
        let json = serde_json::to_string(&ApiDoc::openapi()).unwrap();
        assert!(json.contains("/api/orders/{id}/cancel"));
        assert!(json.contains("/api/payments/confirm"));
        assert!(json.contains("\"Bearer\""));
    }
}
