mod common;

use axum::http::{Method, StatusCode};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use uuid::Uuid;

use common::{read_json, TestApp};
use fragrance_api::services::payment_provider::IntentStatus;

fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => s.parse().expect("decimal string"),
        Value::Number(n) => n.to_string().parse().expect("decimal number"),
        other => panic!("not a decimal: {other}"),
    }
}

fn order_body(product_id: Uuid, quantity: i32, coupon: Option<&str>) -> Value {
    let mut body = json!({
        "orderItems": [{ "productId": product_id, "quantity": quantity }],
        "shippingAddress": {
            "address": "4 Rue des Roses",
            "city": "Paris",
            "postalCode": "75001",
            "country": "France"
        }
    });
    if let Some(code) = coupon {
        body["couponCode"] = json!(code);
    }
    body
}

#[tokio::test]
async fn health_and_docs_are_public() {
    let app = TestApp::new().await;

    let health = app.request(Method::GET, "/health", None, None).await;
    assert_eq!(health.status(), StatusCode::OK);
    assert!(health.headers().contains_key("x-request-id"));
    let body = read_json(health).await;
    assert_eq!(body["status"], "up");
    assert_eq!(body["database"]["status"], "up");

    let docs = app
        .request(Method::GET, "/api-docs/openapi.json", None, None)
        .await;
    assert_eq!(docs.status(), StatusCode::OK);
    let doc = read_json(docs).await;
    assert!(doc["paths"].get("/api/orders").is_some());

    let metrics = app.request(Method::GET, "/metrics", None, None).await;
    assert_eq!(metrics.status(), StatusCode::OK);
}

#[tokio::test]
async fn order_endpoints_require_a_bearer_token() {
    let app = TestApp::new().await;

    let missing = app.request(Method::GET, "/api/orders/myorders", None, None).await;
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let garbage = app
        .request(Method::GET, "/api/orders/myorders", None, Some("not-a-jwt"))
        .await;
    assert_eq!(garbage.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn place_order_over_http_applies_coupon_and_shipping() {
    let app = TestApp::new().await;
    let product = app.seed_product("Lavender Dream", dec!(100.00), 5).await;
    app.seed_coupon("SAVE10", dec!(10), dec!(200), None).await;
    let (user_id, token) = app.customer();

    let response = app
        .request(
            Method::POST,
            "/api/orders",
            Some(order_body(product.id, 3, Some("SAVE10"))),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let order = read_json(response).await;
    assert_eq!(order["user"], json!(user_id));
    assert_eq!(order["status"], "pending");
    assert_eq!(order["isPaid"], false);
    assert_eq!(decimal(&order["subtotal"]), dec!(300));
    assert_eq!(decimal(&order["discountAmount"]), dec!(30));
    assert_eq!(decimal(&order["shippingCost"]), dec!(10));
    assert_eq!(decimal(&order["totalAmount"]), dec!(280));
    assert_eq!(order["orderItems"][0]["quantity"], 3);
    assert_eq!(app.stock_of(product.id).await, 2);

    let mine = app
        .request(Method::GET, "/api/orders/myorders", None, Some(&token))
        .await;
    assert_eq!(mine.status(), StatusCode::OK);
    let page = read_json(mine).await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["_id"], order["_id"]);
}

#[tokio::test]
async fn insufficient_stock_is_a_client_error_naming_the_product() {
    let app = TestApp::new().await;
    let product = app.seed_product("Oud Nocturne", dec!(245.00), 2).await;
    let (_, token) = app.customer();

    let response = app
        .request(
            Method::POST,
            "/api/orders",
            Some(order_body(product.id, 3, None)),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    assert_eq!(
        body["message"],
        "Insufficient stock for Oud Nocturne, available: 2"
    );
    assert_eq!(app.stock_of(product.id).await, 2);
}

#[tokio::test]
async fn malformed_order_bodies_are_rejected_with_400() {
    let app = TestApp::new().await;
    let product = app.seed_product("Citrus Veil", dec!(68.50), 5).await;
    let (_, token) = app.customer();

    let zero_quantity = app
        .request(
            Method::POST,
            "/api/orders",
            Some(order_body(product.id, 0, None)),
            Some(&token),
        )
        .await;
    assert_eq!(zero_quantity.status(), StatusCode::BAD_REQUEST);

    let mut unknown_field = order_body(product.id, 1, None);
    unknown_field["totalAmount"] = json!("0.01");
    let response = app
        .request(Method::POST, "/api/orders", Some(unknown_field), Some(&token))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert_eq!(app.stock_of(product.id).await, 5);
}

#[tokio::test]
async fn customers_only_see_and_cancel_their_own_orders() {
    let app = TestApp::new().await;
    let product = app.seed_product("Amber Solstice", dec!(132.00), 5).await;
    let (_, owner) = app.customer();
    let (_, stranger) = app.customer();

    let created = app
        .request(
            Method::POST,
            "/api/orders",
            Some(order_body(product.id, 2, None)),
            Some(&owner),
        )
        .await;
    let order = read_json(created).await;
    let id = order["_id"].as_str().unwrap().to_string();

    let peek = app
        .request(Method::GET, &format!("/api/orders/{id}"), None, Some(&stranger))
        .await;
    assert_eq!(peek.status(), StatusCode::FORBIDDEN);

    let cancel = app
        .request(
            Method::PUT,
            &format!("/api/orders/{id}/cancel"),
            None,
            Some(&stranger),
        )
        .await;
    assert_eq!(cancel.status(), StatusCode::FORBIDDEN);
    assert_eq!(app.stock_of(product.id).await, 3);

    let own_cancel = app
        .request(
            Method::PUT,
            &format!("/api/orders/{id}/cancel"),
            Some(json!({ "reason": "Ordered the wrong size" })),
            Some(&owner),
        )
        .await;
    assert_eq!(own_cancel.status(), StatusCode::OK);
    let cancelled = read_json(own_cancel).await;
    assert_eq!(cancelled["status"], "cancelled");
    assert_eq!(cancelled["cancellationReason"], "Ordered the wrong size");
    assert_eq!(app.stock_of(product.id).await, 5);

    let missing = app
        .request(
            Method::GET,
            &format!("/api/orders/{}", Uuid::new_v4()),
            None,
            Some(&owner),
        )
        .await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_cancel_bodies_are_rejected_without_cancelling() {
    let app = TestApp::new().await;
    let product = app.seed_product("Fig Leaf", dec!(60.00), 4).await;
    let (_, owner) = app.customer();

    let created = app
        .request(
            Method::POST,
            "/api/orders",
            Some(order_body(product.id, 1, None)),
            Some(&owner),
        )
        .await;
    let id = read_json(created).await["_id"]
        .as_str()
        .unwrap()
        .to_string();
    let uri = format!("/api/orders/{id}/cancel");

    let misspelled = app
        .request(Method::PUT, &uri, Some(json!({ "reasn": "typo" })), Some(&owner))
        .await;
    assert_eq!(misspelled.status(), StatusCode::BAD_REQUEST);

    let too_long = app
        .request(
            Method::PUT,
            &uri,
            Some(json!({ "reason": "x".repeat(501) })),
            Some(&owner),
        )
        .await;
    assert_eq!(too_long.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.stock_of(product.id).await, 3);

    let without_body = app.request(Method::PUT, &uri, None, Some(&owner)).await;
    assert_eq!(without_body.status(), StatusCode::OK);
    let cancelled = read_json(without_body).await;
    assert_eq!(cancelled["status"], "cancelled");
    assert!(cancelled["cancellationReason"].is_null());
    assert_eq!(app.stock_of(product.id).await, 4);
}

#[tokio::test]
async fn status_updates_are_admin_only_and_follow_the_lifecycle() {
    let app = TestApp::new().await;
    let product = app.seed_product("Sea Salt Neroli", dec!(89.00), 5).await;
    let (_, customer) = app.customer();
    let admin = app.admin_token();

    let created = app
        .request(
            Method::POST,
            "/api/orders",
            Some(order_body(product.id, 1, None)),
            Some(&customer),
        )
        .await;
    let id = read_json(created).await["_id"].as_str().unwrap().to_string();
    let uri = format!("/api/orders/{id}/status");

    let by_customer = app
        .request(
            Method::PUT,
            &uri,
            Some(json!({ "status": "processing" })),
            Some(&customer),
        )
        .await;
    assert_eq!(by_customer.status(), StatusCode::FORBIDDEN);

    let skip = app
        .request(
            Method::PUT,
            &uri,
            Some(json!({ "status": "delivered" })),
            Some(&admin),
        )
        .await;
    assert_eq!(skip.status(), StatusCode::BAD_REQUEST);

    let bogus = app
        .request(
            Method::PUT,
            &uri,
            Some(json!({ "status": "teleported" })),
            Some(&admin),
        )
        .await;
    assert_eq!(bogus.status(), StatusCode::BAD_REQUEST);

    for status in ["processing", "shipped", "delivered"] {
        let response = app
            .request(Method::PUT, &uri, Some(json!({ "status": status })), Some(&admin))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let cancel = app
        .request(
            Method::PUT,
            &format!("/api/orders/{id}/cancel"),
            None,
            Some(&admin),
        )
        .await;
    assert_eq!(cancel.status(), StatusCode::BAD_REQUEST);

    let listed = app
        .request(
            Method::GET,
            "/api/orders?status=delivered",
            None,
            Some(&admin),
        )
        .await;
    assert_eq!(listed.status(), StatusCode::OK);
    let page = read_json(listed).await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["isDelivered"], true);

    let as_customer = app
        .request(Method::GET, "/api/orders", None, Some(&customer))
        .await;
    assert_eq!(as_customer.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn coupon_validation_reports_discount_and_rejections() {
    let app = TestApp::new().await;
    app.seed_coupon("SAVE10", dec!(10), dec!(200), None).await;
    let (_, token) = app.customer();

    let ok = app
        .request(
            Method::POST,
            "/api/coupons/validate",
            Some(json!({ "code": "save10", "orderAmount": "300.00" })),
            Some(&token),
        )
        .await;
    assert_eq!(ok.status(), StatusCode::OK);
    let body = read_json(ok).await;
    assert_eq!(body["valid"], true);
    assert_eq!(body["code"], "SAVE10");
    assert_eq!(decimal(&body["discount"]), dec!(30));

    let too_small = app
        .request(
            Method::POST,
            "/api/coupons/validate",
            Some(json!({ "code": "SAVE10", "orderAmount": "150.00" })),
            Some(&token),
        )
        .await;
    assert_eq!(too_small.status(), StatusCode::BAD_REQUEST);

    let unknown = app
        .request(
            Method::POST,
            "/api/coupons/validate",
            Some(json!({ "code": "NOPE", "orderAmount": "150.00" })),
            Some(&token),
        )
        .await;
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn coupon_administration_requires_admin() {
    let app = TestApp::new().await;
    let (_, customer) = app.customer();
    let admin = app.admin_token();
    let now = Utc::now();
    let body = json!({
        "code": "spring25",
        "discountType": "percentage",
        "discountValue": "25",
        "minOrderAmount": "100",
        "usageLimit": 50,
        "validFrom": now.to_rfc3339(),
        "validUntil": (now + Duration::days(14)).to_rfc3339()
    });

    let denied = app
        .request(Method::POST, "/api/coupons", Some(body.clone()), Some(&customer))
        .await;
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);

    let created = app
        .request(Method::POST, "/api/coupons", Some(body.clone()), Some(&admin))
        .await;
    assert_eq!(created.status(), StatusCode::CREATED);
    let coupon = read_json(created).await;
    assert_eq!(coupon["code"], "SPRING25");
    assert_eq!(coupon["usedCount"], 0);

    let duplicate = app
        .request(Method::POST, "/api/coupons", Some(body), Some(&admin))
        .await;
    assert_eq!(duplicate.status(), StatusCode::BAD_REQUEST);

    let listed = app
        .request(Method::GET, "/api/coupons", None, Some(&admin))
        .await;
    assert_eq!(listed.status(), StatusCode::OK);
    assert_eq!(read_json(listed).await["total"], 1);
}

#[tokio::test]
async fn payment_flow_marks_the_order_paid_once() {
    let app = TestApp::new().await;
    let product = app.seed_product("Vetiver Ember", dec!(178.00), 3).await;
    let (_, token) = app.customer();
    let (_, stranger) = app.customer();

    let created = app
        .request(
            Method::POST,
            "/api/orders",
            Some(order_body(product.id, 1, None)),
            Some(&token),
        )
        .await;
    let order_id = read_json(created).await["_id"].as_str().unwrap().to_string();

    let foreign = app
        .request(
            Method::POST,
            "/api/payments/create-payment-intent",
            Some(json!({ "orderId": order_id })),
            Some(&stranger),
        )
        .await;
    assert_eq!(foreign.status(), StatusCode::UNAUTHORIZED);

    let intent = app
        .request(
            Method::POST,
            "/api/payments/create-payment-intent",
            Some(json!({ "orderId": order_id })),
            Some(&token),
        )
        .await;
    assert_eq!(intent.status(), StatusCode::OK);
    let intent = read_json(intent).await;
    let intent_id = intent["paymentIntentId"].as_str().unwrap().to_string();
    assert!(intent["clientSecret"].as_str().is_some());

    let early = app
        .request(
            Method::POST,
            "/api/payments/confirm",
            Some(json!({ "paymentIntentId": intent_id })),
            Some(&token),
        )
        .await;
    assert_eq!(early.status(), StatusCode::BAD_REQUEST);

    app.provider.set_status(&intent_id, IntentStatus::Succeeded);

    let paid = app
        .request(
            Method::PUT,
            &format!("/api/orders/{order_id}/pay"),
            Some(json!({ "paymentIntentId": intent_id })),
            Some(&token),
        )
        .await;
    assert_eq!(paid.status(), StatusCode::OK);
    let paid = read_json(paid).await;
    assert_eq!(paid["isPaid"], true);
    assert_eq!(paid["status"], "processing");

    let again = app
        .request(
            Method::POST,
            "/api/payments/confirm",
            Some(json!({ "paymentIntentId": intent_id })),
            Some(&token),
        )
        .await;
    assert_eq!(again.status(), StatusCode::OK);
    let again = read_json(again).await;
    assert_eq!(again["message"], "Payment already processed");
    assert_eq!(again["isPaid"], true);

    let second_intent = app
        .request(
            Method::POST,
            "/api/payments/create-payment-intent",
            Some(json!({ "orderId": order_id })),
            Some(&token),
        )
        .await;
    assert_eq!(second_intent.status(), StatusCode::BAD_REQUEST);
}
