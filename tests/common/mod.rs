#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request},
    Router,
};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::EntityTrait;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use fragrance_api::{
    auth::{ADMIN_ROLE, CUSTOMER_ROLE},
    config::AppConfig,
    db::{self, DbConfig},
    entities::{
        coupon::{self, DiscountType},
        product,
    },
    events::{self, EventSender},
    services::{
        catalog::NewProduct,
        coupons::CreateCouponRequest,
        orders::{LineItemRequest, PlaceOrderRequest, ShippingAddress},
        payment_provider::MockPaymentProvider,
    },
    AppState,
};

pub const TEST_JWT_SECRET: &str = "integration_test_secret_with_plenty_of_entropy_42";

/// Configuration with no tax, flat shipping of 10 and free shipping from 1000.
pub fn test_config() -> AppConfig {
    let mut cfg = AppConfig::new(
        "sqlite::memory:".to_string(),
        TEST_JWT_SECRET.to_string(),
        "127.0.0.1".to_string(),
        18_080,
        "test".to_string(),
    );
    cfg.payment_provider = "mock".to_string();
    cfg.default_tax_rate = 0.0;
    cfg.shipping_flat_rate = Decimal::new(10, 0);
    cfg.free_shipping_threshold = Decimal::new(1000, 0);
    cfg.cors_allow_any_origin = true;
    cfg
}

/// Application state over a private in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub provider: Arc<MockPaymentProvider>,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        let cfg = test_config();

        let pool = db::establish_connection_with_config(&DbConfig::sqlite_memory())
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let (event_sender, event_rx) = EventSender::channel(1024);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let provider = Arc::new(MockPaymentProvider::new());
        let state = AppState::new(Arc::new(pool), cfg, provider.clone(), event_sender);
        let router = fragrance_api::build_app(state.clone());

        Self {
            router,
            state,
            provider,
            _event_task: event_task,
        }
    }

    pub fn token_for(&self, user_id: Uuid, roles: &[&str]) -> String {
        self.state
            .auth
            .issue_token(user_id, roles)
            .expect("issue test token")
    }

    /// A fresh customer id with a matching bearer token.
    pub fn customer(&self) -> (Uuid, String) {
        let id = Uuid::new_v4();
        (id, self.token_for(id, &[CUSTOMER_ROLE]))
    }

    pub fn admin_token(&self) -> String {
        self.token_for(Uuid::new_v4(), &[ADMIN_ROLE])
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn seed_product(&self, name: &str, price: Decimal, stock: i32) -> product::Model {
        self.state
            .services
            .catalog
            .create_product(NewProduct {
                name: name.to_string(),
                brand: Some("Maison Test".to_string()),
                category: Some("floral".to_string()),
                image: None,
                price,
                discount_percentage: Decimal::ZERO,
                stock,
            })
            .await
            .expect("seed product for tests")
    }

    /// A percentage coupon valid from yesterday for thirty days.
    pub async fn seed_coupon(
        &self,
        code: &str,
        percent: Decimal,
        min_order_amount: Decimal,
        usage_limit: Option<i32>,
    ) -> coupon::Model {
        let now = Utc::now();
        self.state
            .services
            .coupons
            .create_coupon(CreateCouponRequest {
                code: code.to_string(),
                description: None,
                discount_type: DiscountType::Percentage,
                discount_value: percent,
                min_order_amount,
                max_discount_amount: None,
                usage_limit,
                per_user_limit: 1,
                valid_from: now - Duration::days(1),
                valid_until: now + Duration::days(30),
                applicable_categories: Vec::new(),
                applicable_products: Vec::new(),
            })
            .await
            .expect("seed coupon for tests")
    }

    pub async fn stock_of(&self, product_id: Uuid) -> i32 {
        product::Entity::find_by_id(product_id)
            .one(&*self.state.db)
            .await
            .expect("load product")
            .expect("product exists")
            .stock
    }

    pub async fn coupon(&self, coupon_id: Uuid) -> coupon::Model {
        coupon::Entity::find_by_id(coupon_id)
            .one(&*self.state.db)
            .await
            .expect("load coupon")
            .expect("coupon exists")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

pub fn order_request(lines: &[(Uuid, i32)], coupon_code: Option<&str>) -> PlaceOrderRequest {
    PlaceOrderRequest {
        order_items: lines
            .iter()
            .map(|&(product_id, quantity)| LineItemRequest {
                product_id,
                quantity,
            })
            .collect(),
        shipping_address: ShippingAddress {
            address: "12 Jasmine Street".to_string(),
            city: "Grasse".to_string(),
            postal_code: "06130".to_string(),
            country: "France".to_string(),
        },
        coupon_code: coupon_code.map(str::to_string),
    }
}

pub async fn read_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    serde_json::from_slice(&bytes).expect("response body is json")
}
