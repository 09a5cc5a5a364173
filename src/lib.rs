//! Fragrance storefront order engine
//!
//! Places orders against a shared stock ledger, applies coupons, reconciles
//! card payments and drives orders through their lifecycle.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod metrics;
pub mod middleware_helpers;
pub mod migrator;
pub mod openapi;
pub mod services;
pub mod tracing;

use axum::{extract::FromRef, http::HeaderValue, routing::get, Router};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer};

use crate::auth::AuthService;
use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::events::EventSender;
use crate::services::payment_provider::{
    MockPaymentProvider, PaymentProvider, StripePaymentProvider,
};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: AppConfig,
    pub auth: Arc<AuthService>,
    pub event_sender: EventSender,
    pub services: handlers::AppServices,
}

impl AppState {
    /// Wires every service over one connection pool and provider.
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: AppConfig,
        provider: Arc<dyn PaymentProvider>,
        event_sender: EventSender,
    ) -> Self {
        let services =
            handlers::AppServices::new(db.clone(), &config, provider, event_sender.clone());
        let auth = Arc::new(AuthService::new(&config));

        Self {
            db,
            config,
            auth,
            event_sender,
            services,
        }
    }
}

impl FromRef<AppState> for Arc<AuthService> {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

/// Authenticated storefront API, mounted under `/api`
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/orders", handlers::orders::order_routes())
        .nest("/coupons", handlers::coupons::coupon_routes())
        .nest("/payments", handlers::payments::payment_routes())
}

/// Full HTTP application with the middleware stack applied
pub fn build_app(state: AppState) -> Router {
    let cors = cors_layer(&state.config);
    let timeout = Duration::from_secs(state.config.request_timeout_secs.max(1));

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(handlers::health::metrics_endpoint))
        .route("/api-docs/openapi.json", get(openapi::openapi_json))
        .nest("/api", api_routes())
        .layer(
            ServiceBuilder::new()
                .layer(crate::tracing::configure_http_tracing())
                .layer(cors)
                .layer(TimeoutLayer::new(timeout)),
        )
        // Outermost so the trace span and error bodies see the id.
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id_middleware,
        ))
        .with_state(state)
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins()
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    if !origins.is_empty() {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any)
    } else if config.should_allow_permissive_cors() {
        ::tracing::info!("Using permissive CORS because explicit origins were not configured");
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
    }
}

/// Selects the card processor named by `payment_provider`
pub fn build_payment_provider(
    config: &AppConfig,
) -> Result<Arc<dyn PaymentProvider>, ServiceError> {
    match config.payment_provider.to_ascii_lowercase().as_str() {
        "stripe" => {
            let secret = config.stripe_secret_key.clone().ok_or_else(|| {
                ServiceError::InternalError("stripe_secret_key is not configured".to_string())
            })?;
            let provider = StripePaymentProvider::new(
                secret,
                config.stripe_api_base.clone(),
                config.payment_provider_timeout(),
            )?;
            Ok(Arc::new(provider))
        }
        "mock" => Ok(Arc::new(MockPaymentProvider::new())),
        other => Err(ServiceError::InternalError(format!(
            "Unknown payment provider: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(provider: &str) -> AppConfig {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".into(),
            "lib_test_secret_with_plenty_of_entropy_abcdef".into(),
            "127.0.0.1".into(),
            8080,
            "test".into(),
        );
        cfg.payment_provider = provider.to_string();
        cfg
    }

    #[test]
    fn mock_provider_is_selected_by_name() {
        let provider = build_payment_provider(&config("MOCK")).unwrap();
        assert_eq!(provider.name(), "mock");
    }

    #[test]
    fn stripe_without_secret_is_rejected() {
        assert!(build_payment_provider(&config("stripe")).is_err());
    }

    #[test]
    fn unknown_provider_is_rejected() {
        assert!(build_payment_provider(&config("paypal")).is_err());
    }
}
