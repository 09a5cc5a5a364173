pub mod common;
pub mod coupons;
pub mod health;
pub mod orders;
pub mod payments;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::EventSender;
use crate::services::{
    catalog::CatalogService, coupons::CouponService, inventory::InventoryLedger,
    orders::OrderService, payment_provider::PaymentProvider, payments::PaymentService,
    pricing::PricingPolicy,
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub catalog: Arc<CatalogService>,
    pub inventory: Arc<InventoryLedger>,
    pub coupons: Arc<CouponService>,
    pub orders: Arc<OrderService>,
    pub payments: Arc<PaymentService>,
}

impl AppServices {
    pub fn new(
        db_pool: Arc<DbPool>,
        config: &AppConfig,
        provider: Arc<dyn PaymentProvider>,
        event_sender: EventSender,
    ) -> Self {
        let catalog = CatalogService::new(db_pool.clone());
        let inventory = InventoryLedger::new(db_pool.clone());
        let coupons = CouponService::new(db_pool.clone());

        let orders = OrderService::new(
            db_pool.clone(),
            catalog.clone(),
            inventory.clone(),
            coupons.clone(),
            PricingPolicy::from(config),
            event_sender.clone(),
        );

        let payments = PaymentService::new(
            db_pool,
            orders.clone(),
            provider,
            event_sender,
            config.default_currency.clone(),
            config.payment_provider_timeout(),
        );

        Self {
            catalog: Arc::new(catalog),
            inventory: Arc::new(inventory),
            coupons: Arc::new(coupons),
            orders: Arc::new(orders),
            payments: Arc::new(payments),
        }
    }
}
