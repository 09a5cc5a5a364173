pub mod catalog;
pub mod coupons;
pub mod inventory;
pub mod order_status;
pub mod orders;
pub mod payment_provider;
pub mod payments;
pub mod pricing;
