//! Prometheus metrics for the order engine.
//!
//! Counters are registered on a dedicated registry and exposed in the
//! Prometheus text format at `/metrics`.

use lazy_static::lazy_static;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use tracing::error;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref ORDERS_PLACED: IntCounter = register(IntCounter::new(
        "orders_placed_total",
        "Total number of orders placed"
    ));
    pub static ref ORDER_PLACEMENT_FAILURES: IntCounterVec = register(IntCounterVec::new(
        Opts::new(
            "order_placement_failures_total",
            "Failed order placements by reason"
        ),
        &["reason"]
    ));
    pub static ref ORDER_TRANSITIONS: IntCounterVec = register(IntCounterVec::new(
        Opts::new("order_transitions_total", "Order status transitions"),
        &["to"]
    ));
    pub static ref STOCK_RESERVATION_FAILURES: IntCounter = register(IntCounter::new(
        "stock_reservation_failures_total",
        "Stock reservations rejected by the inventory ledger"
    ));
    pub static ref RESERVATION_ROLLBACKS: IntCounter = register(IntCounter::new(
        "stock_reservation_rollbacks_total",
        "Reservations released because order placement failed"
    ));
    pub static ref RESTORATION_FAILURES: IntCounter = register(IntCounter::new(
        "stock_restoration_failures_total",
        "Stock releases that failed after all retries"
    ));
    pub static ref INVARIANT_VIOLATIONS: IntCounterVec = register(IntCounterVec::new(
        Opts::new(
            "invariant_violations_total",
            "Detected engine invariant violations"
        ),
        &["invariant"]
    ));
    pub static ref COUPONS_REDEEMED: IntCounter = register(IntCounter::new(
        "coupons_redeemed_total",
        "Coupon redemptions recorded"
    ));
    pub static ref PAYMENTS_CONFIRMED: IntCounter = register(IntCounter::new(
        "payments_confirmed_total",
        "Payment intents confirmed as succeeded"
    ));
    pub static ref PAYMENT_PROVIDER_LATENCY: Histogram = register(Histogram::with_opts(
        HistogramOpts::new(
            "payment_provider_request_seconds",
            "Latency of payment provider calls"
        )
    ));
}

fn register<M>(metric: prometheus::Result<M>) -> M
where
    M: prometheus::core::Collector + Clone + 'static,
{
    let metric = metric.expect("metric definition is valid");
    if let Err(err) = REGISTRY.register(Box::new(metric.clone())) {
        error!("Failed to register metric: {}", err);
    }
    metric
}

/// Records a detected invariant violation
pub fn invariant_violated(invariant: &str) {
    INVARIANT_VIOLATIONS.with_label_values(&[invariant]).inc();
}

/// Renders every registered metric in the Prometheus text format
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        error!("Failed to encode metrics: {}", err);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rendered_output_contains_engine_counters() {
        ORDERS_PLACED.inc();
        invariant_violated("total_amount");
        let output = render();
        assert!(output.contains("orders_placed_total"));
        assert!(output.contains("invariant_violations_total{invariant=\"total_amount\"}"));
    }
}
