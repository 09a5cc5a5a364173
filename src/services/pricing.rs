//! Order pricing.
//!
//! All arithmetic is done in `Decimal` and rounded to cents with
//! midpoint-away-from-zero, the rounding customers expect on receipts.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use tracing::error;

use crate::config::AppConfig;
use crate::entities::{coupon::DiscountType, order, order_item};
use crate::errors::ServiceError;
use crate::metrics;

fn cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// One priced order line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineAmount {
    pub unit_price: Decimal,
    pub quantity: i32,
}

impl LineAmount {
    pub fn total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

impl From<&order_item::Model> for LineAmount {
    fn from(item: &order_item::Model) -> Self {
        Self {
            unit_price: item.unit_price,
            quantity: item.quantity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceBreakdown {
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub shipping: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

pub fn subtotal(lines: &[LineAmount]) -> Decimal {
    cents(lines.iter().map(LineAmount::total).sum())
}

/// Discount a coupon grants on `order_amount`, never more than the amount itself.
pub fn coupon_discount(
    discount_type: DiscountType,
    value: Decimal,
    max_discount: Option<Decimal>,
    order_amount: Decimal,
) -> Decimal {
    let raw = match discount_type {
        DiscountType::Percentage => {
            let pct = order_amount * value / Decimal::ONE_HUNDRED;
            match max_discount {
                Some(cap) if cap >= Decimal::ZERO => pct.min(cap),
                _ => pct,
            }
        }
        DiscountType::Fixed => value,
    };

    cents(raw.min(order_amount).max(Decimal::ZERO))
}

/// Combines the pieces into a breakdown whose total always equals
/// `subtotal + shipping + tax - discount` with the discount capped at the subtotal.
pub fn price(lines: &[LineAmount], discount: Decimal, shipping: Decimal, tax: Decimal) -> PriceBreakdown {
    let subtotal = subtotal(lines);
    let discount = cents(discount.clamp(Decimal::ZERO, subtotal));
    let shipping = cents(shipping.max(Decimal::ZERO));
    let tax = cents(tax.max(Decimal::ZERO));
    let total = (subtotal + shipping + tax - discount).max(Decimal::ZERO);

    PriceBreakdown {
        subtotal,
        discount,
        shipping,
        tax,
        total,
    }
}

/// Store-wide shipping and tax rules
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricingPolicy {
    pub tax_rate: Decimal,
    pub shipping_flat_rate: Decimal,
    pub free_shipping_threshold: Decimal,
}

impl From<&AppConfig> for PricingPolicy {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            tax_rate: cfg.tax_rate(),
            shipping_flat_rate: cfg.shipping_flat_rate,
            free_shipping_threshold: cfg.free_shipping_threshold,
        }
    }
}

impl PricingPolicy {
    pub fn shipping_for(&self, subtotal: Decimal) -> Decimal {
        if subtotal >= self.free_shipping_threshold {
            Decimal::ZERO
        } else {
            self.shipping_flat_rate
        }
    }

    pub fn tax_for(&self, taxable: Decimal) -> Decimal {
        cents(taxable.max(Decimal::ZERO) * self.tax_rate)
    }

    pub fn quote(&self, lines: &[LineAmount], discount: Decimal) -> PriceBreakdown {
        let subtotal = subtotal(lines);
        let discount = discount.clamp(Decimal::ZERO, subtotal);
        price(
            lines,
            discount,
            self.shipping_for(subtotal),
            self.tax_for(subtotal - discount),
        )
    }
}

/// Checks a stored order against its stored items.
pub fn verify_total(order: &order::Model, items: &[order_item::Model]) -> Result<(), ServiceError> {
    let lines: Vec<LineAmount> = items.iter().map(LineAmount::from).collect();
    let expected_subtotal = subtotal(&lines);
    let expected_total =
        order.subtotal + order.shipping_cost + order.tax_amount - order.discount_amount;

    let subtotal_matches = expected_subtotal.round_dp(2) == order.subtotal.round_dp(2);
    let discount_bounded = order.discount_amount <= order.subtotal;
    let total_matches = expected_total.round_dp(2) == order.total_amount.round_dp(2);

    if subtotal_matches && discount_bounded && total_matches {
        return Ok(());
    }

    error!(
        order_id = %order.id,
        stored_subtotal = %order.subtotal,
        item_subtotal = %expected_subtotal,
        stored_total = %order.total_amount,
        "Order totals are inconsistent"
    );
    metrics::invariant_violated("order_total");
    Err(ServiceError::InvariantViolation(format!(
        "Order {} totals do not add up",
        order.id
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn line(unit_price: Decimal, quantity: i32) -> LineAmount {
        LineAmount {
            unit_price,
            quantity,
        }
    }

    fn policy() -> PricingPolicy {
        PricingPolicy {
            tax_rate: dec!(0.08),
            shipping_flat_rate: dec!(10),
            free_shipping_threshold: dec!(100),
        }
    }

    #[test]
    fn percentage_discount_is_capped() {
        assert_eq!(
            coupon_discount(DiscountType::Percentage, dec!(10), None, dec!(150)),
            dec!(15)
        );
        assert_eq!(
            coupon_discount(DiscountType::Percentage, dec!(50), Some(dec!(20)), dec!(150)),
            dec!(20)
        );
    }

    #[test]
    fn fixed_discount_never_exceeds_order_amount() {
        assert_eq!(
            coupon_discount(DiscountType::Fixed, dec!(25), None, dec!(100)),
            dec!(25)
        );
        assert_eq!(
            coupon_discount(DiscountType::Fixed, dec!(250), None, dec!(100)),
            dec!(100)
        );
    }

    #[test]
    fn price_clamps_discount_to_subtotal() {
        let breakdown = price(&[line(dec!(20), 2)], dec!(100), dec!(10), dec!(0));
        assert_eq!(breakdown.subtotal, dec!(40));
        assert_eq!(breakdown.discount, dec!(40));
        assert_eq!(breakdown.total, dec!(10));
    }

    #[test]
    fn two_line_order_with_ten_percent_coupon() {
        let lines = [line(dec!(60), 2), line(dec!(30), 1)];
        let discount = coupon_discount(DiscountType::Percentage, dec!(10), None, subtotal(&lines));
        let breakdown = price(&lines, discount, dec!(10), dec!(0));

        assert_eq!(breakdown.subtotal, dec!(150));
        assert_eq!(breakdown.discount, dec!(15));
        assert_eq!(breakdown.total, dec!(145));
    }

    #[test]
    fn policy_applies_free_shipping_and_taxes_after_discount() {
        let policy = policy();
        assert_eq!(policy.shipping_for(dec!(99.99)), dec!(10));
        assert_eq!(policy.shipping_for(dec!(100)), dec!(0));

        let quote = policy.quote(&[line(dec!(50), 1)], dec!(5));
        assert_eq!(quote.shipping, dec!(10));
        assert_eq!(quote.tax, dec!(3.60));
        assert_eq!(quote.total, dec!(58.60));
    }

    fn stored_order(subtotal: Decimal, discount: Decimal, total: Decimal) -> order::Model {
        let now = Utc::now();
        order::Model {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            status: order::OrderStatus::Pending,
            shipping_address: "1 Rose Lane".into(),
            shipping_city: "Grasse".into(),
            shipping_postal_code: "06130".into(),
            shipping_country: "FR".into(),
            coupon_code: None,
            subtotal,
            discount_amount: discount,
            shipping_cost: dec!(10),
            tax_amount: dec!(0),
            total_amount: total,
            payment_reference: None,
            paid_at: None,
            delivered_at: None,
            cancelled_at: None,
            cancellation_reason: None,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    fn stored_item(order_id: Uuid, unit_price: Decimal, quantity: i32) -> order_item::Model {
        order_item::Model {
            id: Uuid::new_v4(),
            order_id,
            product_id: Uuid::new_v4(),
            name: "Amber Nights".into(),
            image: None,
            quantity,
            unit_price,
        }
    }

    #[test]
    fn verify_total_accepts_consistent_orders() {
        let order = stored_order(dec!(150), dec!(15), dec!(145));
        let items = vec![
            stored_item(order.id, dec!(60), 2),
            stored_item(order.id, dec!(30), 1),
        ];
        assert!(verify_total(&order, &items).is_ok());
    }

    #[test]
    fn verify_total_rejects_drifted_totals() {
        let order = stored_order(dec!(150), dec!(15), dec!(150));
        let items = vec![stored_item(order.id, dec!(75), 2)];
        assert!(matches!(
            verify_total(&order, &items),
            Err(ServiceError::InvariantViolation(_))
        ));
    }
}
