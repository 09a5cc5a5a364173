//! Property-based tests for order pricing.
//!
//! Totals must always reconcile with their parts, and no coupon may push an
//! order below zero.

use proptest::prelude::*;
use rust_decimal::Decimal;

use fragrance_api::entities::coupon::DiscountType;
use fragrance_api::entities::order::OrderStatus;
use fragrance_api::services::pricing::{self, LineAmount, PricingPolicy};

fn money_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..500_000).prop_map(|cents| Decimal::new(cents, 2))
}

fn line_strategy() -> impl Strategy<Value = LineAmount> {
    (money_strategy(), 1i32..50).prop_map(|(unit_price, quantity)| LineAmount {
        unit_price,
        quantity,
    })
}

fn discount_type_strategy() -> impl Strategy<Value = DiscountType> {
    prop_oneof![Just(DiscountType::Percentage), Just(DiscountType::Fixed)]
}

fn status_strategy() -> impl Strategy<Value = OrderStatus> {
    prop_oneof![
        Just(OrderStatus::Pending),
        Just(OrderStatus::Processing),
        Just(OrderStatus::Shipped),
        Just(OrderStatus::Delivered),
        Just(OrderStatus::Cancelled),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn coupon_discount_stays_within_order_amount(
        discount_type in discount_type_strategy(),
        value in (1i64..20_000).prop_map(|v| Decimal::new(v, 2)),
        cap in proptest::option::of(money_strategy()),
        amount in money_strategy(),
    ) {
        let discount = pricing::coupon_discount(discount_type, value, cap, amount);
        prop_assert!(discount >= Decimal::ZERO);
        prop_assert!(discount <= amount);
        if let Some(cap) = cap {
            if discount_type == DiscountType::Percentage {
                prop_assert!(discount <= cap);
            }
        }
    }

    #[test]
    fn quoted_totals_reconcile_with_their_parts(
        lines in proptest::collection::vec(line_strategy(), 1..8),
        discount in money_strategy(),
        tax_bp in 0i64..2_500,
    ) {
        let policy = PricingPolicy {
            tax_rate: Decimal::new(tax_bp, 4),
            shipping_flat_rate: Decimal::new(1000, 2),
            free_shipping_threshold: Decimal::new(100_000, 2),
        };
        let quote = policy.quote(&lines, discount);

        prop_assert_eq!(quote.subtotal, pricing::subtotal(&lines));
        prop_assert!(quote.discount <= quote.subtotal);
        prop_assert!(quote.total >= Decimal::ZERO);
        prop_assert_eq!(
            quote.total,
            quote.subtotal + quote.shipping + quote.tax - quote.discount
        );
        prop_assert_eq!(quote.total.round_dp(2), quote.total);
    }

    #[test]
    fn shipping_is_free_exactly_from_the_threshold(subtotal in money_strategy()) {
        let policy = PricingPolicy {
            tax_rate: Decimal::ZERO,
            shipping_flat_rate: Decimal::new(1000, 2),
            free_shipping_threshold: Decimal::new(100_000, 2),
        };
        let shipping = policy.shipping_for(subtotal);
        if subtotal >= policy.free_shipping_threshold {
            prop_assert_eq!(shipping, Decimal::ZERO);
        } else {
            prop_assert_eq!(shipping, policy.shipping_flat_rate);
        }
    }

    #[test]
    fn terminal_states_have_no_exits(from in status_strategy(), to in status_strategy()) {
        if from.is_terminal() {
            prop_assert!(!from.can_transition_to(to));
        }
        prop_assert!(!from.can_transition_to(from));
        if to == OrderStatus::Cancelled && from.can_transition_to(to) {
            prop_assert!(matches!(from, OrderStatus::Pending | OrderStatus::Processing));
        }
    }
}
