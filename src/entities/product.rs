use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Catalog product. Only `stock` is mutated by the order engine.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub image: Option<String>,
    pub price: Decimal,
    /// Active discount, 0..=100
    pub discount_percentage: Decimal,
    pub stock: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Price after the active discount, never above `price` and never negative
    pub fn final_price(&self) -> Decimal {
        let pct = self
            .discount_percentage
            .clamp(Decimal::ZERO, Decimal::ONE_HUNDRED);
        let discounted = self.price * (Decimal::ONE_HUNDRED - pct) / Decimal::ONE_HUNDRED;
        discounted.round_dp(2).clamp(Decimal::ZERO, self.price.max(Decimal::ZERO))
    }

    /// Price captured on a line item: the final price when positive, else the base price
    pub fn unit_price(&self) -> Decimal {
        let final_price = self.final_price();
        if final_price > Decimal::ZERO {
            final_price
        } else {
            self.price
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn product(price: Decimal, discount: Decimal) -> Model {
        Model {
            id: Uuid::new_v4(),
            name: "Lavender Dream".into(),
            brand: None,
            category: None,
            image: None,
            price,
            discount_percentage: discount,
            stock: 5,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn final_price_applies_discount_and_rounds() {
        assert_eq!(product(dec!(100), dec!(15)).final_price(), dec!(85));
        assert_eq!(product(dec!(49.99), dec!(10)).final_price(), dec!(44.99));
    }

    #[test]
    fn final_price_never_exceeds_price() {
        assert_eq!(product(dec!(80), dec!(-20)).final_price(), dec!(80));
        assert_eq!(product(dec!(80), dec!(250)).final_price(), dec!(0));
    }

    #[test]
    fn unit_price_falls_back_to_base_price() {
        assert_eq!(product(dec!(60), dec!(100)).unit_price(), dec!(60));
        assert_eq!(product(dec!(60), dec!(50)).unit_price(), dec!(30));
    }
}
