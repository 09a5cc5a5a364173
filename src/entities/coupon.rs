use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum DiscountType {
    #[sea_orm(string_value = "percentage")]
    Percentage,
    #[sea_orm(string_value = "fixed")]
    Fixed,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "coupons")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Upper-cased code
    #[sea_orm(unique)]
    pub code: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub min_order_amount: Decimal,
    /// Cap for percentage coupons
    pub max_discount_amount: Option<Decimal>,
    pub usage_limit: Option<i32>,
    /// Always equal to the number of redemption rows for this coupon
    pub used_count: i32,
    pub per_user_limit: i32,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub is_active: bool,
    /// Comma-separated category names; stored, not enforced
    pub applicable_categories: Option<String>,
    /// Comma-separated product ids; stored, not enforced
    pub applicable_products: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::coupon_redemption::Entity")]
    Redemption,
}

impl Related<super::coupon_redemption::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Redemption.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
