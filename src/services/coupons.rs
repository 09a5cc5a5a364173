//! Coupon validation and redemption.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::{Condition, Expr},
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::entities::coupon::{self, DiscountType};
use crate::entities::coupon_redemption;
use crate::errors::{CouponRejection, ServiceError};
use crate::services::pricing;

pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Applies the eligibility rules to an already loaded coupon, in a fixed order
/// so the reported reason is deterministic.
pub fn check_coupon(
    coupon: &coupon::Model,
    now: DateTime<Utc>,
    redemptions_by_user: u64,
    order_amount: Decimal,
) -> Result<(), CouponRejection> {
    if !coupon.is_active || now > coupon.valid_until {
        return Err(CouponRejection::Expired);
    }
    if now < coupon.valid_from {
        return Err(CouponRejection::NotYetActive);
    }
    if let Some(limit) = coupon.usage_limit {
        if coupon.used_count >= limit {
            return Err(CouponRejection::UsageExceeded);
        }
    }
    if redemptions_by_user >= coupon.per_user_limit.max(0) as u64 {
        return Err(CouponRejection::AlreadyUsedByUser);
    }
    if order_amount < coupon.min_order_amount {
        return Err(CouponRejection::BelowMinimum {
            minimum: coupon.min_order_amount,
        });
    }
    Ok(())
}

/// A coupon that passed validation, with the discount it would grant
#[derive(Debug, Clone)]
pub struct CouponQuote {
    pub coupon: coupon::Model,
    pub discount: Decimal,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateCouponRequest {
    #[validate(length(min = 3, max = 32))]
    pub code: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    #[validate(custom = "validate_positive")]
    pub discount_value: Decimal,
    #[serde(default)]
    pub min_order_amount: Decimal,
    pub max_discount_amount: Option<Decimal>,
    #[validate(range(min = 1))]
    pub usage_limit: Option<i32>,
    #[serde(default = "default_per_user_limit")]
    #[validate(range(min = 1))]
    pub per_user_limit: i32,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    #[serde(default)]
    pub applicable_categories: Vec<String>,
    #[serde(default)]
    pub applicable_products: Vec<Uuid>,
}

fn default_per_user_limit() -> i32 {
    1
}

fn validate_positive(value: &Decimal) -> Result<(), validator::ValidationError> {
    if *value <= Decimal::ZERO {
        return Err(validator::ValidationError::new("must_be_positive"));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CouponSummary {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub code: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub min_order_amount: Decimal,
    pub max_discount_amount: Option<Decimal>,
    pub usage_limit: Option<i32>,
    pub used_count: i32,
    pub per_user_limit: i32,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub is_active: bool,
}

impl From<coupon::Model> for CouponSummary {
    fn from(model: coupon::Model) -> Self {
        Self {
            id: model.id,
            code: model.code,
            description: model.description,
            discount_type: model.discount_type,
            discount_value: model.discount_value,
            min_order_amount: model.min_order_amount,
            max_discount_amount: model.max_discount_amount,
            usage_limit: model.usage_limit,
            used_count: model.used_count,
            per_user_limit: model.per_user_limit,
            valid_from: model.valid_from,
            valid_until: model.valid_until,
            is_active: model.is_active,
        }
    }
}

#[derive(Clone)]
pub struct CouponService {
    db: Arc<DatabaseConnection>,
}

impl CouponService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn find_by_code<C: ConnectionTrait>(
        conn: &C,
        code: &str,
    ) -> Result<Option<coupon::Model>, ServiceError> {
        coupon::Entity::find()
            .filter(coupon::Column::Code.eq(normalize_code(code)))
            .one(conn)
            .await
            .map_err(ServiceError::db_error)
    }

    async fn redemptions_by_user<C: ConnectionTrait>(
        conn: &C,
        coupon_id: Uuid,
        user_id: Uuid,
    ) -> Result<u64, ServiceError> {
        coupon_redemption::Entity::find()
            .filter(coupon_redemption::Column::CouponId.eq(coupon_id))
            .filter(coupon_redemption::Column::UserId.eq(user_id))
            .count(conn)
            .await
            .map_err(ServiceError::db_error)
    }

    /// Checks whether `code` can be applied by `user_id` to an order of `order_amount`.
    #[instrument(skip(self), fields(code = %code, user_id = %user_id))]
    pub async fn validate(
        &self,
        code: &str,
        user_id: Uuid,
        order_amount: Decimal,
    ) -> Result<coupon::Model, ServiceError> {
        let coupon = Self::find_by_code(&*self.db, code)
            .await?
            .ok_or(CouponRejection::NotFound)?;

        let used = Self::redemptions_by_user(&*self.db, coupon.id, user_id).await?;
        check_coupon(&coupon, Utc::now(), used, order_amount)?;
        Ok(coupon)
    }

    /// Validation plus the discount the coupon would grant.
    pub async fn quote(
        &self,
        code: &str,
        user_id: Uuid,
        order_amount: Decimal,
    ) -> Result<CouponQuote, ServiceError> {
        let coupon = self.validate(code, user_id, order_amount).await?;
        let discount = pricing::coupon_discount(
            coupon.discount_type,
            coupon.discount_value,
            coupon.max_discount_amount,
            order_amount,
        );
        Ok(CouponQuote { coupon, discount })
    }

    /// Records one use of the coupon for an order.
    ///
    /// The usage counter is bumped with a conditional update first so that
    /// concurrent redemptions of the last available use serialize on the coupon
    /// row; the per-user count is checked after that increment.
    pub async fn redeem_in<C: ConnectionTrait>(
        conn: &C,
        coupon: &coupon::Model,
        user_id: Uuid,
        order_id: Uuid,
    ) -> Result<(), ServiceError> {
        let now = Utc::now();
        let result = coupon::Entity::update_many()
            .col_expr(
                coupon::Column::UsedCount,
                Expr::col(coupon::Column::UsedCount).add(1),
            )
            .col_expr(coupon::Column::UpdatedAt, Expr::value(now))
            .filter(coupon::Column::Id.eq(coupon.id))
            .filter(coupon::Column::IsActive.eq(true))
            .filter(
                Condition::any()
                    .add(coupon::Column::UsageLimit.is_null())
                    .add(Expr::col(coupon::Column::UsedCount).lt(Expr::col(coupon::Column::UsageLimit))),
            )
            .exec(conn)
            .await
            .map_err(ServiceError::db_error)?;

        if result.rows_affected == 0 {
            warn!(coupon_id = %coupon.id, "Coupon could not be redeemed");
            let current = coupon::Entity::find_by_id(coupon.id)
                .one(conn)
                .await
                .map_err(ServiceError::db_error)?;
            return Err(match current {
                None => CouponRejection::NotFound,
                Some(c) if !c.is_active => CouponRejection::Expired,
                Some(_) => CouponRejection::UsageExceeded,
            }
            .into());
        }

        let used = Self::redemptions_by_user(conn, coupon.id, user_id).await?;
        if used >= coupon.per_user_limit.max(0) as u64 {
            return Err(CouponRejection::AlreadyUsedByUser.into());
        }

        coupon_redemption::ActiveModel {
            id: Set(Uuid::new_v4()),
            coupon_id: Set(coupon.id),
            user_id: Set(user_id),
            order_id: Set(order_id),
            used_at: Set(now),
        }
        .insert(conn)
        .await
        .map_err(ServiceError::db_error)?;

        Ok(())
    }

    #[instrument(skip(self, request), fields(code = %request.code))]
    pub async fn create_coupon(
        &self,
        request: CreateCouponRequest,
    ) -> Result<coupon::Model, ServiceError> {
        request.validate()?;

        if request.valid_until <= request.valid_from {
            return Err(ServiceError::ValidationError(
                "validUntil must be after validFrom".to_string(),
            ));
        }
        if request.discount_type == DiscountType::Percentage
            && request.discount_value > Decimal::ONE_HUNDRED
        {
            return Err(ServiceError::ValidationError(
                "Percentage discounts cannot exceed 100".to_string(),
            ));
        }
        if request.min_order_amount.is_sign_negative() {
            return Err(ServiceError::ValidationError(
                "minOrderAmount cannot be negative".to_string(),
            ));
        }

        let code = normalize_code(&request.code);
        if Self::find_by_code(&*self.db, &code).await?.is_some() {
            return Err(ServiceError::BadRequest(format!(
                "Coupon code {} already exists",
                code
            )));
        }

        let join = |values: Vec<String>| (!values.is_empty()).then(|| values.join(","));
        let now = Utc::now();
        let created = coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code),
            description: Set(request.description),
            discount_type: Set(request.discount_type),
            discount_value: Set(request.discount_value),
            min_order_amount: Set(request.min_order_amount),
            max_discount_amount: Set(request.max_discount_amount),
            usage_limit: Set(request.usage_limit),
            used_count: Set(0),
            per_user_limit: Set(request.per_user_limit),
            valid_from: Set(request.valid_from),
            valid_until: Set(request.valid_until),
            is_active: Set(true),
            applicable_categories: Set(join(request.applicable_categories)),
            applicable_products: Set(join(
                request
                    .applicable_products
                    .iter()
                    .map(Uuid::to_string)
                    .collect(),
            )),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .map_err(ServiceError::db_error)?;

        info!(coupon_id = %created.id, "Coupon created");
        Ok(created)
    }

    pub async fn list_coupons(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<coupon::Model>, u64), ServiceError> {
        let paginator = coupon::Entity::find()
            .order_by_desc(coupon::Column::CreatedAt)
            .paginate(&*self.db, per_page);

        let total = paginator.num_items().await.map_err(ServiceError::db_error)?;
        let coupons = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .map_err(ServiceError::db_error)?;

        Ok((coupons, total))
    }
}
