//! Product catalog lookups used by order placement and seeding.

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, QueryOrder, Set};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::entities::product;
use crate::errors::ServiceError;

/// Input for adding a product to the catalog
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub image: Option<String>,
    #[validate(custom = "validate_non_negative")]
    pub price: Decimal,
    #[serde(default)]
    #[validate(custom = "validate_percentage")]
    pub discount_percentage: Decimal,
    #[validate(range(min = 0))]
    pub stock: i32,
}

fn validate_non_negative(value: &Decimal) -> Result<(), validator::ValidationError> {
    if value.is_sign_negative() {
        return Err(validator::ValidationError::new("negative_amount"));
    }
    Ok(())
}

fn validate_percentage(value: &Decimal) -> Result<(), validator::ValidationError> {
    if *value < Decimal::ZERO || *value > Decimal::ONE_HUNDRED {
        return Err(validator::ValidationError::new("percentage_out_of_range"));
    }
    Ok(())
}

#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
}

impl CatalogService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn get_product(&self, product_id: Uuid) -> Result<Option<product::Model>, ServiceError> {
        product::Entity::find_by_id(product_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }

    pub async fn list_products(&self) -> Result<Vec<product::Model>, ServiceError> {
        product::Entity::find()
            .order_by_asc(product::Column::Name)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_product(&self, input: NewProduct) -> Result<product::Model, ServiceError> {
        input.validate()?;

        let now = Utc::now();
        let model = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name.trim().to_string()),
            brand: Set(input.brand),
            category: Set(input.category),
            image: Set(input.image),
            price: Set(input.price.round_dp(2)),
            discount_percentage: Set(input.discount_percentage),
            stock: Set(input.stock),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let created = model
            .insert(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        info!(product_id = %created.id, stock = created.stock, "Product added to catalog");
        Ok(created)
    }

    /// Hides a product from new orders without touching existing ones
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn deactivate_product(&self, product_id: Uuid) -> Result<product::Model, ServiceError> {
        let existing = self
            .get_product(product_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        let mut active: product::ActiveModel = existing.into();
        active.is_active = Set(false);
        active.updated_at = Set(Utc::now());
        active
            .update(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }
}
