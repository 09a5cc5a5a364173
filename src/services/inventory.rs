//! Inventory ledger
//!
//! Stock is only ever changed through conditional single-statement updates,
//! so two concurrent reservations can never both observe the same units.
//! A reservation is the decrement itself; releasing it increments the same
//! product by the same quantity.

use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
};
use std::sync::Arc;
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;

use crate::entities::product;
use crate::errors::ServiceError;
use crate::metrics;
use crate::middleware_helpers::retry::{with_retry, AlwaysRetryPolicy, RetryConfig};

/// Units taken from a product's stock on behalf of one order line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Clone)]
pub struct InventoryLedger {
    db: Arc<DatabaseConnection>,
    restore_retry: RetryConfig,
}

impl InventoryLedger {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            db,
            restore_retry: RetryConfig::restoration(),
        }
    }

    pub fn with_restore_retry(mut self, config: RetryConfig) -> Self {
        self.restore_retry = config;
        self
    }

    /// Atomically takes `quantity` units of a product.
    #[instrument(skip(self), fields(product_id = %product_id, quantity = quantity))]
    pub async fn reserve(&self, product_id: Uuid, quantity: i32) -> Result<Reservation, ServiceError> {
        Self::reserve_in(&*self.db, product_id, quantity).await
    }

    /// Same as [`InventoryLedger::reserve`] on an explicit connection or transaction.
    pub async fn reserve_in<C: ConnectionTrait>(
        conn: &C,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<Reservation, ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::ValidationError(format!(
                "Quantity must be positive, got {}",
                quantity
            )));
        }

        let result = product::Entity::update_many()
            .col_expr(
                product::Column::Stock,
                Expr::col(product::Column::Stock).sub(quantity),
            )
            .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(product::Column::Id.eq(product_id))
            .filter(product::Column::IsActive.eq(true))
            .filter(product::Column::Stock.gte(quantity))
            .exec(conn)
            .await
            .map_err(ServiceError::db_error)?;

        if result.rows_affected == 1 {
            debug!("Reserved stock");
            return Ok(Reservation {
                product_id,
                quantity,
            });
        }

        metrics::STOCK_RESERVATION_FAILURES.inc();

        // The update touched nothing: work out which precondition failed.
        let current = product::Entity::find_by_id(product_id)
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?;

        Err(match current {
            None => ServiceError::ProductUnavailable(format!("Product {} not found", product_id)),
            Some(p) if !p.is_active => {
                ServiceError::ProductUnavailable(format!("{} is no longer available", p.name))
            }
            Some(p) => ServiceError::InsufficientStock {
                product: p.name,
                available: p.stock,
            },
        })
    }

    /// Returns previously reserved units to stock.
    #[instrument(skip(self), fields(product_id = %product_id, quantity = quantity))]
    pub async fn release(&self, product_id: Uuid, quantity: i32) -> Result<(), ServiceError> {
        Self::release_in(&*self.db, product_id, quantity).await
    }

    pub async fn release_in<C: ConnectionTrait>(
        conn: &C,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::ValidationError(format!(
                "Quantity must be positive, got {}",
                quantity
            )));
        }

        let result = product::Entity::update_many()
            .col_expr(
                product::Column::Stock,
                Expr::col(product::Column::Stock).add(quantity),
            )
            .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(product::Column::Id.eq(product_id))
            .exec(conn)
            .await
            .map_err(ServiceError::db_error)?;

        if result.rows_affected == 0 {
            error!(product_id = %product_id, quantity, "Cannot release stock for a missing product");
            metrics::invariant_violated("stock_release_target_missing");
            return Err(ServiceError::InvariantViolation(format!(
                "Released {} units of product {} which no longer exists",
                quantity, product_id
            )));
        }

        debug!(product_id = %product_id, quantity, "Released stock");
        Ok(())
    }

    /// Compensates a failed placement by releasing every reservation.
    ///
    /// Each release is retried on its own; a release that still fails is
    /// logged loudly and counted, and the remaining ones are attempted anyway.
    /// Returns the number of releases that could not be applied.
    pub async fn release_all(&self, reservations: &[Reservation]) -> usize {
        let mut failures = 0;

        for reservation in reservations {
            let ledger = self;
            let outcome = with_retry(&self.restore_retry, AlwaysRetryPolicy, move || async move {
                ledger
                    .release(reservation.product_id, reservation.quantity)
                    .await
            })
            .await;

            if let Err(e) = outcome {
                failures += 1;
                metrics::RESTORATION_FAILURES.inc();
                error!(
                    product_id = %reservation.product_id,
                    quantity = reservation.quantity,
                    error = %e,
                    "Stock restoration failed, manual reconciliation required"
                );
            }
        }

        if failures == 0 && !reservations.is_empty() {
            warn!(count = reservations.len(), "Rolled back stock reservations");
        }

        failures
    }
}
