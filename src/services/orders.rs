//! Order placement and lifecycle.
//!
//! Placement reserves stock line by line, prices the order, and then writes
//! the order, its items and any coupon redemption in a single transaction.
//! Any failure after the first reservation releases everything reserved so
//! far. Status changes use optimistic versioning so two concurrent writers
//! cannot both move the same order.

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, instrument, warn, Instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::entities::order::{self, OrderStatus};
use crate::entities::{coupon, order_item};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::metrics;
use crate::services::catalog::CatalogService;
use crate::services::coupons::{normalize_code, CouponService};
use crate::services::inventory::{InventoryLedger, Reservation};
use crate::services::order_status::ensure_transition;
use crate::services::pricing::{self, LineAmount, PriceBreakdown, PricingPolicy};

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LineItemRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1, max = 1000))]
    pub quantity: i32,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ShippingAddress {
    #[validate(length(min = 1, max = 255))]
    pub address: String,
    #[validate(length(min = 1, max = 100))]
    pub city: String,
    #[validate(length(min = 1, max = 20))]
    pub postal_code: String,
    #[validate(length(min = 1, max = 100))]
    pub country: String,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PlaceOrderRequest {
    #[validate(length(min = 1, max = 50))]
    pub order_items: Vec<LineItemRequest>,
    pub shipping_address: ShippingAddress,
    pub coupon_code: Option<String>,
}

impl PlaceOrderRequest {
    fn check(&self) -> Result<(), ServiceError> {
        self.validate()?;
        self.shipping_address.validate()?;
        for item in &self.order_items {
            item.validate()?;
        }
        if self
            .shipping_address
            .address
            .trim()
            .is_empty()
            || self.shipping_address.city.trim().is_empty()
            || self.shipping_address.postal_code.trim().is_empty()
            || self.shipping_address.country.trim().is_empty()
        {
            return Err(ServiceError::ValidationError(
                "Shipping address fields cannot be blank".to_string(),
            ));
        }
        Ok(())
    }

    /// Collapses repeated products into one line, keeping first-seen order.
    fn merged_lines(&self) -> Result<Vec<LineItemRequest>, ServiceError> {
        let mut merged: Vec<LineItemRequest> = Vec::with_capacity(self.order_items.len());
        for item in &self.order_items {
            match merged.iter_mut().find(|l| l.product_id == item.product_id) {
                Some(existing) => {
                    existing.quantity = existing.quantity.checked_add(item.quantity).ok_or_else(
                        || ServiceError::ValidationError("Quantity is too large".to_string()),
                    )?;
                }
                None => merged.push(item.clone()),
            }
        }
        Ok(merged)
    }
}

/// An order together with its line items
#[derive(Debug, Clone, PartialEq)]
pub struct OrderDetails {
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
}

/// Price snapshot of a reserved line
#[derive(Debug, Clone)]
struct ReservedLine {
    product_id: Uuid,
    name: String,
    image: Option<String>,
    quantity: i32,
    unit_price: Decimal,
}

fn failure_reason(err: &ServiceError) -> &'static str {
    match err {
        ServiceError::ValidationError(_) => "validation",
        ServiceError::ProductUnavailable(_) => "product_unavailable",
        ServiceError::InsufficientStock { .. } => "insufficient_stock",
        ServiceError::CouponRejected(_) => "coupon_rejected",
        ServiceError::DatabaseError(_) => "database",
        ServiceError::InvariantViolation(_) => "invariant",
        _ => "other",
    }
}

#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    catalog: CatalogService,
    ledger: InventoryLedger,
    coupons: CouponService,
    pricing: PricingPolicy,
    events: EventSender,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        catalog: CatalogService,
        ledger: InventoryLedger,
        coupons: CouponService,
        pricing: PricingPolicy,
        events: EventSender,
    ) -> Self {
        Self {
            db,
            catalog,
            ledger,
            coupons,
            pricing,
            events,
        }
    }

    /// Places an order for `user_id`.
    ///
    /// The work runs on its own task so a client disconnect cannot stop it
    /// halfway through a reservation or its rollback.
    #[instrument(skip(self, request), fields(user_id = %user_id, lines = request.order_items.len()))]
    pub async fn place_order(
        &self,
        user_id: Uuid,
        request: PlaceOrderRequest,
    ) -> Result<OrderDetails, ServiceError> {
        if let Err(e) = request.check() {
            metrics::ORDER_PLACEMENT_FAILURES
                .with_label_values(&[failure_reason(&e)])
                .inc();
            return Err(e);
        }

        let service = self.clone();
        let task = tokio::spawn(
            async move { service.place_order_detached(user_id, request).await }
                .instrument(tracing::Span::current()),
        );

        task.await.map_err(|e| {
            error!("Order placement task failed: {}", e);
            ServiceError::InternalError(format!("order placement task failed: {}", e))
        })?
    }

    async fn place_order_detached(
        &self,
        user_id: Uuid,
        request: PlaceOrderRequest,
    ) -> Result<OrderDetails, ServiceError> {
        let mut reservations: Vec<Reservation> = Vec::with_capacity(request.order_items.len());

        match self
            .reserve_and_persist(user_id, &request, &mut reservations)
            .await
        {
            Ok(details) => {
                metrics::ORDERS_PLACED.inc();
                info!(
                    order_id = %details.order.id,
                    total = %details.order.total_amount,
                    "Order placed"
                );
                self.events.publish(Event::OrderPlaced {
                    order_id: details.order.id,
                    user_id,
                    total_amount: details.order.total_amount,
                });
                Ok(details)
            }
            Err(err) => {
                if !reservations.is_empty() {
                    metrics::RESERVATION_ROLLBACKS.inc_by(reservations.len() as u64);
                    let failed = self.ledger.release_all(&reservations).await;
                    if failed > 0 {
                        error!(failed, "Order rollback left stock unreleased");
                    }
                }
                metrics::ORDER_PLACEMENT_FAILURES
                    .with_label_values(&[failure_reason(&err)])
                    .inc();
                warn!(error = %err, "Order placement failed");
                Err(err)
            }
        }
    }

    async fn reserve_and_persist(
        &self,
        user_id: Uuid,
        request: &PlaceOrderRequest,
        reservations: &mut Vec<Reservation>,
    ) -> Result<OrderDetails, ServiceError> {
        let mut lines: Vec<ReservedLine> = Vec::new();

        for line in request.merged_lines()? {
            let product = self
                .catalog
                .get_product(line.product_id)
                .await?
                .ok_or_else(|| {
                    ServiceError::ProductUnavailable(format!("Product {} not found", line.product_id))
                })?;

            if !product.is_active {
                return Err(ServiceError::ProductUnavailable(format!(
                    "{} is no longer available",
                    product.name
                )));
            }

            let reservation = self.ledger.reserve(product.id, line.quantity).await?;
            reservations.push(reservation);

            lines.push(ReservedLine {
                product_id: product.id,
                unit_price: product.unit_price(),
                name: product.name,
                image: product.image,
                quantity: line.quantity,
            });
        }

        let amounts: Vec<LineAmount> = lines
            .iter()
            .map(|l| LineAmount {
                unit_price: l.unit_price,
                quantity: l.quantity,
            })
            .collect();
        let subtotal = pricing::subtotal(&amounts);

        let coupon: Option<coupon::Model> = match request
            .coupon_code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
        {
            Some(code) => Some(self.coupons.validate(code, user_id, subtotal).await?),
            None => None,
        };

        let discount = coupon
            .as_ref()
            .map(|c| {
                pricing::coupon_discount(
                    c.discount_type,
                    c.discount_value,
                    c.max_discount_amount,
                    subtotal,
                )
            })
            .unwrap_or(Decimal::ZERO);
        let breakdown = self.pricing.quote(&amounts, discount);

        let order_id = Uuid::new_v4();
        let (order, items) = self
            .persist_order(order_id, user_id, request, &lines, breakdown, coupon.clone())
            .await?;

        if let Some(c) = coupon {
            metrics::COUPONS_REDEEMED.inc();
            self.events.publish(Event::CouponRedeemed {
                coupon_id: c.id,
                order_id,
                user_id,
            });
        }

        Ok(OrderDetails { order, items })
    }

    async fn persist_order(
        &self,
        order_id: Uuid,
        user_id: Uuid,
        request: &PlaceOrderRequest,
        lines: &[ReservedLine],
        breakdown: PriceBreakdown,
        coupon: Option<coupon::Model>,
    ) -> Result<(order::Model, Vec<order_item::Model>), ServiceError> {
        let now = Utc::now();
        let address = &request.shipping_address;

        let order_model = order::ActiveModel {
            id: Set(order_id),
            user_id: Set(user_id),
            status: Set(OrderStatus::Pending),
            shipping_address: Set(address.address.trim().to_string()),
            shipping_city: Set(address.city.trim().to_string()),
            shipping_postal_code: Set(address.postal_code.trim().to_string()),
            shipping_country: Set(address.country.trim().to_string()),
            coupon_code: Set(coupon.as_ref().map(|c| normalize_code(&c.code))),
            subtotal: Set(breakdown.subtotal),
            discount_amount: Set(breakdown.discount),
            shipping_cost: Set(breakdown.shipping),
            tax_amount: Set(breakdown.tax),
            total_amount: Set(breakdown.total),
            payment_reference: Set(None),
            paid_at: Set(None),
            delivered_at: Set(None),
            cancelled_at: Set(None),
            cancellation_reason: Set(None),
            version: Set(1),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let item_models: Vec<order_item::ActiveModel> = lines
            .iter()
            .map(|l| order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(l.product_id),
                name: Set(l.name.clone()),
                image: Set(l.image.clone()),
                quantity: Set(l.quantity),
                unit_price: Set(l.unit_price),
            })
            .collect();

        let persisted = self
            .db
            .transaction::<_, (order::Model, Vec<order_item::Model>), ServiceError>(|txn| {
                Box::pin(async move {
                    let order = order_model.insert(txn).await.map_err(ServiceError::db_error)?;

                    let mut items = Vec::with_capacity(item_models.len());
                    for item in item_models {
                        items.push(item.insert(txn).await.map_err(ServiceError::db_error)?);
                    }

                    if let Some(c) = &coupon {
                        CouponService::redeem_in(txn, c, user_id, order_id).await?;
                    }

                    pricing::verify_total(&order, &items)?;
                    Ok((order, items))
                })
            })
            .await?;

        Ok(persisted)
    }

    async fn find_order<C: ConnectionTrait>(
        conn: &C,
        order_id: Uuid,
    ) -> Result<order::Model, ServiceError> {
        order::Entity::find_by_id(order_id)
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    async fn load_items<C: ConnectionTrait>(
        conn: &C,
        order_id: Uuid,
    ) -> Result<Vec<order_item::Model>, ServiceError> {
        order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(conn)
            .await
            .map_err(ServiceError::db_error)
    }

    async fn attach_items(
        &self,
        orders: Vec<order::Model>,
    ) -> Result<Vec<OrderDetails>, ServiceError> {
        let ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
        let mut by_order: HashMap<Uuid, Vec<order_item::Model>> = HashMap::new();

        if !ids.is_empty() {
            let items = order_item::Entity::find()
                .filter(order_item::Column::OrderId.is_in(ids))
                .all(&*self.db)
                .await
                .map_err(ServiceError::db_error)?;
            for item in items {
                by_order.entry(item.order_id).or_default().push(item);
            }
        }

        Ok(orders
            .into_iter()
            .map(|order| OrderDetails {
                items: by_order.remove(&order.id).unwrap_or_default(),
                order,
            })
            .collect())
    }

    /// Writes `changes` only if the order still has `expected_version`.
    async fn save_versioned<C: ConnectionTrait>(
        conn: &C,
        order_id: Uuid,
        expected_version: i32,
        mut changes: order::ActiveModel,
    ) -> Result<order::Model, ServiceError> {
        changes.version = Set(expected_version + 1);
        changes.updated_at = Set(Utc::now());

        match order::Entity::update(changes)
            .filter(order::Column::Version.eq(expected_version))
            .exec(conn)
            .await
        {
            Ok(updated) => Ok(updated),
            Err(DbErr::RecordNotUpdated) => {
                warn!(order_id = %order_id, expected_version, "Order version changed underneath us");
                Err(ServiceError::ConcurrentModification(order_id))
            }
            Err(e) => Err(ServiceError::db_error(e)),
        }
    }

    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderDetails, ServiceError> {
        let order = Self::find_order(&*self.db, order_id).await?;
        let items = Self::load_items(&*self.db, order_id).await?;
        Ok(OrderDetails { order, items })
    }

    /// Orders placed by `user_id`, newest first.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn list_user_orders(
        &self,
        user_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<OrderDetails>, u64), ServiceError> {
        let paginator = order::Entity::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, per_page);

        let total = paginator.num_items().await.map_err(ServiceError::db_error)?;
        let orders = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .map_err(ServiceError::db_error)?;

        Ok((self.attach_items(orders).await?, total))
    }

    /// All orders, optionally restricted to one status, newest first.
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        status: Option<OrderStatus>,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<OrderDetails>, u64), ServiceError> {
        let mut query = order::Entity::find();
        if let Some(status) = status {
            query = query.filter(order::Column::Status.eq(status));
        }

        let paginator = query
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, per_page);

        let total = paginator.num_items().await.map_err(ServiceError::db_error)?;
        let orders = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .map_err(ServiceError::db_error)?;

        Ok((self.attach_items(orders).await?, total))
    }

    /// Records a successful payment and moves the order to processing.
    ///
    /// Only a pending order can be marked paid. A concurrent writer that got
    /// there first surfaces as [`ServiceError::ConcurrentModification`].
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn mark_paid(
        &self,
        order_id: Uuid,
        payment_reference: &str,
    ) -> Result<OrderDetails, ServiceError> {
        let order = Self::find_order(&*self.db, order_id).await?;
        if order.status != OrderStatus::Pending {
            return Err(ServiceError::InvalidTransition {
                from: order.status.to_string(),
                to: OrderStatus::Processing.to_string(),
            });
        }

        let items = Self::load_items(&*self.db, order_id).await?;
        pricing::verify_total(&order, &items)?;

        let now = Utc::now();
        let mut changes: order::ActiveModel = order.clone().into();
        changes.status = Set(OrderStatus::Processing);
        changes.paid_at = Set(Some(now));
        changes.payment_reference = Set(Some(payment_reference.to_string()));

        let updated = Self::save_versioned(&*self.db, order_id, order.version, changes).await?;

        metrics::ORDER_TRANSITIONS
            .with_label_values(&[OrderStatus::Processing.as_str()])
            .inc();
        info!(payment_reference, "Order marked paid");

        self.events.publish(Event::OrderPaid {
            order_id,
            payment_reference: payment_reference.to_string(),
        });
        self.events.publish(Event::OrderStatusChanged {
            order_id,
            old_status: order.status.to_string(),
            new_status: updated.status.to_string(),
        });

        Ok(OrderDetails {
            order: updated,
            items,
        })
    }

    /// Moves an order to `new_status`, releasing its stock when cancelling.
    #[instrument(skip(self), fields(order_id = %order_id, new_status = %new_status))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
    ) -> Result<OrderDetails, ServiceError> {
        self.transition(order_id, new_status, None).await
    }

    /// Cancels an order that has not shipped yet and returns its stock.
    #[instrument(skip(self, reason), fields(order_id = %order_id))]
    pub async fn cancel_order(
        &self,
        order_id: Uuid,
        reason: Option<String>,
    ) -> Result<OrderDetails, ServiceError> {
        let order = Self::find_order(&*self.db, order_id).await?;
        match order.status {
            OrderStatus::Shipped | OrderStatus::Delivered => {
                return Err(ServiceError::NotCancellable(format!(
                    "Order has already been {}",
                    order.status
                )))
            }
            OrderStatus::Cancelled => {
                return Err(ServiceError::NotCancellable(
                    "Order is already cancelled".to_string(),
                ))
            }
            OrderStatus::Pending | OrderStatus::Processing => {}
        }

        let reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        self.transition(order_id, OrderStatus::Cancelled, reason)
            .await
    }

    async fn transition(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
        cancellation_reason: Option<String>,
    ) -> Result<OrderDetails, ServiceError> {
        let order = Self::find_order(&*self.db, order_id).await?;
        ensure_transition(order.status, new_status)?;

        let items = Self::load_items(&*self.db, order_id).await?;
        pricing::verify_total(&order, &items)?;

        let releasing = new_status == OrderStatus::Cancelled;
        if releasing {
            info!(lines = items.len(), "Releasing stock for cancelled order");
        }

        let previous = order.clone();
        let to_release = items.clone();
        let updated = self
            .db
            .transaction::<_, order::Model, ServiceError>(|txn| {
                Box::pin(async move {
                    if releasing {
                        let mut lines = to_release;
                        lines.sort_by_key(|item| item.product_id);
                        for item in &lines {
                            InventoryLedger::release_in(txn, item.product_id, item.quantity).await?;
                        }
                    }

                    let now = Utc::now();
                    let mut changes: order::ActiveModel = order.clone().into();
                    changes.status = Set(new_status);
                    match new_status {
                        OrderStatus::Delivered if order.delivered_at.is_none() => {
                            changes.delivered_at = Set(Some(now));
                        }
                        OrderStatus::Cancelled => {
                            changes.cancelled_at = Set(Some(now));
                            changes.cancellation_reason = Set(cancellation_reason);
                        }
                        _ => {}
                    }

                    Self::save_versioned(txn, order.id, order.version, changes).await
                })
            })
            .await?;

        metrics::ORDER_TRANSITIONS
            .with_label_values(&[new_status.as_str()])
            .inc();

        self.events.publish(Event::OrderStatusChanged {
            order_id,
            old_status: previous.status.to_string(),
            new_status: updated.status.to_string(),
        });

        if releasing {
            for item in &items {
                self.events.publish(Event::StockReleased {
                    order_id,
                    product_id: item.product_id,
                    quantity: item.quantity,
                });
            }

            let refund_required = previous.is_paid();
            if refund_required {
                warn!(
                    payment_reference = previous.payment_reference.as_deref().unwrap_or(""),
                    "Cancelled a paid order, refund must be issued manually"
                );
            }
            self.events.publish(Event::OrderCancelled {
                order_id,
                refund_required,
            });
        }

        Ok(OrderDetails {
            order: updated,
            items,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(items: Vec<(Uuid, i32)>) -> PlaceOrderRequest {
        PlaceOrderRequest {
            order_items: items
                .into_iter()
                .map(|(product_id, quantity)| LineItemRequest {
                    product_id,
                    quantity,
                })
                .collect(),
            shipping_address: ShippingAddress {
                address: "12 Jasmine Street".into(),
                city: "Grasse".into(),
                postal_code: "06130".into(),
                country: "France".into(),
            },
            coupon_code: None,
        }
    }

    #[test]
    fn empty_orders_are_rejected() {
        assert!(matches!(
            request(vec![]).check(),
            Err(ServiceError::ValidationError(_))
        ));
    }

    #[test]
    fn non_positive_quantities_are_rejected() {
        assert!(request(vec![(Uuid::new_v4(), 0)]).check().is_err());
        assert!(request(vec![(Uuid::new_v4(), -2)]).check().is_err());
        assert!(request(vec![(Uuid::new_v4(), 2)]).check().is_ok());
    }

    #[test]
    fn blank_address_is_rejected() {
        let mut req = request(vec![(Uuid::new_v4(), 1)]);
        req.shipping_address.city = "   ".into();
        assert!(req.check().is_err());
    }

    #[test]
    fn repeated_products_are_merged() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let merged = request(vec![(a, 1), (b, 2), (a, 3)]).merged_lines().unwrap();

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].product_id, a);
        assert_eq!(merged[0].quantity, 4);
        assert_eq!(merged[1].quantity, 2);
    }

    async fn pending_order(db: &DatabaseConnection) -> order::Model {
        let now = Utc::now();
        order::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(Uuid::new_v4()),
            status: Set(OrderStatus::Pending),
            shipping_address: Set("12 Jasmine Street".into()),
            shipping_city: Set("Grasse".into()),
            shipping_postal_code: Set("06130".into()),
            shipping_country: Set("France".into()),
            coupon_code: Set(None),
            subtotal: Set(Decimal::ZERO),
            discount_amount: Set(Decimal::ZERO),
            shipping_cost: Set(Decimal::ZERO),
            tax_amount: Set(Decimal::ZERO),
            total_amount: Set(Decimal::ZERO),
            payment_reference: Set(None),
            paid_at: Set(None),
            delivered_at: Set(None),
            cancelled_at: Set(None),
            cancellation_reason: Set(None),
            version: Set(1),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn stale_version_is_a_concurrent_modification() {
        let db = crate::db::establish_connection_with_config(&crate::db::DbConfig::sqlite_memory())
            .await
            .unwrap();
        crate::db::run_migrations(&db).await.unwrap();
        let order = pending_order(&db).await;

        let mut first: order::ActiveModel = order.clone().into();
        first.status = Set(OrderStatus::Processing);
        let saved = OrderService::save_versioned(&db, order.id, order.version, first)
            .await
            .unwrap();
        assert_eq!(saved.version, order.version + 1);

        let mut stale: order::ActiveModel = order.clone().into();
        stale.status = Set(OrderStatus::Cancelled);
        let result = OrderService::save_versioned(&db, order.id, order.version, stale).await;
        assert!(matches!(
            result,
            Err(ServiceError::ConcurrentModification(id)) if id == order.id
        ));

        let current = order::Entity::find_by_id(order.id)
            .one(&db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(current.status, OrderStatus::Processing);
        assert_eq!(current.version, saved.version);
    }

    #[test]
    fn failure_reasons_are_low_cardinality() {
        assert_eq!(
            failure_reason(&ServiceError::InsufficientStock {
                product: "Oud".into(),
                available: 0
            }),
            "insufficient_stock"
        );
        assert_eq!(failure_reason(&ServiceError::NotFound("x".into())), "other");
    }
}
