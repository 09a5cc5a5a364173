//! Payment reconciliation.
//!
//! Creates provider intents for pending orders and, once the customer has
//! paid, propagates the provider's verdict into the order. Confirmation is
//! idempotent: confirming the same intent twice marks the order paid once.

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::auth::AuthUser;
use crate::entities::order::OrderStatus;
use crate::entities::payment::{self, PaymentStatus};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::metrics;
use crate::middleware_helpers::retry::{with_retry, RetryConfig, TransientRetryPolicy};
use crate::services::orders::{OrderDetails, OrderService};
use crate::services::payment_provider::{
    to_minor_units, CreateIntentParams, IntentStatus, PaymentProvider, ProviderError,
    ProviderIntent,
};

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateIntentRequest {
    pub order_id: Uuid,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConfirmPaymentRequest {
    #[validate(length(min = 1, max = 255))]
    pub payment_intent_id: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IntentCreated {
    pub client_secret: String,
    pub payment_intent_id: String,
}

#[derive(Debug, Clone)]
pub struct PaymentConfirmation {
    pub order: OrderDetails,
    pub payment: payment::Model,
    /// True when an earlier confirmation had already marked the order paid
    pub already_processed: bool,
}

#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DatabaseConnection>,
    orders: OrderService,
    provider: Arc<dyn PaymentProvider>,
    events: EventSender,
    currency: String,
    call_timeout: Duration,
    retry: RetryConfig,
}

impl PaymentService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        orders: OrderService,
        provider: Arc<dyn PaymentProvider>,
        events: EventSender,
        currency: impl Into<String>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            db,
            orders,
            provider,
            events,
            currency: currency.into(),
            call_timeout,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Calls the provider with a deadline, retrying transient failures.
    async fn call_provider<F, Fut, T>(&self, operation: &'static str, call: F) -> Result<T, ServiceError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let call = &call;
        let deadline = self.call_timeout;
        let provider = self.provider.name();

        with_retry(&self.retry, TransientRetryPolicy, move || async move {
            let started = Instant::now();
            let outcome = tokio::time::timeout(deadline, call()).await;
            metrics::PAYMENT_PROVIDER_LATENCY.observe(started.elapsed().as_secs_f64());

            match outcome {
                Ok(result) => result.map_err(ServiceError::from),
                Err(_) => {
                    warn!(provider, operation, ?deadline, "Payment provider call timed out");
                    Err(ProviderError::Timeout.into())
                }
            }
        })
        .await
    }

    async fn find_record(&self, payment_intent_id: &str) -> Result<payment::Model, ServiceError> {
        payment::Entity::find()
            .filter(payment::Column::PaymentIntentId.eq(payment_intent_id))
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound("Payment record not found".to_string()))
    }

    /// Starts payment for a pending order owned by the caller.
    #[instrument(skip(self, user), fields(order_id = %order_id, user_id = %user.user_id))]
    pub async fn create_intent(
        &self,
        order_id: Uuid,
        user: &AuthUser,
    ) -> Result<IntentCreated, ServiceError> {
        let details = self.orders.get_order(order_id).await?;
        let order = details.order;

        if order.user_id != user.user_id {
            return Err(ServiceError::Unauthorized(
                "Not authorized to pay for this order".to_string(),
            ));
        }
        if order.status != OrderStatus::Pending || order.is_paid() {
            return Err(ServiceError::BadRequest(format!(
                "Order is {} and cannot be paid",
                order.status
            )));
        }
        if order.total_amount <= Decimal::ZERO {
            return Err(ServiceError::BadRequest(
                "Order total must be positive to take a payment".to_string(),
            ));
        }

        let params = CreateIntentParams {
            amount: order.total_amount,
            currency: self.currency.clone(),
            order_id,
            user_id: user.user_id,
            idempotency_key: Uuid::new_v4().to_string(),
        };
        let provider = &self.provider;
        let params_ref = &params;
        let intent: ProviderIntent = self
            .call_provider("create_intent", || provider.create_intent(params_ref))
            .await?;

        let client_secret = intent.client_secret.clone().ok_or_else(|| {
            ServiceError::ExternalServiceError(
                "Payment provider returned no client secret".to_string(),
            )
        })?;

        let now = Utc::now();
        payment::ActiveModel {
            id: Set(Uuid::new_v4()),
            payment_intent_id: Set(intent.id.clone()),
            order_id: Set(order_id),
            user_id: Set(user.user_id),
            amount: Set(order.total_amount),
            currency: Set(self.currency.to_lowercase()),
            status: Set(PaymentStatus::Pending),
            payment_method: Set(None),
            receipt_url: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .map_err(ServiceError::db_error)?;

        info!(payment_intent_id = %intent.id, "Payment intent created");
        self.events.publish(Event::PaymentIntentCreated {
            order_id,
            payment_intent_id: intent.id.clone(),
        });

        Ok(IntentCreated {
            client_secret,
            payment_intent_id: intent.id,
        })
    }

    /// Confirms a payment by intent id on behalf of the payer.
    #[instrument(skip(self, user), fields(payment_intent_id = %payment_intent_id, user_id = %user.user_id))]
    pub async fn confirm(
        &self,
        payment_intent_id: &str,
        user: &AuthUser,
    ) -> Result<PaymentConfirmation, ServiceError> {
        let record = self.find_record(payment_intent_id).await?;
        if !user.can_access(record.user_id) {
            return Err(ServiceError::Forbidden(
                "Not authorized to confirm this payment".to_string(),
            ));
        }
        self.reconcile(record).await
    }

    /// Marks a specific order paid using one of its payment intents.
    #[instrument(skip(self, user), fields(order_id = %order_id, payment_intent_id = %payment_intent_id))]
    pub async fn pay_order(
        &self,
        order_id: Uuid,
        payment_intent_id: &str,
        user: &AuthUser,
    ) -> Result<PaymentConfirmation, ServiceError> {
        let details = self.orders.get_order(order_id).await?;
        if details.order.user_id != user.user_id {
            return Err(ServiceError::Forbidden(
                "Not authorized to pay for this order".to_string(),
            ));
        }

        let record = self.find_record(payment_intent_id).await?;
        if record.order_id != order_id {
            return Err(ServiceError::BadRequest(
                "Payment intent does not belong to this order".to_string(),
            ));
        }
        self.reconcile(record).await
    }

    async fn reconcile(&self, record: payment::Model) -> Result<PaymentConfirmation, ServiceError> {
        let current = self.orders.get_order(record.order_id).await?;
        if record.status == PaymentStatus::Succeeded && current.order.is_paid() {
            return Ok(PaymentConfirmation {
                order: current,
                payment: record,
                already_processed: true,
            });
        }

        let provider = &self.provider;
        let intent_id = record.payment_intent_id.as_str();
        let intent = self
            .call_provider("retrieve_intent", || provider.retrieve_intent(intent_id))
            .await?;

        if intent.status != IntentStatus::Succeeded {
            info!(status = %intent.status, "Payment not completed yet");
            return Err(ServiceError::PaymentNotSucceeded(intent.status.to_string()));
        }

        let expected_minor = to_minor_units(record.amount).map_err(ServiceError::from)?;
        if intent.amount_minor != expected_minor {
            error!(
                expected = expected_minor,
                received = intent.amount_minor,
                "Provider amount differs from the recorded payment"
            );
            metrics::invariant_violated("payment_amount");
            return Err(ServiceError::ExternalServiceError(
                "Paid amount does not match the order total".to_string(),
            ));
        }

        let payment = self.record_success(&record, &intent).await?;

        if current.order.is_paid() {
            return Ok(PaymentConfirmation {
                order: current,
                payment,
                already_processed: true,
            });
        }

        match self
            .orders
            .mark_paid(record.order_id, &record.payment_intent_id)
            .await
        {
            Ok(order) => {
                metrics::PAYMENTS_CONFIRMED.inc();
                self.events.publish(Event::PaymentSucceeded {
                    order_id: record.order_id,
                    payment_intent_id: record.payment_intent_id.clone(),
                });
                Ok(PaymentConfirmation {
                    order,
                    payment,
                    already_processed: false,
                })
            }
            Err(err @ (ServiceError::ConcurrentModification(_) | ServiceError::InvalidTransition { .. })) => {
                let latest = self.orders.get_order(record.order_id).await?;
                if latest.order.is_paid() {
                    Ok(PaymentConfirmation {
                        order: latest,
                        payment,
                        already_processed: true,
                    })
                } else {
                    warn!(
                        order_status = %latest.order.status,
                        "Payment succeeded for an order that can no longer be paid, refund required"
                    );
                    Err(err)
                }
            }
            Err(err) => Err(err),
        }
    }

    /// Flips the payment record to succeeded once, keeping later calls no-ops.
    async fn record_success(
        &self,
        record: &payment::Model,
        intent: &ProviderIntent,
    ) -> Result<payment::Model, ServiceError> {
        payment::Entity::update_many()
            .col_expr(payment::Column::Status, Expr::value(PaymentStatus::Succeeded))
            .col_expr(
                payment::Column::PaymentMethod,
                Expr::value(intent.payment_method.clone()),
            )
            .col_expr(
                payment::Column::ReceiptUrl,
                Expr::value(intent.receipt_url.clone()),
            )
            .col_expr(payment::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(payment::Column::Id.eq(record.id))
            .filter(payment::Column::Status.ne(PaymentStatus::Succeeded))
            .exec(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        self.find_record(&record.payment_intent_id).await
    }
}
