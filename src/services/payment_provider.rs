//! Payment provider abstraction.
//!
//! The engine only needs two calls from a card processor: create a payment
//! intent for an amount, and read an intent back to learn whether it was paid.
//! [`StripePaymentProvider`] talks to the Stripe REST API; [`MockPaymentProvider`]
//! keeps intents in memory for development and tests.

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::StatusCode;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::ServiceError;

/// Lifecycle of a provider-side payment intent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    RequiresCapture,
    Canceled,
    Succeeded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderIntent {
    pub id: String,
    pub client_secret: Option<String>,
    /// Amount in the currency's minor unit (cents)
    pub amount_minor: i64,
    pub currency: String,
    pub status: IntentStatus,
    pub payment_method: Option<String>,
    pub receipt_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreateIntentParams {
    pub amount: Decimal,
    pub currency: String,
    pub order_id: Uuid,
    pub user_id: Uuid,
    /// Reused across retries so the provider creates at most one intent
    pub idempotency_key: String,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("payment provider timed out")]
    Timeout,
    #[error("payment provider unavailable: {0}")]
    Unavailable(String),
    #[error("payment provider rejected the request: {0}")]
    Rejected(String),
    #[error("unexpected payment provider response: {0}")]
    InvalidResponse(String),
}

impl From<ProviderError> for ServiceError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Timeout | ProviderError::Unavailable(_) => {
                ServiceError::ServiceUnavailable(err.to_string())
            }
            ProviderError::Rejected(_) | ProviderError::InvalidResponse(_) => {
                ServiceError::ExternalServiceError(err.to_string())
            }
        }
    }
}

/// Converts a decimal amount to minor units.
pub fn to_minor_units(amount: Decimal) -> Result<i64, ProviderError> {
    (amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero) * Decimal::ONE_HUNDRED)
        .trunc()
        .to_i64()
        .ok_or_else(|| ProviderError::Rejected(format!("amount {} is out of range", amount)))
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn create_intent(&self, params: &CreateIntentParams) -> Result<ProviderIntent, ProviderError>;

    async fn retrieve_intent(&self, intent_id: &str) -> Result<ProviderIntent, ProviderError>;
}

#[derive(Debug, Deserialize)]
struct StripeIntent {
    id: String,
    client_secret: Option<String>,
    amount: i64,
    currency: String,
    status: IntentStatus,
    payment_method: Option<serde_json::Value>,
    latest_charge: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
}

impl From<StripeIntent> for ProviderIntent {
    fn from(intent: StripeIntent) -> Self {
        // Both fields are ids unless expanded, in which case they are objects.
        let payment_method = intent.payment_method.and_then(|pm| match pm {
            serde_json::Value::String(id) => Some(id),
            serde_json::Value::Object(obj) => obj.get("id").and_then(|v| v.as_str()).map(String::from),
            _ => None,
        });
        let receipt_url = intent
            .latest_charge
            .as_ref()
            .and_then(|charge| charge.get("receipt_url"))
            .and_then(|url| url.as_str())
            .map(String::from);

        ProviderIntent {
            id: intent.id,
            client_secret: intent.client_secret,
            amount_minor: intent.amount,
            currency: intent.currency,
            status: intent.status,
            payment_method,
            receipt_url,
        }
    }
}

pub struct StripePaymentProvider {
    client: reqwest::Client,
    secret_key: String,
    api_base: String,
}

impl StripePaymentProvider {
    pub fn new(
        secret_key: impl Into<String>,
        api_base: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            secret_key: secret_key.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        })
    }

    fn transport_error(err: reqwest::Error) -> ProviderError {
        if err.is_timeout() {
            ProviderError::Timeout
        } else {
            ProviderError::Unavailable(err.to_string())
        }
    }

    async fn parse(response: reqwest::Response) -> Result<ProviderIntent, ProviderError> {
        let status = response.status();
        if status.is_success() {
            let intent: StripeIntent = response
                .json()
                .await
                .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
            return Ok(intent.into());
        }

        let message = response
            .json::<StripeErrorBody>()
            .await
            .ok()
            .and_then(|body| body.error.message)
            .unwrap_or_else(|| status.to_string());

        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            warn!(%status, "Stripe request failed");
            Err(ProviderError::Unavailable(message))
        } else {
            Err(ProviderError::Rejected(message))
        }
    }
}

#[async_trait]
impl PaymentProvider for StripePaymentProvider {
    fn name(&self) -> &'static str {
        "stripe"
    }

    async fn create_intent(&self, params: &CreateIntentParams) -> Result<ProviderIntent, ProviderError> {
        let amount = to_minor_units(params.amount)?;
        let form = [
            ("amount", amount.to_string()),
            ("currency", params.currency.to_lowercase()),
            ("metadata[order_id]", params.order_id.to_string()),
            ("metadata[user_id]", params.user_id.to_string()),
            ("automatic_payment_methods[enabled]", "true".to_string()),
        ];

        debug!(order_id = %params.order_id, amount, "Creating Stripe payment intent");
        let response = self
            .client
            .post(format!("{}/v1/payment_intents", self.api_base))
            .bearer_auth(&self.secret_key)
            .header("Idempotency-Key", &params.idempotency_key)
            .form(&form)
            .send()
            .await
            .map_err(Self::transport_error)?;

        Self::parse(response).await
    }

    async fn retrieve_intent(&self, intent_id: &str) -> Result<ProviderIntent, ProviderError> {
        let response = self
            .client
            .get(format!("{}/v1/payment_intents/{}", self.api_base, intent_id))
            .bearer_auth(&self.secret_key)
            .query(&[("expand[]", "latest_charge")])
            .send()
            .await
            .map_err(Self::transport_error)?;

        Self::parse(response).await
    }
}

/// In-memory provider; every intent starts out awaiting a payment method.
#[derive(Default)]
pub struct MockPaymentProvider {
    intents: DashMap<String, ProviderIntent>,
    by_idempotency_key: DashMap<String, String>,
    latency_ms: AtomicU64,
    retrieve_calls: AtomicUsize,
}

impl MockPaymentProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates the customer completing (or failing) payment.
    pub fn set_status(&self, intent_id: &str, status: IntentStatus) -> bool {
        match self.intents.get_mut(intent_id) {
            Some(mut intent) => {
                intent.status = status;
                if status == IntentStatus::Succeeded {
                    intent.payment_method = Some("pm_card_visa".to_string());
                    intent.receipt_url = Some(format!("https://pay.example/receipts/{}", intent_id));
                }
                true
            }
            None => false,
        }
    }

    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn retrieve_calls(&self) -> usize {
        self.retrieve_calls.load(Ordering::SeqCst)
    }

    pub fn intent(&self, intent_id: &str) -> Option<ProviderIntent> {
        self.intents.get(intent_id).map(|i| i.clone())
    }

    async fn simulate_latency(&self) {
        let ms = self.latency_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }
}

#[async_trait]
impl PaymentProvider for MockPaymentProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn create_intent(&self, params: &CreateIntentParams) -> Result<ProviderIntent, ProviderError> {
        self.simulate_latency().await;

        if let Some(existing) = self
            .by_idempotency_key
            .get(&params.idempotency_key)
            .and_then(|id| self.intents.get(id.value()).map(|i| i.clone()))
        {
            return Ok(existing);
        }

        let id = format!("pi_mock_{}", Uuid::new_v4().simple());
        let intent = ProviderIntent {
            client_secret: Some(format!("{}_secret_{}", id, Uuid::new_v4().simple())),
            id: id.clone(),
            amount_minor: to_minor_units(params.amount)?,
            currency: params.currency.to_lowercase(),
            status: IntentStatus::RequiresPaymentMethod,
            payment_method: None,
            receipt_url: None,
        };

        self.intents.insert(id.clone(), intent.clone());
        self.by_idempotency_key
            .insert(params.idempotency_key.clone(), id);
        Ok(intent)
    }

    async fn retrieve_intent(&self, intent_id: &str) -> Result<ProviderIntent, ProviderError> {
        self.retrieve_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        self.intents
            .get(intent_id)
            .map(|i| i.clone())
            .ok_or_else(|| ProviderError::Rejected(format!("No such payment_intent: {}", intent_id)))
    }
}
