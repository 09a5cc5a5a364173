use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::config::AppConfig;
use crate::errors::ServiceError;

/// Standard created response
pub fn created_response<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(data)).into_response()
}

/// JSON body that has been deserialized and validated.
///
/// Malformed bodies and unknown fields are reported as validation errors
/// (400) rather than axum's default 422.
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ServiceError::ValidationError(rejection.body_text()))?;
        value.validate()?;
        Ok(Self(value))
    }
}

/// Like [`ValidatedJson`] for endpoints whose body may be omitted.
///
/// An empty body yields `None`; anything else must parse and validate.
pub struct OptionalValidatedJson<T>(pub Option<T>);

#[async_trait]
impl<T, S> FromRequest<S> for OptionalValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|rejection| ServiceError::ValidationError(rejection.body_text()))?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self(None));
        }

        let value: T = serde_json::from_slice(&bytes)
            .map_err(|e| ServiceError::ValidationError(format!("Invalid JSON body: {}", e)))?;
        value.validate()?;
        Ok(Self(Some(value)))
    }
}

/// Pagination parameters for list operations
#[derive(Debug, Default, Deserialize, Serialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PaginationParams {
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

impl PaginationParams {
    /// Resolves the one-based page and the clamped page size.
    pub fn resolve(&self, config: &AppConfig) -> (u64, u64) {
        (self.page.unwrap_or(1).max(1), config.page_size(self.limit))
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

impl<T> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, page: u64, limit: u64, total: u64) -> Self {
        let total_pages = if total == 0 || limit == 0 {
            0
        } else {
            (total + limit - 1) / limit
        };
        Self {
            items,
            total,
            page,
            limit,
            total_pages,
        }
    }
}
