//! Request extractors that reject with the standard error body.

use crate::error::AppError;
use crate::middleware::error::get_request_id_from_headers;
use crate::payouts::Actor;
use axum::{
    extract::{FromRequest, FromRequestParts, Request},
    http::{request::Parts, HeaderMap},
    Json,
};
use serde::de::DeserializeOwned;
use uuid::Uuid;

pub const SELLER_ID_HEADER: &str = "x-seller-id";

/// The authenticated seller, as asserted by the upstream auth layer.
#[derive(Debug, Clone)]
pub struct SellerContext {
    pub seller_id: String,
    pub ip_address: Option<String>,
    pub request_id: Option<String>,
}

impl SellerContext {
    pub fn actor(&self) -> Actor {
        Actor::seller(self.seller_id.clone(), self.ip_address.clone())
    }

    /// Attach this request's id to an error on its way out.
    pub fn fail(&self, err: impl Into<AppError>) -> AppError {
        with_request_id(err.into(), self.request_id.clone())
    }
}

impl<S> FromRequestParts<S> for SellerContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let request_id = get_request_id_from_headers(&parts.headers);
        let seller_id = parts
            .headers
            .get(SELLER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                with_request_id(
                    AppError::unauthorized("Missing seller identity"),
                    request_id.clone(),
                )
            })?;

        Ok(Self {
            seller_id,
            ip_address: client_ip(&parts.headers),
            request_id,
        })
    }
}

/// First hop of `x-forwarded-for`, falling back to `x-real-ip`.
pub fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        })
        .map(str::to_string)
}

/// `Json<T>` whose rejection is a validation error instead of axum's plain text.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let request_id = get_request_id_from_headers(req.headers());
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(with_request_id(
                AppError::validation("body", rejection.body_text()),
                request_id,
            )),
        }
    }
}

pub fn parse_request_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| AppError::validation("id", format!("'{}' is not a valid request id", raw)))
}

fn with_request_id(err: AppError, request_id: Option<String>) -> AppError {
    match request_id {
        Some(id) => err.with_request_id(id),
        None => err,
    }
}
