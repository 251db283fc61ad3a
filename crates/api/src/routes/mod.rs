//! HTTP route handlers and the extractors they share.

pub mod catalog;
pub mod health;
pub mod metrics;
pub mod movements;
pub mod reports;

use std::fmt::Display;
use std::str::FromStr;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use chrono::{DateTime, Utc};
use common::ActorId;
use domain::LedgerService;
use event_store::{EventStore, parse_instant};

use crate::error::ApiError;

/// Header carrying the identity of whoever records a movement.
pub const ACTOR_HEADER: &str = "x-actor-id";

/// Shared application state accessible from all handlers.
pub struct AppState<S: EventStore> {
    pub ledger: LedgerService<S>,
}

/// The recording actor, resolved from the [`ACTOR_HEADER`] header.
#[derive(Debug, Clone)]
pub struct Actor(pub ActorId);

impl<S: Send + Sync> FromRequestParts<S> for Actor {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(ACTOR_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| Actor(ActorId::new(value)))
            .ok_or_else(|| ApiError::Unauthorized(format!("missing {ACTOR_HEADER} header")))
    }
}

fn parse_id<T>(field: &str, value: &str) -> Result<T, ApiError>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("invalid {field}: {e}")))
}

fn parse_optional_id<T>(field: &str, value: Option<&str>) -> Result<Option<T>, ApiError>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .filter(|v| !v.trim().is_empty())
        .map(|v| parse_id(field, v))
        .transpose()
}

fn parse_optional_instant(value: Option<&str>) -> Result<Option<DateTime<Utc>>, ApiError> {
    value
        .filter(|v| !v.trim().is_empty())
        .map(|v| parse_instant(v).map_err(ApiError::from))
        .transpose()
}
