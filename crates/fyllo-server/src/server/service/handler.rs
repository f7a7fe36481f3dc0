//! HTTP handlers for the three ID families.
//!
//! Each handler counts the request, validates its query, asks the selected
//! engine for one ID and answers with the result as JSON. Failures are
//! converted into [`ApiError`] responses.

use crate::server::{
    error::ApiError,
    telemetry::{increment_errors, increment_ids_generated, increment_requests},
};
use axum::{
    Json,
    extract::{Query, State},
};
use fyllo::{Error, IdResult, Providers, RandomResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Shared handler state: the engines built at startup.
#[derive(Clone)]
pub struct AppState {
    pub providers: Arc<Providers>,
}

impl AppState {
    pub fn new(providers: Providers) -> Self {
        Self {
            providers: Arc::new(providers),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TagQuery {
    pub tag: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VersionInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub description: &'static str,
}

pub async fn version() -> Json<VersionInfo> {
    Json(VersionInfo {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        description: env!("CARGO_PKG_DESCRIPTION"),
    })
}

#[tracing::instrument(level = "debug", skip(state))]
pub async fn snowflake(
    State(state): State<AppState>,
    Query(query): Query<TagQuery>,
) -> Result<Json<IdResult>, ApiError> {
    const FAMILY: &str = "snowflake";
    increment_requests(FAMILY);

    let result = snowflake_tag(query.tag.as_deref())
        .and_then(|tag| state.providers.snowflake.next_id(tag));
    respond(FAMILY, result)
}

#[tracing::instrument(level = "debug", skip(state))]
pub async fn segment(
    State(state): State<AppState>,
    Query(query): Query<TagQuery>,
) -> Result<Json<IdResult>, ApiError> {
    const FAMILY: &str = "segment";
    increment_requests(FAMILY);

    let result = match segment_tag(query.tag.as_deref()) {
        Ok(tag) => state.providers.segment.next_id(tag).await,
        Err(err) => Err(err),
    };
    respond(FAMILY, result)
}

#[tracing::instrument(level = "debug", skip(state))]
pub async fn random(State(state): State<AppState>) -> Json<RandomResult> {
    const FAMILY: &str = "random";
    increment_requests(FAMILY);

    let result = state.providers.random.next_id();
    increment_ids_generated(FAMILY);
    Json(result)
}

fn respond<T>(family: &'static str, result: fyllo::Result<T>) -> Result<Json<T>, ApiError> {
    match result {
        Ok(value) => {
            increment_ids_generated(family);
            Ok(Json(value))
        }
        Err(err) => {
            increment_errors(family);
            Err(err.into())
        }
    }
}

/// Snowflake tags are decimal integers in `[0, 256)`.
fn snowflake_tag(raw: Option<&str>) -> fyllo::Result<u8> {
    let raw = raw.ok_or_else(|| invalid("missing `tag` parameter"))?;
    let tag: u64 = raw
        .trim()
        .parse()
        .map_err(|_| invalid(format!("`tag` must be an integer, got `{raw}`")))?;
    u8::try_from(tag).map_err(|_| invalid(format!("`tag` must be below 256, got {tag}")))
}

fn segment_tag(raw: Option<&str>) -> fyllo::Result<&str> {
    match raw.map(str::trim) {
        Some(tag) if !tag.is_empty() => Ok(tag),
        _ => Err(invalid("missing `tag` parameter")),
    }
}

fn invalid(reason: impl Into<String>) -> Error {
    Error::InvalidRequest {
        reason: reason.into(),
    }
}
