use axum::{
    Json,
    extract::{Path, RawQuery, State},
    response::IntoResponse,
};
use chrono::Utc;
use tracing::debug;

use aerohub_core::load_featured;
use aerohub_types::api::{FeaturedLivery, LiveryListResponse, ViewResponse};
use aerohub_types::listing::{ListingParams, total_pages};
use aerohub_types::models::LiveryId;

use crate::error::ApiError;
use crate::state::AppState;

/// GET /api/liveries?page&pageSize&sort&search&aircraft
///
/// Takes the same query string the listing page keeps in its URL. Unknown or
/// malformed values fall back to their defaults.
pub async fn list_liveries(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> Result<impl IntoResponse, ApiError> {
    let params = ListingParams::from_query_string(query.as_deref().unwrap_or_default());

    let page = state
        .gateway
        .list_liveries(
            &params.filter(),
            params.sort(),
            params.page,
            params.page_size.get(),
        )
        .await?;

    Ok(Json(LiveryListResponse {
        total_pages: total_pages(page.total_count, params.page_size),
        items: page.items,
        total_count: page.total_count,
        page: params.page,
        page_size: params.page_size.get(),
    }))
}

/// GET /api/liveries/featured
pub async fn featured(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let ranked = load_featured(state.gateway.as_ref(), state.featured, Utc::now()).await?;

    let featured: Vec<FeaturedLivery> = ranked
        .into_iter()
        .map(|r| FeaturedLivery {
            livery: r.livery,
            score: r.score,
        })
        .collect();
    Ok(Json(featured))
}

/// GET /api/livery/{id}
pub async fn get_livery(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_livery_id(&id)?;
    let livery = state.gateway.get_livery(id).await?;
    Ok(Json(livery))
}

/// POST /api/livery/{id}/view (no auth)
pub async fn record_view(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_livery_id(&id)?;
    let views = state.gateway.increment_view(id).await?;
    debug!("Livery {} now has {} views", id, views);
    Ok(Json(ViewResponse { views }))
}

pub(crate) fn parse_livery_id(raw: &str) -> Result<LiveryId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest("Invalid livery ID".into()))
}
