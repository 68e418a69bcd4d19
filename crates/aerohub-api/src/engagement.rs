use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use tracing::info;

use aerohub_gateway::{EngagementKind, Session};
use aerohub_types::api::ToggleResponse;

use crate::error::ApiError;
use crate::liveries::parse_livery_id;
use crate::state::AppState;

/// POST /api/livery/{id}/like
pub async fn toggle_like(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Extension(session): Extension<Session>,
) -> Result<impl IntoResponse, ApiError> {
    toggle(state, session, EngagementKind::Like, &id).await
}

/// POST /api/livery/{id}/save
pub async fn toggle_save(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Extension(session): Extension<Session>,
) -> Result<impl IntoResponse, ApiError> {
    toggle(state, session, EngagementKind::Save, &id).await
}

/// One atomic toggle as the caller. The store flips membership and the
/// counter together and reports both.
async fn toggle(
    state: AppState,
    session: Session,
    kind: EngagementKind,
    id: &str,
) -> Result<Json<ToggleResponse>, ApiError> {
    let id = parse_livery_id(id)?;
    let user_id = session.user_id.clone();

    let toggled = state.gateway.upgrade(session).toggle(kind, id).await?;
    info!(
        "User {} {} livery {}: active={} count={}",
        user_id, kind, id, toggled.active, toggled.count
    );

    Ok(Json(ToggleResponse {
        success: true,
        active: toggled.active,
        count: toggled.count,
    }))
}
