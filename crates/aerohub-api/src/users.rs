use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};

use aerohub_types::api::{GetUserQuery, StatsCounts, UserCard, UserStatsResponse, UserSummaryResponse};

use crate::error::ApiError;
use crate::state::AppState;

/// GET /api/users/{id}/stats
///
/// Always answers: parts that cannot be read are reported as zero.
pub async fn user_stats(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> impl IntoResponse {
    let stats = state.gateway.user_stats(&user_id).await;

    Json(UserStatsResponse {
        user: UserCard {
            username: stats.username,
            image_url: stats.image_url,
        },
        stats: StatsCounts {
            liveries: stats.livery_count,
            likes: stats.total_likes,
            saves: stats.total_saves,
        },
    })
}

/// GET /api/get-user?userId=
pub async fn get_user(
    State(state): State<AppState>,
    Query(query): Query<GetUserQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = query
        .user_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("User ID is required".into()))?;

    let profile = state.gateway.get_user(&user_id).await?;
    Ok(Json(UserSummaryResponse {
        username: profile.username,
        pfp: profile.image_url,
    }))
}
