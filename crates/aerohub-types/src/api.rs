use serde::{Deserialize, Serialize};

use crate::models::Livery;

// -- JWT Claims --

/// Claims of the identity provider's store token. Canonical definition shared
/// by the API middleware and anything else that inspects a session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

// -- Liveries --

#[derive(Debug, Serialize, Deserialize)]
pub struct LiveryListResponse {
    pub items: Vec<Livery>,
    pub total_count: u64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FeaturedLivery {
    #[serde(flatten)]
    pub livery: Livery,
    pub score: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ViewResponse {
    pub views: u64,
}

// -- Engagement --

#[derive(Debug, Serialize, Deserialize)]
pub struct ToggleResponse {
    pub success: bool,
    pub active: bool,
    pub count: u64,
}

// -- Users --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetUserQuery {
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserSummaryResponse {
    pub username: String,
    pub pfp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserStatsResponse {
    pub user: UserCard,
    pub stats: StatsCounts,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserCard {
    pub username: String,
    pub image_url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatsCounts {
    pub liveries: u64,
    pub likes: u64,
    pub saves: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
