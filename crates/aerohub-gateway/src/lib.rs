//! Single seam between Aerohub and its hosted backend.
//!
//! Every read and write against the livery store, the user table and the image
//! bucket goes through [`Gateway`]. Nothing is cached: each call is a fresh
//! round trip.

pub mod config;
pub mod error;
pub mod http;
#[cfg(feature = "test-support")]
pub mod memory;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::warn;

use aerohub_types::listing::{LiveryFilter, SortSpec};
use aerohub_types::models::{Livery, LiveryId, LiveryPatch, NewLivery, UserProfile, UserStats};

pub use config::GatewayConfig;
pub use error::{GatewayError, Result};
pub use http::HttpGateway;

/// An authenticated identity and the store token issued for it.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub token: String,
}

impl Session {
    pub fn new(user_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            token: token.into(),
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// The two per-user engagement toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngagementKind {
    Like,
    Save,
}

impl fmt::Display for EngagementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Like => f.write_str("like"),
            Self::Save => f.write_str("save"),
        }
    }
}

/// Server state after an atomic toggle: membership and the matching counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toggled {
    pub active: bool,
    pub count: u64,
}

/// Likes and saves summed over one user's liveries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngagementTotals {
    pub likes: u64,
    pub saves: u64,
}

/// One page of a listing plus the row count under the same filter.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveryPage {
    pub items: Vec<Livery>,
    pub total_count: u64,
}

#[async_trait]
pub trait Gateway: Send + Sync {
    /// The session this client was upgraded with, if any.
    fn session(&self) -> Option<&Session>;

    /// Authenticated copy of this client. The receiver stays as it was.
    fn upgrade(&self, session: Session) -> Arc<dyn Gateway>;

    // -- Liveries --

    async fn count_liveries(&self, filter: &LiveryFilter) -> Result<u64>;

    async fn fetch_liveries(
        &self,
        filter: &LiveryFilter,
        sort: SortSpec,
        offset: u64,
        limit: u32,
    ) -> Result<Vec<Livery>>;

    /// Count then fetch one page under the same filter.
    ///
    /// A failed count is returned without issuing the page query, so callers
    /// never see rows paired with a count from a different predicate.
    async fn list_liveries(
        &self,
        filter: &LiveryFilter,
        sort: SortSpec,
        page: u32,
        page_size: u32,
    ) -> Result<LiveryPage> {
        if page == 0 {
            return Err(GatewayError::Validation("page must be at least 1".into()));
        }
        if page_size == 0 {
            return Err(GatewayError::Validation("page size must be positive".into()));
        }

        let total_count = self.count_liveries(filter).await.map_err(|e| match e {
            auth @ GatewayError::Auth(_) => auth,
            other => GatewayError::Query(format!("count failed: {other}")),
        })?;

        let offset = u64::from(page - 1) * u64::from(page_size);
        let items = self.fetch_liveries(filter, sort, offset, page_size).await?;

        Ok(LiveryPage { items, total_count })
    }

    async fn get_livery(&self, id: LiveryId) -> Result<Livery>;

    async fn insert_livery(&self, livery: &NewLivery) -> Result<Livery>;

    async fn update_livery(&self, id: LiveryId, patch: &LiveryPatch) -> Result<Livery>;

    async fn delete_livery(&self, id: LiveryId) -> Result<()>;

    // -- Engagement --

    async fn toggle_like(&self, id: LiveryId) -> Result<Toggled>;

    async fn toggle_save(&self, id: LiveryId) -> Result<Toggled>;

    async fn toggle(&self, kind: EngagementKind, id: LiveryId) -> Result<Toggled> {
        match kind {
            EngagementKind::Like => self.toggle_like(id).await,
            EngagementKind::Save => self.toggle_save(id).await,
        }
    }

    /// Bump the view counter. Needs no session.
    async fn increment_view(&self, id: LiveryId) -> Result<u64>;

    // -- Users --

    async fn get_user(&self, user_id: &str) -> Result<UserProfile>;

    async fn count_user_liveries(&self, user_id: &str) -> Result<u64>;

    async fn total_user_likes(&self, user_id: &str) -> Result<u64>;

    async fn total_user_saves(&self, user_id: &str) -> Result<u64>;

    /// Sum the counters over the user's livery rows. Slower fallback for the
    /// two total RPCs.
    async fn sum_user_engagement(&self, user_id: &str) -> Result<EngagementTotals>;

    /// Profile card aggregate. Never fails.
    ///
    /// If either total RPC fails, both totals are summed from the user's
    /// liveries instead. Whatever still cannot be read is logged and left at
    /// zero.
    async fn user_stats(&self, user_id: &str) -> UserStats {
        let (username, image_url) = match self.get_user(user_id).await {
            Ok(profile) => (profile.username, profile.image_url),
            Err(e) => {
                warn!("User stats: profile for {} unavailable: {}", user_id, e);
                (placeholder_username(user_id), String::new())
            }
        };

        let livery_count = self.count_user_liveries(user_id).await.unwrap_or_else(|e| {
            warn!("User stats: livery count for {} unavailable: {}", user_id, e);
            0
        });
        let totals = match (
            self.total_user_likes(user_id).await,
            self.total_user_saves(user_id).await,
        ) {
            (Ok(likes), Ok(saves)) => EngagementTotals { likes, saves },
            (likes, saves) => {
                if let Err(e) = likes.and(saves) {
                    warn!("User stats: totals for {} unavailable, summing rows: {}", user_id, e);
                }
                self.sum_user_engagement(user_id).await.unwrap_or_else(|e| {
                    warn!("User stats: engagement for {} unavailable: {}", user_id, e);
                    EngagementTotals::default()
                })
            }
        };

        UserStats {
            username,
            image_url,
            livery_count,
            total_likes: totals.likes,
            total_saves: totals.saves,
        }
    }

    // -- Storage --

    /// Store an image under `object_path` in the image bucket and return its
    /// public URL.
    async fn upload_image(&self, object_path: &str, bytes: Bytes, content_type: &str)
    -> Result<String>;
}

/// Display name used when a user's profile cannot be read.
pub fn placeholder_username(user_id: &str) -> String {
    let prefix: String = user_id.chars().take(8).collect();
    format!("User {prefix}")
}

/// Fail fast on calls that need a signed-in user.
pub fn require_session<'a>(gateway: &'a (impl Gateway + ?Sized)) -> Result<&'a Session> {
    gateway
        .session()
        .ok_or_else(|| GatewayError::Auth("sign in required".into()))
}
