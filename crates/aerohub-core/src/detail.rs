use std::sync::Arc;

use tracing::{debug, warn};

use aerohub_gateway::{Gateway, Result};
use aerohub_types::models::{Livery, LiveryId, UserProfile};

use crate::engagement::Engagement;

/// Poster line shown under a livery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PosterSummary {
    pub username: String,
    pub image_url: String,
}

impl From<UserProfile> for PosterSummary {
    fn from(profile: UserProfile) -> Self {
        Self {
            username: profile.username,
            image_url: profile.image_url,
        }
    }
}

/// A livery opened on its own page.
pub struct LiveryDetail<G: Gateway + ?Sized> {
    pub livery: Livery,
    /// `None` when the poster's profile could not be read.
    pub poster: Option<PosterSummary>,
    pub engagement: Engagement<G>,
}

/// Load everything the detail page needs.
///
/// Only the livery itself is required. The poster, the viewer's like/save
/// state and the view bump are best effort.
pub async fn load_detail<G: Gateway + ?Sized>(gateway: Arc<G>, id: LiveryId) -> Result<LiveryDetail<G>> {
    let mut livery = gateway.get_livery(id).await?;

    let poster = match gateway.get_user(&livery.user_id).await {
        Ok(profile) => Some(PosterSummary::from(profile)),
        Err(e) => {
            warn!("Poster {} of livery {} unavailable: {}", livery.user_id, id, e);
            None
        }
    };

    let viewer_id = gateway.session().map(|s| s.user_id.clone());
    let viewer = match viewer_id {
        Some(viewer_id) => match gateway.get_user(&viewer_id).await {
            Ok(profile) => Some(profile),
            Err(e) => {
                warn!("Viewer {} profile unavailable, showing toggles off: {}", viewer_id, e);
                None
            }
        },
        None => None,
    };

    if let Some(views) = record_view(gateway.as_ref(), id).await {
        livery.views = views;
    }

    let engagement = Engagement::new(gateway, &livery, viewer.as_ref());
    Ok(LiveryDetail {
        livery,
        poster,
        engagement,
    })
}

/// Bump the view counter. Failures are swallowed: a missed view is not worth
/// an error on the page.
pub async fn record_view<G: Gateway + ?Sized>(gateway: &G, id: LiveryId) -> Option<u64> {
    match gateway.increment_view(id).await {
        Ok(views) => Some(views),
        Err(e) => {
            debug!("View bump for livery {} failed: {}", id, e);
            None
        }
    }
}
