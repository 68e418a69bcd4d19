//! Featured carousel: the most-liked recent liveries, decayed by age.

use chrono::{DateTime, Utc};
use tracing::debug;

use aerohub_gateway::{Gateway, Result};
use aerohub_types::listing::{LiveryFilter, SortField, SortOrder, SortSpec};
use aerohub_types::models::Livery;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeaturedConfig {
    /// Most-liked rows fetched before ranking.
    pub candidate_limit: u32,
    /// Rows kept after ranking.
    pub top_k: usize,
}

impl Default for FeaturedConfig {
    fn default() -> Self {
        Self {
            candidate_limit: 100,
            top_k: 6,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankedLivery {
    pub livery: Livery,
    pub score: f64,
}

/// Whole days between `created_at` and `now`. Future timestamps count as 0.
pub fn age_days(created_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - created_at).num_days().max(0)
}

/// `(likes * 2 + views) / (age_days + 1)`
pub fn popularity_score(livery: &Livery, now: DateTime<Utc>) -> f64 {
    let engagement = livery.likes.saturating_mul(2).saturating_add(livery.views);
    engagement as f64 / (age_days(livery.created_at, now) + 1) as f64
}

/// Score every candidate and keep the best `top_k`.
///
/// The sort is stable, so equal scores keep the order the candidates came in.
pub fn rank_featured(candidates: Vec<Livery>, now: DateTime<Utc>, top_k: usize) -> Vec<RankedLivery> {
    let mut ranked: Vec<RankedLivery> = candidates
        .into_iter()
        .map(|livery| {
            let score = popularity_score(&livery, now);
            RankedLivery { livery, score }
        })
        .collect();

    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    ranked.truncate(top_k);
    ranked
}

/// Fetch the most-liked candidates and rank them as of `now`.
pub async fn load_featured<G: Gateway + ?Sized>(
    gateway: &G,
    config: FeaturedConfig,
    now: DateTime<Utc>,
) -> Result<Vec<RankedLivery>> {
    let candidates = gateway
        .fetch_liveries(
            &LiveryFilter::default(),
            SortSpec::new(SortField::Likes, SortOrder::Desc),
            0,
            config.candidate_limit,
        )
        .await?;

    debug!("Ranking {} featured candidates", candidates.len());
    Ok(rank_featured(candidates, now, config.top_k))
}
