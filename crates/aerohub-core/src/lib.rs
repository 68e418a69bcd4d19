//! Client-side behaviour of the livery hub: the paged listing, the featured
//! carousel, like/save toggles, livery detail and the publish flow.
//!
//! Everything here talks to the backend only through
//! [`aerohub_gateway::Gateway`], so the same engines run against the hosted
//! store and the in-memory one used in tests.

pub mod detail;
pub mod engagement;
pub mod featured;
pub mod listing;
pub mod publish;

pub use detail::{LiveryDetail, PosterSummary, load_detail};
pub use engagement::{Engagement, EngagementError, ToggleOutcome, ToggleView};
pub use featured::{FeaturedConfig, RankedLivery, load_featured, rank_featured};
pub use listing::{ListingEngine, ListingSnapshot, LoadStatus};
pub use publish::{
    ImageFile, ImageSource, LiveryDraft, LiveryRevision, publish_livery, remove_livery, revise_livery,
};
