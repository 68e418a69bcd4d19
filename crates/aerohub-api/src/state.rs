use std::sync::Arc;

use aerohub_core::FeaturedConfig;
use aerohub_gateway::Gateway;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    /// Anonymous client. Authenticated routes upgrade it per request.
    pub gateway: Arc<dyn Gateway>,
    pub jwt_secret: String,
    pub featured: FeaturedConfig,
}

impl AppStateInner {
    pub fn new(gateway: Arc<dyn Gateway>, jwt_secret: impl Into<String>) -> AppState {
        Arc::new(Self {
            gateway,
            jwt_secret: jwt_secret.into(),
            featured: FeaturedConfig::default(),
        })
    }
}
