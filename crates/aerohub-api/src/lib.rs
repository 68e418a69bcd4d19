//! HTTP surface of the livery hub.

pub mod engagement;
pub mod error;
pub mod liveries;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod users;

pub use error::ApiError;
pub use routes::router;
pub use state::{AppState, AppStateInner};
