use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

use aerohub_gateway::GatewayError;
use aerohub_types::api::ErrorResponse;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Gateway(e) => match e {
                GatewayError::Auth(_) => StatusCode::UNAUTHORIZED,
                GatewayError::NotFound { .. } => StatusCode::NOT_FOUND,
                GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
                GatewayError::Query(_) => StatusCode::BAD_GATEWAY,
                GatewayError::Mutation(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("{}", self);
        }
        (status, Json(ErrorResponse { error: self.to_string() })).into_response()
    }
}
