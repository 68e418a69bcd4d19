/// Failures surfaced by the data access gateway.
///
/// Reads fail with `Query`, writes with `Mutation`. Components catch these at
/// their boundary and turn them into their own error state or a rollback.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("Authentication required: {0}")]
    Auth(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Mutation failed: {0}")]
    Mutation(String),

    #[error("Invalid input: {0}")]
    Validation(String),
}

impl GatewayError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Reads can simply be re-issued; nothing else is retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Query(_))
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
