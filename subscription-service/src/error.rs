//! Error types for subscription lifecycle operations.

use service_core::error::AppError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SubscriptionError {
    /// Plan billing parameters are missing or unusable.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The storage layer failed to read or commit.
    #[error("Persistence error: {0}")]
    Persistence(#[source] anyhow::Error),

    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(Uuid),

    #[error("Plan not found: {0}")]
    PlanNotFound(Uuid),

    #[error("Invalid period: ends_at precedes starts_at")]
    InvalidPeriod,

    #[error("Subscription {0} has already ended")]
    AlreadyEnded(Uuid),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

impl SubscriptionError {
    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            SubscriptionError::Configuration(_) => "configuration",
            SubscriptionError::Persistence(_) => "persistence",
            SubscriptionError::SubscriptionNotFound(_) | SubscriptionError::PlanNotFound(_) => {
                "not_found"
            }
            SubscriptionError::InvalidPeriod => "invalid_period",
            SubscriptionError::AlreadyEnded(_) => "already_ended",
            SubscriptionError::Validation(_) => "validation",
        }
    }
}

impl From<sqlx::Error> for SubscriptionError {
    fn from(err: sqlx::Error) -> Self {
        SubscriptionError::Persistence(anyhow::Error::new(err))
    }
}

impl From<SubscriptionError> for AppError {
    fn from(err: SubscriptionError) -> Self {
        match err {
            SubscriptionError::Configuration(msg) => AppError::ConfigError(anyhow::anyhow!(msg)),
            SubscriptionError::Persistence(e) => AppError::DatabaseError(e),
            e @ (SubscriptionError::SubscriptionNotFound(_) | SubscriptionError::PlanNotFound(_)) => {
                AppError::NotFound(anyhow::anyhow!(e.to_string()))
            }
            e @ SubscriptionError::InvalidPeriod => AppError::BadRequest(anyhow::anyhow!(e.to_string())),
            e @ SubscriptionError::AlreadyEnded(_) => {
                AppError::Conflict(anyhow::anyhow!(e.to_string()))
            }
            SubscriptionError::Validation(e) => AppError::ValidationError(e),
        }
    }
}
