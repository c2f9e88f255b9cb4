use thiserror::Error;

use crate::{
    application::feed::FeedError, cache::MutationError, domain::error::DomainError,
    infra::error::InfraError,
};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Feed(#[from] FeedError),
    #[error(transparent)]
    Mutation(#[from] MutationError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Message suitable for showing to the person using the feed.
    pub fn presentation_message(&self) -> &'static str {
        match self {
            AppError::Feed(FeedError::Fetch(_)) => "The feed could not be loaded",
            AppError::Feed(FeedError::Cancelled) => "Loading the feed was interrupted",
            AppError::Mutation(MutationError::AuthRequired { .. }) => {
                "You need to sign in to like posts"
            }
            AppError::Domain(DomainError::Validation { .. }) => "Request could not be processed",
            AppError::Infra(InfraError::Configuration { .. }) => "Service misconfigured",
            AppError::Infra(InfraError::Telemetry(_)) => "Logging subsystem could not start",
            AppError::Infra(InfraError::Io(_)) => "I/O failure",
            AppError::Infra(InfraError::Fixture { .. }) => "Feed fixture could not be read",
            AppError::Domain(DomainError::Invariant { .. }) | AppError::Unexpected(_) => {
                "Unexpected error occurred"
            }
        }
    }
}
