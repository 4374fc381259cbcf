//! Error types for the onboarding flow.

use std::time::Duration;

use crate::onboarding::step::StepId;

/// Top-level error type for the onboarding service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("User service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Flow error: {0}")]
    Flow(#[from] FlowError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors talking to the external user service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("User service returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response from user service: {message}")]
    InvalidResponse { message: String },
}

impl ServiceError {
    /// Whether this is the service rejecting a bio that another user already has.
    pub fn is_bio_conflict(&self) -> bool {
        match self {
            Self::Api { status, message } => {
                (*status == 400 || *status == 409)
                    && message.to_lowercase().contains("bio already exists")
            }
            _ => false,
        }
    }

    /// Text suitable for a user-facing alert.
    pub fn user_message(&self) -> String {
        if self.is_bio_conflict() {
            return "That bio is already taken. Please write something unique.".to_string();
        }
        match self {
            Self::Timeout { .. } | Self::Http(_) => {
                "We couldn't reach the server. Please try again.".to_string()
            }
            Self::Api { .. } | Self::InvalidResponse { .. } => {
                "Something went wrong creating your profile. Please try again.".to_string()
            }
        }
    }
}

/// Flow definition and controller errors.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("Flow definition has no steps")]
    EmptyFlow,

    #[error("Step {0} appears more than once in the flow")]
    DuplicateStep(StepId),

    #[error("Step {step} refers to unknown step {target}")]
    UnknownStep { step: StepId, target: StepId },

    #[error("Info branch {0} must not be part of the forward order")]
    InfoBranchInOrder(StepId),

    #[error("Unknown step name: {0}")]
    UnknownStepName(String),

    #[error("Invalid share link base: {0}")]
    InvalidLinkBase(String),
}

/// Client-side photo rejections, raised before any network call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MediaError {
    #[error("Unsupported image type: {content_type}")]
    UnsupportedType { content_type: String },

    #[error("Image is too large: {size} bytes > {max} bytes")]
    TooLarge { size: usize, max: usize },

    #[error("Image file is empty")]
    Empty,

    #[error("Upload rejected: {reason}")]
    Rejected { reason: String },
}

/// Result type alias for the onboarding service.
pub type Result<T> = std::result::Result<T, Error>;
