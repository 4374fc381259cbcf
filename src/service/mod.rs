//! External user service: the only system of record for a signup.
//!
//! The controller talks to it through the [`UserService`] trait so tests can
//! substitute a stub; [`HttpUserService`] is the real reqwest client.

pub mod client;
pub mod types;

pub use client::HttpUserService;
pub use types::{CreatedUser, EnrichmentOptions, UploadedImage};

use async_trait::async_trait;

use crate::error::ServiceError;
use crate::onboarding::answers::{AnswerRecord, ProfileFields};
use crate::onboarding::session::SessionId;
use crate::onboarding::validate::PhotoUpload;

/// Operations the onboarding flow needs from the user service. Every call
/// carries the session id so the service can tie partial updates together.
#[async_trait]
pub trait UserService: Send + Sync {
    /// Create the user. The one call whose failure blocks the flow.
    async fn create_user(
        &self,
        session: SessionId,
        fields: &ProfileFields,
    ) -> Result<CreatedUser, ServiceError>;

    /// Record partial answers. Keyed by the user when one exists, otherwise
    /// by the session.
    async fn update_user(
        &self,
        session: SessionId,
        user_id: Option<&str>,
        fields: &AnswerRecord,
    ) -> Result<(), ServiceError>;

    /// Whether another user already has this bio.
    async fn check_bio_uniqueness(&self, session: SessionId, bio: &str)
    -> Result<bool, ServiceError>;

    async fn upload_photo(
        &self,
        session: SessionId,
        photo: &PhotoUpload,
    ) -> Result<UploadedImage, ServiceError>;

    /// Kick off backend processing for a new user. Never awaited by the flow.
    async fn trigger_enrichment(
        &self,
        session: SessionId,
        user_id: &str,
        options: &EnrichmentOptions,
    ) -> Result<(), ServiceError>;
}
