//! Wire types for the user service.

use serde::{Deserialize, Serialize};

use crate::onboarding::answers::ProfileFields;
use crate::onboarding::session::SessionId;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedUser {
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedImage {
    pub image_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub(crate) struct BioCheck {
    pub exists: bool,
}

/// What the backend should work on after the user is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentOptions {
    pub generate_archetype: bool,
    pub process_image: bool,
}

impl Default for EnrichmentOptions {
    fn default() -> Self {
        Self {
            generate_archetype: true,
            process_image: true,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateUserRequest<'a> {
    pub session_id: SessionId,
    #[serde(flatten)]
    pub fields: &'a ProfileFields,
}
