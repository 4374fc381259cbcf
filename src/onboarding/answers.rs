//! Answer store: the record of everything the user has told us so far.

use serde::{Deserialize, Serialize};

use super::archetype::{Personality, color_for};

/// First and last name, always set together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullName {
    pub first: String,
    pub last: String,
}

/// Someone the user is connected to, entered on the connections step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    /// Role or position, e.g. "Founder".
    pub role: String,
    pub location: String,
}

/// Where the profile photo currently lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PhotoRef {
    /// Optimistic local preview while the upload is in flight.
    #[serde(rename_all = "camelCase")]
    Local { object_url: String },
    /// Stored by the user service.
    #[serde(rename_all = "camelCase")]
    Remote { image_id: String },
}

/// Education status from the edu steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Education {
    pub is_student: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Accumulated onboarding answers for one session.
///
/// `personality`, `color_code` and `color_name` only change together, through
/// [`merge`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<FullName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personality: Option<Personality>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connections: Option<Vec<Connection>>,
    /// E.164, e.g. `+14155550100`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<PhotoRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub education: Option<Education>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dream: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub struggle: Option<String>,
}

/// A partial update emitted by a step. Present keys replace the record's
/// value wholesale; absent keys leave it alone.
///
/// There are no color keys: colors are derived from `personality`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<FullName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(
        default,
        deserialize_with = "crate::onboarding::archetype::deserialize_lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub personality: Option<Personality>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connections: Option<Vec<Connection>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<PhotoRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub education: Option<Education>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dream: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub struggle: Option<String>,
}

impl AnswerPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Shallow merge: every key present in `patch` replaces the record's value.
/// Nested values (the name, the connections list) are replaced whole.
pub fn merge(mut current: AnswerRecord, patch: AnswerPatch) -> AnswerRecord {
    fn replace<T>(slot: &mut Option<T>, value: Option<T>) {
        if let Some(v) = value {
            *slot = Some(v);
        }
    }

    if let Some(personality) = patch.personality {
        let color = color_for(Some(personality));
        current.personality = Some(personality);
        current.color_code = Some(color.code.to_string());
        current.color_name = Some(color.name.to_string());
    }
    replace(&mut current.name, patch.name);
    replace(&mut current.bio, patch.bio);
    replace(&mut current.age, patch.age);
    replace(&mut current.location, patch.location);
    replace(&mut current.connections, patch.connections);
    replace(&mut current.phone, patch.phone);
    replace(&mut current.photo, patch.photo);
    replace(&mut current.education, patch.education);
    replace(&mut current.dream, patch.dream);
    replace(&mut current.struggle, patch.struggle);
    current
}

/// Fields required to create the user, taken from a locally complete profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileFields {
    pub first_name: String,
    pub last_name: String,
    pub bio: String,
    pub age: u8,
    pub location: String,
    pub personality: Personality,
    pub color_code: String,
    pub color_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dream: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub struggle: Option<String>,
}

impl AnswerRecord {
    /// Create-user payload, or `None` while name, bio, age or location is
    /// still missing. An unset personality uses the fallback archetype.
    pub fn profile_fields(&self) -> Option<ProfileFields> {
        let name = self.name.as_ref()?;
        let color = color_for(self.personality);
        let personality = self
            .personality
            .unwrap_or(super::archetype::FALLBACK_PERSONALITY);
        let image_id = match &self.photo {
            Some(PhotoRef::Remote { image_id }) => Some(image_id.clone()),
            _ => None,
        };
        Some(ProfileFields {
            first_name: name.first.clone(),
            last_name: name.last.clone(),
            bio: self.bio.clone()?,
            age: self.age?,
            location: self.location.clone()?,
            personality,
            color_code: self.color_code.clone().unwrap_or_else(|| color.code.to_string()),
            color_name: self.color_name.clone().unwrap_or_else(|| color.name.to_string()),
            image_id,
            dream: self.dream.clone(),
            struggle: self.struggle.clone(),
        })
    }

    /// Only the keys a patch touches, with derived colors filled in. This is
    /// what a best-effort update sends.
    pub fn slice_for(patch: &AnswerPatch) -> AnswerRecord {
        merge(AnswerRecord::default(), patch.clone())
    }
}
