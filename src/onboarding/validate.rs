//! Step forms: local validation before a step reports back to the controller.
//!
//! A form never touches the controller. It turns its fields into an
//! [`AnswerPatch`] or a list of inline [`FieldError`]s, and [`FormState`]
//! hands a valid patch to the step's completion callback.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use super::answers::{AnswerPatch, Connection, Education, FullName};
use super::archetype::Personality;
use super::step::StepId;
use crate::error::MediaError;

pub const MIN_AGE: u8 = 14;
pub const MAX_AGE: u8 = 65;
pub const MIN_BIO_LEN: usize = 10;
pub const MAX_BIO_LEN: usize = 280;
pub const MIN_CONNECTIONS: usize = 3;
pub const MAX_PHOTO_BYTES: usize = 10 * 1024 * 1024;
pub const ALLOWED_PHOTO_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/webp", "image/heic"];

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email pattern"));

/// An inline validation message attached to one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Ordered list of field errors for one form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(Vec<FieldError>);

impl FieldErrors {
    pub fn push(&mut self, field: &str, message: impl Into<String>) {
        self.0.push(FieldError {
            field: field.to_string(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|e| e.field == field)
            .map(|e| e.message.as_str())
    }

    pub fn clear_field(&mut self, field: &str) {
        self.0.retain(|e| e.field != field);
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.0.iter()
    }

    /// Names of the fields with errors, in order.
    pub fn fields(&self) -> Vec<&str> {
        self.iter().map(|e| e.field.as_str()).collect()
    }

    fn extend(&mut self, other: FieldErrors) {
        self.0.extend(other.0);
    }

    fn into_result(self, patch: AnswerPatch) -> Result<AnswerPatch, FieldErrors> {
        if self.is_empty() { Ok(patch) } else { Err(self) }
    }
}

/// A step's form: validates its own fields and produces the step's patch.
pub trait StepForm {
    fn step(&self) -> StepId;

    fn validate(&self) -> Result<AnswerPatch, FieldErrors>;
}

fn required(errors: &mut FieldErrors, field: &str, value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        errors.push(field, "This field is required");
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Trimmed bio; too short or too long is reported.
fn check_bio(errors: &mut FieldErrors, bio: &str) -> String {
    let bio = bio.trim();
    let len = bio.chars().count();
    if len < MIN_BIO_LEN {
        errors.push("bio", format!("Bio must be at least {MIN_BIO_LEN} characters"));
    } else if len > MAX_BIO_LEN {
        errors.push("bio", format!("Bio must be at most {MAX_BIO_LEN} characters"));
    }
    bio.to_string()
}

fn check_age(errors: &mut FieldErrors, age: u32) -> Option<u8> {
    if (u32::from(MIN_AGE)..=u32::from(MAX_AGE)).contains(&age) {
        u8::try_from(age).ok()
    } else {
        errors.push("age", format!("Age must be between {MIN_AGE} and {MAX_AGE}"));
        None
    }
}

/// At least [`MIN_CONNECTIONS`] entries, each with a role and a location.
fn check_connections(errors: &mut FieldErrors, entries: &[Connection]) -> Vec<Connection> {
    if entries.len() < MIN_CONNECTIONS {
        errors.push(
            "connections",
            format!("Add at least {MIN_CONNECTIONS} connections"),
        );
    }
    let mut cleaned = Vec::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        let role = required(errors, &format!("connections[{i}].role"), &entry.role);
        let location = required(errors, &format!("connections[{i}].location"), &entry.location);
        if let (Some(role), Some(location)) = (role, location) {
            cleaned.push(Connection { role, location });
        }
    }
    cleaned
}

/// Lowercased, trimmed email.
fn check_email(errors: &mut FieldErrors, raw: &str) -> String {
    let email = raw.trim().to_lowercase();
    if !EMAIL_RE.is_match(&email) {
        errors.push("email", "Enter a valid email address");
    }
    email
}

// ── Survey ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct SurveyForm {
    pub dream: String,
    pub struggle: String,
    pub personality: Option<Personality>,
}

impl StepForm for SurveyForm {
    fn step(&self) -> StepId {
        StepId::Survey
    }

    fn validate(&self) -> Result<AnswerPatch, FieldErrors> {
        let mut errors = FieldErrors::default();
        let dream = required(&mut errors, "dream", &self.dream);
        let struggle = required(&mut errors, "struggle", &self.struggle);
        if self.personality.is_none() {
            errors.push("personality", "Pick the archetype that fits you best");
        }
        errors.into_result(AnswerPatch {
            dream,
            struggle,
            personality: self.personality,
            ..Default::default()
        })
    }
}

// ── Profile ─────────────────────────────────────────────────────────────

/// Profile fields as typed; `age` is raw text so bad input can be reported.
#[derive(Debug, Clone, Default)]
pub struct ProfileForm {
    pub first_name: String,
    pub last_name: String,
    pub bio: String,
    pub age: String,
    pub location: String,
}

impl StepForm for ProfileForm {
    fn step(&self) -> StepId {
        StepId::Profile
    }

    fn validate(&self) -> Result<AnswerPatch, FieldErrors> {
        let mut errors = FieldErrors::default();
        let first = required(&mut errors, "firstName", &self.first_name);
        let last = required(&mut errors, "lastName", &self.last_name);
        let location = required(&mut errors, "location", &self.location);

        let bio = check_bio(&mut errors, &self.bio);
        let age = match self.age.trim().parse::<u32>() {
            Ok(age) => check_age(&mut errors, age),
            Err(_) => {
                errors.push("age", "Enter your age as a number");
                None
            }
        };

        let name = first.zip(last).map(|(first, last)| FullName { first, last });
        errors.into_result(AnswerPatch {
            name,
            bio: Some(bio),
            age,
            location,
            ..Default::default()
        })
    }
}

// ── Phone ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct PhoneForm {
    pub raw: String,
}

/// Normalize a typed phone number to E.164. Ten bare digits are read as a
/// North American number.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let international = trimmed.starts_with('+');
    if trimmed
        .chars()
        .any(|c| !(c.is_ascii_digit() || matches!(c, '+' | ' ' | '-' | '(' | ')' | '.')))
    {
        return None;
    }
    let digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();
    if international {
        return (8..=15).contains(&digits.len()).then(|| format!("+{digits}"));
    }
    match digits.len() {
        10 => Some(format!("+1{digits}")),
        11 if digits.starts_with('1') => Some(format!("+{digits}")),
        _ => None,
    }
}

impl StepForm for PhoneForm {
    fn step(&self) -> StepId {
        StepId::PhoneVerification
    }

    fn validate(&self) -> Result<AnswerPatch, FieldErrors> {
        let mut errors = FieldErrors::default();
        let phone = normalize_phone(&self.raw);
        if phone.is_none() {
            errors.push("phone", "Enter a valid phone number");
        }
        errors.into_result(AnswerPatch {
            phone,
            ..Default::default()
        })
    }
}

// ── Connections ─────────────────────────────────────────────────────────

/// Connections entered so far. Entries are only ever appended.
#[derive(Debug, Clone, Default)]
pub struct ConnectionsForm {
    entries: Vec<Connection>,
}

impl ConnectionsForm {
    pub fn add(&mut self, role: impl Into<String>, location: impl Into<String>) {
        self.entries.push(Connection {
            role: role.into(),
            location: location.into(),
        });
    }

    pub fn entries(&self) -> &[Connection] {
        &self.entries
    }
}

impl StepForm for ConnectionsForm {
    fn step(&self) -> StepId {
        StepId::Connections
    }

    fn validate(&self) -> Result<AnswerPatch, FieldErrors> {
        let mut errors = FieldErrors::default();
        let cleaned = check_connections(&mut errors, &self.entries);
        errors.into_result(AnswerPatch {
            connections: Some(cleaned),
            ..Default::default()
        })
    }
}

// ── Education ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct EduCheckForm {
    pub is_student: Option<bool>,
}

impl StepForm for EduCheckForm {
    fn step(&self) -> StepId {
        StepId::EduCheck
    }

    fn validate(&self) -> Result<AnswerPatch, FieldErrors> {
        let mut errors = FieldErrors::default();
        match self.is_student {
            Some(is_student) => errors.into_result(AnswerPatch {
                education: Some(Education {
                    is_student,
                    email: None,
                }),
                ..Default::default()
            }),
            None => {
                errors.push("isStudent", "Let us know whether you're a student");
                Err(errors)
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EduSurveyForm {
    pub email: String,
}

impl StepForm for EduSurveyForm {
    fn step(&self) -> StepId {
        StepId::EduSurvey
    }

    fn validate(&self) -> Result<AnswerPatch, FieldErrors> {
        let mut errors = FieldErrors::default();
        let email = check_email(&mut errors, &self.email);
        errors.into_result(AnswerPatch {
            education: Some(Education {
                is_student: true,
                email: Some(email),
            }),
            ..Default::default()
        })
    }
}

// ── Patches ─────────────────────────────────────────────────────────────

/// Check every key a patch carries against the rules the step forms use and
/// return the normalized patch. Absent keys are not checked.
pub fn validate_patch(patch: &AnswerPatch) -> Result<AnswerPatch, FieldErrors> {
    let mut errors = FieldErrors::default();
    let mut out = patch.clone();

    if let Some(name) = &patch.name {
        let first = required(&mut errors, "firstName", &name.first);
        let last = required(&mut errors, "lastName", &name.last);
        out.name = first.zip(last).map(|(first, last)| FullName { first, last });
    }
    if let Some(bio) = &patch.bio {
        out.bio = Some(check_bio(&mut errors, bio));
    }
    if let Some(age) = patch.age {
        check_age(&mut errors, u32::from(age));
    }
    if let Some(location) = &patch.location {
        out.location = required(&mut errors, "location", location);
    }
    if let Some(dream) = &patch.dream {
        out.dream = required(&mut errors, "dream", dream);
    }
    if let Some(struggle) = &patch.struggle {
        out.struggle = required(&mut errors, "struggle", struggle);
    }
    if let Some(connections) = &patch.connections {
        out.connections = Some(check_connections(&mut errors, connections));
    }
    if let Some(raw) = &patch.phone {
        out.phone = normalize_phone(raw);
        if out.phone.is_none() {
            errors.push("phone", "Enter a valid phone number");
        }
    }
    if let Some(Education {
        is_student,
        email: Some(email),
    }) = &patch.education
    {
        out.education = Some(Education {
            is_student: *is_student,
            email: Some(check_email(&mut errors, email)),
        });
    }

    errors.into_result(out)
}

/// [`validate_patch`] plus the keys completing `step` has to supply.
pub fn validate_step(step: StepId, patch: &AnswerPatch) -> Result<AnswerPatch, FieldErrors> {
    let mut missing = FieldErrors::default();
    match step {
        StepId::Survey if patch.personality.is_none() => {
            missing.push("personality", "Pick the archetype that fits you best");
        }
        StepId::PhoneVerification if patch.phone.is_none() => {
            missing.push("phone", "Enter a valid phone number");
        }
        StepId::Connections if patch.connections.is_none() => {
            missing.push(
                "connections",
                format!("Add at least {MIN_CONNECTIONS} connections"),
            );
        }
        StepId::EduCheck if patch.education.is_none() => {
            missing.push("isStudent", "Let us know whether you're a student");
        }
        StepId::EduSurvey
            if patch
                .education
                .as_ref()
                .and_then(|e| e.email.as_ref())
                .is_none() =>
        {
            missing.push("email", "Enter a valid email address");
        }
        _ => {}
    }
    match validate_patch(patch) {
        Ok(patch) => missing.into_result(patch),
        Err(errors) => {
            missing.extend(errors);
            Err(missing)
        }
    }
}

// ── Form state ──────────────────────────────────────────────────────────

/// A form plus the inline errors currently shown next to its fields.
#[derive(Debug, Clone, Default)]
pub struct FormState<F> {
    form: F,
    errors: FieldErrors,
}

impl<F: StepForm> FormState<F> {
    pub fn new(form: F) -> Self {
        Self {
            form,
            errors: FieldErrors::default(),
        }
    }

    pub fn form(&self) -> &F {
        &self.form
    }

    pub fn errors(&self) -> &FieldErrors {
        &self.errors
    }

    /// Edit the form. The error shown for `field` goes away.
    pub fn edit(&mut self, field: &str, f: impl FnOnce(&mut F)) {
        f(&mut self.form);
        self.errors.clear_field(field);
    }

    /// Validate and, if valid, call `on_complete` exactly once with the patch.
    /// Returns whether the callback fired.
    pub fn submit(&mut self, on_complete: impl FnOnce(AnswerPatch)) -> bool {
        match self.form.validate() {
            Ok(patch) => {
                self.errors = FieldErrors::default();
                on_complete(patch);
                true
            }
            Err(errors) => {
                tracing::debug!(step = %self.form.step(), errors = errors.len(), "Step validation failed");
                self.errors = errors;
                false
            }
        }
    }
}

// ── Photo ───────────────────────────────────────────────────────────────

/// A photo picked by the user, before upload.
#[derive(Debug, Clone)]
pub struct PhotoUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl PhotoUpload {
    /// Client-side checks that avoid a pointless upload.
    pub fn check(&self) -> Result<(), MediaError> {
        if self.bytes.is_empty() {
            return Err(MediaError::Empty);
        }
        let content_type = self.content_type.to_lowercase();
        if !ALLOWED_PHOTO_TYPES.contains(&content_type.as_str()) {
            return Err(MediaError::UnsupportedType {
                content_type: self.content_type.clone(),
            });
        }
        if self.bytes.len() > MAX_PHOTO_BYTES {
            return Err(MediaError::TooLarge {
                size: self.bytes.len(),
                max: MAX_PHOTO_BYTES,
            });
        }
        Ok(())
    }
}
