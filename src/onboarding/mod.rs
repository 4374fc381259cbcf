//! Onboarding wizard: welcome, survey, profile, verification, connections.
//!
//! One `FlowController` per session drives a `FlowDefinition`. Step forms
//! validate locally and hand their `AnswerPatch` to the controller, which
//! merges it into the `AnswerRecord`, animates, advances, and calls the user
//! service where the step requires it.

pub mod answers;
pub mod archetype;
pub mod controller;
pub mod routes;
pub mod session;
pub mod step;
pub mod validate;

pub use answers::{AnswerPatch, AnswerRecord, Connection, Education, FullName, PhotoRef, merge};
pub use archetype::{ColorChoice, Personality, color_for, share_link};
pub use controller::{FlowController, FlowEvent, IgnoreReason, Snapshot, Transition, WizardState};
pub use routes::{OnboardingRouteState, SessionRegistry, onboarding_routes};
pub use session::SessionId;
pub use step::{FlowDefinition, StepEffect, StepId};
pub use validate::{FieldErrors, FormState, PhotoUpload, StepForm};
