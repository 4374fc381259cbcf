//! Onboarding flow: session controller and HTTP surface for the signup wizard.

pub mod config;
pub mod error;
pub mod onboarding;
pub mod service;
