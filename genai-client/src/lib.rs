//! genai-client: orchestration core for a freemium generative AI client.
//!
//! Credential resolution, the daily credit gate, retrying backend calls,
//! long-running video jobs and speech playback, behind the [`Studio`] facade.

pub mod audio;
pub mod config;
pub mod credential;
pub mod models;
pub mod services;
pub mod studio;

pub use config::{Feature, GenaiConfig};
pub use credential::{Credential, CredentialStore};
pub use studio::{Outcome, Studio, StudioProviders};
