//! Generative backend abstractions and implementations.
//!
//! Each capability is a trait so the Gemini REST client, the Veo job client
//! and the scripted mock can be swapped behind the studio facade.

pub mod gemini;
pub mod mock;
pub mod veo;

use crate::credential::Credential;
use crate::models::{
    GeneratedImage, GeoPoint, GroundedAnswer, ImageQuality, InlineImage, RemoteOperation, Voice,
};
use async_trait::async_trait;
use studio_core::error::{AppError, TransportFailure};
use thiserror::Error;

/// Error type for provider operations.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("API error {status}: {message}")]
    Transport { status: u16, message: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Content filtered")]
    ContentFiltered,

    #[error("Empty response: {0}")]
    EmptyResponse(String),

    #[error("Network error: {0}")]
    NetworkError(String),
}

impl TransportFailure for ProviderError {
    fn transport_status(&self) -> Option<u16> {
        match self {
            ProviderError::Transport { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<ProviderError> for AppError {
    fn from(error: ProviderError) -> Self {
        match error {
            ProviderError::NotConfigured(msg) => AppError::ConfigError(anyhow::anyhow!(msg)),
            ProviderError::Transport { status, message } => AppError::Transport { status, message },
            ProviderError::InvalidRequest(msg) => AppError::InvalidRequest(msg),
            ProviderError::ContentFiltered => AppError::ContentFiltered,
            ProviderError::EmptyResponse(msg) => AppError::EmptyResponse(msg),
            ProviderError::NetworkError(msg) => AppError::Network(msg),
        }
    }
}

/// Tool the text model may ground its answer on.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum Grounding {
    #[default]
    None,
    WebSearch,
    Maps { location: Option<GeoPoint> },
}

/// One text generation call.
#[derive(Debug, Clone, Default)]
pub struct TextRequest {
    pub prompt: String,
    pub system_instruction: Option<String>,
    pub image: Option<InlineImage>,
    pub grounding: Grounding,
}

impl TextRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    pub fn with_image(mut self, image: InlineImage) -> Self {
        self.image = Some(image);
        self
    }

    pub fn with_grounding(mut self, grounding: Grounding) -> Self {
        self.grounding = grounding;
        self
    }
}

/// Trait for text generation (chat, lookup, translation, grounded queries).
#[async_trait]
pub trait TextProvider: Send + Sync {
    async fn generate_text(
        &self,
        credential: &Credential,
        request: &TextRequest,
    ) -> Result<GroundedAnswer, ProviderError>;
}

/// Trait for image generation.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    async fn generate_image(
        &self,
        credential: &Credential,
        prompt: &str,
        quality: ImageQuality,
    ) -> Result<GeneratedImage, ProviderError>;
}

/// Trait for speech synthesis.
#[async_trait]
pub trait SpeechProvider: Send + Sync {
    /// Returns base64 encoded PCM16, mono, 24 kHz.
    async fn generate_speech(
        &self,
        credential: &Credential,
        text: &str,
        voice: Voice,
    ) -> Result<String, ProviderError>;
}

/// Trait for long-running video synthesis.
#[async_trait]
pub trait VideoProvider: Send + Sync {
    async fn submit_video_job(
        &self,
        credential: &Credential,
        prompt: &str,
    ) -> Result<RemoteOperation, ProviderError>;

    async fn poll_video_job(
        &self,
        credential: &Credential,
        operation: &RemoteOperation,
    ) -> Result<RemoteOperation, ProviderError>;
}

/// Map a non-success HTTP response to a provider error.
pub(crate) async fn error_from_response(response: reqwest::Response) -> ProviderError {
    let status = response.status();
    let error_text = response.text().await.unwrap_or_default();
    ProviderError::Transport {
        status: status.as_u16(),
        message: error_text,
    }
}
