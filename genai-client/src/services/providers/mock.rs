//! Scripted provider for tests.
//!
//! Each capability pops the next scripted result, falling back to a canned
//! success once its script is exhausted.

use super::{
    ImageProvider, ProviderError, SpeechProvider, TextProvider, TextRequest, VideoProvider,
};
use crate::credential::Credential;
use crate::models::{GeneratedImage, GroundedAnswer, ImageQuality, RemoteOperation, Voice};
use async_trait::async_trait;
use base64::Engine;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

type Script<T> = Mutex<VecDeque<Result<T, ProviderError>>>;

/// Handle used by the canned video job.
pub const MOCK_OPERATION: &str = "operations/mock-video";

/// Result URI of the canned video job.
pub const MOCK_VIDEO_URI: &str = "https://media.example/video.mp4?alt=media";

#[derive(Default)]
pub struct MockProvider {
    text: Script<GroundedAnswer>,
    image: Script<GeneratedImage>,
    speech: Script<String>,
    submit: Script<RemoteOperation>,
    poll: Script<RemoteOperation>,
    text_requests: Mutex<Vec<TextRequest>>,
    image_calls: AtomicUsize,
    speech_calls: AtomicUsize,
    submit_calls: AtomicUsize,
    poll_calls: AtomicUsize,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_text(&self, result: Result<GroundedAnswer, ProviderError>) -> &Self {
        push(&self.text, result);
        self
    }

    pub fn script_image(&self, result: Result<GeneratedImage, ProviderError>) -> &Self {
        push(&self.image, result);
        self
    }

    pub fn script_speech(&self, result: Result<String, ProviderError>) -> &Self {
        push(&self.speech, result);
        self
    }

    pub fn script_submit(&self, result: Result<RemoteOperation, ProviderError>) -> &Self {
        push(&self.submit, result);
        self
    }

    pub fn script_poll(&self, result: Result<RemoteOperation, ProviderError>) -> &Self {
        push(&self.poll, result);
        self
    }

    /// Every text request received, in order.
    pub fn text_requests(&self) -> Vec<TextRequest> {
        self.text_requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    pub fn text_calls(&self) -> usize {
        self.text_requests().len()
    }

    pub fn image_calls(&self) -> usize {
        self.image_calls.load(Ordering::SeqCst)
    }

    pub fn speech_calls(&self) -> usize {
        self.speech_calls.load(Ordering::SeqCst)
    }

    pub fn submit_calls(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub fn poll_calls(&self) -> usize {
        self.poll_calls.load(Ordering::SeqCst)
    }
}

fn push<T>(script: &Script<T>, result: Result<T, ProviderError>) {
    if let Ok(mut queue) = script.lock() {
        queue.push_back(result);
    }
}

fn pop<T>(script: &Script<T>) -> Option<Result<T, ProviderError>> {
    script.lock().ok().and_then(|mut queue| queue.pop_front())
}

/// A short mono PCM16 tone, base64 encoded.
pub fn canned_speech() -> String {
    let bytes: Vec<u8> = [0i16, 8192, 16384, 8192, 0, -8192, -16384, -8192]
        .iter()
        .flat_map(|s| s.to_le_bytes())
        .collect();
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

#[async_trait]
impl TextProvider for MockProvider {
    async fn generate_text(
        &self,
        _credential: &Credential,
        request: &TextRequest,
    ) -> Result<GroundedAnswer, ProviderError> {
        if let Ok(mut requests) = self.text_requests.lock() {
            requests.push(request.clone());
        }

        pop(&self.text).unwrap_or_else(|| {
            Ok(GroundedAnswer {
                text: format!("Mock response for: {}", request.prompt),
                sources: Vec::new(),
            })
        })
    }
}

#[async_trait]
impl ImageProvider for MockProvider {
    async fn generate_image(
        &self,
        _credential: &Credential,
        _prompt: &str,
        _quality: ImageQuality,
    ) -> Result<GeneratedImage, ProviderError> {
        self.image_calls.fetch_add(1, Ordering::SeqCst);
        pop(&self.image).unwrap_or_else(|| {
            Ok(GeneratedImage {
                mime_type: "image/png".to_string(),
                bytes: vec![0x89, b'P', b'N', b'G'],
            })
        })
    }
}

#[async_trait]
impl SpeechProvider for MockProvider {
    async fn generate_speech(
        &self,
        _credential: &Credential,
        _text: &str,
        _voice: Voice,
    ) -> Result<String, ProviderError> {
        self.speech_calls.fetch_add(1, Ordering::SeqCst);
        pop(&self.speech).unwrap_or_else(|| Ok(canned_speech()))
    }
}

#[async_trait]
impl VideoProvider for MockProvider {
    async fn submit_video_job(
        &self,
        _credential: &Credential,
        _prompt: &str,
    ) -> Result<RemoteOperation, ProviderError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        pop(&self.submit).unwrap_or_else(|| Ok(RemoteOperation::pending(MOCK_OPERATION)))
    }

    async fn poll_video_job(
        &self,
        _credential: &Credential,
        operation: &RemoteOperation,
    ) -> Result<RemoteOperation, ProviderError> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        pop(&self.poll)
            .unwrap_or_else(|| Ok(RemoteOperation::completed(&operation.handle, MOCK_VIDEO_URI)))
    }
}
