//! Feature facade.
//!
//! Every gated feature follows the same path: resolve the credential, take
//! one credit from the daily quota, then call the backend through the
//! resilient invoker (or the operation poller for video).

use crate::audio::{AudioOutput, AudioPlaybackPipeline, PlaybackState};
use crate::config::{Feature, GenaiConfig};
use crate::credential::{Credential, CredentialStore};
use crate::models::{
    EntitlementStatus, GeneratedImage, GeoPoint, GroundedAnswer, ImageQuality, InlineImage,
    Language, ProfileUpdate, UsageRecord, Voice,
};
use crate::services::entitlement::EntitlementService;
use crate::services::metrics;
use crate::services::poller::{OperationPoller, PollConfig};
use crate::services::prompts;
use crate::services::providers::gemini::{GeminiConfig, GeminiProvider};
use crate::services::providers::veo::{VeoConfig, VeoProvider};
use crate::services::providers::{
    Grounding, ImageProvider, SpeechProvider, TextProvider, TextRequest, VideoProvider,
};
use crate::services::quota::{self, QuotaGate};
use crate::services::usage_store::UsageRepository;
use chrono::NaiveDate;
use secrecy::ExposeSecret;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use studio_core::error::AppError;
use studio_core::retry::ResilientInvoker;
use studio_core::store::KeyValueStore;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Result of a gated feature call.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Completed(T),
    /// The daily limit is spent; show the upgrade path instead.
    QuotaExceeded { limit: u32 },
}

impl<T> Outcome<T> {
    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed(_))
    }

    pub fn completed(self) -> Option<T> {
        match self {
            Outcome::Completed(value) => Some(value),
            Outcome::QuotaExceeded { .. } => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Completed(value) => Outcome::Completed(f(value)),
            Outcome::QuotaExceeded { limit } => Outcome::QuotaExceeded { limit },
        }
    }
}

/// Backend capabilities used by the studio.
#[derive(Clone)]
pub struct StudioProviders {
    pub text: Arc<dyn TextProvider>,
    pub image: Arc<dyn ImageProvider>,
    pub speech: Arc<dyn SpeechProvider>,
    pub video: Arc<dyn VideoProvider>,
}

impl StudioProviders {
    /// Gemini for text, image and speech; Veo for video.
    pub fn gemini(config: &GenaiConfig) -> Self {
        let gemini = Arc::new(GeminiProvider::new(GeminiConfig {
            api_base: config.google.api_base.clone(),
            models: config.models.clone(),
        }));
        let veo = Arc::new(VeoProvider::new(VeoConfig {
            api_base: config.google.api_base.clone(),
            model: config.models.video_model.clone(),
        }));

        tracing::info!(
            text_model = %config.models.text_model,
            video_model = %config.models.video_model,
            "Initialized Gemini providers"
        );

        Self {
            text: gemini.clone(),
            image: gemini.clone(),
            speech: gemini,
            video: veo,
        }
    }

    /// One object serving every capability.
    pub fn single<P>(provider: Arc<P>) -> Self
    where
        P: TextProvider + ImageProvider + SpeechProvider + VideoProvider + 'static,
    {
        Self {
            text: provider.clone(),
            image: provider.clone(),
            speech: provider.clone(),
            video: provider,
        }
    }
}

type Clock = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

pub struct Studio {
    credentials: CredentialStore,
    usage: UsageRepository,
    usage_lock: Mutex<()>,
    gate: QuotaGate,
    invoker: ResilientInvoker,
    poller: OperationPoller,
    providers: StudioProviders,
    playback: AudioPlaybackPipeline,
    entitlement: Option<Arc<dyn EntitlementService>>,
    default_voice: Voice,
    clock: Clock,
}

impl Studio {
    pub fn new(
        config: &GenaiConfig,
        store: Arc<dyn KeyValueStore>,
        providers: StudioProviders,
        output: Arc<dyn AudioOutput>,
    ) -> Self {
        let fallback = config
            .google
            .fallback_api_key
            .as_ref()
            .map(|key| key.expose_secret().as_str());
        let invoker = ResilientInvoker::new(config.common.retry_config());

        Self {
            credentials: CredentialStore::new(store.clone(), fallback),
            usage: UsageRepository::new(store),
            usage_lock: Mutex::new(()),
            gate: QuotaGate::new(config.quota.daily_limit),
            poller: OperationPoller::new(invoker.clone(), PollConfig::from(&config.polling)),
            invoker,
            providers,
            playback: AudioPlaybackPipeline::new(output),
            entitlement: None,
            default_voice: config.speech.default_voice,
            clock: Arc::new(quota::today),
        }
    }

    /// Studio wired to the real backend and the configured store.
    pub fn from_config(config: &GenaiConfig) -> Self {
        let store = config.common.open_store();
        let mut studio = Self::new(
            config,
            store,
            StudioProviders::gemini(config),
            default_output(),
        );

        if let Some(base_url) = &config.entitlement.base_url {
            tracing::info!(endpoint = %base_url, "Initialized entitlement client");
            studio = studio.with_entitlement_service(Arc::new(
                crate::services::entitlement::HttpEntitlementClient::new(base_url.clone()),
            ));
        }

        studio
    }

    pub fn with_entitlement_service(mut self, service: Arc<dyn EntitlementService>) -> Self {
        self.entitlement = Some(service);
        self
    }

    /// Override the calendar used for the daily reset.
    pub fn with_clock(mut self, clock: impl Fn() -> NaiveDate + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    // ------------------------------------------------------------------
    // Credential
    // ------------------------------------------------------------------

    pub fn set_credential(&self, raw: &str) -> Result<(), AppError> {
        self.credentials.set(raw).map(|_| ())
    }

    pub fn clear_credential(&self) -> Result<(), AppError> {
        self.credentials.clear()
    }

    pub fn has_credential(&self) -> bool {
        self.credentials.get().is_some()
    }

    // ------------------------------------------------------------------
    // Quota and entitlement
    // ------------------------------------------------------------------

    /// Current usage record, rolled over to today.
    pub fn usage(&self) -> Result<UsageRecord, AppError> {
        self.usage.load((self.clock)())
    }

    /// Credits left today, `None` when entitled.
    pub fn remaining_credits(&self) -> Result<Option<u32>, AppError> {
        let today = (self.clock)();
        Ok(self.gate.remaining(&self.usage.load(today)?, today))
    }

    pub fn is_limit_reached(&self) -> Result<bool, AppError> {
        let today = (self.clock)();
        Ok(self.gate.is_limit_reached(&self.usage.load(today)?, today))
    }

    /// Load, change and save the persisted record under the usage lock.
    fn update_record(
        &self,
        change: impl FnOnce(&UsageRecord) -> UsageRecord,
    ) -> Result<UsageRecord, AppError> {
        let _guard = self.usage_lock.lock().unwrap_or_else(|p| p.into_inner());
        let record = change(&self.usage.load((self.clock)())?);
        self.usage.save(&record)?;
        Ok(record)
    }

    /// Apply an entitlement change and persist it.
    pub fn apply_entitlement(&self, status: &EntitlementStatus) -> Result<UsageRecord, AppError> {
        let record = self.update_record(|r| r.apply_entitlement(status))?;
        tracing::info!(entitled = record.is_entitled, "Entitlement applied");
        Ok(record)
    }

    /// Query the subscription of a known customer and apply it.
    pub async fn refresh_entitlement(&self, customer_id: &str) -> Result<UsageRecord, AppError> {
        let status = self.entitlement_service()?.check_subscription(customer_id).await?;
        self.apply_entitlement(&status)
    }

    /// Verify a completed checkout session and apply it.
    pub async fn verify_checkout(&self, session_id: &str) -> Result<UsageRecord, AppError> {
        let status = self.entitlement_service()?.verify_checkout(session_id).await?;
        self.apply_entitlement(&status)
    }

    // ------------------------------------------------------------------
    // Profile
    // ------------------------------------------------------------------

    pub fn sign_in(&self, email: &str, display_name: &str) -> Result<UsageRecord, AppError> {
        let email = email.trim();
        let display_name = display_name.trim();
        if email.is_empty() || display_name.is_empty() {
            return Err(AppError::InvalidRequest(
                "Email and name are required".to_string(),
            ));
        }

        let record = self.update_record(|r| r.signed_in(email, display_name))?;
        tracing::info!("Signed in");
        Ok(record)
    }

    /// Clear the account identity. Credits and entitlement are kept.
    pub fn sign_out(&self) -> Result<UsageRecord, AppError> {
        let record = self.update_record(UsageRecord::signed_out)?;
        tracing::info!("Signed out");
        Ok(record)
    }

    pub fn update_profile(&self, update: &ProfileUpdate) -> Result<UsageRecord, AppError> {
        if update.display_name.as_deref().is_some_and(|n| n.trim().is_empty())
            || update.email.as_deref().is_some_and(|e| e.trim().is_empty())
        {
            return Err(AppError::InvalidRequest(
                "Profile fields must not be blank".to_string(),
            ));
        }

        let record = self.update_record(|r| r.with_profile(update))?;
        tracing::debug!(language = %record.language, "Profile updated");
        Ok(record)
    }

    pub fn set_language(&self, language: Language) -> Result<UsageRecord, AppError> {
        self.update_profile(&ProfileUpdate {
            language: Some(language),
            ..Default::default()
        })
    }

    fn entitlement_service(&self) -> Result<&Arc<dyn EntitlementService>, AppError> {
        self.entitlement.as_ref().ok_or_else(|| {
            AppError::ConfigError(anyhow::anyhow!("Entitlement service is not configured"))
        })
    }

    /// One quota decision. Load, decide and save happen under a lock with
    /// no suspension point in between.
    fn consume_credit(&self) -> Result<bool, AppError> {
        let _guard = self.usage_lock.lock().unwrap_or_else(|p| p.into_inner());
        let today = (self.clock)();
        let record = self.usage.load(today)?;
        let decision = self.gate.try_consume(&record, today);
        self.usage.save(&decision.state)?;

        metrics::record_quota_decision(decision.granted);
        tracing::debug!(
            granted = decision.granted,
            credits_used = decision.state.credits_used_today,
            limit = self.gate.daily_limit(),
            entitled = decision.state.is_entitled,
            "Quota decision"
        );
        Ok(decision.granted)
    }

    async fn gated<T, F, Fut>(&self, feature: Feature, call: F) -> Result<Outcome<T>, AppError>
    where
        F: FnOnce(Credential) -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let credential = self.credentials.require()?;

        if !self.consume_credit()? {
            metrics::record_request(feature.as_str(), "quota_exceeded");
            tracing::info!(feature = feature.as_str(), "Daily limit reached");
            return Ok(Outcome::QuotaExceeded {
                limit: self.gate.daily_limit(),
            });
        }

        let started = Instant::now();
        let result = call(credential).await;
        metrics::record_provider_latency(feature.as_str(), started.elapsed().as_secs_f64());

        match result {
            Ok(value) => {
                metrics::record_request(feature.as_str(), "ok");
                Ok(Outcome::Completed(value))
            }
            Err(e) => {
                metrics::record_request(feature.as_str(), "error");
                tracing::warn!(feature = feature.as_str(), error = %e, "Feature request failed");
                Err(e)
            }
        }
    }

    async fn generate_text(
        &self,
        feature: Feature,
        request: TextRequest,
    ) -> Result<Outcome<GroundedAnswer>, AppError> {
        if request.prompt.trim().is_empty() {
            return Err(AppError::InvalidRequest("Prompt must not be empty".to_string()));
        }

        let text = self.providers.text.clone();
        self.gated(feature, move |credential| async move {
            self.invoker
                .invoke(feature.as_str(), || text.generate_text(&credential, &request))
                .await
                .map_err(AppError::from)
        })
        .await
    }

    // ------------------------------------------------------------------
    // Features
    // ------------------------------------------------------------------

    /// Conversational reply, optionally about an attached image.
    pub async fn chat(
        &self,
        message: &str,
        image: Option<InlineImage>,
        system_instruction: Option<&str>,
    ) -> Result<Outcome<String>, AppError> {
        let mut request = TextRequest::new(message)
            .with_system_instruction(system_instruction.unwrap_or(prompts::DEFAULT_PERSONA));
        if let Some(image) = image {
            request = request.with_image(image);
        }

        Ok(self
            .generate_text(Feature::Chat, request)
            .await?
            .map(|answer| answer.text))
    }

    /// Dictionary entry for one word.
    pub async fn lookup_word(&self, word: &str) -> Result<Outcome<String>, AppError> {
        let request = TextRequest::new(word.trim())
            .with_system_instruction(prompts::dictionary_instruction(word));

        Ok(self
            .generate_text(Feature::Dictionary, request)
            .await?
            .map(|answer| answer.text))
    }

    pub async fn translate(
        &self,
        text: &str,
        from: &str,
        to: &str,
    ) -> Result<Outcome<String>, AppError> {
        let request =
            TextRequest::new(text).with_system_instruction(prompts::translation_instruction(from, to));

        Ok(self
            .generate_text(Feature::Translate, request)
            .await?
            .map(|answer| answer.text))
    }

    /// Web-grounded answer with its sources.
    pub async fn search(&self, query: &str) -> Result<Outcome<GroundedAnswer>, AppError> {
        let request = TextRequest::new(query).with_grounding(Grounding::WebSearch);
        self.generate_text(Feature::Search, request).await
    }

    /// Maps-grounded answer, biased towards `location` when given.
    pub async fn find_places(
        &self,
        query: &str,
        location: Option<GeoPoint>,
    ) -> Result<Outcome<GroundedAnswer>, AppError> {
        let request = TextRequest::new(query).with_grounding(Grounding::Maps { location });
        self.generate_text(Feature::Maps, request).await
    }

    pub async fn generate_image(
        &self,
        prompt: &str,
        quality: ImageQuality,
    ) -> Result<Outcome<GeneratedImage>, AppError> {
        if prompt.trim().is_empty() {
            return Err(AppError::InvalidRequest("Prompt must not be empty".to_string()));
        }

        let image = self.providers.image.clone();
        self.gated(Feature::Image, move |credential| async move {
            self.invoker
                .invoke("generate_image", || {
                    image.generate_image(&credential, prompt, quality)
                })
                .await
                .map_err(AppError::from)
        })
        .await
    }

    /// Synthesize `text` and play it, replacing any current playback.
    ///
    /// Returns the id of the started playback session.
    pub async fn speak(&self, text: &str, voice: Option<Voice>) -> Result<Outcome<Uuid>, AppError> {
        if text.trim().is_empty() {
            return Err(AppError::InvalidRequest("Text must not be empty".to_string()));
        }

        let voice = voice.unwrap_or(self.default_voice);
        let speech = self.providers.speech.clone();
        let outcome = self
            .gated(Feature::Speech, move |credential| async move {
                // Credit granted: silence the previous answer before synthesizing.
                self.playback.stop();
                self.invoker
                    .invoke("generate_speech", || {
                        speech.generate_speech(&credential, text, voice)
                    })
                    .await
                    .map_err(AppError::from)
            })
            .await?;

        match outcome {
            Outcome::Completed(payload) => Ok(Outcome::Completed(self.playback.play_payload(&payload)?)),
            Outcome::QuotaExceeded { limit } => Ok(Outcome::QuotaExceeded { limit }),
        }
    }

    pub fn stop_speech(&self) {
        self.playback.stop();
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.playback.state()
    }

    pub fn subscribe_playback(&self) -> watch::Receiver<PlaybackState> {
        self.playback.subscribe()
    }

    /// Generate a video and return a fetchable, authenticated URI.
    pub async fn generate_video(
        &self,
        prompt: &str,
        on_status: impl Fn(&str),
    ) -> Result<Outcome<String>, AppError> {
        self.generate_video_with_cancel(prompt, &CancellationToken::new(), on_status)
            .await
    }

    /// Like [`generate_video`](Self::generate_video), abandoning the job when
    /// `cancel` fires. The spent credit is not refunded.
    pub async fn generate_video_with_cancel(
        &self,
        prompt: &str,
        cancel: &CancellationToken,
        on_status: impl Fn(&str),
    ) -> Result<Outcome<String>, AppError> {
        if prompt.trim().is_empty() {
            return Err(AppError::InvalidRequest("Prompt must not be empty".to_string()));
        }

        let video = self.providers.video.clone();
        self.gated(Feature::Video, move |credential| async move {
            let uri = self
                .poller
                .run_with_cancel(
                    cancel,
                    || video.submit_video_job(&credential, prompt),
                    |operation| {
                        let video = video.clone();
                        let credential = credential.clone();
                        async move { video.poll_video_job(&credential, &operation).await }
                    },
                    on_status,
                )
                .await?;
            authenticated_uri(&uri, &credential)
        })
        .await
    }
}

/// Append the API key so the media can be fetched without headers.
fn authenticated_uri(uri: &str, credential: &Credential) -> Result<String, AppError> {
    let mut url = reqwest::Url::parse(uri)
        .map_err(|e| AppError::OperationFailed(format!("Invalid result URI: {}", e)))?;
    url.query_pairs_mut().append_pair("key", credential.expose());
    Ok(url.to_string())
}

#[cfg(feature = "device-output")]
fn default_output() -> Arc<dyn AudioOutput> {
    Arc::new(crate::audio::DeviceOutput)
}

#[cfg(not(feature = "device-output"))]
fn default_output() -> Arc<dyn AudioOutput> {
    Arc::new(crate::audio::ClockedOutput)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authenticated_uri_keeps_existing_query() {
        let credential = Credential::parse("AIzaKey").unwrap();
        let uri = authenticated_uri("https://media.example/v.mp4?alt=media", &credential).unwrap();
        assert_eq!(uri, "https://media.example/v.mp4?alt=media&key=AIzaKey");

        let uri = authenticated_uri("https://media.example/v.mp4", &credential).unwrap();
        assert_eq!(uri, "https://media.example/v.mp4?key=AIzaKey");
    }

    #[test]
    fn unparsable_uri_is_an_operation_failure() {
        let credential = Credential::parse("AIzaKey").unwrap();
        assert!(matches!(
            authenticated_uri("not a url", &credential),
            Err(AppError::OperationFailed(_))
        ));
    }

    #[test]
    fn from_config_builds_in_memory_studio() {
        let mut config = GenaiConfig::default();
        config.google.fallback_api_key = None;

        let studio = Studio::from_config(&config);
        assert!(!studio.has_credential());
        assert_eq!(studio.usage().unwrap().credits_used_today, 0);
        assert!(matches!(
            studio.entitlement_service(),
            Err(AppError::ConfigError(_))
        ));

        config.entitlement.base_url = Some("http://127.0.0.1:9".to_string());
        assert!(Studio::from_config(&config).entitlement_service().is_ok());
    }

    #[test]
    fn outcome_map_preserves_quota_denial() {
        let denied: Outcome<u32> = Outcome::QuotaExceeded { limit: 5 };
        assert_eq!(denied.map(|n| n + 1), Outcome::QuotaExceeded { limit: 5 });
        assert_eq!(Outcome::Completed(1).map(|n| n + 1).completed(), Some(2));
    }
}
