use crate::models::Voice;
use secrecy::SecretString;
use std::env;
use std::time::Duration;
use studio_core::config::CoreConfig;
use studio_core::error::AppError;

/// Gemini REST API base URL.
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Credits a non-entitled user may spend per calendar day.
pub const DEFAULT_DAILY_LIMIT: u32 = 5;

/// Delay between status checks of a long-running operation.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct GenaiConfig {
    pub common: CoreConfig,
    pub models: ModelConfig,
    pub google: GoogleConfig,
    pub quota: QuotaConfig,
    pub polling: PollingConfig,
    pub entitlement: EntitlementConfig,
    pub speech: SpeechConfig,
}

#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Model for chat, dictionary and translation (e.g., gemini-2.0-flash-exp)
    pub text_model: String,
    /// Model for web-grounded search
    pub search_model: String,
    /// Model for maps-grounded queries (e.g., gemini-2.5-flash)
    pub maps_model: String,
    /// Model for image generation
    pub image_model: String,
    /// Model for speech synthesis (e.g., gemini-2.5-flash-preview-tts)
    pub speech_model: String,
    /// Model for video synthesis (e.g., veo-3.1-fast-generate-preview)
    pub video_model: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            text_model: "gemini-2.0-flash-exp".to_string(),
            search_model: "gemini-2.0-flash-exp".to_string(),
            maps_model: "gemini-2.5-flash".to_string(),
            image_model: "gemini-2.0-flash-exp".to_string(),
            speech_model: "gemini-2.5-flash-preview-tts".to_string(),
            video_model: "veo-3.1-fast-generate-preview".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub api_base: String,
    /// Credential baked in at build time or provided by the environment.
    pub fallback_api_key: Option<SecretString>,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            fallback_api_key: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QuotaConfig {
    pub daily_limit: u32,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            daily_limit: DEFAULT_DAILY_LIMIT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PollingConfig {
    pub interval: Duration,
    /// Wall-clock ceiling for one poll run. Unbounded when unset.
    pub max_duration: Option<Duration>,
    /// Ceiling on status checks for one poll run. Unbounded when unset.
    pub max_polls: Option<u32>,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            max_duration: None,
            max_polls: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EntitlementConfig {
    /// Base URL of the subscription endpoints. Entitlement checks are
    /// unavailable when unset.
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SpeechConfig {
    pub default_voice: Voice,
}

impl Default for GenaiConfig {
    fn default() -> Self {
        Self {
            common: CoreConfig::default(),
            models: ModelConfig::default(),
            google: GoogleConfig::default(),
            quota: QuotaConfig::default(),
            polling: PollingConfig::default(),
            entitlement: EntitlementConfig::default(),
            speech: SpeechConfig::default(),
        }
    }
}

impl GenaiConfig {
    pub fn load() -> Result<Self, AppError> {
        let common_config = CoreConfig::load()?;
        let is_prod = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string()) == "prod";
        let models = ModelConfig::default();

        let fallback_api_key = env::var("GENAI_API_KEY")
            .ok()
            .or_else(|| option_env!("GENAI_API_KEY").map(str::to_string))
            .filter(|key| !key.is_empty())
            .map(SecretString::new);

        let default_voice = get_env("GENAI_DEFAULT_VOICE", Some(Voice::default().as_str()), is_prod)?;

        Ok(GenaiConfig {
            common: common_config,
            models: ModelConfig {
                text_model: get_env("GENAI_TEXT_MODEL", Some(&models.text_model), is_prod)?,
                search_model: get_env("GENAI_SEARCH_MODEL", Some(&models.search_model), is_prod)?,
                maps_model: get_env("GENAI_MAPS_MODEL", Some(&models.maps_model), is_prod)?,
                image_model: get_env("GENAI_IMAGE_MODEL", Some(&models.image_model), is_prod)?,
                speech_model: get_env("GENAI_SPEECH_MODEL", Some(&models.speech_model), is_prod)?,
                video_model: get_env("GENAI_VIDEO_MODEL", Some(&models.video_model), is_prod)?,
            },
            google: GoogleConfig {
                api_base: get_env("GENAI_API_BASE", Some(DEFAULT_API_BASE), is_prod)?,
                fallback_api_key,
            },
            quota: QuotaConfig {
                daily_limit: parse_env("GENAI_DAILY_LIMIT", DEFAULT_DAILY_LIMIT)?,
            },
            polling: PollingConfig {
                interval: Duration::from_secs(parse_env(
                    "GENAI_POLL_INTERVAL_SECS",
                    DEFAULT_POLL_INTERVAL_SECS,
                )?),
                max_duration: parse_optional_env::<u64>("GENAI_POLL_MAX_DURATION_SECS")?
                    .map(Duration::from_secs),
                max_polls: parse_optional_env("GENAI_POLL_MAX_POLLS")?,
            },
            entitlement: EntitlementConfig {
                base_url: env::var("ENTITLEMENT_SERVICE_URL")
                    .ok()
                    .filter(|url| !url.is_empty()),
            },
            speech: SpeechConfig {
                default_voice: default_voice.parse()?,
            },
        })
    }
}

/// Gated user-facing features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    Chat,
    Dictionary,
    Translate,
    Search,
    Maps,
    Image,
    Speech,
    Video,
}

impl Feature {
    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::Chat => "chat",
            Feature::Dictionary => "dictionary",
            Feature::Translate => "translate",
            Feature::Search => "search",
            Feature::Maps => "maps",
            Feature::Image => "image",
            Feature::Speech => "speech",
            Feature::Video => "video",
        }
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T, AppError> {
    Ok(parse_optional_env(key)?.unwrap_or(default))
}

fn parse_optional_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>, AppError> {
    match env::var(key) {
        Ok(val) if !val.trim().is_empty() => val.trim().parse().map(Some).map_err(|_| {
            AppError::ConfigError(anyhow::anyhow!("{} has an invalid value: {}", key, val))
        }),
        _ => Ok(None),
    }
}
