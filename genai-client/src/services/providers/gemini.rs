//! Gemini provider implementation.
//!
//! Implements text, grounded text, image and speech generation against the
//! `generateContent` REST method.

use super::{
    error_from_response, Grounding, ImageProvider, ProviderError, SpeechProvider, TextProvider,
    TextRequest,
};
use crate::config::ModelConfig;
use crate::credential::Credential;
use crate::models::{GeneratedImage, GroundedAnswer, GroundingSource, ImageQuality, Voice};
use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Header carrying the API key on backend calls.
pub(crate) const API_KEY_HEADER: &str = "x-goog-api-key";

/// Gemini provider configuration.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_base: String,
    pub models: ModelConfig,
}

/// Gemini provider for every `generateContent` based feature.
pub struct GeminiProvider {
    config: GeminiConfig,
    client: Client,
}

impl GeminiProvider {
    pub fn new(config: GeminiConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_default();

        Self { config, client }
    }

    /// Build the API URL for the given model and method.
    fn api_url(&self, model: &str, method: &str) -> String {
        format!(
            "{}/models/{}:{}",
            self.config.api_base.trim_end_matches('/'),
            model,
            method
        )
    }

    async fn generate_content(
        &self,
        credential: &Credential,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, ProviderError> {
        let url = self.api_url(model, "generateContent");

        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, credential.expose())
            .json(request)
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let api_response: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::EmptyResponse(format!("Failed to parse response: {}", e)))?;

        if api_response.is_blocked() {
            return Err(ProviderError::ContentFiltered);
        }

        Ok(api_response)
    }
}

#[async_trait]
impl TextProvider for GeminiProvider {
    async fn generate_text(
        &self,
        credential: &Credential,
        request: &TextRequest,
    ) -> Result<GroundedAnswer, ProviderError> {
        let mut parts = vec![Part::text(&request.prompt)];
        if let Some(image) = &request.image {
            parts.push(Part::inline(&image.mime_type, &image.data));
        }

        let (model, tools, tool_config) = match request.grounding {
            Grounding::None => (&self.config.models.text_model, None, None),
            Grounding::WebSearch => (
                &self.config.models.search_model,
                Some(vec![Tool::google_search()]),
                None,
            ),
            Grounding::Maps { location } => (
                &self.config.models.maps_model,
                Some(vec![Tool::google_maps()]),
                location.map(|point| ToolConfig {
                    retrieval_config: RetrievalConfig {
                        lat_lng: LatLng {
                            latitude: point.latitude,
                            longitude: point.longitude,
                        },
                    },
                }),
            ),
        };

        let body = GenerateContentRequest {
            contents: vec![Content::user(parts)],
            system_instruction: request
                .system_instruction
                .as_ref()
                .map(|s| Content::system(s)),
            tools,
            tool_config,
            generation_config: None,
        };

        tracing::debug!(
            model = %model,
            prompt_len = request.prompt.len(),
            has_image = request.image.is_some(),
            grounding = ?request.grounding,
            "Sending request to Gemini API"
        );

        let response = self.generate_content(credential, model, &body).await?;
        let text = response.text();
        let sources = response.sources(request.grounding);

        if text.is_empty() && sources.is_empty() {
            return Err(ProviderError::EmptyResponse("No text generated".to_string()));
        }

        Ok(GroundedAnswer { text, sources })
    }
}

#[async_trait]
impl ImageProvider for GeminiProvider {
    async fn generate_image(
        &self,
        credential: &Credential,
        prompt: &str,
        quality: ImageQuality,
    ) -> Result<GeneratedImage, ProviderError> {
        let body = GenerateContentRequest {
            contents: vec![Content::user(vec![Part::text(prompt)])],
            system_instruction: None,
            tools: None,
            tool_config: None,
            generation_config: Some(GenerationConfig {
                response_modalities: Some(vec!["TEXT".to_string(), "IMAGE".to_string()]),
                image_config: Some(ImageConfig {
                    aspect_ratio: "1:1".to_string(),
                    image_size: match quality {
                        ImageQuality::Standard => None,
                        ImageQuality::High => Some("2K".to_string()),
                    },
                }),
                speech_config: None,
            }),
        };

        let response = self
            .generate_content(credential, &self.config.models.image_model, &body)
            .await?;

        let inline = response
            .first_inline_data()
            .ok_or_else(|| ProviderError::EmptyResponse("No image generated".to_string()))?;

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&inline.data)
            .map_err(|e| ProviderError::EmptyResponse(format!("Invalid image data: {}", e)))?;

        Ok(GeneratedImage {
            mime_type: inline.mime_type.clone(),
            bytes,
        })
    }
}

#[async_trait]
impl SpeechProvider for GeminiProvider {
    async fn generate_speech(
        &self,
        credential: &Credential,
        text: &str,
        voice: Voice,
    ) -> Result<String, ProviderError> {
        let body = GenerateContentRequest {
            contents: vec![Content::user(vec![Part::text(text)])],
            system_instruction: None,
            tools: None,
            tool_config: None,
            generation_config: Some(GenerationConfig {
                response_modalities: Some(vec!["AUDIO".to_string()]),
                speech_config: Some(SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: voice.as_str().to_string(),
                        },
                    },
                }),
                image_config: None,
            }),
        };

        tracing::debug!(voice = %voice, text_len = text.len(), "Requesting speech synthesis");

        let response = self
            .generate_content(credential, &self.config.models.speech_model, &body)
            .await?;

        response
            .first_inline_data()
            .map(|inline| inline.data.clone())
            .filter(|data| !data.is_empty())
            .ok_or_else(|| ProviderError::EmptyResponse("No audio generated".to_string()))
    }
}

// ============================================================================
// Gemini API Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Tool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_config: Option<ToolConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

impl Content {
    fn user(parts: Vec<Part>) -> Self {
        Self {
            role: Some("user".to_string()),
            parts,
        }
    }

    fn system(text: &str) -> Self {
        Self {
            role: None,
            parts: vec![Part::text(text)],
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

impl Part {
    fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            inline_data: None,
        }
    }

    fn inline(mime_type: &str, data: &str) -> Self {
        Self {
            text: None,
            inline_data: Some(InlineData {
                mime_type: mime_type.to_string(),
                data: data.to_string(),
            }),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(default)]
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct EmptyObject {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Tool {
    #[serde(skip_serializing_if = "Option::is_none")]
    google_search: Option<EmptyObject>,
    #[serde(skip_serializing_if = "Option::is_none")]
    google_maps: Option<EmptyObject>,
}

impl Tool {
    fn google_search() -> Self {
        Self {
            google_search: Some(EmptyObject {}),
            google_maps: None,
        }
    }

    fn google_maps() -> Self {
        Self {
            google_search: None,
            google_maps: Some(EmptyObject {}),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolConfig {
    retrieval_config: RetrievalConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RetrievalConfig {
    lat_lng: LatLng,
}

#[derive(Debug, Serialize)]
struct LatLng {
    latitude: f64,
    longitude: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    response_modalities: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    speech_config: Option<SpeechConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_config: Option<ImageConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SpeechConfig {
    voice_config: VoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceConfig {
    prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PrebuiltVoiceConfig {
    voice_name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageConfig {
    aspect_ratio: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_size: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
    #[serde(default)]
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Deserialize)]
struct GroundingChunk {
    #[serde(default)]
    web: Option<ChunkSource>,
    #[serde(default)]
    maps: Option<ChunkSource>,
}

#[derive(Debug, Deserialize)]
struct ChunkSource {
    #[serde(default)]
    uri: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

impl GenerateContentResponse {
    fn first_parts(&self) -> &[Part] {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| c.parts.as_slice())
            .unwrap_or_default()
    }

    fn is_blocked(&self) -> bool {
        let prompt_blocked = self
            .prompt_feedback
            .as_ref()
            .is_some_and(|f| f.block_reason.is_some());
        let candidate_blocked = self
            .candidates
            .first()
            .is_some_and(|c| c.finish_reason.as_deref() == Some("SAFETY"));
        prompt_blocked || candidate_blocked
    }

    /// Concatenated text of the first candidate.
    fn text(&self) -> String {
        self.first_parts()
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect::<Vec<_>>()
            .join("")
    }

    fn first_inline_data(&self) -> Option<&InlineData> {
        self.first_parts()
            .iter()
            .find_map(|p| p.inline_data.as_ref())
    }

    fn sources(&self, grounding: Grounding) -> Vec<GroundingSource> {
        let chunks = self
            .candidates
            .first()
            .and_then(|c| c.grounding_metadata.as_ref())
            .map(|m| m.grounding_chunks.as_slice())
            .unwrap_or_default();

        let (default_title, pick): (&str, fn(&GroundingChunk) -> Option<&ChunkSource>) =
            match grounding {
                Grounding::None => return Vec::new(),
                Grounding::WebSearch => ("Source", |c| c.web.as_ref()),
                Grounding::Maps { .. } => ("Map Location", |c| c.maps.as_ref()),
            };

        chunks
            .iter()
            .map(|chunk| {
                let source = pick(chunk);
                GroundingSource {
                    title: source
                        .and_then(|s| s.title.clone())
                        .unwrap_or_else(|| default_title.to_string()),
                    uri: source
                        .and_then(|s| s.uri.clone())
                        .unwrap_or_else(|| "#".to_string()),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> GenerateContentResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn request_serializes_in_camel_case() {
        let body = GenerateContentRequest {
            contents: vec![Content::user(vec![
                Part::text("hi"),
                Part::inline("image/png", "AAAA"),
            ])],
            system_instruction: Some(Content::system("be brief")),
            tools: Some(vec![Tool::google_maps()]),
            tool_config: Some(ToolConfig {
                retrieval_config: RetrievalConfig {
                    lat_lng: LatLng {
                        latitude: 1.5,
                        longitude: 2.5,
                    },
                },
            }),
            generation_config: None,
        };

        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["contents"][0]["role"], "user");
        assert_eq!(value["contents"][0]["parts"][1]["inlineData"]["mimeType"], "image/png");
        assert_eq!(value["systemInstruction"]["parts"][0]["text"], "be brief");
        assert_eq!(value["tools"][0]["googleMaps"], json!({}));
        assert!(value["tools"][0].get("googleSearch").is_none());
        assert_eq!(value["toolConfig"]["retrievalConfig"]["latLng"]["latitude"], 1.5);
        assert!(value.get("generationConfig").is_none());
    }

    #[test]
    fn speech_config_shape() {
        let config = GenerationConfig {
            response_modalities: Some(vec!["AUDIO".to_string()]),
            speech_config: Some(SpeechConfig {
                voice_config: VoiceConfig {
                    prebuilt_voice_config: PrebuiltVoiceConfig {
                        voice_name: "Kore".to_string(),
                    },
                },
            }),
            image_config: None,
        };
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(
            value["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]["voiceName"],
            "Kore"
        );
        assert_eq!(value["responseModalities"][0], "AUDIO");
    }

    #[test]
    fn text_joins_all_parts() {
        let response = parse(json!({
            "candidates": [{"content": {"parts": [{"text": "Hello, "}, {"text": "world"}]}}]
        }));
        assert_eq!(response.text(), "Hello, world");
    }

    #[test]
    fn web_sources_fall_back_to_placeholders() {
        let response = parse(json!({
            "candidates": [{
                "content": {"parts": [{"text": "answer"}]},
                "groundingMetadata": {"groundingChunks": [
                    {"web": {"uri": "https://a.example", "title": "A"}},
                    {"web": {}},
                    {"maps": {"uri": "https://maps.example"}}
                ]}
            }]
        }));

        let sources = response.sources(Grounding::WebSearch);
        assert_eq!(sources.len(), 3);
        assert_eq!(sources[0].title, "A");
        assert_eq!(sources[1].title, "Source");
        assert_eq!(sources[1].uri, "#");
        assert_eq!(sources[2].uri, "#");

        let maps = response.sources(Grounding::Maps { location: None });
        assert_eq!(maps[2].uri, "https://maps.example");
        assert_eq!(maps[2].title, "Map Location");
    }

    #[test]
    fn safety_finish_is_blocked() {
        let response = parse(json!({
            "candidates": [{"content": {"parts": []}, "finishReason": "SAFETY"}]
        }));
        assert!(response.is_blocked());

        let response = parse(json!({"promptFeedback": {"blockReason": "OTHER"}}));
        assert!(response.is_blocked());
    }

    #[test]
    fn inline_data_is_found_after_text() {
        let response = parse(json!({
            "candidates": [{"content": {"parts": [
                {"text": "here you go"},
                {"inlineData": {"mimeType": "image/png", "data": "cG5n"}}
            ]}}]
        }));
        let inline = response.first_inline_data().unwrap();
        assert_eq!(inline.mime_type, "image/png");
        assert_eq!(inline.data, "cG5n");
    }
}
