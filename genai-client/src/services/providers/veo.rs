//! Veo video generation provider implementation.
//!
//! Video synthesis is a long-running job: `predictLongRunning` returns an
//! operation name which is then fetched until it reports `done`.

use super::gemini::API_KEY_HEADER;
use super::{error_from_response, ProviderError, VideoProvider};
use crate::credential::Credential;
use crate::models::RemoteOperation;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Veo provider configuration.
#[derive(Debug, Clone)]
pub struct VeoConfig {
    pub api_base: String,
    pub model: String,
}

/// Veo video provider.
pub struct VeoProvider {
    config: VeoConfig,
    client: Client,
}

impl VeoProvider {
    pub fn new(config: VeoConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();

        Self { config, client }
    }

    fn base(&self) -> &str {
        self.config.api_base.trim_end_matches('/')
    }

    async fn read_operation(
        &self,
        response: reqwest::Response,
    ) -> Result<RemoteOperation, ProviderError> {
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let operation: OperationResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::EmptyResponse(format!("Failed to parse operation: {}", e)))?;

        operation.into_remote()
    }
}

#[async_trait]
impl VideoProvider for VeoProvider {
    async fn submit_video_job(
        &self,
        credential: &Credential,
        prompt: &str,
    ) -> Result<RemoteOperation, ProviderError> {
        let url = format!(
            "{}/models/{}:predictLongRunning",
            self.base(),
            self.config.model
        );

        let body = PredictRequest {
            instances: vec![Instance {
                prompt: prompt.to_string(),
            }],
            parameters: VideoParameters {
                aspect_ratio: "16:9".to_string(),
                resolution: "720p".to_string(),
                sample_count: 1,
            },
        };

        tracing::debug!(
            model = %self.config.model,
            prompt_len = prompt.len(),
            "Submitting video job"
        );

        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, credential.expose())
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        let operation = self.read_operation(response).await?;
        tracing::info!(operation = %operation.handle, "Video job submitted");
        Ok(operation)
    }

    async fn poll_video_job(
        &self,
        credential: &Credential,
        operation: &RemoteOperation,
    ) -> Result<RemoteOperation, ProviderError> {
        let url = format!("{}/{}", self.base(), operation.handle.trim_start_matches('/'));

        let response = self
            .client
            .get(&url)
            .header(API_KEY_HEADER, credential.expose())
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        self.read_operation(response).await
    }
}

// ============================================================================
// Veo API Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
struct PredictRequest {
    instances: Vec<Instance>,
    parameters: VideoParameters,
}

#[derive(Debug, Serialize)]
struct Instance {
    prompt: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VideoParameters {
    aspect_ratio: String,
    resolution: String,
    sample_count: u32,
}

#[derive(Debug, Deserialize)]
struct OperationResponse {
    #[serde(default)]
    name: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    response: Option<OperationResult>,
    #[serde(default)]
    error: Option<OperationError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationResult {
    #[serde(default)]
    generate_video_response: Option<GenerateVideoResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateVideoResponse {
    #[serde(default)]
    generated_samples: Vec<GeneratedSample>,
}

#[derive(Debug, Deserialize)]
struct GeneratedSample {
    #[serde(default)]
    video: Option<VideoRef>,
}

#[derive(Debug, Deserialize)]
struct VideoRef {
    #[serde(default)]
    uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OperationError {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
}

impl OperationResponse {
    fn into_remote(self) -> Result<RemoteOperation, ProviderError> {
        if self.name.is_empty() {
            return Err(ProviderError::EmptyResponse(
                "Operation has no name".to_string(),
            ));
        }

        if let Some(error) = self.error {
            return Ok(RemoteOperation::failed(
                self.name,
                format!("{} (code {})", error.message, error.code),
            ));
        }

        if !self.done {
            return Ok(RemoteOperation::pending(self.name));
        }

        let uri = self
            .response
            .and_then(|r| r.generate_video_response)
            .and_then(|r| r.generated_samples.into_iter().next())
            .and_then(|s| s.video)
            .and_then(|v| v.uri)
            .filter(|uri| !uri.is_empty());

        Ok(match uri {
            Some(uri) => RemoteOperation::completed(self.name, uri),
            None => RemoteOperation::failed(self.name, "Operation finished without a video"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> RemoteOperation {
        serde_json::from_value::<OperationResponse>(value)
            .unwrap()
            .into_remote()
            .unwrap()
    }

    #[test]
    fn submit_body_shape() {
        let body = PredictRequest {
            instances: vec![Instance {
                prompt: "a cat".to_string(),
            }],
            parameters: VideoParameters {
                aspect_ratio: "16:9".to_string(),
                resolution: "720p".to_string(),
                sample_count: 1,
            },
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["instances"][0]["prompt"], "a cat");
        assert_eq!(value["parameters"]["aspectRatio"], "16:9");
        assert_eq!(value["parameters"]["sampleCount"], 1);
    }

    #[test]
    fn pending_operation() {
        let op = parse(json!({"name": "models/veo/operations/abc"}));
        assert_eq!(op, RemoteOperation::pending("models/veo/operations/abc"));
    }

    #[test]
    fn completed_operation_carries_uri() {
        let op = parse(json!({
            "name": "operations/abc",
            "done": true,
            "response": {"generateVideoResponse": {"generatedSamples": [
                {"video": {"uri": "https://files.example/v.mp4?alt=media"}}
            ]}}
        }));
        assert_eq!(op.usable_result(), Some("https://files.example/v.mp4?alt=media"));
    }

    #[test]
    fn backend_error_is_terminal_failure() {
        let op = parse(json!({
            "name": "operations/abc",
            "done": true,
            "error": {"code": 3, "message": "prompt rejected"}
        }));
        assert!(op.done);
        assert!(op.usable_result().is_none());
        assert!(op.last_status_message.contains("prompt rejected"));
    }

    #[test]
    fn done_without_samples_is_failure() {
        let op = parse(json!({"name": "operations/abc", "done": true, "response": {}}));
        assert!(op.done);
        assert!(op.usable_result().is_none());
    }

    #[test]
    fn nameless_operation_is_rejected() {
        let result = serde_json::from_value::<OperationResponse>(json!({"done": false}))
            .unwrap()
            .into_remote();
        assert!(matches!(result, Err(ProviderError::EmptyResponse(_))));
    }
}
