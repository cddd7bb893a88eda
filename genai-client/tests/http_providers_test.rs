//! HTTP surface tests for the Gemini, Veo and entitlement clients.

use genai_client::config::ModelConfig;
use genai_client::models::{GeoPoint, ImageQuality, RemoteOperation, Voice};
use genai_client::services::providers::gemini::{GeminiConfig, GeminiProvider};
use genai_client::services::providers::veo::{VeoConfig, VeoProvider};
use genai_client::services::providers::{
    Grounding, ImageProvider, ProviderError, SpeechProvider, TextProvider, TextRequest,
    VideoProvider,
};
use genai_client::services::{EntitlementService, HttpEntitlementClient};
use genai_client::Credential;
use serde_json::{json, Value};
use studio_core::error::AppError;
use studio_core::retry::{ResilientInvoker, RetryConfig};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const KEY: &str = "AIzaWireTest";

fn credential() -> Credential {
    Credential::parse(KEY).unwrap()
}

fn gemini(server: &MockServer) -> GeminiProvider {
    GeminiProvider::new(GeminiConfig {
        api_base: server.uri(),
        models: ModelConfig::default(),
    })
}

async fn last_body(server: &MockServer) -> Value {
    let requests = server.received_requests().await.unwrap();
    serde_json::from_slice(&requests.last().unwrap().body).unwrap()
}

fn text_response(text: &str) -> Value {
    json!({"candidates": [{"content": {"role": "model", "parts": [{"text": text}]}}]})
}

mod gemini {
    use super::*;

    #[tokio::test]
    async fn chat_sends_key_header_and_system_instruction() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.0-flash-exp:generateContent"))
            .and(header("x-goog-api-key", KEY))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_response("Hi there")))
            .expect(1)
            .mount(&server)
            .await;

        let request = TextRequest::new("Hello").with_system_instruction("Be kind");
        let answer = gemini(&server)
            .generate_text(&credential(), &request)
            .await
            .unwrap();
        assert_eq!(answer.text, "Hi there");
        assert!(answer.sources.is_empty());

        let body = last_body(&server).await;
        assert_eq!(body["contents"][0]["parts"][0]["text"], "Hello");
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "Be kind");
        assert!(body.get("tools").is_none());
    }

    #[tokio::test]
    async fn maps_query_uses_maps_model_and_location() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.5-flash:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": {"parts": [{"text": "Try the corner cafe."}]},
                    "groundingMetadata": {"groundingChunks": [
                        {"maps": {"uri": "https://maps.example/cafe", "title": "Cafe"}},
                        {"maps": {}}
                    ]}
                }]
            })))
            .mount(&server)
            .await;

        let request = TextRequest::new("coffee").with_grounding(Grounding::Maps {
            location: Some(GeoPoint {
                latitude: 24.5,
                longitude: 93.9,
            }),
        });
        let answer = gemini(&server)
            .generate_text(&credential(), &request)
            .await
            .unwrap();

        assert_eq!(answer.sources.len(), 2);
        assert_eq!(answer.sources[0].title, "Cafe");
        assert_eq!(answer.sources[1].title, "Map Location");
        assert_eq!(answer.sources[1].uri, "#");

        let body = last_body(&server).await;
        assert_eq!(body["tools"][0]["googleMaps"], json!({}));
        assert_eq!(body["toolConfig"]["retrievalConfig"]["latLng"]["latitude"], 24.5);
    }

    #[tokio::test]
    async fn image_is_decoded_from_inline_data() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.0-flash-exp:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"parts": [
                    {"text": "Here is your image"},
                    {"inlineData": {"mimeType": "image/png", "data": "iVBORw=="}}
                ]}}]
            })))
            .mount(&server)
            .await;

        let image = gemini(&server)
            .generate_image(&credential(), "a cat", ImageQuality::High)
            .await
            .unwrap();
        assert_eq!(image.mime_type, "image/png");
        assert_eq!(image.bytes, vec![0x89, b'P', b'N', b'G']);

        let body = last_body(&server).await;
        assert_eq!(body["generationConfig"]["imageConfig"]["aspectRatio"], "1:1");
        assert_eq!(body["generationConfig"]["imageConfig"]["imageSize"], "2K");
    }

    #[tokio::test]
    async fn image_without_inline_part_is_empty_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_response("no")))
            .mount(&server)
            .await;

        let err = gemini(&server)
            .generate_image(&credential(), "a cat", ImageQuality::Standard)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::EmptyResponse(_)));
    }

    #[tokio::test]
    async fn speech_requests_audio_with_voice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.5-flash-preview-tts:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"parts": [
                    {"inlineData": {"mimeType": "audio/L16;rate=24000", "data": "AEAAwA=="}}
                ]}}]
            })))
            .mount(&server)
            .await;

        let audio = gemini(&server)
            .generate_speech(&credential(), "Hello", Voice::Puck)
            .await
            .unwrap();
        assert_eq!(audio, "AEAAwA==");

        let body = last_body(&server).await;
        assert_eq!(body["generationConfig"]["responseModalities"][0], "AUDIO");
        assert_eq!(
            body["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]
                ["voiceName"],
            "Puck"
        );
    }

    #[tokio::test]
    async fn safety_block_is_content_filtered() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"finishReason": "SAFETY"}]
            })))
            .mount(&server)
            .await;

        let err = gemini(&server)
            .generate_text(&credential(), &TextRequest::new("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::ContentFiltered));
    }

    #[tokio::test]
    async fn server_errors_are_retried_until_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_response("finally")))
            .expect(1)
            .mount(&server)
            .await;

        let provider = gemini(&server);
        let invoker = ResilientInvoker::new(RetryConfig {
            initial_backoff: std::time::Duration::from_millis(5),
            ..RetryConfig::default()
        });
        let credential = credential();
        let request = TextRequest::new("hello");

        let answer = invoker
            .invoke("chat", || provider.generate_text(&credential, &request))
            .await
            .unwrap();
        assert_eq!(answer.text, "finally");
    }

    #[tokio::test]
    async fn bad_request_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("API key not valid"))
            .expect(1)
            .mount(&server)
            .await;

        let provider = gemini(&server);
        let credential = credential();
        let request = TextRequest::new("hello");
        let err = ResilientInvoker::default()
            .invoke("chat", || provider.generate_text(&credential, &request))
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::Transport { status: 400, .. }));
        let app: AppError = err.into();
        assert!(!app.user_message().contains("API key not valid"));
    }
}

mod veo {
    use super::*;

    fn veo(server: &MockServer) -> VeoProvider {
        VeoProvider::new(VeoConfig {
            api_base: server.uri(),
            model: "veo-3.1-fast-generate-preview".to_string(),
        })
    }

    #[tokio::test]
    async fn submit_then_poll() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/veo-3.1-fast-generate-preview:predictLongRunning"))
            .and(header("x-goog-api-key", KEY))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "models/veo-3.1-fast-generate-preview/operations/op1"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/models/veo-3.1-fast-generate-preview/operations/op1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "models/veo-3.1-fast-generate-preview/operations/op1",
                "done": true,
                "response": {"generateVideoResponse": {"generatedSamples": [
                    {"video": {"uri": "https://files.example/v1:download?alt=media"}}
                ]}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = veo(&server);
        let submitted = provider
            .submit_video_job(&credential(), "a sunrise")
            .await
            .unwrap();
        assert_eq!(
            submitted,
            RemoteOperation::pending("models/veo-3.1-fast-generate-preview/operations/op1")
        );

        let body = last_body(&server).await;
        assert_eq!(body["instances"][0]["prompt"], "a sunrise");
        assert_eq!(body["parameters"]["resolution"], "720p");

        let polled = provider
            .poll_video_job(&credential(), &submitted)
            .await
            .unwrap();
        assert_eq!(
            polled.usable_result(),
            Some("https://files.example/v1:download?alt=media")
        );
    }

    #[tokio::test]
    async fn missing_operation_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
            .mount(&server)
            .await;

        let err = veo(&server)
            .poll_video_job(&credential(), &RemoteOperation::pending("operations/gone"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Transport { status: 404, .. }));
    }
}

mod entitlement {
    use super::*;

    #[tokio::test]
    async fn check_subscription_posts_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/check-subscription"))
            .and(body_json(json!({"customerId": "cus_123"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "isPro": true,
                "subscription": {"id": "sub_9", "status": "active", "customer": "cus_123"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let status = HttpEntitlementClient::new(server.uri())
            .check_subscription("cus_123")
            .await
            .unwrap();
        assert!(status.is_entitled);
        assert_eq!(status.subscription_id.as_deref(), Some("sub_9"));
        assert_eq!(status.subscription_status.as_deref(), Some("active"));
        assert_eq!(status.customer_id.as_deref(), Some("cus_123"));
    }

    #[tokio::test]
    async fn verify_checkout_reads_session() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/verify-subscription"))
            .and(query_param("session_id", "cs_test_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "isPro": true,
                "customerId": "cus_1",
                "subscriptionId": "sub_1",
                "status": "active",
                "email": "user@example.com"
            })))
            .mount(&server)
            .await;

        let status = HttpEntitlementClient::new(server.uri())
            .verify_checkout("cs_test_1")
            .await
            .unwrap();
        assert!(status.is_entitled);
        assert_eq!(status.email.as_deref(), Some("user@example.com"));
    }

    #[tokio::test]
    async fn server_failure_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("stripe down"))
            .mount(&server)
            .await;

        let err = HttpEntitlementClient::new(server.uri())
            .verify_checkout("cs_test_1")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Transport { status: 500, .. }));
    }
}
