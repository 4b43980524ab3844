//! Gemini `generateContent` backend for the model gateway.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{
    GatewayError, GatewayRequest, GatewayResponse, ImagePart, ModelGateway, OutputModality,
    ResponsePart,
};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image-preview";

#[derive(Clone)]
pub struct GeminiGateway {
    client: Client,
    api_key: String,
    base_url: String,
    text_model: String,
    image_model: String,
}

impl GeminiGateway {
    pub fn new(api_key: String) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()?;
        Ok(Self {
            client,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_models(mut self, text_model: impl Into<String>, image_model: impl Into<String>) -> Self {
        self.text_model = text_model.into();
        self.image_model = image_model.into();
        self
    }

    /// Requests that ask for image output go to the image model.
    fn model_for(&self, request: &GatewayRequest) -> &str {
        if request.wants_image() {
            &self.image_model
        } else {
            &self.text_model
        }
    }

    fn build_url(&self, model: &str) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            model
        )
    }
}

#[async_trait]
impl ModelGateway for GeminiGateway {
    async fn generate(&self, request: GatewayRequest) -> Result<GatewayResponse, GatewayError> {
        let model = self.model_for(&request);
        let body = to_gemini_request(&request);

        debug!(
            model,
            images = request.images.len(),
            prompt_chars = request.prompt.len(),
            "Sending generateContent request"
        );

        let response = self
            .client
            .post(self.build_url(model))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<GeminiErrorEnvelope>(&text)
                .map(|e| e.error.message)
                .unwrap_or(text);
            warn!("Gemini API returned {}: {}", status, message);
            return Err(GatewayError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let gemini_response: GeminiResponse = response.json().await?;
        from_gemini_response(gemini_response)
    }
}

fn to_gemini_request(request: &GatewayRequest) -> GeminiRequest {
    let mut parts: Vec<GeminiPart> = request
        .images
        .iter()
        .map(|image| GeminiPart::InlineData {
            inline_data: GeminiInlineData {
                mime_type: image.mime_type.clone(),
                data: STANDARD.encode(&image.data),
            },
        })
        .collect();
    parts.push(GeminiPart::Text {
        text: request.prompt.clone(),
    });

    let generation_config = if request.output_modalities.is_empty() {
        None
    } else {
        Some(GeminiGenerationConfig {
            response_modalities: request
                .output_modalities
                .iter()
                .map(|m| match m {
                    OutputModality::Text => "TEXT",
                    OutputModality::Image => "IMAGE",
                })
                .collect(),
        })
    };

    GeminiRequest {
        contents: vec![GeminiContent {
            role: Some("user".to_string()),
            parts,
        }],
        generation_config,
    }
}

fn from_gemini_response(response: GeminiResponse) -> Result<GatewayResponse, GatewayError> {
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or(GatewayError::EmptyCandidates)?;

    let parts = candidate
        .content
        .map(|c| c.parts)
        .unwrap_or_default()
        .into_iter()
        .map(|part| match part {
            GeminiPart::Text { text } => Ok(ResponsePart::Text(text)),
            GeminiPart::InlineData { inline_data } => {
                let data = STANDARD
                    .decode(inline_data.data.as_bytes())
                    .map_err(|e| GatewayError::Decode(format!("inline image data: {e}")))?;
                Ok(ResponsePart::Image(ImagePart {
                    mime_type: inline_data.mime_type,
                    data: Bytes::from(data),
                }))
            }
        })
        .collect::<Result<Vec<_>, GatewayError>>()?;

    Ok(GatewayResponse { parts })
}

// === Gemini API Types ===

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GeminiGenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData", alias = "inline_data")]
        inline_data: GeminiInlineData,
    },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    response_modalities: Vec<&'static str>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorEnvelope {
    error: GeminiErrorBody,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn gateway() -> GeminiGateway {
        GeminiGateway::new("test-key".to_string()).unwrap()
    }

    #[test]
    fn test_build_url_uses_model_endpoint() {
        let gw = gateway().with_base_url("https://proxy.example.com/v1beta/");
        assert_eq!(
            gw.build_url("gemini-2.5-flash"),
            "https://proxy.example.com/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }

    #[test]
    fn test_model_selected_by_output_modality() {
        let gw = gateway().with_models("text-model", "image-model");
        let text = GatewayRequest::new(vec![], "read");
        let image = GatewayRequest::new(vec![], "edit").with_modalities(&[OutputModality::Image]);
        assert_eq!(gw.model_for(&text), "text-model");
        assert_eq!(gw.model_for(&image), "image-model");
    }

    #[test]
    fn test_request_puts_images_before_prompt() {
        let request = GatewayRequest::new(
            vec![ImagePart {
                mime_type: "image/png".to_string(),
                data: Bytes::from_static(b"abc"),
            }],
            "Transcribe",
        )
        .with_modalities(&[OutputModality::Image]);

        let value = serde_json::to_value(to_gemini_request(&request)).unwrap();
        let parts = &value["contents"][0]["parts"];
        assert_eq!(parts[0]["inlineData"]["mimeType"], "image/png");
        assert_eq!(parts[0]["inlineData"]["data"], STANDARD.encode(b"abc"));
        assert_eq!(parts[1]["text"], "Transcribe");
        assert_eq!(
            value["generationConfig"]["responseModalities"],
            json!(["IMAGE"])
        );
    }

    #[test]
    fn test_text_request_omits_generation_config() {
        let value =
            serde_json::to_value(to_gemini_request(&GatewayRequest::new(vec![], "hi"))).unwrap();
        assert!(value.get("generationConfig").is_none());
    }

    #[test]
    fn test_response_decodes_text_and_inline_images() {
        let raw = json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        {"text": "Here is the edited page."},
                        {"inlineData": {"mimeType": "image/png", "data": STANDARD.encode(b"img")}}
                    ]
                },
                "finishReason": "STOP"
            }]
        });
        let response: GeminiResponse = serde_json::from_value(raw).unwrap();
        let parsed = from_gemini_response(response).unwrap();
        assert_eq!(parsed.text(), "Here is the edited page.");
        assert_eq!(parsed.first_image().unwrap().data.as_ref(), b"img");
    }

    #[test]
    fn test_response_without_candidates_is_error() {
        let response: GeminiResponse = serde_json::from_value(json!({})).unwrap();
        assert!(matches!(
            from_gemini_response(response),
            Err(GatewayError::EmptyCandidates)
        ));
    }

    #[test]
    fn test_candidate_without_content_yields_no_parts() {
        let response: GeminiResponse =
            serde_json::from_value(json!({"candidates": [{"finishReason": "SAFETY"}]})).unwrap();
        let parsed = from_gemini_response(response).unwrap();
        assert!(parsed.parts.is_empty());
    }
}
