/// Model Gateway: the single point of entry for all generative model calls.
///
/// ARCHITECTURAL RULE: No other module may call the model API directly.
/// Components receive an `Arc<dyn ModelGateway>` at construction time, so tests
/// substitute a scripted gateway without touching the network.
///
/// The gateway is a thin transport boundary: no retries, no interpretation.
use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;

pub mod gemini;
pub mod prompts;
pub mod response_parser;

#[cfg(test)]
pub mod testing;

pub use gemini::GeminiGateway;
pub use response_parser::{extract_json, MalformedModelOutput};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to decode model response: {0}")]
    Decode(String),

    #[error("Model returned no candidates")]
    EmptyCandidates,
}

/// User-facing categories a gateway failure is sorted into at the outermost boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayErrorCategory {
    QuotaExceeded,
    BadRequest,
    InvalidCredential,
    Generic,
}

impl GatewayError {
    /// Classifies by status and message content, the way the backend reports them.
    pub fn category(&self) -> GatewayErrorCategory {
        let message = self.to_string();
        let status = match self {
            GatewayError::Api { status, .. } => Some(*status),
            _ => None,
        };

        if status == Some(429) || message.to_lowercase().contains("quota") {
            GatewayErrorCategory::QuotaExceeded
        } else if message.contains("API key not valid") {
            GatewayErrorCategory::InvalidCredential
        } else if status == Some(400) || message.contains("400") {
            GatewayErrorCategory::BadRequest
        } else {
            GatewayErrorCategory::Generic
        }
    }

    pub fn user_message(&self) -> String {
        match self.category() {
            GatewayErrorCategory::QuotaExceeded => {
                "You have exceeded your API quota. Please check your account.".to_string()
            }
            GatewayErrorCategory::BadRequest => "There was an issue with the request. \
                The uploaded images might be invalid or the prompt too long."
                .to_string(),
            GatewayErrorCategory::InvalidCredential => {
                "The provided API key is not valid. Please check your configuration.".to_string()
            }
            GatewayErrorCategory::Generic => self.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputModality {
    Text,
    Image,
}

/// One image sent to, or returned by, the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePart {
    pub mime_type: String,
    pub data: Bytes,
}

/// A multimodal request: ordered images followed by a text prompt.
#[derive(Debug, Clone)]
pub struct GatewayRequest {
    pub images: Vec<ImagePart>,
    pub prompt: String,
    /// Empty means "backend default" (text).
    pub output_modalities: Vec<OutputModality>,
}

impl GatewayRequest {
    pub fn new(images: Vec<ImagePart>, prompt: impl Into<String>) -> Self {
        Self {
            images,
            prompt: prompt.into(),
            output_modalities: Vec::new(),
        }
    }

    pub fn with_modalities(mut self, modalities: &[OutputModality]) -> Self {
        self.output_modalities = modalities.to_vec();
        self
    }

    pub fn wants_image(&self) -> bool {
        self.output_modalities.contains(&OutputModality::Image)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponsePart {
    Text(String),
    Image(ImagePart),
}

/// Raw structured response: the first candidate's parts, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GatewayResponse {
    pub parts: Vec<ResponsePart>,
}

impl GatewayResponse {
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                ResponsePart::Text(text) => Some(text.as_str()),
                ResponsePart::Image(_) => None,
            })
            .collect()
    }

    pub fn first_image(&self) -> Option<&ImagePart> {
        self.parts.iter().find_map(|p| match p {
            ResponsePart::Image(image) => Some(image),
            ResponsePart::Text(_) => None,
        })
    }
}

#[async_trait]
pub trait ModelGateway: Send + Sync {
    async fn generate(&self, request: GatewayRequest) -> Result<GatewayResponse, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(status: u16, message: &str) -> GatewayError {
        GatewayError::Api {
            status,
            message: message.to_string(),
        }
    }

    #[test]
    fn test_quota_is_classified_by_status_and_message() {
        assert_eq!(
            api(429, "Too many requests").category(),
            GatewayErrorCategory::QuotaExceeded
        );
        assert_eq!(
            api(403, "Resource has been exhausted (e.g. check quota).").category(),
            GatewayErrorCategory::QuotaExceeded
        );
    }

    #[test]
    fn test_invalid_key_is_classified() {
        let err = api(400, "API key not valid. Please pass a valid API key.");
        assert_eq!(err.category(), GatewayErrorCategory::InvalidCredential);
    }

    #[test]
    fn test_bad_request_is_classified() {
        assert_eq!(
            api(400, "Request payload size exceeds the limit").category(),
            GatewayErrorCategory::BadRequest
        );
    }

    #[test]
    fn test_unknown_errors_are_generic_and_keep_message() {
        let err = GatewayError::EmptyCandidates;
        assert_eq!(err.category(), GatewayErrorCategory::Generic);
        assert_eq!(err.user_message(), "Model returned no candidates");
    }

    #[test]
    fn test_response_text_concatenates_text_parts_only() {
        let response = GatewayResponse {
            parts: vec![
                ResponsePart::Text("Hello ".to_string()),
                ResponsePart::Image(ImagePart {
                    mime_type: "image/png".to_string(),
                    data: Bytes::from_static(b"png"),
                }),
                ResponsePart::Text("world".to_string()),
            ],
        };
        assert_eq!(response.text(), "Hello world");
        assert_eq!(response.first_image().unwrap().data.as_ref(), b"png");
    }

    #[test]
    fn test_request_modalities() {
        let request = GatewayRequest::new(vec![], "edit")
            .with_modalities(&[OutputModality::Image]);
        assert!(request.wants_image());
        assert!(!GatewayRequest::new(vec![], "read").wants_image());
    }
}
