//! Resume pages travel through every layer as self-describing data URIs
//! (`data:<mime>;base64,<payload>`). The page's position in its list is the
//! join key to changes and generated output.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::llm_client::ImagePart;

pub const MIME_PNG: &str = "image/png";
pub const MIME_JPEG: &str = "image/jpeg";

/// Mime types accepted on intake. Generated output is not filtered.
pub const ACCEPTED_MIME_TYPES: [&str; 2] = [MIME_PNG, MIME_JPEG];

#[derive(Debug, Error, PartialEq)]
pub enum PageError {
    #[error("Unsupported image type '{0}' (only PNG and JPEG are accepted)")]
    UnsupportedMime(String),

    #[error("Malformed data URI: {0}")]
    MalformedDataUri(String),

    #[error("Image payload is empty")]
    EmptyPayload,
}

/// One resume page image, held as a data URI string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResumePage(String);

impl ResumePage {
    /// Validates an uploaded data URI. Only PNG and JPEG are accepted.
    pub fn parse(data_uri: &str) -> Result<Self, PageError> {
        let (mime, payload) = split_data_uri(data_uri)?;
        if !ACCEPTED_MIME_TYPES.contains(&mime) {
            return Err(PageError::UnsupportedMime(mime.to_string()));
        }
        if payload.is_empty() {
            return Err(PageError::EmptyPayload);
        }
        STANDARD
            .decode(payload)
            .map_err(|e| PageError::MalformedDataUri(format!("invalid base64: {e}")))?;
        Ok(Self(data_uri.to_string()))
    }

    /// Encodes raw uploaded bytes. Only PNG and JPEG are accepted.
    pub fn from_upload(mime: &str, data: &[u8]) -> Result<Self, PageError> {
        let mime = mime.trim().to_ascii_lowercase();
        if !ACCEPTED_MIME_TYPES.contains(&mime.as_str()) {
            return Err(PageError::UnsupportedMime(mime));
        }
        if data.is_empty() {
            return Err(PageError::EmptyPayload);
        }
        Ok(Self(encode_data_uri(&mime, data)))
    }

    /// Wraps an image returned by the model. The mime type is taken as given.
    pub fn from_generated(part: &ImagePart) -> Self {
        Self(encode_data_uri(&part.mime_type, &part.data))
    }

    pub fn as_data_uri(&self) -> &str {
        &self.0
    }

    pub fn mime_type(&self) -> &str {
        split_data_uri(&self.0).map(|(mime, _)| mime).unwrap_or_default()
    }

    /// Decodes the page into the binary form the gateway sends.
    pub fn to_image_part(&self) -> Result<ImagePart, PageError> {
        let (mime, payload) = split_data_uri(&self.0)?;
        let data = STANDARD
            .decode(payload)
            .map_err(|e| PageError::MalformedDataUri(format!("invalid base64: {e}")))?;
        Ok(ImagePart {
            mime_type: mime.to_string(),
            data: Bytes::from(data),
        })
    }
}

fn encode_data_uri(mime: &str, data: &[u8]) -> String {
    format!("data:{mime};base64,{}", STANDARD.encode(data))
}

fn split_data_uri(data_uri: &str) -> Result<(&str, &str), PageError> {
    let rest = data_uri
        .strip_prefix("data:")
        .ok_or_else(|| PageError::MalformedDataUri("missing 'data:' prefix".to_string()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| PageError::MalformedDataUri("missing ',' separator".to_string()))?;
    let mime = header
        .strip_suffix(";base64")
        .ok_or_else(|| PageError::MalformedDataUri("payload is not base64".to_string()))?;
    if mime.is_empty() {
        return Err(PageError::MalformedDataUri("missing mime type".to_string()));
    }
    Ok((mime, payload))
}
