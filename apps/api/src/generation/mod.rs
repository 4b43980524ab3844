// Resume tailoring components.
// Implements: text-asset generation, original-text extraction, image patching,
// final text synthesis. All model calls go through llm_client.

pub mod extractor;
pub mod final_text;
pub mod image_patch;
pub mod prompts;
pub mod text_assets;

use thiserror::Error;

use crate::llm_client::{GatewayError, MalformedModelOutput};
use crate::models::PageError;

pub use extractor::OriginalTextExtractor;
pub use final_text::FinalTextSynthesizer;
pub use image_patch::{ImagePatchEngine, PatchConfig};
pub use text_assets::TextAssetGenerator;

/// Failures of a pipeline phase. Every variant is fatal to the phase it occurs in.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Model gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    MalformedOutput(#[from] MalformedModelOutput),

    #[error("Expected text for {expected} pages, but the model returned {actual}")]
    PageCountMismatch { expected: usize, actual: usize },

    #[error("Change '{change_summary}' references page {page_index}, but the resume has {page_count} pages")]
    PageIndexOutOfRange {
        page_index: i64,
        page_count: usize,
        change_summary: String,
    },

    #[error("Failed to apply '{change_summary}' to page {} after {attempts} attempts: {last_error}", .page_index + 1)]
    ImagePatchFailure {
        page_index: usize,
        change_summary: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Invalid page image: {0}")]
    InvalidPage(#[from] PageError),
}

impl PipelineError {
    /// The message shown to the user. Raw model output never appears here.
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::Gateway(e) => e.user_message(),
            other => other.to_string(),
        }
    }
}
