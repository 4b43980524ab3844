//! Original-Text Extractor: verbatim transcription of the uploaded pages.
//! Returns unstructured text; the page count is never echoed back.

use std::sync::Arc;

use tracing::{error, info};

use crate::generation::prompts::EXTRACT_TEXT_PROMPT;
use crate::generation::PipelineError;
use crate::llm_client::{GatewayRequest, MalformedModelOutput, ModelGateway, OutputModality};
use crate::models::ResumePage;

pub const CONTEXT: &str = "text extraction";

pub struct OriginalTextExtractor {
    gateway: Arc<dyn ModelGateway>,
}

impl OriginalTextExtractor {
    pub fn new(gateway: Arc<dyn ModelGateway>) -> Self {
        Self { gateway }
    }

    pub async fn extract(&self, pages: &[ResumePage]) -> Result<String, PipelineError> {
        let images = pages
            .iter()
            .map(ResumePage::to_image_part)
            .collect::<Result<Vec<_>, _>>()?;

        info!("Transcribing {} resume pages", pages.len());
        let response = self
            .gateway
            .generate(
                GatewayRequest::new(images, EXTRACT_TEXT_PROMPT)
                    .with_modalities(&[OutputModality::Text]),
            )
            .await?;

        let text = response.text();
        if text.trim().is_empty() {
            error!("Model returned no transcription text");
            return Err(MalformedModelOutput::new(CONTEXT, &text, "no text returned").into());
        }
        Ok(text)
    }
}
