//! Text-Asset Generator: cover letter, strategy summary, ATS keywords and the
//! candidate change set, produced in one multimodal call.
//!
//! `pageIndex` values are trusted as given by the model; range checking is the
//! orchestrator's job. Negative indices cannot become a `usize` and are
//! rejected here with the same error.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{error, info};

use crate::generation::prompts::TEXT_ASSETS_PROMPT_TEMPLATE;
use crate::generation::PipelineError;
use crate::llm_client::prompts::JSON_BLOCK_INSTRUCTION;
use crate::llm_client::{extract_json, GatewayRequest, ModelGateway, OutputModality};
use crate::models::{ChangeDetail, ChangeId, JobDetails, ResumePage, TextGenerationResult};

pub const CONTEXT: &str = "text generation";

/// Candidate JSON contract as returned by the model.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CandidatePayload {
    cover_letter: String,
    executive_summary: String,
    changes_made: Vec<RawChange>,
    #[serde(default)]
    ats_keywords: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawChange {
    section: String,
    summary: String,
    #[serde(default)]
    original_text: String,
    new_text: String,
    page_index: i64,
}

pub struct TextAssetGenerator {
    gateway: Arc<dyn ModelGateway>,
}

impl TextAssetGenerator {
    pub fn new(gateway: Arc<dyn ModelGateway>) -> Self {
        Self { gateway }
    }

    pub async fn generate(
        &self,
        pages: &[ResumePage],
        job: &JobDetails,
    ) -> Result<TextGenerationResult, PipelineError> {
        let images = pages
            .iter()
            .map(ResumePage::to_image_part)
            .collect::<Result<Vec<_>, _>>()?;
        let prompt = build_prompt(job, pages.len());

        info!(
            "Generating candidate changes for '{}' at '{}' ({} pages)",
            job.job_title,
            job.company_name,
            pages.len()
        );
        let request =
            GatewayRequest::new(images, prompt).with_modalities(&[OutputModality::Text]);
        let response = self.gateway.generate(request).await?;
        let raw = response.text();

        let payload: CandidatePayload = extract_json(&raw, CONTEXT).map_err(|e| {
            error!("Failed to parse {} reply: {}. Raw text: {}", CONTEXT, e.reason, e.raw);
            e
        })?;

        let result = into_result(payload, pages.len())?;
        info!("Model proposed {} candidate changes", result.changes.len());
        Ok(result)
    }
}

fn build_prompt(job: &JobDetails, page_count: usize) -> String {
    TEXT_ASSETS_PROMPT_TEMPLATE
        .replace("{json_instruction}", JSON_BLOCK_INSTRUCTION)
        .replace("{page_count}", &page_count.to_string())
        .replace("{max_page_index}", &page_count.saturating_sub(1).to_string())
        .replace("{job_title}", &job.job_title)
        .replace("{company_name}", &job.company_name)
        .replace("{job_description}", &job.job_description)
}

/// Assigns stable ids in candidate order.
fn into_result(
    payload: CandidatePayload,
    page_count: usize,
) -> Result<TextGenerationResult, PipelineError> {
    let changes = payload
        .changes_made
        .into_iter()
        .map(|raw| {
            let page_index =
                usize::try_from(raw.page_index).map_err(|_| PipelineError::PageIndexOutOfRange {
                    page_index: raw.page_index,
                    page_count,
                    change_summary: raw.summary.clone(),
                })?;
            Ok(ChangeDetail {
                id: ChangeId::new(),
                section: raw.section,
                summary: raw.summary,
                original_text: raw.original_text,
                new_text: raw.new_text,
                page_index,
            })
        })
        .collect::<Result<Vec<_>, PipelineError>>()?;

    Ok(TextGenerationResult {
        cover_letter: payload.cover_letter,
        summary: payload.executive_summary,
        changes,
        ats_keywords: payload.ats_keywords,
    })
}
