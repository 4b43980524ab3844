//! Final Text Synthesizer: rewrites the transcription with only the approved
//! changes, split into exactly one string per page. A wrong page count is a
//! contract violation and is not retried.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::generation::prompts::FINAL_TEXT_PROMPT_TEMPLATE;
use crate::generation::PipelineError;
use crate::llm_client::prompts::JSON_BLOCK_INSTRUCTION;
use crate::llm_client::{
    extract_json, GatewayRequest, MalformedModelOutput, ModelGateway, OutputModality,
};
use crate::models::{ChangeDetail, ChangeId};

pub const CONTEXT: &str = "final text generation";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FinalTextPayload {
    rewritten_resume_text: Vec<String>,
}

/// What the model sees of a change: no ids, no internal bookkeeping.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PromptChange<'a> {
    section: &'a str,
    summary: &'a str,
    original_text: &'a str,
    new_text: &'a str,
    page_index: usize,
}

impl<'a> From<&'a ChangeDetail> for PromptChange<'a> {
    fn from(change: &'a ChangeDetail) -> Self {
        Self {
            section: &change.section,
            summary: &change.summary,
            original_text: &change.original_text,
            new_text: &change.new_text,
            page_index: change.page_index,
        }
    }
}

pub struct FinalTextSynthesizer {
    gateway: Arc<dyn ModelGateway>,
}

impl FinalTextSynthesizer {
    pub fn new(gateway: Arc<dyn ModelGateway>) -> Self {
        Self { gateway }
    }

    /// `candidates` gives the model context; only `applied` may change the text.
    pub async fn synthesize(
        &self,
        original_text: &str,
        candidates: &[ChangeDetail],
        applied: &[ChangeDetail],
        page_count: usize,
    ) -> Result<Vec<String>, PipelineError> {
        let prompt = build_prompt(original_text, candidates, applied, page_count)?;

        info!(
            "Synthesizing final text: {} applied of {} candidates, {} pages",
            applied.len(),
            candidates.len(),
            page_count
        );
        let request =
            GatewayRequest::new(Vec::new(), prompt).with_modalities(&[OutputModality::Text]);
        let response = self.gateway.generate(request).await?;
        let raw = response.text();

        let payload: FinalTextPayload = extract_json(&raw, CONTEXT).map_err(|e| {
            error!("Failed to parse {} reply: {}. Raw text: {}", CONTEXT, e.reason, e.raw);
            e
        })?;

        let actual = payload.rewritten_resume_text.len();
        if actual != page_count {
            error!(
                "Final text page count mismatch: expected {}, got {}",
                page_count, actual
            );
            return Err(PipelineError::PageCountMismatch {
                expected: page_count,
                actual,
            });
        }
        Ok(payload.rewritten_resume_text)
    }
}

fn build_prompt(
    original_text: &str,
    candidates: &[ChangeDetail],
    applied: &[ChangeDetail],
    page_count: usize,
) -> Result<String, PipelineError> {
    let applied_ids: Vec<ChangeId> = applied.iter().map(|c| c.id).collect();
    let approved: Vec<PromptChange> = applied.iter().map(PromptChange::from).collect();
    let rejected: Vec<PromptChange> = candidates
        .iter()
        .filter(|c| !applied_ids.contains(&c.id))
        .map(PromptChange::from)
        .collect();

    Ok(FINAL_TEXT_PROMPT_TEMPLATE
        .replace("{json_instruction}", JSON_BLOCK_INSTRUCTION)
        .replace("{page_count}", &page_count.to_string())
        .replace("{applied_json}", &to_prompt_json(&approved)?)
        .replace("{rejected_json}", &to_prompt_json(&rejected)?)
        .replace("{original_text}", original_text))
}

fn to_prompt_json(changes: &[PromptChange]) -> Result<String, PipelineError> {
    serde_json::to_string_pretty(changes).map_err(|e| {
        PipelineError::MalformedOutput(MalformedModelOutput::new(
            CONTEXT,
            "",
            format!("could not encode change list: {e}"),
        ))
    })
}
