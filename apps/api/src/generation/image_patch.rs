//! Image Patch Engine: applies approved changes onto page images.
//!
//! # Ordering rules
//! - A page with no applied changes is returned as-is (no model call).
//! - Within a page, changes are applied strictly in approved-list order: the
//!   output image of change *i* is the input image of change *i+1*. Each edit
//!   prompt describes the page's current rendered state, so changes on one page
//!   must never run concurrently.
//! - Pages are independent and are patched concurrently.
//!
//! # Retry policy
//! One atomic patch = one image + one targeted prompt, image output requested.
//! It fails when the reply has no image part, when the gateway errors, or
//! (when `reject_identical_output` is set) when the returned bytes equal the
//! input. The identity check is a best-effort signal for silent no-ops, not a
//! correctness guarantee. Failures are retried `max_retries` times with linear
//! backoff (`attempt × retry_base_delay`), then the page fails as a whole.

use std::sync::Arc;
use std::time::Duration;

use futures::future::try_join_all;
use tracing::{debug, info, warn};

use crate::generation::prompts::{
    PATCH_ADDITION_PROMPT_TEMPLATE, PATCH_FALLBACK_PROMPT_TEMPLATE,
    PATCH_REPLACEMENT_PROMPT_TEMPLATE,
};
use crate::generation::PipelineError;
use crate::llm_client::prompts::FIDELITY_INSTRUCTION;
use crate::llm_client::{GatewayRequest, ModelGateway, OutputModality};
use crate::models::{ChangeDetail, ResumePage};

pub const DEFAULT_MAX_RETRIES: u32 = 2;
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone)]
pub struct PatchConfig {
    /// Extra attempts after the first one.
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub reject_identical_output: bool,
}

impl Default for PatchConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
            reject_identical_output: true,
        }
    }
}

/// Prompt shape chosen for one change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchKind {
    Addition,
    /// `original_text` was found in the transcription.
    Replacement,
    /// `original_text` was not found; replace the closest passage or insert.
    UnverifiedReplacement,
}

/// Picks the prompt shape, checking the claimed original span against the
/// transcription (whitespace-collapsed, case-folded).
pub fn classify_change(change: &ChangeDetail, original_text: &str) -> PatchKind {
    if change.is_addition() {
        return PatchKind::Addition;
    }
    if normalize(original_text).contains(&normalize(&change.original_text)) {
        PatchKind::Replacement
    } else {
        PatchKind::UnverifiedReplacement
    }
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

pub fn build_patch_prompt(change: &ChangeDetail, kind: PatchKind) -> String {
    let template = match kind {
        PatchKind::Addition => PATCH_ADDITION_PROMPT_TEMPLATE,
        PatchKind::Replacement => PATCH_REPLACEMENT_PROMPT_TEMPLATE,
        PatchKind::UnverifiedReplacement => PATCH_FALLBACK_PROMPT_TEMPLATE,
    };
    template
        .replace("{fidelity_instruction}", FIDELITY_INSTRUCTION)
        .replace("{section}", &change.section)
        .replace("{original_text}", &change.original_text)
        .replace("{new_text}", &change.new_text)
}

/// Buckets applied changes by page, keeping approved-list order inside each bucket.
pub fn group_by_page(
    changes: &[ChangeDetail],
    page_count: usize,
) -> Result<Vec<Vec<&ChangeDetail>>, PipelineError> {
    let mut groups: Vec<Vec<&ChangeDetail>> = vec![Vec::new(); page_count];
    for change in changes {
        let bucket =
            groups
                .get_mut(change.page_index)
                .ok_or_else(|| PipelineError::PageIndexOutOfRange {
                    page_index: change.page_index as i64,
                    page_count,
                    change_summary: change.summary.clone(),
                })?;
        bucket.push(change);
    }
    Ok(groups)
}

pub struct ImagePatchEngine {
    gateway: Arc<dyn ModelGateway>,
    config: PatchConfig,
}

impl ImagePatchEngine {
    pub fn new(gateway: Arc<dyn ModelGateway>, config: PatchConfig) -> Self {
        Self { gateway, config }
    }

    /// Produces one final image per input page, in page order.
    pub async fn patch_all(
        &self,
        pages: &[ResumePage],
        applied: &[ChangeDetail],
        original_text: &str,
    ) -> Result<Vec<ResumePage>, PipelineError> {
        let groups = group_by_page(applied, pages.len())?;
        let affected = groups.iter().filter(|g| !g.is_empty()).count();
        info!(
            "Patching {} of {} pages with {} applied changes",
            affected,
            pages.len(),
            applied.len()
        );

        try_join_all(
            pages
                .iter()
                .zip(&groups)
                .enumerate()
                .map(|(index, (page, changes))| {
                    self.patch_page(index, page, changes, original_text)
                }),
        )
        .await
    }

    /// Chains the page's changes sequentially, starting from the original image.
    pub async fn patch_page(
        &self,
        page_index: usize,
        original: &ResumePage,
        changes: &[&ChangeDetail],
        original_text: &str,
    ) -> Result<ResumePage, PipelineError> {
        let mut current = original.clone();
        for (step, change) in changes.iter().enumerate() {
            let kind = classify_change(change, original_text);
            if kind == PatchKind::UnverifiedReplacement {
                warn!(
                    page = page_index,
                    change = %change.id,
                    "Original text not found in transcription; using fallback prompt"
                );
            }
            debug!(
                page = page_index,
                step = step + 1,
                of = changes.len(),
                "Applying '{}'",
                change.summary
            );
            current = self.apply_change(page_index, &current, change, kind).await?;
        }
        Ok(current)
    }

    async fn apply_change(
        &self,
        page_index: usize,
        current: &ResumePage,
        change: &ChangeDetail,
        kind: PatchKind,
    ) -> Result<ResumePage, PipelineError> {
        let input = current.to_image_part()?;
        let prompt = build_patch_prompt(change, kind);
        let total_attempts = self.config.max_retries + 1;
        let mut last_error = String::new();

        for attempt in 1..=total_attempts {
            if attempt > 1 {
                let delay = self.config.retry_base_delay * (attempt - 1);
                warn!(
                    page = page_index,
                    attempt,
                    total_attempts,
                    "Patch attempt failed ({}), retrying after {}ms",
                    last_error,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let request = GatewayRequest::new(vec![input.clone()], prompt.clone())
                .with_modalities(&[OutputModality::Image]);

            match self.gateway.generate(request).await {
                Ok(response) => match response.first_image() {
                    Some(image)
                        if self.config.reject_identical_output && image.data == input.data =>
                    {
                        last_error = "model returned the input image unchanged".to_string();
                    }
                    Some(image) => return Ok(ResumePage::from_generated(image)),
                    None => {
                        last_error = "response contained no image".to_string();
                    }
                },
                Err(e) => {
                    last_error = e.to_string();
                }
            }
        }

        warn!(
            page = page_index,
            change = %change.id,
            "Giving up on '{}' after {} attempts: {}",
            change.summary,
            total_attempts,
            last_error
        );
        Err(PipelineError::ImagePatchFailure {
            page_index,
            change_summary: change.summary.clone(),
            attempts: total_attempts,
            last_error,
        })
    }
}
