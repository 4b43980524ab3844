//! Orchestrator: sequences the components into the two-phase pipeline.
//!
//! Phase 1 runs the text-asset generator and the original-text extractor
//! together; phase 2 runs the final-text synthesizer and the image patch
//! engine together. Both use fail-fast joins in the calling task: the first
//! error drops the sibling future, abandoning its in-flight request.
//!
//! `run_generation` / `run_finalization` drive a session's state machine and
//! hold its lock only around transitions, never across model calls. The
//! phase body runs on its own task: a caller that stops waiting (a dropped
//! request) does not stop the phase, which still lands on its success or
//! revert transition.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinError;
use tracing::{error, info};

use crate::generation::{
    FinalTextSynthesizer, ImagePatchEngine, OriginalTextExtractor, PatchConfig, PipelineError,
    TextAssetGenerator,
};
use crate::llm_client::ModelGateway;
use crate::models::{ChangeDetail, FinalAssetsResult, GeneratedAssets};
use crate::pipeline::state::{
    CandidateSet, FinalizeJob, PipelineState, Submission, TransitionError,
};

/// Outcome of driving a session through one phase.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("Pipeline task aborted: {0}")]
    Aborted(#[from] JoinError),
}

/// A session's state machine, shared with the task running its phase.
pub type SharedState = Arc<Mutex<PipelineState>>;

pub struct Orchestrator {
    generator: TextAssetGenerator,
    extractor: OriginalTextExtractor,
    synthesizer: FinalTextSynthesizer,
    patcher: ImagePatchEngine,
}

impl Orchestrator {
    pub fn new(gateway: Arc<dyn ModelGateway>, patch_config: PatchConfig) -> Self {
        Self {
            generator: TextAssetGenerator::new(Arc::clone(&gateway)),
            extractor: OriginalTextExtractor::new(Arc::clone(&gateway)),
            synthesizer: FinalTextSynthesizer::new(Arc::clone(&gateway)),
            patcher: ImagePatchEngine::new(gateway, patch_config),
        }
    }

    // ────────────────────────────────────────────────────────────────────────
    // Phase 1: candidates
    // ────────────────────────────────────────────────────────────────────────

    pub async fn generate_candidates(
        &self,
        submission: &Submission,
    ) -> Result<CandidateSet, PipelineError> {
        let (text, original_text) = tokio::try_join!(
            self.generator.generate(&submission.pages, &submission.job),
            self.extractor.extract(&submission.pages),
        )?;

        validate_page_indices(&text.changes, submission.page_count())?;
        Ok(CandidateSet {
            text,
            original_text,
        })
    }

    // ────────────────────────────────────────────────────────────────────────
    // Phase 2: final assets
    // ────────────────────────────────────────────────────────────────────────

    pub async fn produce_final_assets(
        &self,
        job: &FinalizeJob,
    ) -> Result<FinalAssetsResult, PipelineError> {
        let page_count = job.submission.page_count();
        let (final_texts, final_pages) = tokio::try_join!(
            self.synthesizer.synthesize(
                &job.candidates.original_text,
                &job.candidates.text.changes,
                &job.applied,
                page_count,
            ),
            self.patcher.patch_all(
                &job.submission.pages,
                &job.applied,
                &job.candidates.original_text,
            ),
        )?;

        if final_pages.len() != page_count {
            return Err(PipelineError::PageCountMismatch {
                expected: page_count,
                actual: final_pages.len(),
            });
        }
        if final_texts.len() != page_count {
            return Err(PipelineError::PageCountMismatch {
                expected: page_count,
                actual: final_texts.len(),
            });
        }

        Ok(FinalAssetsResult {
            final_images: final_pages
                .iter()
                .map(|page| page.as_data_uri().to_string())
                .collect(),
            final_texts,
        })
    }

    // ────────────────────────────────────────────────────────────────────────
    // Session drivers
    // ────────────────────────────────────────────────────────────────────────

    /// Runs phase 1 for a session. `None` retries with the input kept from
    /// the last failed run.
    pub async fn run_generation(
        self: &Arc<Self>,
        session: SharedState,
        submission: Option<Submission>,
    ) -> Result<(), RunError> {
        let mut state = session.lock().await;
        let submission = match submission {
            Some(submission) => state.submit(submission)?,
            None => state.resubmit()?,
        };
        drop(state);

        let orchestrator = Arc::clone(self);
        let phase =
            tokio::spawn(async move { orchestrator.complete_generation(&session, &submission).await });
        phase.await?
    }

    async fn complete_generation(
        &self,
        session: &Mutex<PipelineState>,
        submission: &Submission,
    ) -> Result<(), RunError> {
        let outcome = self.generate_candidates(submission).await;

        let mut state = session.lock().await;
        match outcome {
            Ok(candidates) => {
                info!(
                    "Generated {} candidate changes for {} pages",
                    candidates.text.changes.len(),
                    submission.page_count()
                );
                state.candidates_ready(candidates)?;
                Ok(())
            }
            Err(e) => {
                error!("Candidate generation failed: {e}");
                state.generation_failed(e.user_message())?;
                Err(e.into())
            }
        }
    }

    /// Runs phase 2 for a session in review.
    pub async fn run_finalization(self: &Arc<Self>, session: SharedState) -> Result<(), RunError> {
        let job = session.lock().await.confirm_review()?;
        info!(
            "Finalizing {} applied changes across {} pages",
            job.applied.len(),
            job.submission.page_count()
        );

        let orchestrator = Arc::clone(self);
        let phase =
            tokio::spawn(async move { orchestrator.complete_finalization(&session, &job).await });
        phase.await?
    }

    async fn complete_finalization(
        &self,
        session: &Mutex<PipelineState>,
        job: &FinalizeJob,
    ) -> Result<(), RunError> {
        let outcome = self.produce_final_assets(job).await;

        let mut state = session.lock().await;
        match outcome {
            Ok(result) => {
                state.finalized(assemble_assets(job, result))?;
                Ok(())
            }
            Err(e) => {
                error!("Finalization failed: {e}");
                state.finalization_failed(e.user_message())?;
                Err(e.into())
            }
        }
    }
}

/// Every change must reference an existing page before review starts.
pub fn validate_page_indices(
    changes: &[ChangeDetail],
    page_count: usize,
) -> Result<(), PipelineError> {
    match changes.iter().find(|c| c.page_index >= page_count) {
        Some(change) => Err(PipelineError::PageIndexOutOfRange {
            page_index: change.page_index as i64,
            page_count,
            change_summary: change.summary.clone(),
        }),
        None => Ok(()),
    }
}

pub fn assemble_assets(job: &FinalizeJob, result: FinalAssetsResult) -> GeneratedAssets {
    let text = &job.candidates.text;
    let details = &job.submission.job;
    GeneratedAssets {
        tailored_resume_images: result.final_images,
        cover_letter: text.cover_letter.clone(),
        summary: text.summary.clone(),
        original_resume_text: job.candidates.original_text.clone(),
        rewritten_resume_text: result.final_texts,
        applied_changes: job.applied.as_ref().clone(),
        ats_keywords: text.ats_keywords.clone(),
        resume_file_name: details.download_file_name("Resume"),
        cover_letter_file_name: details.download_file_name("CoverLetter"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::testing::{image_response, text_response, ScriptedGateway};
    use crate::llm_client::{GatewayError, GatewayRequest, GatewayResponse};
    use crate::models::{JobDetails, ResumePage};
    use crate::pipeline::state::Phase;
    use std::time::Duration;

    fn job() -> JobDetails {
        JobDetails {
            job_title: "Platform Engineer".to_string(),
            company_name: "Initech".to_string(),
            job_description: "Rust and Kubernetes".to_string(),
        }
    }

    fn submission(pages: usize) -> Submission {
        let pages = (0..pages)
            .map(|i| ResumePage::from_upload("image/png", format!("page{i}").as_bytes()).unwrap())
            .collect();
        Submission::new(job(), pages).unwrap()
    }

    const CANDIDATES: &str = r#"```json
{
  "coverLetter": "Dear Initech,",
  "executiveSummary": "Leaned into platform work.",
  "changesMade": [
    {"section": "Experience", "summary": "first", "originalText": "Led team", "newText": "Led a team of 5", "pageIndex": 0},
    {"section": "Experience", "summary": "second", "originalText": "", "newText": "On-call owner", "pageIndex": 0},
    {"section": "Skills", "summary": "third", "originalText": "", "newText": "Kubernetes", "pageIndex": 1}
  ],
  "atsKeywords": ["Kubernetes"]
}
```"#;

    const TRANSCRIPTION: &str = "Jane Doe\nLed team\nSkills: Rust";

    /// Routes each request to the right scripted reply by prompt shape.
    fn pipeline_gateway(
        final_pages: usize,
    ) -> impl Fn(&GatewayRequest, usize) -> Result<GatewayResponse, GatewayError> {
        move |request, _| {
            if request.wants_image() {
                let mut data = request.images[0].data.to_vec();
                data.extend_from_slice(b"+");
                Ok(image_response(&data))
            } else if request.prompt.starts_with("Transcribe") {
                Ok(text_response(TRANSCRIPTION))
            } else if request.prompt.contains("rewrittenResumeText") {
                let pages: Vec<String> = (0..final_pages).map(|i| format!("text {i}")).collect();
                Ok(text_response(
                    &serde_json::json!({ "rewrittenResumeText": pages }).to_string(),
                ))
            } else {
                Ok(text_response(CANDIDATES))
            }
        }
    }

    fn new_session() -> SharedState {
        Arc::new(Mutex::new(PipelineState::default()))
    }

    fn config() -> PatchConfig {
        PatchConfig {
            retry_base_delay: Duration::from_millis(1),
            ..PatchConfig::default()
        }
    }

    #[tokio::test]
    async fn test_generate_candidates_joins_both_branches() {
        let gateway = Arc::new(ScriptedGateway::new(pipeline_gateway(2)));
        let orchestrator = Arc::new(Orchestrator::new(gateway.clone(), config()));

        let candidates = orchestrator.generate_candidates(&submission(2)).await.unwrap();

        assert_eq!(candidates.text.changes.len(), 3);
        assert_eq!(candidates.original_text, TRANSCRIPTION);
        assert_eq!(gateway.call_count(), 2);
    }

    #[tokio::test]
    async fn test_out_of_range_page_index_is_rejected_before_review() {
        let gateway = Arc::new(ScriptedGateway::new(pipeline_gateway(1)));
        let orchestrator = Arc::new(Orchestrator::new(gateway, config()));

        let err = orchestrator.generate_candidates(&submission(1)).await.unwrap_err();

        assert!(matches!(
            err,
            PipelineError::PageIndexOutOfRange {
                page_index: 1,
                page_count: 1,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_two_page_scenario_with_one_rejected_change() {
        let gateway = Arc::new(ScriptedGateway::new(pipeline_gateway(2)));
        let orchestrator = Arc::new(Orchestrator::new(gateway.clone(), config()));
        let session = new_session();

        orchestrator
            .run_generation(Arc::clone(&session), Some(submission(2)))
            .await
            .unwrap();
        {
            let mut state = session.lock().await;
            assert_eq!(state.phase(), Phase::Reviewing);
            let first = state.candidates().unwrap().text.changes[0].id;
            let review = state.review_mut().unwrap();
            review.toggle(first).unwrap();
            assert_eq!(review.snapshot().affected_page_count, 2);
        }

        orchestrator.run_finalization(Arc::clone(&session)).await.unwrap();

        let requests = gateway.requests();
        let patches: Vec<_> = requests.iter().filter(|r| r.wants_image()).collect();
        assert_eq!(patches.len(), 2);
        assert!(patches.iter().any(|r| r.images[0].data.as_ref() == b"page0"
            && r.prompt.contains("On-call owner")));
        assert!(patches.iter().any(|r| r.images[0].data.as_ref() == b"page1"
            && r.prompt.contains("Kubernetes")));
        assert!(!patches.iter().any(|r| r.prompt.contains("Led a team of 5")));

        let state = session.lock().await;
        let assets = state.assets().unwrap();
        assert_eq!(assets.tailored_resume_images.len(), 2);
        assert_eq!(assets.rewritten_resume_text, vec!["text 0", "text 1"]);
        assert_eq!(assets.applied_changes.len(), 2);
        assert_eq!(assets.cover_letter, "Dear Initech,");
        assert_eq!(assets.original_resume_text, TRANSCRIPTION);
        assert_eq!(assets.resume_file_name, "Initech_Platform_Engineer_Resume.pdf");
        assert_eq!(
            assets.cover_letter_file_name,
            "Initech_Platform_Engineer_CoverLetter.pdf"
        );
    }

    #[tokio::test]
    async fn test_generation_failure_reverts_to_input_and_retry_reuses_input() {
        let gateway = Arc::new(ScriptedGateway::new(|request, call| {
            if call < 2 && !request.prompt.starts_with("Transcribe") {
                Err(GatewayError::Api {
                    status: 429,
                    message: "Resource exhausted".to_string(),
                })
            } else {
                pipeline_gateway(2)(request, call)
            }
        }));
        let orchestrator = Arc::new(Orchestrator::new(gateway.clone(), config()));
        let session = new_session();

        let err = orchestrator
            .run_generation(Arc::clone(&session), Some(submission(2)))
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::Pipeline(PipelineError::Gateway(_))));
        {
            let state = session.lock().await;
            assert_eq!(state.phase(), Phase::Input);
            assert!(state.last_error().unwrap().contains("API quota"));
        }

        orchestrator.run_generation(Arc::clone(&session), None).await.unwrap();

        assert_eq!(session.lock().await.phase(), Phase::Reviewing);
        let last = gateway.requests().pop().unwrap();
        assert_eq!(last.images.len(), 2);
    }

    #[tokio::test]
    async fn test_finalization_failure_returns_to_review_with_toggles() {
        let gateway = Arc::new(ScriptedGateway::new(pipeline_gateway(1)));
        let orchestrator = Arc::new(Orchestrator::new(gateway, config()));
        let session = new_session();
        orchestrator
            .run_generation(Arc::clone(&session), Some(submission(2)))
            .await
            .unwrap();
        let rejected = {
            let mut state = session.lock().await;
            let id = state.candidates().unwrap().text.changes[2].id;
            state.review_mut().unwrap().toggle(id).unwrap();
            id
        };

        let err = orchestrator.run_finalization(Arc::clone(&session)).await.unwrap_err();

        assert!(matches!(
            err,
            RunError::Pipeline(PipelineError::PageCountMismatch {
                expected: 2,
                actual: 1
            })
        ));
        let state = session.lock().await;
        assert_eq!(state.phase(), Phase::Reviewing);
        assert!(state.last_error().unwrap().contains("Expected text for 2 pages"));
        assert!(!state.review().unwrap().is_applied(rejected).unwrap());
    }

    #[tokio::test]
    async fn test_finalize_requires_review_phase() {
        let orchestrator = Arc::new(Orchestrator::new(
            Arc::new(ScriptedGateway::with_text("{}")),
            config(),
        ));
        let session = new_session();

        let err = orchestrator.run_finalization(Arc::clone(&session)).await.unwrap_err();
        assert!(matches!(err, RunError::Transition(_)));
    }

    #[tokio::test]
    async fn test_no_applied_changes_returns_original_images() {
        let gateway = Arc::new(ScriptedGateway::new(pipeline_gateway(2)));
        let orchestrator = Arc::new(Orchestrator::new(gateway.clone(), config()));
        let session = new_session();
        orchestrator
            .run_generation(Arc::clone(&session), Some(submission(2)))
            .await
            .unwrap();
        {
            let mut state = session.lock().await;
            let review = state.review_mut().unwrap();
            review.set_section("Experience", false).unwrap();
            review.set_section("Skills", false).unwrap();
        }

        orchestrator.run_finalization(Arc::clone(&session)).await.unwrap();

        let original = submission(2);
        let state = session.lock().await;
        let assets = state.assets().unwrap();
        assert_eq!(assets.tailored_resume_images[0], original.pages[0].as_data_uri());
        assert_eq!(assets.tailored_resume_images[1], original.pages[1].as_data_uri());
        assert!(!gateway.requests().iter().any(|r| r.wants_image()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_generation_completes_after_caller_gives_up() {
        let gateway = Arc::new(
            ScriptedGateway::new(pipeline_gateway(2)).with_delay(Duration::from_secs(5)),
        );
        let orchestrator = Arc::new(Orchestrator::new(gateway, config()));
        let session = new_session();

        let waited = tokio::time::timeout(
            Duration::from_millis(50),
            orchestrator.run_generation(Arc::clone(&session), Some(submission(2))),
        )
        .await;
        assert!(waited.is_err());
        assert_eq!(session.lock().await.phase(), Phase::GeneratingCandidates);

        tokio::time::sleep(Duration::from_secs(10)).await;

        let state = session.lock().await;
        assert_eq!(state.phase(), Phase::Reviewing);
        assert_eq!(state.candidates().unwrap().text.changes.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_generation_reverts_after_caller_gives_up() {
        let gateway = Arc::new(
            ScriptedGateway::new(|_, _| {
                Err(GatewayError::Api {
                    status: 500,
                    message: "backend unavailable".to_string(),
                })
            })
            .with_delay(Duration::from_secs(5)),
        );
        let orchestrator = Arc::new(Orchestrator::new(gateway, config()));
        let session = new_session();

        let waited = tokio::time::timeout(
            Duration::from_millis(50),
            orchestrator.run_generation(Arc::clone(&session), Some(submission(1))),
        )
        .await;
        assert!(waited.is_err());

        tokio::time::sleep(Duration::from_secs(10)).await;

        let mut state = session.lock().await;
        assert_eq!(state.phase(), Phase::Input);
        assert!(state.last_error().is_some());
        assert!(state.resubmit().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_finalization_keeps_toggles_after_caller_gives_up() {
        let gateway = Arc::new(
            ScriptedGateway::new(pipeline_gateway(1)).with_delay(Duration::from_secs(5)),
        );
        let orchestrator = Arc::new(Orchestrator::new(gateway, config()));
        let session = new_session();
        orchestrator
            .run_generation(Arc::clone(&session), Some(submission(2)))
            .await
            .unwrap();
        let rejected = {
            let mut state = session.lock().await;
            let id = state.candidates().unwrap().text.changes[0].id;
            state.review_mut().unwrap().toggle(id).unwrap();
            id
        };

        let waited = tokio::time::timeout(
            Duration::from_millis(50),
            orchestrator.run_finalization(Arc::clone(&session)),
        )
        .await;
        assert!(waited.is_err());
        assert_eq!(session.lock().await.phase(), Phase::Finalizing);

        tokio::time::sleep(Duration::from_secs(60)).await;

        let state = session.lock().await;
        assert_eq!(state.phase(), Phase::Reviewing);
        assert!(state.last_error().unwrap().contains("Expected text for 2 pages"));
        assert!(!state.review().unwrap().is_applied(rejected).unwrap());
    }

    #[test]
    fn test_validate_page_indices() {
        let change = |page_index| ChangeDetail {
            id: crate::models::ChangeId::new(),
            section: "S".to_string(),
            summary: "s".to_string(),
            original_text: String::new(),
            new_text: "n".to_string(),
            page_index,
        };
        assert!(validate_page_indices(&[change(0), change(2)], 3).is_ok());
        assert!(validate_page_indices(&[change(3)], 3).is_err());
    }
}
