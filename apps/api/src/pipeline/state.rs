//! Pipeline state machine.
//!
//! `Input → GeneratingCandidates → Reviewing → Finalizing → Results`
//!
//! A failed phase falls back to the interactive state it started from
//! (`Input` or `Reviewing`) with the classified message attached and every
//! piece of user input intact: job details and pages for phase 1, plus the
//! candidate set and review toggles for phase 2.
//!
//! Transitions are plain methods; an operation requested in the wrong phase
//! returns `TransitionError` and leaves the state untouched.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::models::{ChangeDetail, GeneratedAssets, JobDetails, ResumePage, TextGenerationResult};
use crate::pipeline::review::ChangeReviewState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Input,
    GeneratingCandidates,
    Reviewing,
    Finalizing,
    Results,
}

impl Phase {
    /// A model phase is in flight.
    pub fn is_running(self) -> bool {
        matches!(self, Phase::GeneratingCandidates | Phase::Finalizing)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Input => "input",
            Phase::GeneratingCandidates => "generating candidates",
            Phase::Reviewing => "reviewing",
            Phase::Finalizing => "finalizing",
            Phase::Results => "showing results",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error, PartialEq)]
#[error("Cannot {operation} while {phase}")]
pub struct TransitionError {
    pub operation: &'static str,
    pub phase: Phase,
}

/// Everything the user entered for one generation run.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub job: JobDetails,
    pub pages: Vec<ResumePage>,
}

impl Submission {
    pub fn new(job: JobDetails, pages: Vec<ResumePage>) -> Result<Self, String> {
        job.validate()?;
        if pages.is_empty() {
            return Err("At least one resume page image is required".to_string());
        }
        Ok(Self { job, pages })
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

/// Phase 1 output.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateSet {
    pub text: TextGenerationResult,
    pub original_text: String,
}

/// Frozen inputs of phase 2, handed out by `confirm_review`.
#[derive(Debug, Clone)]
pub struct FinalizeJob {
    pub submission: Arc<Submission>,
    pub candidates: Arc<CandidateSet>,
    pub applied: Arc<Vec<ChangeDetail>>,
}

#[derive(Debug, Clone)]
pub enum PipelineState {
    Input {
        draft: Option<Arc<Submission>>,
        last_error: Option<String>,
    },
    GeneratingCandidates {
        submission: Arc<Submission>,
    },
    Reviewing {
        submission: Arc<Submission>,
        candidates: Arc<CandidateSet>,
        review: ChangeReviewState,
        last_error: Option<String>,
    },
    Finalizing {
        submission: Arc<Submission>,
        candidates: Arc<CandidateSet>,
        review: ChangeReviewState,
    },
    Results {
        assets: Arc<GeneratedAssets>,
    },
}

impl Default for PipelineState {
    fn default() -> Self {
        PipelineState::Input {
            draft: None,
            last_error: None,
        }
    }
}

impl PipelineState {
    pub fn phase(&self) -> Phase {
        match self {
            PipelineState::Input { .. } => Phase::Input,
            PipelineState::GeneratingCandidates { .. } => Phase::GeneratingCandidates,
            PipelineState::Reviewing { .. } => Phase::Reviewing,
            PipelineState::Finalizing { .. } => Phase::Finalizing,
            PipelineState::Results { .. } => Phase::Results,
        }
    }

    pub fn last_error(&self) -> Option<&str> {
        match self {
            PipelineState::Input { last_error, .. } | PipelineState::Reviewing { last_error, .. } => {
                last_error.as_deref()
            }
            _ => None,
        }
    }

    /// The input of the current (or last failed) run, if any.
    pub fn submission(&self) -> Option<&Submission> {
        match self {
            PipelineState::Input { draft, .. } => draft.as_deref(),
            PipelineState::GeneratingCandidates { submission }
            | PipelineState::Reviewing { submission, .. }
            | PipelineState::Finalizing { submission, .. } => Some(&**submission),
            PipelineState::Results { .. } => None,
        }
    }

    pub fn review(&self) -> Option<&ChangeReviewState> {
        match self {
            PipelineState::Reviewing { review, .. } | PipelineState::Finalizing { review, .. } => {
                Some(review)
            }
            _ => None,
        }
    }

    pub fn candidates(&self) -> Option<&CandidateSet> {
        match self {
            PipelineState::Reviewing { candidates, .. }
            | PipelineState::Finalizing { candidates, .. } => Some(&**candidates),
            _ => None,
        }
    }

    pub fn assets(&self) -> Option<&GeneratedAssets> {
        match self {
            PipelineState::Results { assets } => Some(&**assets),
            _ => None,
        }
    }

    /// The review toggles; only editable while reviewing.
    pub fn review_mut(&mut self) -> Result<&mut ChangeReviewState, TransitionError> {
        let phase = self.phase();
        match self {
            PipelineState::Reviewing { review, .. } => Ok(review),
            _ => Err(TransitionError {
                operation: "edit the review",
                phase,
            }),
        }
    }

    // ────────────────────────────────────────────────────────────────────────
    // Transitions
    // ────────────────────────────────────────────────────────────────────────

    /// Input → GeneratingCandidates with fresh input.
    pub fn submit(&mut self, submission: Submission) -> Result<Arc<Submission>, TransitionError> {
        if !matches!(self, PipelineState::Input { .. }) {
            return Err(self.rejected("submit a resume"));
        }
        let submission = Arc::new(submission);
        *self = PipelineState::GeneratingCandidates {
            submission: Arc::clone(&submission),
        };
        Ok(submission)
    }

    /// Input → GeneratingCandidates reusing the input kept from a failed run.
    pub fn resubmit(&mut self) -> Result<Arc<Submission>, TransitionError> {
        let submission = match &*self {
            PipelineState::Input {
                draft: Some(draft), ..
            } => Arc::clone(draft),
            _ => return Err(self.rejected("retry generation")),
        };
        *self = PipelineState::GeneratingCandidates {
            submission: Arc::clone(&submission),
        };
        Ok(submission)
    }

    /// GeneratingCandidates → Reviewing. Every candidate starts applied.
    pub fn candidates_ready(&mut self, candidates: CandidateSet) -> Result<(), TransitionError> {
        let submission = match &*self {
            PipelineState::GeneratingCandidates { submission } => Arc::clone(submission),
            _ => return Err(self.rejected("accept candidates")),
        };
        let review = ChangeReviewState::new(candidates.text.changes.clone());
        *self = PipelineState::Reviewing {
            submission,
            candidates: Arc::new(candidates),
            review,
            last_error: None,
        };
        Ok(())
    }

    /// GeneratingCandidates → Input, keeping the submission as a draft.
    pub fn generation_failed(&mut self, message: String) -> Result<(), TransitionError> {
        let submission = match &*self {
            PipelineState::GeneratingCandidates { submission } => Arc::clone(submission),
            _ => return Err(self.rejected("fail generation")),
        };
        *self = PipelineState::Input {
            draft: Some(submission),
            last_error: Some(message),
        };
        Ok(())
    }

    /// Reviewing → Finalizing. The applied list is frozen from here on.
    pub fn confirm_review(&mut self) -> Result<FinalizeJob, TransitionError> {
        let (submission, candidates, review) = match &*self {
            PipelineState::Reviewing {
                submission,
                candidates,
                review,
                ..
            } => (Arc::clone(submission), Arc::clone(candidates), review.clone()),
            _ => return Err(self.rejected("finalize")),
        };
        let applied = Arc::new(review.applied_changes());
        *self = PipelineState::Finalizing {
            submission: Arc::clone(&submission),
            candidates: Arc::clone(&candidates),
            review,
        };
        Ok(FinalizeJob {
            submission,
            candidates,
            applied,
        })
    }

    /// Finalizing → Results.
    pub fn finalized(&mut self, assets: GeneratedAssets) -> Result<(), TransitionError> {
        if !matches!(self, PipelineState::Finalizing { .. }) {
            return Err(self.rejected("publish results"));
        }
        *self = PipelineState::Results {
            assets: Arc::new(assets),
        };
        Ok(())
    }

    /// Finalizing → Reviewing with candidates and toggles untouched.
    pub fn finalization_failed(&mut self, message: String) -> Result<(), TransitionError> {
        let (submission, candidates, review) = match &*self {
            PipelineState::Finalizing {
                submission,
                candidates,
                review,
                ..
            } => (Arc::clone(submission), Arc::clone(candidates), review.clone()),
            _ => return Err(self.rejected("fail finalization")),
        };
        *self = PipelineState::Reviewing {
            submission,
            candidates,
            review,
            last_error: Some(message),
        };
        Ok(())
    }

    fn rejected(&self, operation: &'static str) -> TransitionError {
        TransitionError {
            operation,
            phase: self.phase(),
        }
    }
}
