//! Axum route handlers for the Session API.
//!
//! Handlers are thin: they resolve the session, hand control to the
//! orchestrator or the review state, and render the session view.

use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{ChangeId, GeneratedAssets, JobDetails, ResumePage};
use crate::pipeline::review::{ReviewSnapshot, SectionGroup};
use crate::pipeline::session::{Session, SessionHandle};
use crate::pipeline::state::{Phase, PipelineState, Submission};
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct BulkSectionRequest {
    pub section: String,
    pub apply: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewView {
    pub page_count: usize,
    pub cover_letter: String,
    pub summary: String,
    pub ats_keywords: Vec<String>,
    pub sections: Vec<SectionGroup>,
    pub snapshot: ReviewSnapshot,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub phase: Phase,
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review: Option<ReviewView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<GeneratedAssets>,
}

impl SessionView {
    fn render(session: &Session, state: &PipelineState) -> Self {
        let review = match (state.review(), state.candidates(), state.submission()) {
            (Some(review), Some(candidates), Some(submission)) => Some(ReviewView {
                page_count: submission.page_count(),
                cover_letter: candidates.text.cover_letter.clone(),
                summary: candidates.text.summary.clone(),
                ats_keywords: candidates.text.ats_keywords.clone(),
                sections: review.grouped(),
                snapshot: review.snapshot(),
            }),
            _ => None,
        };
        Self {
            id: session.id,
            created_at: session.created_at,
            phase: state.phase(),
            last_error: state.last_error().map(str::to_string),
            review,
            results: state.assets().cloned(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/sessions
pub async fn handle_create_session(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<SessionView>), AppError> {
    let session = state.sessions.create().await;
    info!("Created session {}", session.id);
    let view = SessionView::render(&session, &*session.state.lock().await);
    Ok((StatusCode::CREATED, Json(view)))
}

/// GET /api/v1/sessions/:id
pub async fn handle_get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    let session = find_session(&state, id).await?;
    let view = SessionView::render(&session, &*session.state.lock().await);
    Ok(Json(view))
}

/// DELETE /api/v1/sessions/:id
///
/// Resets by discarding everything the session holds.
pub async fn handle_delete_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if !state.sessions.remove(id).await {
        return Err(AppError::NotFound(format!("Session {id} not found")));
    }
    info!("Deleted session {id}");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/sessions/:id/generate
///
/// Multipart: `job_title`, `company_name`, `job_description` text fields and
/// one or more `page` files (PNG or JPEG), in page order. Runs phase 1.
pub async fn handle_generate(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> Result<Json<SessionView>, AppError> {
    let session = find_session(&state, id).await?;
    let submission = read_submission(multipart).await?;
    info!(
        "Session {id}: generating for {} pages",
        submission.page_count()
    );

    state
        .orchestrator
        .run_generation(Arc::clone(&session.state), Some(submission))
        .await?;

    let view = SessionView::render(&session, &*session.state.lock().await);
    Ok(Json(view))
}

/// POST /api/v1/sessions/:id/retry
///
/// Re-runs phase 1 with the input kept from the last failed attempt.
pub async fn handle_retry(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    let session = find_session(&state, id).await?;
    state
        .orchestrator
        .run_generation(Arc::clone(&session.state), None)
        .await?;
    let view = SessionView::render(&session, &*session.state.lock().await);
    Ok(Json(view))
}

/// POST /api/v1/sessions/:id/changes/:change_id/toggle
pub async fn handle_toggle_change(
    State(state): State<AppState>,
    Path((id, change_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<SessionView>, AppError> {
    let session = find_session(&state, id).await?;
    let mut guard = session.state.lock().await;
    let applied = guard.review_mut()?.toggle(ChangeId(change_id))?;
    debug!("Session {id}: change {change_id} applied={applied}");
    Ok(Json(SessionView::render(&session, &guard)))
}

/// POST /api/v1/sessions/:id/sections/bulk
pub async fn handle_bulk_section(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<BulkSectionRequest>,
) -> Result<Json<SessionView>, AppError> {
    let session = find_session(&state, id).await?;
    let mut guard = session.state.lock().await;
    let count = guard
        .review_mut()?
        .set_section(&request.section, request.apply)?;
    debug!(
        "Session {id}: section '{}' apply={} ({count} changes)",
        request.section, request.apply
    );
    Ok(Json(SessionView::render(&session, &guard)))
}

/// POST /api/v1/sessions/:id/finalize
///
/// Freezes the applied list and runs phase 2.
pub async fn handle_finalize(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    let session = find_session(&state, id).await?;
    state
        .orchestrator
        .run_finalization(Arc::clone(&session.state))
        .await?;
    let view = SessionView::render(&session, &*session.state.lock().await);
    Ok(Json(view))
}

/// GET /api/v1/sessions/:id/results
pub async fn handle_get_results(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<GeneratedAssets>, AppError> {
    let session = find_session(&state, id).await?;
    let guard = session.state.lock().await;
    let assets = guard.assets().cloned().ok_or_else(|| {
        AppError::Conflict(format!("Results are not available while {}", guard.phase()))
    })?;
    Ok(Json(assets))
}

// ────────────────────────────────────────────────────────────────────────────
// Helpers
// ────────────────────────────────────────────────────────────────────────────

async fn find_session(state: &AppState, id: Uuid) -> Result<SessionHandle, AppError> {
    state
        .sessions
        .get(id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Session {id} not found")))
}

fn multipart_error(e: MultipartError) -> AppError {
    AppError::Validation(format!("Invalid multipart body: {e}"))
}

/// Collects job details and page files. Files that are not PNG or JPEG are
/// skipped, like the upload filter on the form.
async fn read_submission(mut multipart: Multipart) -> Result<Submission, AppError> {
    let mut job = JobDetails {
        job_title: String::new(),
        company_name: String::new(),
        job_description: String::new(),
    };
    let mut pages = Vec::new();
    let mut skipped = 0usize;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "job_title" => job.job_title = field.text().await.map_err(multipart_error)?,
            "company_name" => job.company_name = field.text().await.map_err(multipart_error)?,
            "job_description" => {
                job.job_description = field.text().await.map_err(multipart_error)?
            }
            "page" => {
                // Files carry raw bytes; plain fields carry a data URI.
                let (label, parsed) = match field.file_name().map(str::to_string) {
                    Some(file_name) => {
                        let mime = field.content_type().unwrap_or_default().to_string();
                        let data = field.bytes().await.map_err(multipart_error)?;
                        (file_name, ResumePage::from_upload(&mime, &data))
                    }
                    None => {
                        let data_uri = field.text().await.map_err(multipart_error)?;
                        ("data URI".to_string(), ResumePage::parse(data_uri.trim()))
                    }
                };
                match parsed {
                    Ok(page) => {
                        debug!("Accepted page {} ({})", pages.len(), page.mime_type());
                        pages.push(page);
                    }
                    Err(e) => {
                        warn!("Skipping uploaded page '{label}': {e}");
                        skipped += 1;
                    }
                }
            }
            other => debug!("Ignoring multipart field '{other}'"),
        }
    }

    if pages.is_empty() && skipped > 0 {
        return Err(AppError::Validation(
            "No valid page images: only PNG and JPEG files are accepted".to_string(),
        ));
    }
    Submission::new(job, pages).map_err(AppError::Validation)
}
