use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The target role a resume is tailored for. Immutable once submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDetails {
    pub job_title: String,
    pub company_name: String,
    pub job_description: String,
}

impl JobDetails {
    /// All three fields are required free text.
    pub fn validate(&self) -> Result<(), String> {
        for (field, value) in [
            ("jobTitle", &self.job_title),
            ("companyName", &self.company_name),
            ("jobDescription", &self.job_description),
        ] {
            if value.trim().is_empty() {
                return Err(format!("{field} cannot be empty"));
            }
        }
        Ok(())
    }

    /// `<Company>_<Title>_<suffix>.pdf`, whitespace replaced by underscores.
    pub fn download_file_name(&self, suffix: &str) -> String {
        format!("{}_{}_{suffix}.pdf", self.company_name, self.job_title)
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("_")
    }
}

/// Stable identifier assigned to a candidate change when it is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeId(pub Uuid);

impl ChangeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ChangeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ChangeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A single proposed edit. Empty `original_text` means a pure addition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeDetail {
    pub id: ChangeId,
    pub section: String,
    pub summary: String,
    pub original_text: String,
    pub new_text: String,
    pub page_index: usize,
}

impl ChangeDetail {
    pub fn is_addition(&self) -> bool {
        self.original_text.trim().is_empty()
    }
}

/// Candidate-phase output of the text-asset generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextGenerationResult {
    pub cover_letter: String,
    pub summary: String,
    pub changes: Vec<ChangeDetail>,
    pub ats_keywords: Vec<String>,
}

/// Terminal artifact of the finalize phase. Both vectors are page-aligned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalAssetsResult {
    pub final_images: Vec<String>,
    pub final_texts: Vec<String>,
}

/// The bundle presented once both phases have completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedAssets {
    pub tailored_resume_images: Vec<String>,
    pub cover_letter: String,
    pub summary: String,
    pub original_resume_text: String,
    pub rewritten_resume_text: Vec<String>,
    pub applied_changes: Vec<ChangeDetail>,
    pub ats_keywords: Vec<String>,
    pub resume_file_name: String,
    pub cover_letter_file_name: String,
}
