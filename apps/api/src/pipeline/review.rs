//! Change Review State: the candidate change list plus the user's accept/reject
//! flags. Pure and synchronous; every derived value is recomputed on read.

use std::collections::BTreeSet;

use serde::Serialize;
use thiserror::Error;

use crate::models::{ChangeDetail, ChangeId};

/// Image generation cost estimate per affected page, in USD.
pub const COST_PER_PAGE_USD: f64 = 0.025;
const CHARS_PER_TOKEN: f64 = 4.0;

#[derive(Debug, Error, PartialEq)]
pub enum ReviewError {
    #[error("Change {0} does not exist")]
    UnknownChange(ChangeId),

    #[error("Section '{0}' has no changes")]
    UnknownSection(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChangeReviewState {
    candidates: Vec<ChangeDetail>,
    /// Aligned with `candidates`.
    applied: Vec<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewedChange {
    #[serde(flatten)]
    pub change: ChangeDetail,
    pub applied: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionGroup {
    pub section: String,
    pub changes: Vec<ReviewedChange>,
}

/// Derived read of the current decisions.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewSnapshot {
    pub applied_changes: Vec<ChangeDetail>,
    pub applied_count: usize,
    pub total_count: usize,
    pub affected_page_count: usize,
    pub approx_input_tokens: u64,
    pub estimated_cost_usd: f64,
}

impl ChangeReviewState {
    /// Every candidate starts out applied.
    pub fn new(candidates: Vec<ChangeDetail>) -> Self {
        let applied = vec![true; candidates.len()];
        Self {
            candidates,
            applied,
        }
    }

    pub fn candidates(&self) -> &[ChangeDetail] {
        &self.candidates
    }

    pub fn is_applied(&self, id: ChangeId) -> Result<bool, ReviewError> {
        self.position(id).map(|i| self.applied[i])
    }

    /// Flips one change and returns its new flag.
    pub fn toggle(&mut self, id: ChangeId) -> Result<bool, ReviewError> {
        let i = self.position(id)?;
        self.applied[i] = !self.applied[i];
        Ok(self.applied[i])
    }

    /// Bulk accept or reject every change in `section`. Returns how many changes it covers.
    pub fn set_section(&mut self, section: &str, apply: bool) -> Result<usize, ReviewError> {
        let mut matched = 0;
        for (change, flag) in self.candidates.iter().zip(self.applied.iter_mut()) {
            if change.section == section {
                *flag = apply;
                matched += 1;
            }
        }
        if matched == 0 {
            return Err(ReviewError::UnknownSection(section.to_string()));
        }
        Ok(matched)
    }

    /// Applied subset in candidate order.
    pub fn applied_changes(&self) -> Vec<ChangeDetail> {
        self.candidates
            .iter()
            .zip(&self.applied)
            .filter(|(_, applied)| **applied)
            .map(|(change, _)| change.clone())
            .collect()
    }

    pub fn snapshot(&self) -> ReviewSnapshot {
        let applied_changes = self.applied_changes();
        let affected_page_count = applied_changes
            .iter()
            .map(|c| c.page_index)
            .collect::<BTreeSet<_>>()
            .len();
        let chars: usize = applied_changes
            .iter()
            .map(|c| c.new_text.chars().count())
            .sum();

        ReviewSnapshot {
            applied_count: applied_changes.len(),
            total_count: self.candidates.len(),
            affected_page_count,
            approx_input_tokens: (chars as f64 / CHARS_PER_TOKEN).round() as u64,
            estimated_cost_usd: affected_page_count as f64 * COST_PER_PAGE_USD,
            applied_changes,
        }
    }

    /// Section names in first-seen order.
    pub fn sections(&self) -> Vec<String> {
        let mut sections: Vec<String> = Vec::new();
        for change in &self.candidates {
            if !sections.contains(&change.section) {
                sections.push(change.section.clone());
            }
        }
        sections
    }

    pub fn grouped(&self) -> Vec<SectionGroup> {
        self.sections()
            .into_iter()
            .map(|section| {
                let changes = self
                    .candidates
                    .iter()
                    .zip(&self.applied)
                    .filter(|(change, _)| change.section == section)
                    .map(|(change, applied)| ReviewedChange {
                        change: change.clone(),
                        applied: *applied,
                    })
                    .collect();
                SectionGroup { section, changes }
            })
            .collect()
    }

    fn position(&self, id: ChangeId) -> Result<usize, ReviewError> {
        self.candidates
            .iter()
            .position(|c| c.id == id)
            .ok_or(ReviewError::UnknownChange(id))
    }
}
