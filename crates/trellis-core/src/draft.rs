//! The model-proposed plan draft: serde types, structural bounds, and
//! validation.
//!
//! Drafts cross a trust boundary (they arrive as free-form model output),
//! so [`PlanDraft::validate`] is called both when a draft is first parsed
//! and again inside the full-tree replace, even when the caller claims to
//! have validated already.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use trellis_db::models::NodeStatus;

/// Maximum number of outcomes in a plan.
pub const MAX_OUTCOMES: usize = 8;
/// Maximum number of deliverables per outcome.
pub const MAX_DELIVERABLES: usize = 8;
/// Maximum number of actions per deliverable.
pub const MAX_ACTIONS: usize = 12;
/// Maximum length of any title, in characters.
pub const MAX_TITLE_LEN: usize = 200;
/// Maximum length of summaries and notes, in characters.
pub const MAX_TEXT_LEN: usize = 2000;
/// Maximum length of a deliverable's acceptance sentence, in characters.
pub const MAX_DONE_WHEN_LEN: usize = 500;
/// Maximum length of the original idea, in characters.
pub const MAX_IDEA_LEN: usize = 4000;

/// Errors from parsing or validating a plan draft.
#[derive(Debug, Error)]
pub enum DraftError {
    #[error("draft JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("draft output contains no JSON object")]
    NoJsonObject,

    #[error("{field} must not be empty")]
    EmptyField { field: &'static str },

    #[error("{field} exceeds {max} characters (got {len})")]
    TooLong {
        field: &'static str,
        max: usize,
        len: usize,
    },

    #[error("draft must contain at least one outcome")]
    NoOutcomes,

    #[error("draft has {count} outcomes (maximum {MAX_OUTCOMES})")]
    TooManyOutcomes { count: usize },

    #[error("outcome {outcome:?} must contain at least one deliverable")]
    NoDeliverables { outcome: String },

    #[error("outcome {outcome:?} has {count} deliverables (maximum {MAX_DELIVERABLES})")]
    TooManyDeliverables { outcome: String, count: usize },

    #[error("deliverable {deliverable:?} has {count} actions (maximum {MAX_ACTIONS})")]
    TooManyActions { deliverable: String, count: usize },
}

/// A complete plan proposal, ordered as it should be stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanDraft {
    /// Echo of the original idea; checked against the stored plan on
    /// adjustment so a proposal computed against a different base is
    /// rejected.
    pub idea: String,
    pub title: String,
    pub summary: String,
    pub outcomes: Vec<OutcomeDraft>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeDraft {
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default = "default_status")]
    pub status: NodeStatus,
    pub deliverables: Vec<DeliverableDraft>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliverableDraft {
    pub title: String,
    pub done_when: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default = "default_status")]
    pub status: NodeStatus,
    #[serde(default)]
    pub actions: Vec<ActionDraft>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionDraft {
    pub title: String,
    #[serde(default = "default_status")]
    pub status: NodeStatus,
}

fn default_status() -> NodeStatus {
    NodeStatus::Todo
}

fn check_text(field: &'static str, value: &str, max: usize) -> Result<(), DraftError> {
    let len = value.chars().count();
    if len > max {
        return Err(DraftError::TooLong { field, max, len });
    }
    Ok(())
}

fn check_title(field: &'static str, value: &str) -> Result<(), DraftError> {
    if value.trim().is_empty() {
        return Err(DraftError::EmptyField { field });
    }
    check_text(field, value, MAX_TITLE_LEN)
}

impl PlanDraft {
    /// Validate structural bounds: counts per level, string lengths, and
    /// non-empty titles.
    pub fn validate(&self) -> Result<(), DraftError> {
        if self.idea.trim().is_empty() {
            return Err(DraftError::EmptyField { field: "idea" });
        }
        check_text("idea", &self.idea, MAX_IDEA_LEN)?;
        check_title("plan title", &self.title)?;
        check_text("plan summary", &self.summary, MAX_TEXT_LEN)?;

        if self.outcomes.is_empty() {
            return Err(DraftError::NoOutcomes);
        }
        if self.outcomes.len() > MAX_OUTCOMES {
            return Err(DraftError::TooManyOutcomes {
                count: self.outcomes.len(),
            });
        }

        for outcome in &self.outcomes {
            check_title("outcome title", &outcome.title)?;
            check_text("outcome summary", &outcome.summary, MAX_TEXT_LEN)?;

            if outcome.deliverables.is_empty() {
                return Err(DraftError::NoDeliverables {
                    outcome: outcome.title.clone(),
                });
            }
            if outcome.deliverables.len() > MAX_DELIVERABLES {
                return Err(DraftError::TooManyDeliverables {
                    outcome: outcome.title.clone(),
                    count: outcome.deliverables.len(),
                });
            }

            for deliverable in &outcome.deliverables {
                check_title("deliverable title", &deliverable.title)?;
                if deliverable.done_when.trim().is_empty() {
                    return Err(DraftError::EmptyField {
                        field: "deliverable done_when",
                    });
                }
                check_text(
                    "deliverable done_when",
                    &deliverable.done_when,
                    MAX_DONE_WHEN_LEN,
                )?;
                if let Some(notes) = &deliverable.notes {
                    check_text("deliverable notes", notes, MAX_TEXT_LEN)?;
                }
                if deliverable.actions.len() > MAX_ACTIONS {
                    return Err(DraftError::TooManyActions {
                        deliverable: deliverable.title.clone(),
                        count: deliverable.actions.len(),
                    });
                }
                for action in &deliverable.actions {
                    check_title("action title", &action.title)?;
                }
            }
        }

        Ok(())
    }

    /// Total node counts: `(outcomes, deliverables, actions)`.
    pub fn counts(&self) -> (usize, usize, usize) {
        let deliverables: usize = self.outcomes.iter().map(|o| o.deliverables.len()).sum();
        let actions: usize = self
            .outcomes
            .iter()
            .flat_map(|o| o.deliverables.iter())
            .map(|d| d.actions.len())
            .sum();
        (self.outcomes.len(), deliverables, actions)
    }
}

/// Parse and validate a draft from a JSON string.
pub fn parse_draft(json: &str) -> Result<PlanDraft, DraftError> {
    let draft: PlanDraft = serde_json::from_str(json)?;
    draft.validate()?;
    Ok(draft)
}

/// Extract the outermost JSON object from raw model output.
///
/// Models wrap the draft in prose or code fences often enough that taking
/// the span from the first `{` to the last `}` is the reliable move; the
/// parse that follows rejects anything that was not actually JSON.
pub fn extract_json_object(output: &str) -> Result<&str, DraftError> {
    let start = output.find('{').ok_or(DraftError::NoJsonObject)?;
    let end = output.rfind('}').ok_or(DraftError::NoJsonObject)?;
    if end < start {
        return Err(DraftError::NoJsonObject);
    }
    Ok(&output[start..=end])
}
