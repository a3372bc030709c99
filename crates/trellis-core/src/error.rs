//! The engine's error taxonomy.
//!
//! Not-found errors carry the most specific level at which the ownership
//! chain broke; `AccessDenied` is only produced once the owning plan has
//! been reached and its owner is known not to match.

use uuid::Uuid;

use crate::draft::DraftError;

/// Errors surfaced by the plan-consistency engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("authentication required")]
    Unauthenticated,

    #[error("access denied")]
    AccessDenied,

    #[error("plan {0} not found")]
    PlanNotFound(Uuid),

    #[error("outcome {0} not found")]
    OutcomeNotFound(Uuid),

    #[error("deliverable {0} not found")]
    DeliverableNotFound(Uuid),

    #[error("action {0} not found")]
    ActionNotFound(Uuid),

    #[error(transparent)]
    Validation(#[from] DraftError),

    #[error("adjustment draft idea does not match the plan's stored idea")]
    IdeaMismatch,

    #[error("model service failure: {0}")]
    Upstream(String),

    #[error("full-tree replace interrupted during {stage} for plan {plan_id}")]
    PartialApply {
        plan_id: Uuid,
        stage: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl EngineError {
    /// True for any level-specific not-found variant.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::PlanNotFound(_)
                | Self::OutcomeNotFound(_)
                | Self::DeliverableNotFound(_)
                | Self::ActionNotFound(_)
        )
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
