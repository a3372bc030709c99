//! Full-tree replace: destroy and rebuild a plan's entire descendant
//! subtree from a validated draft.
//!
//! Model-proposed drafts carry no stable identifiers across regenerations,
//! so no diff/merge is attempted: the whole subtree is deleted (children
//! before parents) and re-inserted top-down in draft order. The sequence
//! is deliberately not wrapped in a transaction; a failure between steps
//! surfaces as [`EngineError::PartialApply`] and the plan keeps whatever
//! subtree the interruption left until the next generation or adjustment
//! overwrites it.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use trellis_db::queries::nodes::{self, NodeLevel};
use trellis_db::queries::plans;

use crate::draft::PlanDraft;
use crate::error::{EngineError, EngineResult};
use crate::tree::delete_subtree;

/// Whether the draft is the plan's first subtree or a revision of one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceMode {
    /// Initial generation: the plan shell has no subtree yet.
    Generation,
    /// Adjustment: the draft must have been computed against the plan's
    /// stored idea.
    Adjustment,
}

fn partial(plan_id: Uuid, stage: &'static str) -> impl FnOnce(EngineError) -> EngineError {
    move |err| match err {
        // Re-validation and consistency failures happen before any write;
        // only genuine mid-sequence failures are partial applies.
        e @ (EngineError::Validation(_) | EngineError::IdeaMismatch) => e,
        e => EngineError::PartialApply {
            plan_id,
            stage,
            source: anyhow::anyhow!(e),
        },
    }
}

/// Replace the plan's entire descendant subtree with `draft`.
///
/// The draft is re-validated here regardless of what the caller already
/// did: untrusted proposals can reach this boundary directly, and a
/// bypassed validator upstream must not become a corrupted tree.
pub async fn apply_draft(
    pool: &PgPool,
    plan_id: Uuid,
    draft: &PlanDraft,
    mode: ReplaceMode,
) -> EngineResult<()> {
    draft.validate()?;

    let plan = plans::get_plan(pool, plan_id)
        .await?
        .ok_or(EngineError::PlanNotFound(plan_id))?;

    // Consistency guard: an adjustment computed against a stale or
    // different base is rejected before anything is touched.
    if mode == ReplaceMode::Adjustment && draft.idea != plan.idea {
        return Err(EngineError::IdeaMismatch);
    }

    let at = Utc::now();

    // 1. Clear the existing subtree, children before parents.
    for outcome_id in nodes::child_ids(pool, NodeLevel::Outcome, plan.id)
        .await
        .map_err(EngineError::from)
        .map_err(partial(plan_id, "delete"))?
    {
        delete_subtree(pool, NodeLevel::Outcome, outcome_id)
            .await
            .map_err(partial(plan_id, "delete"))?;
    }

    // 2. Re-insert top-down. `ord` is the 0-based position in the draft's
    //    arrays; the draft is already in desired order, so no sorting.
    //    Every row shares one timestamp for the whole operation.
    let insert = async {
        for (o_idx, outcome_draft) in draft.outcomes.iter().enumerate() {
            let outcome = nodes::insert_outcome(
                pool,
                plan.id,
                &outcome_draft.title,
                &outcome_draft.summary,
                outcome_draft.status,
                o_idx as i32,
                at,
            )
            .await?;

            for (d_idx, deliverable_draft) in outcome_draft.deliverables.iter().enumerate() {
                let deliverable = nodes::insert_deliverable(
                    pool,
                    outcome.id,
                    &deliverable_draft.title,
                    &deliverable_draft.done_when,
                    deliverable_draft.notes.as_deref(),
                    deliverable_draft.status,
                    d_idx as i32,
                    at,
                )
                .await?;

                for (a_idx, action_draft) in deliverable_draft.actions.iter().enumerate() {
                    nodes::insert_action(
                        pool,
                        deliverable.id,
                        &action_draft.title,
                        action_draft.status,
                        a_idx as i32,
                        at,
                    )
                    .await?;
                }
            }
        }
        Ok::<_, EngineError>(())
    };
    insert.await.map_err(partial(plan_id, "insert"))?;

    // 3. Patch the plan header and bump `updated_at`.
    plans::patch_plan_after_replace(pool, plan.id, &draft.title, &draft.summary, at)
        .await
        .map_err(EngineError::from)
        .map_err(partial(plan_id, "patch"))?;

    let (outcomes, deliverables, actions) = draft.counts();
    tracing::info!(
        plan_id = %plan.id,
        outcomes,
        deliverables,
        actions,
        mode = ?mode,
        "applied full-tree replace"
    );

    Ok(())
}
