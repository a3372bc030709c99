//! Tree mutation operations: add, update, delete, and status changes for
//! outcomes, deliverables, and actions.
//!
//! Every operation verifies the caller's ownership chain first, re-fetching
//! current state at the point of mutation, and finishes by bumping the
//! plan's `updated_at` so the plan timestamp always dominates its subtree.
//! The cascade walks (subtree delete, force-done) are written once,
//! parameterized by [`NodeLevel`], instead of once per level.

pub mod order;

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use trellis_db::models::{Action, Deliverable, NodeStatus, Outcome};
use trellis_db::queries::nodes::{self, NodeLevel};
use trellis_db::queries::{adjustments, plans, threads};

use crate::error::{EngineError, EngineResult};
use crate::ownership;

// ---------------------------------------------------------------------------
// Cascade walks
// ---------------------------------------------------------------------------

/// Delete the node and everything under it, children before parents.
///
/// Sibling compaction is the caller's job; this only clears the subtree.
pub(crate) fn delete_subtree<'a>(
    pool: &'a PgPool,
    level: NodeLevel,
    node_id: Uuid,
) -> Pin<Box<dyn Future<Output = EngineResult<u64>> + Send + 'a>> {
    Box::pin(async move {
        let mut deleted = 0;
        if let Some(child) = level.child() {
            for child_id in nodes::child_ids(pool, child, node_id).await? {
                deleted += delete_subtree(pool, child, child_id).await?;
            }
        }
        deleted += nodes::delete_node(pool, level, node_id).await?;
        Ok(deleted)
    })
}

/// Force every non-done descendant of `node_id` to `done` with a shared
/// timestamp. A bounded write burst proportional to the subtree size.
async fn cascade_force_done(
    pool: &PgPool,
    level: NodeLevel,
    node_id: Uuid,
    at: DateTime<Utc>,
) -> EngineResult<u64> {
    let mut touched = 0;
    let mut frontier = vec![(level, node_id)];
    while let Some((lvl, id)) = frontier.pop() {
        if let Some(child) = lvl.child() {
            touched += nodes::force_done_children(pool, child, id, at).await?;
            for child_id in nodes::child_ids(pool, child, id).await? {
                frontier.push((child, child_id));
            }
        }
    }
    Ok(touched)
}

// ---------------------------------------------------------------------------
// Add
// ---------------------------------------------------------------------------

/// Append a new outcome to a plan.
pub async fn add_outcome(
    pool: &PgPool,
    user_id: &str,
    plan_id: Uuid,
    title: &str,
    summary: &str,
) -> EngineResult<Outcome> {
    let plan = ownership::verify_plan(pool, plan_id, user_id).await?;

    let at = Utc::now();
    let ord = order::next_ord(pool, NodeLevel::Outcome, plan.id).await?;
    let outcome =
        nodes::insert_outcome(pool, plan.id, title, summary, NodeStatus::Todo, ord, at).await?;
    plans::touch_plan(pool, plan.id, at).await?;

    Ok(outcome)
}

/// Append a new deliverable to an outcome.
pub async fn add_deliverable(
    pool: &PgPool,
    user_id: &str,
    outcome_id: Uuid,
    title: &str,
    done_when: &str,
    notes: Option<&str>,
) -> EngineResult<Deliverable> {
    let chain = ownership::verify_outcome(pool, outcome_id, user_id).await?;

    let at = Utc::now();
    let ord = order::next_ord(pool, NodeLevel::Deliverable, chain.outcome.id).await?;
    let deliverable = nodes::insert_deliverable(
        pool,
        chain.outcome.id,
        title,
        done_when,
        notes,
        NodeStatus::Todo,
        ord,
        at,
    )
    .await?;
    plans::touch_plan(pool, chain.plan.id, at).await?;

    Ok(deliverable)
}

/// Append a new action to a deliverable.
pub async fn add_action(
    pool: &PgPool,
    user_id: &str,
    deliverable_id: Uuid,
    title: &str,
) -> EngineResult<Action> {
    let chain = ownership::verify_deliverable(pool, deliverable_id, user_id).await?;

    let at = Utc::now();
    let ord = order::next_ord(pool, NodeLevel::Action, chain.deliverable.id).await?;
    let action =
        nodes::insert_action(pool, chain.deliverable.id, title, NodeStatus::Todo, ord, at).await?;
    plans::touch_plan(pool, chain.plan.id, at).await?;

    Ok(action)
}

// ---------------------------------------------------------------------------
// Update
// ---------------------------------------------------------------------------

/// Update an outcome's fields. `None` keeps the current value.
pub async fn update_outcome(
    pool: &PgPool,
    user_id: &str,
    outcome_id: Uuid,
    title: Option<&str>,
    summary: Option<&str>,
) -> EngineResult<()> {
    let chain = ownership::verify_outcome(pool, outcome_id, user_id).await?;

    let at = Utc::now();
    let rows = nodes::update_outcome(
        pool,
        chain.outcome.id,
        title.unwrap_or(&chain.outcome.title),
        summary.unwrap_or(&chain.outcome.summary),
        at,
    )
    .await?;
    if rows == 0 {
        return Err(EngineError::OutcomeNotFound(outcome_id));
    }
    plans::touch_plan(pool, chain.plan.id, at).await?;

    Ok(())
}

/// Update a deliverable's fields. `None` keeps the current value.
pub async fn update_deliverable(
    pool: &PgPool,
    user_id: &str,
    deliverable_id: Uuid,
    title: Option<&str>,
    done_when: Option<&str>,
    notes: Option<&str>,
) -> EngineResult<()> {
    let chain = ownership::verify_deliverable(pool, deliverable_id, user_id).await?;

    let at = Utc::now();
    let rows = nodes::update_deliverable(
        pool,
        chain.deliverable.id,
        title.unwrap_or(&chain.deliverable.title),
        done_when.unwrap_or(&chain.deliverable.done_when),
        notes.or(chain.deliverable.notes.as_deref()),
        at,
    )
    .await?;
    if rows == 0 {
        return Err(EngineError::DeliverableNotFound(deliverable_id));
    }
    plans::touch_plan(pool, chain.plan.id, at).await?;

    Ok(())
}

/// Update an action's title.
pub async fn update_action(
    pool: &PgPool,
    user_id: &str,
    action_id: Uuid,
    title: &str,
) -> EngineResult<()> {
    let chain = ownership::verify_action(pool, action_id, user_id).await?;

    let at = Utc::now();
    let rows = nodes::update_action(pool, chain.action.id, title, at).await?;
    if rows == 0 {
        return Err(EngineError::ActionNotFound(action_id));
    }
    plans::touch_plan(pool, chain.plan.id, at).await?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Set an outcome's status. `done` force-completes every descendant with
/// the same timestamp.
pub async fn set_outcome_status(
    pool: &PgPool,
    user_id: &str,
    outcome_id: Uuid,
    status: NodeStatus,
) -> EngineResult<()> {
    let chain = ownership::verify_outcome(pool, outcome_id, user_id).await?;

    let at = Utc::now();
    let rows = nodes::set_node_status(pool, NodeLevel::Outcome, chain.outcome.id, status, at).await?;
    if rows == 0 {
        return Err(EngineError::OutcomeNotFound(outcome_id));
    }
    if status == NodeStatus::Done {
        cascade_force_done(pool, NodeLevel::Outcome, chain.outcome.id, at).await?;
    }
    plans::touch_plan(pool, chain.plan.id, at).await?;

    Ok(())
}

/// Set a deliverable's status. `done` force-completes its actions.
pub async fn set_deliverable_status(
    pool: &PgPool,
    user_id: &str,
    deliverable_id: Uuid,
    status: NodeStatus,
) -> EngineResult<()> {
    let chain = ownership::verify_deliverable(pool, deliverable_id, user_id).await?;

    let at = Utc::now();
    let rows =
        nodes::set_node_status(pool, NodeLevel::Deliverable, chain.deliverable.id, status, at)
            .await?;
    if rows == 0 {
        return Err(EngineError::DeliverableNotFound(deliverable_id));
    }
    if status == NodeStatus::Done {
        cascade_force_done(pool, NodeLevel::Deliverable, chain.deliverable.id, at).await?;
    }
    plans::touch_plan(pool, chain.plan.id, at).await?;

    Ok(())
}

/// Set an action's status.
pub async fn set_action_status(
    pool: &PgPool,
    user_id: &str,
    action_id: Uuid,
    status: NodeStatus,
) -> EngineResult<()> {
    let chain = ownership::verify_action(pool, action_id, user_id).await?;

    let at = Utc::now();
    let rows = nodes::set_node_status(pool, NodeLevel::Action, chain.action.id, status, at).await?;
    if rows == 0 {
        return Err(EngineError::ActionNotFound(action_id));
    }
    plans::touch_plan(pool, chain.plan.id, at).await?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Delete
// ---------------------------------------------------------------------------

/// Delete an outcome and its whole subtree, then compact the plan's
/// remaining outcomes.
pub async fn delete_outcome(pool: &PgPool, user_id: &str, outcome_id: Uuid) -> EngineResult<()> {
    let chain = ownership::verify_outcome(pool, outcome_id, user_id).await?;

    let at = Utc::now();
    delete_subtree(pool, NodeLevel::Outcome, chain.outcome.id).await?;
    order::compact(pool, NodeLevel::Outcome, chain.plan.id, at).await?;
    plans::touch_plan(pool, chain.plan.id, at).await?;

    Ok(())
}

/// Delete a deliverable and its actions, then compact the outcome's
/// remaining deliverables.
pub async fn delete_deliverable(
    pool: &PgPool,
    user_id: &str,
    deliverable_id: Uuid,
) -> EngineResult<()> {
    let chain = ownership::verify_deliverable(pool, deliverable_id, user_id).await?;

    let at = Utc::now();
    delete_subtree(pool, NodeLevel::Deliverable, chain.deliverable.id).await?;
    order::compact(pool, NodeLevel::Deliverable, chain.outcome.id, at).await?;
    plans::touch_plan(pool, chain.plan.id, at).await?;

    Ok(())
}

/// Delete an action, then compact the deliverable's remaining actions.
pub async fn delete_action(pool: &PgPool, user_id: &str, action_id: Uuid) -> EngineResult<()> {
    let chain = ownership::verify_action(pool, action_id, user_id).await?;

    let at = Utc::now();
    delete_subtree(pool, NodeLevel::Action, chain.action.id).await?;
    order::compact(pool, NodeLevel::Action, chain.deliverable.id, at).await?;
    plans::touch_plan(pool, chain.plan.id, at).await?;

    Ok(())
}

/// Delete a plan and everything attached to it: the full subtree
/// (children before parents), its conversation thread, and its adjustment
/// history. No soft-delete.
pub async fn delete_plan(pool: &PgPool, user_id: &str, plan_id: Uuid) -> EngineResult<()> {
    let plan = ownership::verify_plan(pool, plan_id, user_id).await?;

    for outcome_id in nodes::child_ids(pool, NodeLevel::Outcome, plan.id).await? {
        delete_subtree(pool, NodeLevel::Outcome, outcome_id).await?;
    }
    threads::delete_thread(pool, plan.id).await?;
    adjustments::delete_events_for_plan(pool, plan.id).await?;
    let rows = plans::delete_plan_row(pool, plan.id).await?;
    if rows == 0 {
        return Err(EngineError::PlanNotFound(plan_id));
    }

    tracing::info!(plan_id = %plan.id, "plan deleted");
    Ok(())
}
