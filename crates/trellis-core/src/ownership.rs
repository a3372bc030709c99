//! Ownership chain verification.
//!
//! Every read and mutation in the engine is gated by one of these checks.
//! The walk goes one parent fetch per level, failing with the most
//! specific not-found error the moment an ancestor is missing, and with
//! `AccessDenied` only at the top once the plan's owner is known not to
//! match. The full chain is returned on success so callers reuse the
//! fetched parents instead of re-querying.

use sqlx::PgPool;
use uuid::Uuid;

use trellis_db::models::{Action, Deliverable, Outcome, Plan};
use trellis_db::queries::{nodes, plans};

use crate::error::{EngineError, EngineResult};

/// Ancestors of an outcome, root first.
#[derive(Debug, Clone)]
pub struct OutcomeChain {
    pub plan: Plan,
    pub outcome: Outcome,
}

/// Ancestors of a deliverable, root first.
#[derive(Debug, Clone)]
pub struct DeliverableChain {
    pub plan: Plan,
    pub outcome: Outcome,
    pub deliverable: Deliverable,
}

/// Ancestors of an action, root first.
#[derive(Debug, Clone)]
pub struct ActionChain {
    pub plan: Plan,
    pub outcome: Outcome,
    pub deliverable: Deliverable,
    pub action: Action,
}

fn check_owner(plan: Plan, user_id: &str) -> EngineResult<Plan> {
    if plan.user_id != user_id {
        return Err(EngineError::AccessDenied);
    }
    Ok(plan)
}

/// Verify that `plan_id` exists and is owned by `user_id`.
pub async fn verify_plan(pool: &PgPool, plan_id: Uuid, user_id: &str) -> EngineResult<Plan> {
    let plan = plans::get_plan(pool, plan_id)
        .await?
        .ok_or(EngineError::PlanNotFound(plan_id))?;
    check_owner(plan, user_id)
}

/// Verify an outcome's chain up to its owning plan.
pub async fn verify_outcome(
    pool: &PgPool,
    outcome_id: Uuid,
    user_id: &str,
) -> EngineResult<OutcomeChain> {
    let outcome = nodes::get_outcome(pool, outcome_id)
        .await?
        .ok_or(EngineError::OutcomeNotFound(outcome_id))?;
    let plan = plans::get_plan(pool, outcome.plan_id)
        .await?
        .ok_or(EngineError::PlanNotFound(outcome.plan_id))?;
    let plan = check_owner(plan, user_id)?;
    Ok(OutcomeChain { plan, outcome })
}

/// Verify a deliverable's chain up to its owning plan.
pub async fn verify_deliverable(
    pool: &PgPool,
    deliverable_id: Uuid,
    user_id: &str,
) -> EngineResult<DeliverableChain> {
    let deliverable = nodes::get_deliverable(pool, deliverable_id)
        .await?
        .ok_or(EngineError::DeliverableNotFound(deliverable_id))?;
    let outcome = nodes::get_outcome(pool, deliverable.outcome_id)
        .await?
        .ok_or(EngineError::OutcomeNotFound(deliverable.outcome_id))?;
    let plan = plans::get_plan(pool, outcome.plan_id)
        .await?
        .ok_or(EngineError::PlanNotFound(outcome.plan_id))?;
    let plan = check_owner(plan, user_id)?;
    Ok(DeliverableChain {
        plan,
        outcome,
        deliverable,
    })
}

/// Verify an action's chain up to its owning plan.
pub async fn verify_action(
    pool: &PgPool,
    action_id: Uuid,
    user_id: &str,
) -> EngineResult<ActionChain> {
    let action = nodes::get_action(pool, action_id)
        .await?
        .ok_or(EngineError::ActionNotFound(action_id))?;
    let deliverable = nodes::get_deliverable(pool, action.deliverable_id)
        .await?
        .ok_or(EngineError::DeliverableNotFound(action.deliverable_id))?;
    let outcome = nodes::get_outcome(pool, deliverable.outcome_id)
        .await?
        .ok_or(EngineError::OutcomeNotFound(deliverable.outcome_id))?;
    let plan = plans::get_plan(pool, outcome.plan_id)
        .await?
        .ok_or(EngineError::PlanNotFound(outcome.plan_id))?;
    let plan = check_owner(plan, user_id)?;
    Ok(ActionChain {
        plan,
        outcome,
        deliverable,
        action,
    })
}
