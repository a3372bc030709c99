//! Read-only resolvers: "what do I do next" and the full nested tree.
//!
//! Both are pure reads gated by ownership verification; neither ever
//! mutates `ord` or `status`.

use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use trellis_db::models::{Action, Deliverable, NodeStatus, Outcome, Plan};
use trellis_db::queries::nodes;

use crate::error::EngineResult;
use crate::ownership;

/// The first actionable deliverable with its open actions.
#[derive(Debug, Clone, Serialize)]
pub struct PendingDeliverable {
    #[serde(flatten)]
    pub deliverable: Deliverable,
    pub actions: Vec<Action>,
}

/// Result of the pending-work resolution.
#[derive(Debug, Clone, Serialize)]
pub struct PendingWork {
    /// True when every outcome is done.
    pub done: bool,
    pub outcome: Option<Outcome>,
    /// Zero or one entries: the first non-done deliverable of the first
    /// non-done outcome, with its non-done actions.
    pub deliverables: Vec<PendingDeliverable>,
    /// Compact line-oriented rendering of the same result.
    pub summary_lines: Vec<String>,
}

/// One deliverable with all of its actions, unfiltered.
#[derive(Debug, Clone, Serialize)]
pub struct DeliverableDetail {
    #[serde(flatten)]
    pub deliverable: Deliverable,
    pub actions: Vec<Action>,
}

/// One outcome with all of its deliverables, unfiltered.
#[derive(Debug, Clone, Serialize)]
pub struct OutcomeDetail {
    #[serde(flatten)]
    pub outcome: Outcome,
    pub deliverables: Vec<DeliverableDetail>,
}

/// The full nested hierarchy of a plan.
#[derive(Debug, Clone, Serialize)]
pub struct PlanDetails {
    #[serde(flatten)]
    pub plan: Plan,
    pub outcomes: Vec<OutcomeDetail>,
}

/// Locate the next actionable step via bounded greedy descent.
///
/// First non-done outcome by `ord`; within it the first non-done
/// deliverable; within that, all non-done actions. Not an exhaustive
/// search: a later outcome with open work is never considered while an
/// earlier one is unfinished.
pub async fn resolve_pending_work(
    pool: &PgPool,
    user_id: &str,
    plan_id: Uuid,
) -> EngineResult<PendingWork> {
    let plan = ownership::verify_plan(pool, plan_id, user_id).await?;

    let outcomes = nodes::list_outcomes(pool, plan.id).await?;
    let Some(outcome) = outcomes
        .into_iter()
        .find(|o| o.status != NodeStatus::Done)
    else {
        return Ok(PendingWork {
            done: true,
            outcome: None,
            deliverables: vec![],
            summary_lines: vec![format!("Plan: {}", plan.title), "All outcomes are done.".to_string()],
        });
    };

    let deliverables = nodes::list_deliverables(pool, outcome.id).await?;
    let Some(deliverable) = deliverables
        .into_iter()
        .find(|d| d.status != NodeStatus::Done)
    else {
        return Ok(PendingWork {
            done: false,
            summary_lines: vec![
                format!("Plan: {}", plan.title),
                format!("Outcome: {}", outcome.title),
                "No actionable deliverable in this outcome.".to_string(),
            ],
            outcome: Some(outcome),
            deliverables: vec![],
        });
    };

    let actions: Vec<Action> = nodes::list_actions(pool, deliverable.id)
        .await?
        .into_iter()
        .filter(|a| a.status != NodeStatus::Done)
        .collect();

    let mut summary_lines = vec![
        format!("Plan: {}", plan.title),
        format!("Outcome: {}", outcome.title),
        format!("Deliverable: {}", deliverable.title),
        format!("Done when: {}", deliverable.done_when),
    ];
    if let Some(notes) = &deliverable.notes {
        summary_lines.push(format!("Notes: {notes}"));
    }
    if actions.is_empty() {
        summary_lines.push("No open actions recorded.".to_string());
    } else {
        summary_lines.push("Next actions:".to_string());
        for action in &actions {
            summary_lines.push(format!("  - {}", action.title));
        }
    }

    Ok(PendingWork {
        done: false,
        outcome: Some(outcome),
        deliverables: vec![PendingDeliverable {
            deliverable,
            actions,
        }],
        summary_lines,
    })
}

/// Flatten the whole hierarchy into one nested read-only structure, each
/// level in stored order, nothing filtered. Used for export/preview and
/// the external read API.
pub async fn resolve_plan_details(
    pool: &PgPool,
    user_id: &str,
    plan_id: Uuid,
) -> EngineResult<PlanDetails> {
    let plan = ownership::verify_plan(pool, plan_id, user_id).await?;

    let mut outcomes = Vec::new();
    for outcome in nodes::list_outcomes(pool, plan.id).await? {
        let mut deliverables = Vec::new();
        for deliverable in nodes::list_deliverables(pool, outcome.id).await? {
            let actions = nodes::list_actions(pool, deliverable.id).await?;
            deliverables.push(DeliverableDetail {
                deliverable,
                actions,
            });
        }
        outcomes.push(OutcomeDetail {
            outcome,
            deliverables,
        });
    }

    Ok(PlanDetails { plan, outcomes })
}
