//! Database query functions for the `outcomes`, `deliverables`, and
//! `actions` tables.
//!
//! The three tables share a common shape (parent reference, `status`,
//! dense `ord`), so the ordering and cascade queries are written once,
//! parameterized by [`NodeLevel`]. Identifiers come from the enum, never
//! from callers, so the `format!` queries stay injection-safe.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Action, Deliverable, NodeStatus, Outcome};

/// One tier of the plan tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeLevel {
    Outcome,
    Deliverable,
    Action,
}

impl NodeLevel {
    /// Table holding rows of this level.
    pub fn table(self) -> &'static str {
        match self {
            Self::Outcome => "outcomes",
            Self::Deliverable => "deliverables",
            Self::Action => "actions",
        }
    }

    /// Column referencing the parent's ID.
    pub fn parent_column(self) -> &'static str {
        match self {
            Self::Outcome => "plan_id",
            Self::Deliverable => "outcome_id",
            Self::Action => "deliverable_id",
        }
    }

    /// The level one step down, if any.
    pub fn child(self) -> Option<Self> {
        match self {
            Self::Outcome => Some(Self::Deliverable),
            Self::Deliverable => Some(Self::Action),
            Self::Action => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Typed per-level queries
// ---------------------------------------------------------------------------

/// Insert an outcome at an explicit position with explicit timestamps.
pub async fn insert_outcome(
    pool: &PgPool,
    plan_id: Uuid,
    title: &str,
    summary: &str,
    status: NodeStatus,
    ord: i32,
    at: DateTime<Utc>,
) -> Result<Outcome> {
    let outcome = sqlx::query_as::<_, Outcome>(
        "INSERT INTO outcomes (plan_id, title, summary, status, ord, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $6) \
         RETURNING *",
    )
    .bind(plan_id)
    .bind(title)
    .bind(summary)
    .bind(status)
    .bind(ord)
    .bind(at)
    .fetch_one(pool)
    .await
    .context("failed to insert outcome")?;

    Ok(outcome)
}

/// Insert a deliverable at an explicit position with explicit timestamps.
#[allow(clippy::too_many_arguments)]
pub async fn insert_deliverable(
    pool: &PgPool,
    outcome_id: Uuid,
    title: &str,
    done_when: &str,
    notes: Option<&str>,
    status: NodeStatus,
    ord: i32,
    at: DateTime<Utc>,
) -> Result<Deliverable> {
    let deliverable = sqlx::query_as::<_, Deliverable>(
        "INSERT INTO deliverables \
             (outcome_id, title, done_when, notes, status, ord, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $7) \
         RETURNING *",
    )
    .bind(outcome_id)
    .bind(title)
    .bind(done_when)
    .bind(notes)
    .bind(status)
    .bind(ord)
    .bind(at)
    .fetch_one(pool)
    .await
    .context("failed to insert deliverable")?;

    Ok(deliverable)
}

/// Insert an action at an explicit position with explicit timestamps.
pub async fn insert_action(
    pool: &PgPool,
    deliverable_id: Uuid,
    title: &str,
    status: NodeStatus,
    ord: i32,
    at: DateTime<Utc>,
) -> Result<Action> {
    let action = sqlx::query_as::<_, Action>(
        "INSERT INTO actions (deliverable_id, title, status, ord, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $5) \
         RETURNING *",
    )
    .bind(deliverable_id)
    .bind(title)
    .bind(status)
    .bind(ord)
    .bind(at)
    .fetch_one(pool)
    .await
    .context("failed to insert action")?;

    Ok(action)
}

/// Fetch a single outcome by ID.
pub async fn get_outcome(pool: &PgPool, id: Uuid) -> Result<Option<Outcome>> {
    let outcome = sqlx::query_as::<_, Outcome>("SELECT * FROM outcomes WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch outcome")?;

    Ok(outcome)
}

/// Fetch a single deliverable by ID.
pub async fn get_deliverable(pool: &PgPool, id: Uuid) -> Result<Option<Deliverable>> {
    let deliverable = sqlx::query_as::<_, Deliverable>("SELECT * FROM deliverables WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch deliverable")?;

    Ok(deliverable)
}

/// Fetch a single action by ID.
pub async fn get_action(pool: &PgPool, id: Uuid) -> Result<Option<Action>> {
    let action = sqlx::query_as::<_, Action>("SELECT * FROM actions WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch action")?;

    Ok(action)
}

/// List a plan's outcomes in stored order.
pub async fn list_outcomes(pool: &PgPool, plan_id: Uuid) -> Result<Vec<Outcome>> {
    let outcomes = sqlx::query_as::<_, Outcome>(
        "SELECT * FROM outcomes WHERE plan_id = $1 ORDER BY ord ASC",
    )
    .bind(plan_id)
    .fetch_all(pool)
    .await
    .context("failed to list outcomes")?;

    Ok(outcomes)
}

/// List an outcome's deliverables in stored order.
pub async fn list_deliverables(pool: &PgPool, outcome_id: Uuid) -> Result<Vec<Deliverable>> {
    let deliverables = sqlx::query_as::<_, Deliverable>(
        "SELECT * FROM deliverables WHERE outcome_id = $1 ORDER BY ord ASC",
    )
    .bind(outcome_id)
    .fetch_all(pool)
    .await
    .context("failed to list deliverables")?;

    Ok(deliverables)
}

/// List a deliverable's actions in stored order.
pub async fn list_actions(pool: &PgPool, deliverable_id: Uuid) -> Result<Vec<Action>> {
    let actions = sqlx::query_as::<_, Action>(
        "SELECT * FROM actions WHERE deliverable_id = $1 ORDER BY ord ASC",
    )
    .bind(deliverable_id)
    .fetch_all(pool)
    .await
    .context("failed to list actions")?;

    Ok(actions)
}

/// Update an outcome's editable fields.
pub async fn update_outcome(
    pool: &PgPool,
    id: Uuid,
    title: &str,
    summary: &str,
    at: DateTime<Utc>,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE outcomes SET title = $1, summary = $2, updated_at = $3 WHERE id = $4",
    )
    .bind(title)
    .bind(summary)
    .bind(at)
    .bind(id)
    .execute(pool)
    .await
    .context("failed to update outcome")?;

    Ok(result.rows_affected())
}

/// Update a deliverable's editable fields.
pub async fn update_deliverable(
    pool: &PgPool,
    id: Uuid,
    title: &str,
    done_when: &str,
    notes: Option<&str>,
    at: DateTime<Utc>,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE deliverables \
         SET title = $1, done_when = $2, notes = $3, updated_at = $4 \
         WHERE id = $5",
    )
    .bind(title)
    .bind(done_when)
    .bind(notes)
    .bind(at)
    .bind(id)
    .execute(pool)
    .await
    .context("failed to update deliverable")?;

    Ok(result.rows_affected())
}

/// Update an action's editable fields.
pub async fn update_action(pool: &PgPool, id: Uuid, title: &str, at: DateTime<Utc>) -> Result<u64> {
    let result = sqlx::query("UPDATE actions SET title = $1, updated_at = $2 WHERE id = $3")
        .bind(title)
        .bind(at)
        .bind(id)
        .execute(pool)
        .await
        .context("failed to update action")?;

    Ok(result.rows_affected())
}

// ---------------------------------------------------------------------------
// Level-parameterized queries (ordering + cascades)
// ---------------------------------------------------------------------------

/// Maximum `ord` among the children of `parent_id`, or `None` with no
/// children.
pub async fn max_sibling_ord(
    pool: &PgPool,
    level: NodeLevel,
    parent_id: Uuid,
) -> Result<Option<i32>> {
    let query = format!(
        "SELECT MAX(ord) FROM {} WHERE {} = $1",
        level.table(),
        level.parent_column()
    );
    let row: (Option<i32>,) = sqlx::query_as(&query)
        .bind(parent_id)
        .fetch_one(pool)
        .await
        .with_context(|| format!("failed to get max ord in {}", level.table()))?;

    Ok(row.0)
}

/// IDs and stored `ord` values of the children of `parent_id`, sorted by
/// `ord` (ties broken by `created_at` so compaction is deterministic).
pub async fn sibling_ords(
    pool: &PgPool,
    level: NodeLevel,
    parent_id: Uuid,
) -> Result<Vec<(Uuid, i32)>> {
    let query = format!(
        "SELECT id, ord FROM {} WHERE {} = $1 ORDER BY ord ASC, created_at ASC",
        level.table(),
        level.parent_column()
    );
    let rows: Vec<(Uuid, i32)> = sqlx::query_as(&query)
        .bind(parent_id)
        .fetch_all(pool)
        .await
        .with_context(|| format!("failed to list sibling ords in {}", level.table()))?;

    Ok(rows)
}

/// Patch one node's `ord`.
pub async fn set_node_ord(
    pool: &PgPool,
    level: NodeLevel,
    id: Uuid,
    ord: i32,
    at: DateTime<Utc>,
) -> Result<()> {
    let query = format!(
        "UPDATE {} SET ord = $1, updated_at = $2 WHERE id = $3",
        level.table()
    );
    sqlx::query(&query)
        .bind(ord)
        .bind(at)
        .bind(id)
        .execute(pool)
        .await
        .with_context(|| format!("failed to set ord in {}", level.table()))?;

    Ok(())
}

/// Set one node's status. Returns affected rows (0 when the node is gone).
pub async fn set_node_status(
    pool: &PgPool,
    level: NodeLevel,
    id: Uuid,
    status: NodeStatus,
    at: DateTime<Utc>,
) -> Result<u64> {
    let query = format!(
        "UPDATE {} SET status = $1, updated_at = $2 WHERE id = $3",
        level.table()
    );
    let result = sqlx::query(&query)
        .bind(status)
        .bind(at)
        .bind(id)
        .execute(pool)
        .await
        .with_context(|| format!("failed to set status in {}", level.table()))?;

    Ok(result.rows_affected())
}

/// IDs of the children of `parent_id` at `level`.
pub async fn child_ids(pool: &PgPool, level: NodeLevel, parent_id: Uuid) -> Result<Vec<Uuid>> {
    let query = format!(
        "SELECT id FROM {} WHERE {} = $1",
        level.table(),
        level.parent_column()
    );
    let rows: Vec<(Uuid,)> = sqlx::query_as(&query)
        .bind(parent_id)
        .fetch_all(pool)
        .await
        .with_context(|| format!("failed to list child ids in {}", level.table()))?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Force every non-done child of `parent_id` to `done` with a shared
/// timestamp. Returns the number of rows touched.
pub async fn force_done_children(
    pool: &PgPool,
    level: NodeLevel,
    parent_id: Uuid,
    at: DateTime<Utc>,
) -> Result<u64> {
    let query = format!(
        "UPDATE {} SET status = 'done', updated_at = $1 \
         WHERE {} = $2 AND status <> 'done'",
        level.table(),
        level.parent_column()
    );
    let result = sqlx::query(&query)
        .bind(at)
        .bind(parent_id)
        .execute(pool)
        .await
        .with_context(|| format!("failed to force-complete children in {}", level.table()))?;

    Ok(result.rows_affected())
}

/// Delete one node row. Returns affected rows.
pub async fn delete_node(pool: &PgPool, level: NodeLevel, id: Uuid) -> Result<u64> {
    let query = format!("DELETE FROM {} WHERE id = $1", level.table());
    let result = sqlx::query(&query)
        .bind(id)
        .execute(pool)
        .await
        .with_context(|| format!("failed to delete from {}", level.table()))?;

    Ok(result.rows_affected())
}

/// Delete every child of `parent_id` at `level`. Returns affected rows.
pub async fn delete_children(pool: &PgPool, level: NodeLevel, parent_id: Uuid) -> Result<u64> {
    let query = format!(
        "DELETE FROM {} WHERE {} = $1",
        level.table(),
        level.parent_column()
    );
    let result = sqlx::query(&query)
        .bind(parent_id)
        .execute(pool)
        .await
        .with_context(|| format!("failed to delete children in {}", level.table()))?;

    Ok(result.rows_affected())
}

/// Count the children of `parent_id` at `level`.
pub async fn count_children(pool: &PgPool, level: NodeLevel, parent_id: Uuid) -> Result<i64> {
    let query = format!(
        "SELECT COUNT(*) FROM {} WHERE {} = $1",
        level.table(),
        level.parent_column()
    );
    let row: (i64,) = sqlx::query_as(&query)
        .bind(parent_id)
        .fetch_one(pool)
        .await
        .with_context(|| format!("failed to count children in {}", level.table()))?;

    Ok(row.0)
}
