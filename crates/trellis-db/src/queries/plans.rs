//! Database query functions for the `plans` table.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Plan, PlanStatus};

/// Insert a new plan shell. The subtree is populated later by the background
/// generation unit. Returns the inserted plan with server-generated defaults.
pub async fn insert_plan_shell(
    pool: &PgPool,
    user_id: &str,
    idea: &str,
    status: PlanStatus,
) -> Result<Plan> {
    let plan = sqlx::query_as::<_, Plan>(
        "INSERT INTO plans (user_id, idea, status) \
         VALUES ($1, $2, $3) \
         RETURNING *",
    )
    .bind(user_id)
    .bind(idea)
    .bind(status)
    .fetch_one(pool)
    .await
    .context("failed to insert plan")?;

    Ok(plan)
}

/// Fetch a plan by its ID.
pub async fn get_plan(pool: &PgPool, id: Uuid) -> Result<Option<Plan>> {
    let plan = sqlx::query_as::<_, Plan>("SELECT * FROM plans WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch plan")?;

    Ok(plan)
}

/// List a user's plans, newest first by `updated_at`, capped at `limit`.
pub async fn list_recent_plans(pool: &PgPool, user_id: &str, limit: i64) -> Result<Vec<Plan>> {
    let plans = sqlx::query_as::<_, Plan>(
        "SELECT * FROM plans WHERE user_id = $1 ORDER BY updated_at DESC LIMIT $2",
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("failed to list plans")?;

    Ok(plans)
}

/// Update the lifecycle status of a plan and bump `updated_at`.
pub async fn update_plan_status(pool: &PgPool, id: Uuid, status: PlanStatus) -> Result<()> {
    let result = sqlx::query("UPDATE plans SET status = $1, updated_at = now() WHERE id = $2")
        .bind(status)
        .bind(id)
        .execute(pool)
        .await
        .context("failed to update plan status")?;

    if result.rows_affected() == 0 {
        anyhow::bail!("plan {id} not found");
    }

    Ok(())
}

/// Record a failed generation/adjustment: status `error` plus the message.
pub async fn set_plan_error(pool: &PgPool, id: Uuid, message: &str) -> Result<()> {
    let result = sqlx::query(
        "UPDATE plans SET status = 'error', generation_error = $1, updated_at = now() \
         WHERE id = $2",
    )
    .bind(message)
    .bind(id)
    .execute(pool)
    .await
    .context("failed to record plan error")?;

    if result.rows_affected() == 0 {
        anyhow::bail!("plan {id} not found");
    }

    Ok(())
}

/// Attach research snippets (a JSON array) to a plan.
pub async fn set_plan_research(
    pool: &PgPool,
    id: Uuid,
    research: &serde_json::Value,
) -> Result<()> {
    sqlx::query("UPDATE plans SET research = $1, updated_at = now() WHERE id = $2")
        .bind(research)
        .bind(id)
        .execute(pool)
        .await
        .context("failed to set plan research")?;

    Ok(())
}

/// Patch the plan header after a full-tree replace: title, summary, status
/// `ready`, cleared error, `updated_at` set to the replace timestamp.
pub async fn patch_plan_after_replace(
    pool: &PgPool,
    id: Uuid,
    title: &str,
    summary: &str,
    at: DateTime<Utc>,
) -> Result<()> {
    let result = sqlx::query(
        "UPDATE plans \
         SET title = $1, summary = $2, status = 'ready', generation_error = NULL, updated_at = $3 \
         WHERE id = $4",
    )
    .bind(title)
    .bind(summary)
    .bind(at)
    .bind(id)
    .execute(pool)
    .await
    .context("failed to patch plan after replace")?;

    if result.rows_affected() == 0 {
        anyhow::bail!("plan {id} not found");
    }

    Ok(())
}

/// Bump a plan's `updated_at` to `at`. Called after every descendant
/// mutation so the plan timestamp dominates its subtree.
pub async fn touch_plan(pool: &PgPool, id: Uuid, at: DateTime<Utc>) -> Result<()> {
    sqlx::query("UPDATE plans SET updated_at = $1 WHERE id = $2")
        .bind(at)
        .bind(id)
        .execute(pool)
        .await
        .context("failed to touch plan")?;

    Ok(())
}

/// Delete the plan row itself. Descendants, threads, and audit events must
/// already be gone.
pub async fn delete_plan_row(pool: &PgPool, id: Uuid) -> Result<u64> {
    let result = sqlx::query("DELETE FROM plans WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .context("failed to delete plan")?;

    Ok(result.rows_affected())
}
