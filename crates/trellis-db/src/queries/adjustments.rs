//! Database query functions for the `adjustment_events` table.
//!
//! Events are append-only; the only permitted update is the guarded
//! `pending -> applied | error` transition, enforced here with a
//! `WHERE status = 'pending'` clause so a terminal event can never be
//! rewritten.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::AdjustmentEvent;

/// Insert a new `pending` event. Recorded before the model is invoked so a
/// stuck call is still visible in the history.
pub async fn insert_pending_event(
    pool: &PgPool,
    plan_id: Uuid,
    prompt: &str,
    thread_id: &str,
) -> Result<AdjustmentEvent> {
    let event = sqlx::query_as::<_, AdjustmentEvent>(
        "INSERT INTO adjustment_events (plan_id, prompt, thread_id) \
         VALUES ($1, $2, $3) \
         RETURNING *",
    )
    .bind(plan_id)
    .bind(prompt)
    .bind(thread_id)
    .fetch_one(pool)
    .await
    .with_context(|| format!("failed to insert adjustment event for plan {plan_id}"))?;

    Ok(event)
}

/// Fetch a single event by ID.
pub async fn get_event(pool: &PgPool, id: Uuid) -> Result<Option<AdjustmentEvent>> {
    let event = sqlx::query_as::<_, AdjustmentEvent>(
        "SELECT * FROM adjustment_events WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("failed to fetch adjustment event")?;

    Ok(event)
}

/// Transition `pending -> applied`. Returns affected rows: 0 means the
/// event is missing or already terminal.
pub async fn mark_applied_pending(
    pool: &PgPool,
    id: Uuid,
    summary: &str,
    latency_ms: i64,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE adjustment_events \
         SET status = 'applied', summary = $1, latency_ms = $2, \
             applied_at = now(), updated_at = now() \
         WHERE id = $3 AND status = 'pending'",
    )
    .bind(summary)
    .bind(latency_ms)
    .bind(id)
    .execute(pool)
    .await
    .context("failed to mark adjustment event applied")?;

    Ok(result.rows_affected())
}

/// Transition `pending -> error`. Returns affected rows: 0 means the event
/// is missing or already terminal.
pub async fn mark_error_pending(pool: &PgPool, id: Uuid, error: &str) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE adjustment_events \
         SET status = 'error', error = $1, updated_at = now() \
         WHERE id = $2 AND status = 'pending'",
    )
    .bind(error)
    .bind(id)
    .execute(pool)
    .await
    .context("failed to mark adjustment event errored")?;

    Ok(result.rows_affected())
}

/// List a plan's events, newest first, capped at `limit`.
pub async fn list_events_for_plan(
    pool: &PgPool,
    plan_id: Uuid,
    limit: i64,
) -> Result<Vec<AdjustmentEvent>> {
    let events = sqlx::query_as::<_, AdjustmentEvent>(
        "SELECT * FROM adjustment_events \
         WHERE plan_id = $1 \
         ORDER BY created_at DESC \
         LIMIT $2",
    )
    .bind(plan_id)
    .bind(limit)
    .fetch_all(pool)
    .await
    .with_context(|| format!("failed to list adjustment events for plan {plan_id}"))?;

    Ok(events)
}

/// Delete all events for a plan. Only called from full plan deletion.
pub async fn delete_events_for_plan(pool: &PgPool, plan_id: Uuid) -> Result<u64> {
    let result = sqlx::query("DELETE FROM adjustment_events WHERE plan_id = $1")
        .bind(plan_id)
        .execute(pool)
        .await
        .context("failed to delete adjustment events")?;

    Ok(result.rows_affected())
}
