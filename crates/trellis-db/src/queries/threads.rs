//! Database query functions for the `conversation_threads` table.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::ConversationThread;

/// Fetch the thread mapping for a plan, if one exists.
pub async fn get_thread(pool: &PgPool, plan_id: Uuid) -> Result<Option<ConversationThread>> {
    let thread = sqlx::query_as::<_, ConversationThread>(
        "SELECT * FROM conversation_threads WHERE plan_id = $1",
    )
    .bind(plan_id)
    .fetch_optional(pool)
    .await
    .context("failed to fetch conversation thread")?;

    Ok(thread)
}

/// Insert a thread mapping for a plan.
///
/// `ON CONFLICT DO NOTHING` keeps the first handle if two callers race to
/// create one; callers should re-read after an insert that affected no rows.
pub async fn insert_thread(
    pool: &PgPool,
    plan_id: Uuid,
    user_id: &str,
    thread_handle: &str,
) -> Result<u64> {
    let result = sqlx::query(
        "INSERT INTO conversation_threads (plan_id, user_id, thread_handle) \
         VALUES ($1, $2, $3) \
         ON CONFLICT (plan_id) DO NOTHING",
    )
    .bind(plan_id)
    .bind(user_id)
    .bind(thread_handle)
    .execute(pool)
    .await
    .context("failed to insert conversation thread")?;

    Ok(result.rows_affected())
}

/// Delete the thread mapping for a plan. Only called from full plan deletion.
pub async fn delete_thread(pool: &PgPool, plan_id: Uuid) -> Result<u64> {
    let result = sqlx::query("DELETE FROM conversation_threads WHERE plan_id = $1")
        .bind(plan_id)
        .execute(pool)
        .await
        .context("failed to delete conversation thread")?;

    Ok(result.rows_affected())
}
