//! Conversation thread affinity: at most one model-conversation handle per
//! plan, created lazily and reused for every subsequent adjustment so the
//! model service retains context by handle instead of receiving the full
//! plan history each call.

use sqlx::PgPool;
use uuid::Uuid;

use trellis_db::models::ConversationThread;
use trellis_db::queries::threads;

use crate::error::{EngineError, EngineResult};
use crate::model::ModelClient;

/// Look up the plan's thread handle, creating and persisting one via the
/// model client when absent.
///
/// The mapping is persisted before first use. Two racing creators both
/// insert with `ON CONFLICT DO NOTHING`; the loser re-reads and uses the
/// winner's handle, so one handle per plan holds.
pub async fn get_or_create(
    pool: &PgPool,
    plan_id: Uuid,
    user_id: &str,
    client: &dyn ModelClient,
) -> EngineResult<ConversationThread> {
    if let Some(thread) = threads::get_thread(pool, plan_id).await? {
        return Ok(thread);
    }

    let handle = client
        .create_thread()
        .await
        .map_err(|e| EngineError::Upstream(format!("failed to create thread: {e:#}")))?;

    let inserted = threads::insert_thread(pool, plan_id, user_id, &handle).await?;
    if inserted == 0 {
        tracing::debug!(plan_id = %plan_id, "lost thread-creation race, reusing existing handle");
    }

    let thread = threads::get_thread(pool, plan_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("thread for plan {plan_id} vanished after insert"))?;

    Ok(thread)
}
