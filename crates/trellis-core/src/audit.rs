//! The adjustment audit log.
//!
//! Every AI generation/adjustment attempt is recorded as an event whose
//! status moves `pending -> applied` or `pending -> error` and then never
//! again. The transition is guarded in SQL (`WHERE status = 'pending'`);
//! when zero rows match, the event is re-fetched to distinguish "missing"
//! from "already terminal".

use anyhow::bail;
use sqlx::PgPool;
use uuid::Uuid;

use trellis_db::models::AdjustmentEvent;
use trellis_db::queries::adjustments;

use crate::error::EngineResult;
use crate::ownership;

/// Maximum stored length of an error message, in characters.
pub const ERROR_CAP: usize = 512;

/// Truncate an error message to [`ERROR_CAP`] characters.
pub fn cap_error(message: &str) -> String {
    if message.chars().count() <= ERROR_CAP {
        return message.to_string();
    }
    message.chars().take(ERROR_CAP).collect()
}

/// Record a `pending` event. Called *before* the model is invoked, so a
/// call that never returns still leaves a visible trace.
pub async fn open(
    pool: &PgPool,
    plan_id: Uuid,
    prompt: &str,
    thread_id: &str,
) -> EngineResult<AdjustmentEvent> {
    let event = adjustments::insert_pending_event(pool, plan_id, prompt, thread_id).await?;
    tracing::debug!(plan_id = %plan_id, event_id = %event.id, "opened adjustment event");
    Ok(event)
}

/// Transition an event `pending -> applied`.
pub async fn mark_applied(
    pool: &PgPool,
    event_id: Uuid,
    summary: &str,
    latency_ms: i64,
) -> EngineResult<()> {
    let rows = adjustments::mark_applied_pending(pool, event_id, summary, latency_ms).await?;
    if rows == 0 {
        explain_failed_transition(pool, event_id, "applied").await?;
    }
    Ok(())
}

/// Transition an event `pending -> error`, capping the stored message.
///
/// The triggering error is the caller's to propagate; this only records it.
pub async fn mark_error(pool: &PgPool, event_id: Uuid, message: &str) -> EngineResult<()> {
    let capped = cap_error(message);
    let rows = adjustments::mark_error_pending(pool, event_id, &capped).await?;
    if rows == 0 {
        explain_failed_transition(pool, event_id, "error").await?;
    }
    Ok(())
}

/// A zero-row guarded update means the event is gone or already terminal.
async fn explain_failed_transition(
    pool: &PgPool,
    event_id: Uuid,
    to: &str,
) -> anyhow::Result<()> {
    let event = adjustments::get_event(pool, event_id).await?;
    match event {
        None => bail!("adjustment event {event_id} not found"),
        Some(e) => bail!(
            "adjustment event {event_id} is already terminal with status {} (attempted {to})",
            e.status
        ),
    }
}

/// List a plan's events, newest first, capped at `limit`.
pub async fn list_history(
    pool: &PgPool,
    user_id: &str,
    plan_id: Uuid,
    limit: i64,
) -> EngineResult<Vec<AdjustmentEvent>> {
    let plan = ownership::verify_plan(pool, plan_id, user_id).await?;
    let events = adjustments::list_events_for_plan(pool, plan.id, limit).await?;
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cap_error_short_passthrough() {
        assert_eq!(cap_error("boom"), "boom");
    }

    #[test]
    fn cap_error_truncates() {
        let long = "e".repeat(ERROR_CAP + 100);
        let capped = cap_error(&long);
        assert_eq!(capped.chars().count(), ERROR_CAP);
    }

    #[test]
    fn cap_error_respects_char_boundaries() {
        let long = "é".repeat(ERROR_CAP + 1);
        let capped = cap_error(&long);
        assert_eq!(capped.chars().count(), ERROR_CAP);
    }
}
