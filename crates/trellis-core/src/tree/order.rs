//! Sibling order allocation and rebalancing.
//!
//! `ord` values within a sibling set are a dense permutation of `0..n-1`
//! at rest. Appends take max+1 rather than a count so a pre-existing gap
//! never forces a renumber on insert; compaction after a delete patches
//! only the rows whose position actually changed.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use trellis_db::queries::nodes::{self, NodeLevel};

use crate::error::EngineResult;

/// Next append position under `parent_id`: max sibling `ord` + 1, or 0
/// with no siblings.
pub async fn next_ord(pool: &PgPool, level: NodeLevel, parent_id: Uuid) -> EngineResult<i32> {
    let max = nodes::max_sibling_ord(pool, level, parent_id).await?;
    Ok(max.map_or(0, |m| m + 1))
}

/// Re-establish dense ordering under `parent_id` after a removal.
///
/// Fetches the remaining siblings sorted by `ord` and patches only those
/// whose position index differs from their stored `ord` (typically just
/// the nodes after the removed one). Returns the number of rows patched.
pub async fn compact(
    pool: &PgPool,
    level: NodeLevel,
    parent_id: Uuid,
    at: DateTime<Utc>,
) -> EngineResult<usize> {
    let siblings = nodes::sibling_ords(pool, level, parent_id).await?;

    let mut patched = 0;
    for (index, (id, ord)) in siblings.into_iter().enumerate() {
        let want = index as i32;
        if ord != want {
            nodes::set_node_ord(pool, level, id, want, at).await?;
            patched += 1;
        }
    }
    Ok(patched)
}
