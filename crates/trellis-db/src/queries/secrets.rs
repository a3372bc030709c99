//! Database query functions for the `integration_keys` and `model_keys`
//! tables.
//!
//! Integration keys are stored irreversibly (salt + digest); model API
//! keys are stored by value so they can be replayed to the model service.

use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::models::{IntegrationKey, ModelKey};

/// Insert a new integration key record.
pub async fn insert_integration_key(
    pool: &PgPool,
    key_id: &str,
    user_id: &str,
    salt: &str,
    digest: &str,
) -> Result<IntegrationKey> {
    let key = sqlx::query_as::<_, IntegrationKey>(
        "INSERT INTO integration_keys (key_id, user_id, salt, digest) \
         VALUES ($1, $2, $3, $4) \
         RETURNING *",
    )
    .bind(key_id)
    .bind(user_id)
    .bind(salt)
    .bind(digest)
    .fetch_one(pool)
    .await
    .context("failed to insert integration key")?;

    Ok(key)
}

/// Fetch an integration key record by its public key ID.
pub async fn get_integration_key(pool: &PgPool, key_id: &str) -> Result<Option<IntegrationKey>> {
    let key = sqlx::query_as::<_, IntegrationKey>(
        "SELECT * FROM integration_keys WHERE key_id = $1",
    )
    .bind(key_id)
    .fetch_optional(pool)
    .await
    .context("failed to fetch integration key")?;

    Ok(key)
}

/// Mark an integration key revoked. Returns affected rows.
pub async fn revoke_integration_key(pool: &PgPool, key_id: &str) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE integration_keys SET revoked_at = now() \
         WHERE key_id = $1 AND revoked_at IS NULL",
    )
    .bind(key_id)
    .execute(pool)
    .await
    .context("failed to revoke integration key")?;

    Ok(result.rows_affected())
}

/// Store (or replace) a user's model API key.
pub async fn upsert_model_key(pool: &PgPool, user_id: &str, api_key: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO model_keys (user_id, api_key) VALUES ($1, $2) \
         ON CONFLICT (user_id) DO UPDATE SET api_key = $2, updated_at = now()",
    )
    .bind(user_id)
    .bind(api_key)
    .execute(pool)
    .await
    .context("failed to upsert model key")?;

    Ok(())
}

/// Retrieve a user's model API key, if stored.
pub async fn get_model_key(pool: &PgPool, user_id: &str) -> Result<Option<ModelKey>> {
    let key = sqlx::query_as::<_, ModelKey>("SELECT * FROM model_keys WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch model key")?;

    Ok(key)
}
