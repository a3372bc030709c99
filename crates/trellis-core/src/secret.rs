//! Secret store: service-issued integration keys and user-supplied model
//! API keys.
//!
//! Integration keys are irreversible: the stored record holds a random
//! per-key salt and an HMAC-SHA256 digest of the secret half, never the
//! secret itself. Verification is constant-time via the HMAC comparison.
//! Model API keys are reversible by contract (they must be replayed to the
//! model service) and are stored by value.

use anyhow::Context;
use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::Sha256;
use sqlx::PgPool;

use trellis_db::queries::secrets;

use crate::error::{EngineError, EngineResult};

type HmacSha256 = Hmac<Sha256>;

/// Prefix on every issued integration key.
pub const KEY_PREFIX: &str = "trellis_ik_";

const KEY_ID_BYTES: usize = 8;
const SECRET_BYTES: usize = 24;
const SALT_BYTES: usize = 16;

/// A freshly issued integration key. The full key is shown exactly once;
/// only `key_id`, the salt, and the digest are persisted.
#[derive(Debug, Clone)]
pub struct IssuedKey {
    pub key_id: String,
    pub key: String,
}

fn random_hex(n: usize) -> String {
    let mut bytes = vec![0u8; n];
    rand::rng().fill(&mut bytes[..]);
    hex::encode(bytes)
}

fn digest_secret(salt: &[u8], secret: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(salt).expect("HMAC accepts any key length");
    mac.update(secret.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

fn verify_digest(salt: &[u8], secret: &str, digest_hex: &str) -> bool {
    let Ok(expected) = hex::decode(digest_hex) else {
        return false;
    };
    let mut mac = HmacSha256::new_from_slice(salt).expect("HMAC accepts any key length");
    mac.update(secret.as_bytes());
    mac.verify_slice(&expected).is_ok()
}

/// Split a presented key into `(key_id, secret)`.
///
/// Format: `trellis_ik_<key_id:16 hex>_<secret:48 hex>`.
fn parse_key(presented: &str) -> Option<(&str, &str)> {
    let rest = presented.strip_prefix(KEY_PREFIX)?;
    let (key_id, secret) = rest.split_once('_')?;
    if key_id.len() != KEY_ID_BYTES * 2 || secret.len() != SECRET_BYTES * 2 {
        return None;
    }
    if !key_id.chars().all(|c| c.is_ascii_hexdigit())
        || !secret.chars().all(|c| c.is_ascii_hexdigit())
    {
        return None;
    }
    Some((key_id, secret))
}

/// Issue a new integration key for `user_id`, returning the one-time full
/// key string.
pub async fn issue_key(pool: &PgPool, user_id: &str) -> EngineResult<IssuedKey> {
    let key_id = random_hex(KEY_ID_BYTES);
    let secret = random_hex(SECRET_BYTES);
    let salt = random_hex(SALT_BYTES);

    let salt_bytes = hex::decode(&salt).context("salt hex should decode")?;
    let digest = digest_secret(&salt_bytes, &secret);

    secrets::insert_integration_key(pool, &key_id, user_id, &salt, &digest).await?;

    tracing::info!(user_id, key_id, "issued integration key");
    Ok(IssuedKey {
        key: format!("{KEY_PREFIX}{key_id}_{secret}"),
        key_id,
    })
}

/// Verify a presented integration key and return the owning user ID.
///
/// Any failure -- malformed key, unknown key ID, revoked key, digest
/// mismatch -- collapses to `Unauthenticated`; callers learn nothing about
/// which part failed.
pub async fn verify_key(pool: &PgPool, presented: &str) -> EngineResult<String> {
    let Some((key_id, secret)) = parse_key(presented) else {
        return Err(EngineError::Unauthenticated);
    };

    let Some(record) = secrets::get_integration_key(pool, key_id).await? else {
        return Err(EngineError::Unauthenticated);
    };
    if record.revoked_at.is_some() {
        return Err(EngineError::Unauthenticated);
    }

    let Ok(salt_bytes) = hex::decode(&record.salt) else {
        return Err(EngineError::Unauthenticated);
    };
    if !verify_digest(&salt_bytes, secret, &record.digest) {
        return Err(EngineError::Unauthenticated);
    }

    Ok(record.user_id)
}

/// Revoke an integration key by its public ID.
pub async fn revoke_key(pool: &PgPool, key_id: &str) -> EngineResult<bool> {
    let rows = secrets::revoke_integration_key(pool, key_id).await?;
    Ok(rows > 0)
}

/// Store (or replace) a user's own model API key.
pub async fn set_model_key(pool: &PgPool, user_id: &str, api_key: &str) -> EngineResult<()> {
    secrets::upsert_model_key(pool, user_id, api_key).await?;
    Ok(())
}

/// Retrieve a user's model API key, if one is stored.
pub async fn get_model_key(pool: &PgPool, user_id: &str) -> EngineResult<Option<String>> {
    let key = secrets::get_model_key(pool, user_id).await?;
    Ok(key.map(|k| k.api_key))
}
