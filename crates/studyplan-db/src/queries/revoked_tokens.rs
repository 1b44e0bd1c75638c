//! Denylist of refresh tokens revoked at logout.
//!
//! Only a digest of the token is stored, never the token itself.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgPool;

/// Record a token digest as revoked. Idempotent.
pub async fn revoke(pool: &PgPool, token_digest: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO revoked_tokens (token_digest) VALUES ($1) ON CONFLICT DO NOTHING",
    )
    .bind(token_digest)
    .execute(pool)
    .await
    .context("failed to revoke token")?;

    Ok(())
}

pub async fn is_revoked(pool: &PgPool, token_digest: &str) -> Result<bool> {
    let revoked: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM revoked_tokens WHERE token_digest = $1)")
            .bind(token_digest)
            .fetch_one(pool)
            .await
            .context("failed to check revoked token")?;

    Ok(revoked)
}

/// Drop entries revoked before `cutoff`; once a token has expired its
/// denylist entry is dead weight. Returns the number of rows removed.
pub async fn purge_revoked_before(pool: &PgPool, cutoff: DateTime<Utc>) -> Result<u64> {
    let result = sqlx::query("DELETE FROM revoked_tokens WHERE revoked_at < $1")
        .bind(cutoff)
        .execute(pool)
        .await
        .context("failed to purge revoked tokens")?;

    Ok(result.rows_affected())
}
