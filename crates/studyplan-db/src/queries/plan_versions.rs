//! Database query functions for the `plan_versions` table.
//!
//! Versions are append-only: there is no update or per-version delete.

use anyhow::{Context, Result};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use crate::models::PlanVersion;

/// Column values for a new version row.
#[derive(Debug, Clone)]
pub struct NewPlanVersion<'a> {
    pub plan_id: Uuid,
    pub version_number: i32,
    pub content_json: &'a serde_json::Value,
    pub prompt_used: &'a str,
    pub model_used: &'a str,
}

/// The version number the next snapshot of `plan_id` should take: one past
/// the current maximum, or 1 for a plan without versions.
pub async fn next_version_number<'e>(executor: impl PgExecutor<'e>, plan_id: Uuid) -> Result<i32> {
    let next: i32 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(version_number), 0) + 1 FROM plan_versions WHERE plan_id = $1",
    )
    .bind(plan_id)
    .fetch_one(executor)
    .await
    .context("failed to compute next version number")?;

    Ok(next)
}

/// Insert a version row.
pub async fn insert_version<'e>(
    executor: impl PgExecutor<'e>,
    new: &NewPlanVersion<'_>,
) -> Result<PlanVersion> {
    let version = sqlx::query_as::<_, PlanVersion>(
        "INSERT INTO plan_versions (plan_id, version_number, content_json, prompt_used, model_used) \
         VALUES ($1, $2, $3, $4, $5) \
         RETURNING *",
    )
    .bind(new.plan_id)
    .bind(new.version_number)
    .bind(new.content_json)
    .bind(new.prompt_used)
    .bind(new.model_used)
    .fetch_one(executor)
    .await
    .with_context(|| {
        format!(
            "failed to insert version {} of plan {}",
            new.version_number, new.plan_id
        )
    })?;

    Ok(version)
}

/// All versions of a plan, newest first.
pub async fn list_versions(pool: &PgPool, plan_id: Uuid) -> Result<Vec<PlanVersion>> {
    let versions = sqlx::query_as::<_, PlanVersion>(
        "SELECT * FROM plan_versions WHERE plan_id = $1 ORDER BY version_number DESC",
    )
    .bind(plan_id)
    .fetch_all(pool)
    .await
    .context("failed to list plan versions")?;

    Ok(versions)
}

/// All versions of several plans, grouped by plan and newest first within
/// each plan.
pub async fn list_versions_for_plans(pool: &PgPool, plan_ids: &[Uuid]) -> Result<Vec<PlanVersion>> {
    let versions = sqlx::query_as::<_, PlanVersion>(
        "SELECT * FROM plan_versions WHERE plan_id = ANY($1) \
         ORDER BY plan_id, version_number DESC",
    )
    .bind(plan_ids)
    .fetch_all(pool)
    .await
    .context("failed to list plan versions")?;

    Ok(versions)
}

/// The most recent version of a plan.
pub async fn latest_version(pool: &PgPool, plan_id: Uuid) -> Result<Option<PlanVersion>> {
    let version = sqlx::query_as::<_, PlanVersion>(
        "SELECT * FROM plan_versions WHERE plan_id = $1 ORDER BY version_number DESC LIMIT 1",
    )
    .bind(plan_id)
    .fetch_optional(pool)
    .await
    .context("failed to fetch latest plan version")?;

    Ok(version)
}

/// Number of versions stored for a plan.
pub async fn count_versions(pool: &PgPool, plan_id: Uuid) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM plan_versions WHERE plan_id = $1")
        .bind(plan_id)
        .fetch_one(pool)
        .await
        .context("failed to count plan versions")?;

    Ok(count)
}
