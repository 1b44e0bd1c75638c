//! Aggregate queries behind the admin dashboard.
//!
//! Calendar days are computed in UTC.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use sqlx::PgPool;

/// Total and active user counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct UserTotals {
    pub total: i64,
    pub active: i64,
}

pub async fn user_totals(pool: &PgPool) -> Result<UserTotals> {
    let totals = sqlx::query_as::<_, UserTotals>(
        "SELECT COUNT(*) AS total, COUNT(*) FILTER (WHERE is_active) AS active FROM users",
    )
    .fetch_one(pool)
    .await
    .context("failed to count users")?;

    Ok(totals)
}

pub async fn count_plans(pool: &PgPool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM plans")
        .fetch_one(pool)
        .await
        .context("failed to count plans")?;

    Ok(count)
}

/// Plans created on or after `since` (UTC day), grouped per day.
/// Days without plans are absent.
pub async fn plans_per_day(pool: &PgPool, since: NaiveDate) -> Result<Vec<(NaiveDate, i64)>> {
    let rows: Vec<(NaiveDate, i64)> = sqlx::query_as(
        "SELECT (created_at AT TIME ZONE 'UTC')::date AS day, COUNT(*) \
         FROM plans \
         WHERE (created_at AT TIME ZONE 'UTC')::date >= $1 \
         GROUP BY day \
         ORDER BY day",
    )
    .bind(since)
    .fetch_all(pool)
    .await
    .context("failed to count plans per day")?;

    Ok(rows)
}

/// Users whose last login falls on or after `since` (UTC day), grouped by
/// the day of that login. Days without logins are absent.
pub async fn logins_per_day(pool: &PgPool, since: NaiveDate) -> Result<Vec<(NaiveDate, i64)>> {
    let rows: Vec<(NaiveDate, i64)> = sqlx::query_as(
        "SELECT (last_login AT TIME ZONE 'UTC')::date AS day, COUNT(*) \
         FROM users \
         WHERE last_login IS NOT NULL \
           AND (last_login AT TIME ZONE 'UTC')::date >= $1 \
         GROUP BY day \
         ORDER BY day",
    )
    .bind(since)
    .fetch_all(pool)
    .await
    .context("failed to count logins per day")?;

    Ok(rows)
}
