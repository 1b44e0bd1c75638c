//! Database query functions for the `plans` table.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use crate::models::Plan;

/// Column values for a new plan header.
#[derive(Debug, Clone)]
pub struct NewPlan<'a> {
    pub user_id: Uuid,
    pub title: &'a str,
    pub goal_text: &'a str,
    pub deadline: Option<NaiveDate>,
    pub is_active: bool,
}

/// Partial update of a plan header.
///
/// `deadline` is doubly optional: `None` keeps the stored value,
/// `Some(None)` clears it.
#[derive(Debug, Clone, Default)]
pub struct PlanHeaderUpdate {
    pub title: Option<String>,
    pub deadline: Option<Option<NaiveDate>>,
    pub is_active: Option<bool>,
}

/// Insert a new plan header. Callers activating the plan must deactivate
/// the user's other plans first (see [`deactivate_other_plans`]).
pub async fn insert_plan<'e>(executor: impl PgExecutor<'e>, new: &NewPlan<'_>) -> Result<Plan> {
    let plan = sqlx::query_as::<_, Plan>(
        "INSERT INTO plans (user_id, title, goal_text, deadline, is_active) \
         VALUES ($1, $2, $3, $4, $5) \
         RETURNING *",
    )
    .bind(new.user_id)
    .bind(new.title)
    .bind(new.goal_text)
    .bind(new.deadline)
    .bind(new.is_active)
    .fetch_one(executor)
    .await
    .context("failed to insert plan")?;

    Ok(plan)
}

/// Clear the active flag on every plan of `user_id` except `keep`.
/// Returns the number of plans deactivated.
pub async fn deactivate_other_plans<'e>(
    executor: impl PgExecutor<'e>,
    user_id: Uuid,
    keep: Option<Uuid>,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE plans SET is_active = FALSE, updated_at = now() \
         WHERE user_id = $1 AND is_active AND ($2::uuid IS NULL OR id <> $2)",
    )
    .bind(user_id)
    .bind(keep)
    .execute(executor)
    .await
    .context("failed to deactivate plans")?;

    Ok(result.rows_affected())
}

/// Fetch a plan by ID regardless of owner.
pub async fn get_plan(pool: &PgPool, id: Uuid) -> Result<Option<Plan>> {
    let plan = sqlx::query_as::<_, Plan>("SELECT * FROM plans WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch plan")?;

    Ok(plan)
}

/// Fetch a plan only if it belongs to `user_id`.
pub async fn get_plan_for_user<'e>(
    executor: impl PgExecutor<'e>,
    id: Uuid,
    user_id: Uuid,
) -> Result<Option<Plan>> {
    let plan = sqlx::query_as::<_, Plan>("SELECT * FROM plans WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .fetch_optional(executor)
        .await
        .context("failed to fetch plan")?;

    Ok(plan)
}

/// Like [`get_plan_for_user`], but takes a row lock so concurrent version
/// appends to the same plan serialize.
pub async fn lock_plan_for_user<'e>(
    executor: impl PgExecutor<'e>,
    id: Uuid,
    user_id: Uuid,
) -> Result<Option<Plan>> {
    let plan = sqlx::query_as::<_, Plan>(
        "SELECT * FROM plans WHERE id = $1 AND user_id = $2 FOR UPDATE",
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(executor)
    .await
    .context("failed to lock plan")?;

    Ok(plan)
}

/// List a user's plans, newest first.
pub async fn list_plans_for_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<Plan>> {
    let plans = sqlx::query_as::<_, Plan>(
        "SELECT * FROM plans WHERE user_id = $1 ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("failed to list plans")?;

    Ok(plans)
}

/// The user's active plan, if any.
pub async fn get_active_plan(pool: &PgPool, user_id: Uuid) -> Result<Option<Plan>> {
    let plan = sqlx::query_as::<_, Plan>(
        "SELECT * FROM plans WHERE user_id = $1 AND is_active",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .context("failed to fetch active plan")?;

    Ok(plan)
}

/// Apply a partial header update and bump `updated_at`.
pub async fn update_plan_header<'e>(
    executor: impl PgExecutor<'e>,
    id: Uuid,
    update: &PlanHeaderUpdate,
) -> Result<Plan> {
    let (set_deadline, deadline) = match update.deadline {
        Some(d) => (true, d),
        None => (false, None),
    };

    let plan = sqlx::query_as::<_, Plan>(
        "UPDATE plans SET \
             title = COALESCE($2, title), \
             deadline = CASE WHEN $3 THEN $4 ELSE deadline END, \
             is_active = COALESCE($5, is_active), \
             updated_at = now() \
         WHERE id = $1 \
         RETURNING *",
    )
    .bind(id)
    .bind(update.title.as_deref())
    .bind(set_deadline)
    .bind(deadline)
    .bind(update.is_active)
    .fetch_optional(executor)
    .await
    .context("failed to update plan")?;

    plan.with_context(|| format!("plan {id} not found"))
}

/// Delete a plan owned by `user_id`. Versions cascade. Returns whether a row
/// was removed.
pub async fn delete_plan(pool: &PgPool, id: Uuid, user_id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM plans WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await
        .context("failed to delete plan")?;

    Ok(result.rows_affected() > 0)
}
