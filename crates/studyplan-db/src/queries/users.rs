//! Database query functions for the `users` table.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use crate::models::{Role, User};

/// Column values for a new account.
#[derive(Debug, Clone)]
pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub role: Role,
}

/// Optional filters for [`list_users`]. `None` fields match everything.
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    /// Case-insensitive substring of username, email, first or last name.
    pub search: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

/// Partial update of the account's personal fields.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
}

/// Per-user plan statistics used by the admin listing.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserPlanStats {
    pub user_id: Uuid,
    pub plans_count: i64,
    pub last_plan_created: Option<DateTime<Utc>>,
}

/// Insert a new user row and return it with server-side defaults.
pub async fn insert_user<'e>(executor: impl PgExecutor<'e>, new: &NewUser<'_>) -> Result<User> {
    let user = sqlx::query_as::<_, User>(
        "INSERT INTO users (username, email, password_hash, first_name, last_name, role) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         RETURNING *",
    )
    .bind(new.username)
    .bind(new.email)
    .bind(new.password_hash)
    .bind(new.first_name)
    .bind(new.last_name)
    .bind(new.role)
    .fetch_one(executor)
    .await
    .with_context(|| format!("failed to insert user {:?}", new.username))?;

    Ok(user)
}

/// Fetch a user by ID.
pub async fn get_user(pool: &PgPool, id: Uuid) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch user")?;

    Ok(user)
}

/// Take a row lock on a user, serializing work that must see a consistent
/// set of that user's plans. Returns `false` if the user does not exist.
pub async fn lock_user<'e>(executor: impl PgExecutor<'e>, id: Uuid) -> Result<bool> {
    let row: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM users WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(executor)
        .await
        .context("failed to lock user")?;

    Ok(row.is_some())
}

/// Fetch a user by exact username.
pub async fn get_user_by_username(pool: &PgPool, username: &str) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1")
        .bind(username)
        .fetch_optional(pool)
        .await
        .context("failed to fetch user by username")?;

    Ok(user)
}

/// Whether a username is already taken.
pub async fn username_exists<'e>(executor: impl PgExecutor<'e>, username: &str) -> Result<bool> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE username = $1)")
        .bind(username)
        .fetch_one(executor)
        .await
        .context("failed to check username")?;

    Ok(exists)
}

/// Escape `%`, `_` and `\` so user input matches literally inside ILIKE.
fn like_pattern(search: &str) -> String {
    let mut escaped = String::with_capacity(search.len() + 2);
    escaped.push('%');
    for c in search.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// List users matching the filter, newest first.
pub async fn list_users(pool: &PgPool, filter: &UserFilter) -> Result<Vec<User>> {
    let pattern = filter
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(like_pattern);

    let users = sqlx::query_as::<_, User>(
        "SELECT * FROM users \
         WHERE ($1::text IS NULL \
                OR username ILIKE $1 OR email ILIKE $1 \
                OR first_name ILIKE $1 OR last_name ILIKE $1) \
           AND ($2::text IS NULL OR role = $2) \
           AND ($3::boolean IS NULL OR is_active = $3) \
         ORDER BY date_joined DESC",
    )
    .bind(pattern)
    .bind(filter.role)
    .bind(filter.is_active)
    .fetch_all(pool)
    .await
    .context("failed to list users")?;

    Ok(users)
}

/// Apply a partial update to the personal fields. Returns the updated row.
pub async fn update_user<'e>(
    executor: impl PgExecutor<'e>,
    id: Uuid,
    update: &UserUpdate,
) -> Result<User> {
    let user = sqlx::query_as::<_, User>(
        "UPDATE users SET \
             first_name = COALESCE($2, first_name), \
             last_name = COALESCE($3, last_name), \
             email = COALESCE($4, email), \
             updated_at = now() \
         WHERE id = $1 \
         RETURNING *",
    )
    .bind(id)
    .bind(update.first_name.as_deref())
    .bind(update.last_name.as_deref())
    .bind(update.email.as_deref())
    .fetch_optional(executor)
    .await
    .context("failed to update user")?;

    user.with_context(|| format!("user {id} not found"))
}

/// Set the active flag. Fails if the user does not exist.
pub async fn set_user_active(pool: &PgPool, id: Uuid, is_active: bool) -> Result<()> {
    let result = sqlx::query("UPDATE users SET is_active = $1, updated_at = now() WHERE id = $2")
        .bind(is_active)
        .bind(id)
        .execute(pool)
        .await
        .context("failed to update user active flag")?;

    if result.rows_affected() == 0 {
        anyhow::bail!("user {id} not found");
    }

    Ok(())
}

/// Change a user's role. Fails if the user does not exist.
pub async fn set_user_role(pool: &PgPool, id: Uuid, role: Role) -> Result<()> {
    let result = sqlx::query("UPDATE users SET role = $1, updated_at = now() WHERE id = $2")
        .bind(role)
        .bind(id)
        .execute(pool)
        .await
        .context("failed to update user role")?;

    if result.rows_affected() == 0 {
        anyhow::bail!("user {id} not found");
    }

    Ok(())
}

/// Stamp `last_login` with the current time.
pub async fn record_login(pool: &PgPool, id: Uuid) -> Result<()> {
    sqlx::query("UPDATE users SET last_login = now() WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .context("failed to record login")?;

    Ok(())
}

/// Delete a user (profile, plans and versions cascade). Returns whether a
/// row was removed.
pub async fn delete_user(pool: &PgPool, id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .context("failed to delete user")?;

    Ok(result.rows_affected() > 0)
}

/// Plan count and latest plan creation time for each of the given users.
/// Users without plans are absent from the result.
pub async fn plan_stats_for_users(pool: &PgPool, user_ids: &[Uuid]) -> Result<Vec<UserPlanStats>> {
    let stats = sqlx::query_as::<_, UserPlanStats>(
        "SELECT user_id, COUNT(*) AS plans_count, MAX(created_at) AS last_plan_created \
         FROM plans \
         WHERE user_id = ANY($1) \
         GROUP BY user_id",
    )
    .bind(user_ids)
    .fetch_all(pool)
    .await
    .context("failed to aggregate plan stats")?;

    Ok(stats)
}
