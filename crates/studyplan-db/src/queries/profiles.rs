//! Database query functions for the `study_profiles` table.

use anyhow::{Context, Result};
use sqlx::{Acquire, PgExecutor, PgPool, Postgres};
use uuid::Uuid;

use crate::models::{Language, StudyLevel, StudyProfile};

/// Partial update of a study profile. `None` leaves the column unchanged.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub current_level: Option<StudyLevel>,
    pub daily_minutes: Option<i32>,
    pub preferred_language: Option<Language>,
    pub study_goal: Option<String>,
    pub focus_areas: Option<Vec<String>>,
    pub preferred_resources: Option<Vec<String>>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.current_level.is_none()
            && self.daily_minutes.is_none()
            && self.preferred_language.is_none()
            && self.study_goal.is_none()
            && self.focus_areas.is_none()
            && self.preferred_resources.is_none()
    }
}

/// Create a profile with column defaults for a freshly registered user.
pub async fn insert_default_profile<'e>(
    executor: impl PgExecutor<'e>,
    user_id: Uuid,
) -> Result<StudyProfile> {
    let profile = sqlx::query_as::<_, StudyProfile>(
        "INSERT INTO study_profiles (user_id) VALUES ($1) RETURNING *",
    )
    .bind(user_id)
    .fetch_one(executor)
    .await
    .context("failed to insert study profile")?;

    Ok(profile)
}

/// Fetch the profile of a user, if any.
pub async fn get_profile(pool: &PgPool, user_id: Uuid) -> Result<Option<StudyProfile>> {
    let profile =
        sqlx::query_as::<_, StudyProfile>("SELECT * FROM study_profiles WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(pool)
            .await
            .context("failed to fetch study profile")?;

    Ok(profile)
}

/// Fetch the profiles of several users at once.
pub async fn get_profiles(pool: &PgPool, user_ids: &[Uuid]) -> Result<Vec<StudyProfile>> {
    let profiles =
        sqlx::query_as::<_, StudyProfile>("SELECT * FROM study_profiles WHERE user_id = ANY($1)")
            .bind(user_ids)
            .fetch_all(pool)
            .await
            .context("failed to fetch study profiles")?;

    Ok(profiles)
}

/// Apply a partial update, creating the profile first if the user has none.
///
/// Takes a pool or an open transaction; inside a transaction the two
/// statements run under a savepoint.
pub async fn upsert_profile<'a>(
    conn: impl Acquire<'a, Database = Postgres>,
    user_id: Uuid,
    update: &ProfileUpdate,
) -> Result<StudyProfile> {
    let mut tx = conn.begin().await.context("failed to begin transaction")?;

    sqlx::query("INSERT INTO study_profiles (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .context("failed to ensure study profile exists")?;

    let profile = sqlx::query_as::<_, StudyProfile>(
        "UPDATE study_profiles SET \
             current_level = COALESCE($2, current_level), \
             daily_minutes = COALESCE($3, daily_minutes), \
             preferred_language = COALESCE($4, preferred_language), \
             study_goal = COALESCE($5, study_goal), \
             focus_areas = COALESCE($6, focus_areas), \
             preferred_resources = COALESCE($7, preferred_resources), \
             updated_at = now() \
         WHERE user_id = $1 \
         RETURNING *",
    )
    .bind(user_id)
    .bind(update.current_level)
    .bind(update.daily_minutes)
    .bind(update.preferred_language)
    .bind(update.study_goal.as_deref())
    .bind(update.focus_areas.as_deref())
    .bind(update.preferred_resources.as_deref())
    .fetch_one(&mut *tx)
    .await
    .context("failed to update study profile")?;

    tx.commit().await.context("failed to commit transaction")?;

    Ok(profile)
}
