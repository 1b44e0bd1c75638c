//! Super-admin operations: user management and dashboard metrics.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use studyplan_db::models::{Language, Plan, Role, StudyLevel, StudyProfile, User};
use studyplan_db::queries::users::{self as user_queries, UserFilter};
use studyplan_db::queries::{metrics as metric_queries, plan_versions, plans, profiles};

/// Days covered by the per-day series, today included.
const SERIES_DAYS: i64 = 30;
const WEEK_DAYS: i64 = 7;
const MONTH_DAYS: i64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error("super admin access required")]
    Forbidden,

    #[error("user not found")]
    NotFound,

    #[error("{0}")]
    Protected(&'static str),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub fn require_super_admin(actor: &User) -> Result<(), AdminError> {
    if actor.role.is_super_admin() {
        Ok(())
    } else {
        Err(AdminError::Forbidden)
    }
}

/// Study preferences shown next to each user in the listing.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileSummary {
    pub current_level: StudyLevel,
    pub daily_minutes: i32,
    pub preferred_language: Language,
}

impl From<&StudyProfile> for ProfileSummary {
    fn from(p: &StudyProfile) -> Self {
        Self {
            current_level: p.current_level,
            daily_minutes: p.daily_minutes,
            preferred_language: p.preferred_language,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UserSummary {
    #[serde(flatten)]
    pub user: User,
    pub study_profile: Option<ProfileSummary>,
    pub plans_count: i64,
    pub last_plan_created: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VersionSummary {
    pub id: Uuid,
    pub version_number: i32,
    pub model_used: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanSummary {
    #[serde(flatten)]
    pub plan: Plan,
    pub versions_count: i64,
    pub latest_version: Option<VersionSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserDetail {
    #[serde(flatten)]
    pub user: User,
    pub study_profile: Option<StudyProfile>,
    pub plans: Vec<PlanSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardMetrics {
    pub total_users: i64,
    pub active_users: i64,
    pub total_plans: i64,
    pub plans_today: i64,
    pub plans_this_week: i64,
    pub plans_this_month: i64,
    pub active_users_today: i64,
    pub active_users_this_week: i64,
    pub plans_by_day: BTreeMap<NaiveDate, i64>,
    pub users_by_day: BTreeMap<NaiveDate, i64>,
}

/// Users matching the filter, newest first, with plan statistics.
pub async fn list_users(
    pool: &PgPool,
    actor: &User,
    filter: &UserFilter,
) -> Result<Vec<UserSummary>, AdminError> {
    require_super_admin(actor)?;

    let users = user_queries::list_users(pool, filter).await?;
    let ids: Vec<Uuid> = users.iter().map(|u| u.id).collect();

    let mut stats: HashMap<Uuid, _> = user_queries::plan_stats_for_users(pool, &ids)
        .await?
        .into_iter()
        .map(|s| (s.user_id, s))
        .collect();
    let mut summaries: HashMap<Uuid, ProfileSummary> = profiles::get_profiles(pool, &ids)
        .await?
        .iter()
        .map(|p| (p.user_id, ProfileSummary::from(p)))
        .collect();

    Ok(users
        .into_iter()
        .map(|user| {
            let stat = stats.remove(&user.id);
            UserSummary {
                study_profile: summaries.remove(&user.id),
                plans_count: stat.as_ref().map_or(0, |s| s.plans_count),
                last_plan_created: stat.and_then(|s| s.last_plan_created),
                user,
            }
        })
        .collect())
}

/// A user with their full profile and plan history.
pub async fn user_detail(
    pool: &PgPool,
    actor: &User,
    user_id: Uuid,
) -> Result<UserDetail, AdminError> {
    require_super_admin(actor)?;

    let user = user_queries::get_user(pool, user_id)
        .await?
        .ok_or(AdminError::NotFound)?;
    let study_profile = profiles::get_profile(pool, user_id).await?;

    let user_plans = plans::list_plans_for_user(pool, user_id).await?;
    let ids: Vec<Uuid> = user_plans.iter().map(|p| p.id).collect();

    // Versions arrive grouped per plan, newest first.
    let mut counts: HashMap<Uuid, i64> = HashMap::new();
    let mut latest: HashMap<Uuid, VersionSummary> = HashMap::new();
    for v in plan_versions::list_versions_for_plans(pool, &ids).await? {
        *counts.entry(v.plan_id).or_default() += 1;
        latest.entry(v.plan_id).or_insert(VersionSummary {
            id: v.id,
            version_number: v.version_number,
            model_used: v.model_used,
            created_at: v.created_at,
        });
    }

    let plans = user_plans
        .into_iter()
        .map(|plan| PlanSummary {
            versions_count: counts.get(&plan.id).copied().unwrap_or(0),
            latest_version: latest.remove(&plan.id),
            plan,
        })
        .collect();

    Ok(UserDetail {
        user,
        study_profile,
        plans,
    })
}

/// Deactivate an account. Another super admin cannot be deactivated.
pub async fn deactivate_user(
    pool: &PgPool,
    actor: &User,
    user_id: Uuid,
) -> Result<User, AdminError> {
    require_super_admin(actor)?;

    let target = user_queries::get_user(pool, user_id)
        .await?
        .ok_or(AdminError::NotFound)?;
    if target.role == Role::SuperAdmin && target.id != actor.id {
        return Err(AdminError::Protected("cannot deactivate another super admin"));
    }

    user_queries::set_user_active(pool, user_id, false).await?;
    info!(actor = %actor.id, %user_id, "user deactivated");

    user_queries::get_user(pool, user_id)
        .await?
        .ok_or(AdminError::NotFound)
}

/// Delete an account and everything it owns. Super admins cannot be deleted.
pub async fn delete_user(pool: &PgPool, actor: &User, user_id: Uuid) -> Result<(), AdminError> {
    require_super_admin(actor)?;

    let target = user_queries::get_user(pool, user_id)
        .await?
        .ok_or(AdminError::NotFound)?;
    if target.role.is_super_admin() {
        return Err(AdminError::Protected("cannot delete a super admin"));
    }

    if !user_queries::delete_user(pool, user_id).await? {
        return Err(AdminError::NotFound);
    }
    info!(actor = %actor.id, %user_id, username = %target.username, "user deleted");
    Ok(())
}

pub async fn metrics(pool: &PgPool, actor: &User) -> Result<DashboardMetrics, AdminError> {
    require_super_admin(actor)?;
    metrics_on(pool, Utc::now().date_naive()).await
}

/// Dashboard numbers as seen on the UTC day `today`.
pub async fn metrics_on(pool: &PgPool, today: NaiveDate) -> Result<DashboardMetrics, AdminError> {
    let totals = metric_queries::user_totals(pool).await?;
    let total_plans = metric_queries::count_plans(pool).await?;

    let month_start = today - Duration::days(MONTH_DAYS);
    let plan_days = metric_queries::plans_per_day(pool, month_start).await?;
    let login_days = metric_queries::logins_per_day(pool, month_start).await?;

    let week_start = today - Duration::days(WEEK_DAYS);
    let since = |days: &[(NaiveDate, i64)], start: NaiveDate| -> i64 {
        days.iter()
            .filter(|(day, _)| *day >= start && *day <= today)
            .map(|(_, n)| n)
            .sum()
    };

    Ok(DashboardMetrics {
        total_users: totals.total,
        active_users: totals.active,
        total_plans,
        plans_today: since(&plan_days, today),
        plans_this_week: since(&plan_days, week_start),
        plans_this_month: since(&plan_days, month_start),
        active_users_today: since(&login_days, today),
        active_users_this_week: since(&login_days, week_start),
        plans_by_day: daily_series(&plan_days, today),
        users_by_day: daily_series(&login_days, today),
    })
}

/// One entry per day for the last [`SERIES_DAYS`] days ending at `today`,
/// zero-filled.
fn daily_series(days: &[(NaiveDate, i64)], today: NaiveDate) -> BTreeMap<NaiveDate, i64> {
    let first = today - Duration::days(SERIES_DAYS - 1);
    let mut series: BTreeMap<NaiveDate, i64> = first
        .iter_days()
        .take_while(|d| *d <= today)
        .map(|d| (d, 0))
        .collect();
    for (day, n) in days {
        if let Some(slot) = series.get_mut(day) {
            *slot = *n;
        }
    }
    series
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn series_covers_thirty_days_including_today() {
        let today = day(2026, 3, 10);
        let series = daily_series(&[(day(2026, 3, 10), 4), (day(2026, 1, 1), 9)], today);
        assert_eq!(series.len(), 30);
        assert_eq!(series.keys().next(), Some(&day(2026, 2, 9)));
        assert_eq!(series.keys().last(), Some(&today));
        assert_eq!(series[&today], 4);
        assert_eq!(series.values().sum::<i64>(), 4);
    }

    #[test]
    fn series_serializes_iso_dates() {
        let series = daily_series(&[], day(2026, 3, 10));
        let json = serde_json::to_value(&series).unwrap();
        assert_eq!(json["2026-03-10"], 0);
    }
}
