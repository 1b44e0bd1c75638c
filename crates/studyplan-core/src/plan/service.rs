//! Plan service layer.
//!
//! Resolves learning requests against the user's profile, runs the
//! generator, and persists each result as a new immutable version. Header
//! and version writes happen inside one transaction; generation itself runs
//! before the transaction opens so no connection is held across the
//! backend call.

use std::collections::HashMap;

use anyhow::Context;
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use studyplan_db::models::{Plan, PlanVersion};
use studyplan_db::queries::plan_versions::{self as version_queries, NewPlanVersion};
use studyplan_db::queries::plans::{self as plan_queries, NewPlan, PlanHeaderUpdate};
use studyplan_db::queries::{profiles as profile_queries, users as user_queries};

use crate::generate::request::validate_title;
use crate::generate::{GeneratedPlan, LearningRequest, PlanGenerator, RequestError, RequestOverrides};

#[derive(Debug, thiserror::Error)]
pub enum PlanServiceError {
    #[error(transparent)]
    Invalid(#[from] RequestError),

    #[error("plan not found")]
    NotFound,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Body of a plan creation call.
#[derive(Debug, Clone, Deserialize)]
pub struct NewPlanRequest {
    pub title: String,
    pub goal_text: String,
    #[serde(default)]
    pub deadline: Option<NaiveDate>,
    #[serde(flatten)]
    pub overrides: RequestOverrides,
}

/// Body of a regeneration call. Everything is optional; the plan's goal is
/// reused and its stored deadline applies when none is given.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegenerateRequest {
    #[serde(default)]
    pub deadline: Option<NaiveDate>,
    #[serde(flatten)]
    pub overrides: RequestOverrides,
}

/// Editable header fields. An explicit `"deadline": null` clears the
/// deadline; an absent key leaves it alone.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlanUpdate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub deadline: Option<Option<NaiveDate>>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// A plan header with its versions, newest first.
#[derive(Debug, Clone, Serialize)]
pub struct PlanWithVersions {
    #[serde(flatten)]
    pub plan: Plan,
    pub versions: Vec<PlanVersion>,
    pub latest_version: Option<PlanVersion>,
}

impl PlanWithVersions {
    fn new(plan: Plan, versions: Vec<PlanVersion>) -> Self {
        let latest_version = versions.first().cloned();
        Self {
            plan,
            versions,
            latest_version,
        }
    }
}

async fn generate_content(
    generator: &PlanGenerator,
    request: &LearningRequest,
) -> anyhow::Result<(GeneratedPlan, serde_json::Value)> {
    let (generated, _source) = generator.generate(request).await;
    let content = serde_json::to_value(&generated).context("failed to serialize plan content")?;
    Ok((generated, content))
}

/// Generate a new plan and make it the user's active one.
pub async fn create_plan(
    pool: &PgPool,
    generator: &PlanGenerator,
    user_id: Uuid,
    new: &NewPlanRequest,
) -> Result<PlanWithVersions, PlanServiceError> {
    validate_title(&new.title)?;
    let profile = profile_queries::get_profile(pool, user_id).await?;
    let request =
        LearningRequest::resolve(&new.goal_text, new.deadline, &new.overrides, profile.as_ref())?;

    let (generated, content) = generate_content(generator, &request).await?;

    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    if !user_queries::lock_user(&mut *tx, user_id).await? {
        return Err(anyhow::anyhow!("user {user_id} not found").into());
    }
    plan_queries::deactivate_other_plans(&mut *tx, user_id, None).await?;

    let plan = plan_queries::insert_plan(
        &mut *tx,
        &NewPlan {
            user_id,
            title: new.title.trim(),
            goal_text: &request.goal,
            deadline: new.deadline,
            is_active: true,
        },
    )
    .await?;

    let version = version_queries::insert_version(
        &mut *tx,
        &NewPlanVersion {
            plan_id: plan.id,
            version_number: 1,
            content_json: &content,
            prompt_used: &generated.prompt_used,
            model_used: &generated.model_used,
        },
    )
    .await?;

    tx.commit().await.context("failed to commit transaction")?;

    info!(
        %user_id,
        plan_id = %plan.id,
        model = %generated.model_used,
        "plan created"
    );

    Ok(PlanWithVersions::new(plan, vec![version]))
}

/// Generate a fresh version of an existing plan.
pub async fn regenerate_plan(
    pool: &PgPool,
    generator: &PlanGenerator,
    user_id: Uuid,
    plan_id: Uuid,
    regen: &RegenerateRequest,
) -> Result<PlanWithVersions, PlanServiceError> {
    let plan = plan_queries::get_plan_for_user(pool, plan_id, user_id)
        .await?
        .ok_or(PlanServiceError::NotFound)?;
    let profile = profile_queries::get_profile(pool, user_id).await?;

    let deadline = regen.deadline.or(plan.deadline);
    let request =
        LearningRequest::resolve(&plan.goal_text, deadline, &regen.overrides, profile.as_ref())?;

    let (generated, content) = generate_content(generator, &request).await?;

    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    // Locking the header serializes concurrent regenerations of one plan.
    let locked = plan_queries::lock_plan_for_user(&mut *tx, plan_id, user_id)
        .await?
        .ok_or(PlanServiceError::NotFound)?;

    let version_number = version_queries::next_version_number(&mut *tx, plan_id).await?;
    version_queries::insert_version(
        &mut *tx,
        &NewPlanVersion {
            plan_id,
            version_number,
            content_json: &content,
            prompt_used: &generated.prompt_used,
            model_used: &generated.model_used,
        },
    )
    .await?;

    if deadline.is_some() && deadline != locked.deadline {
        plan_queries::update_plan_header(
            &mut *tx,
            plan_id,
            &PlanHeaderUpdate {
                deadline: Some(deadline),
                ..Default::default()
            },
        )
        .await?;
    }

    tx.commit().await.context("failed to commit transaction")?;

    info!(
        %user_id,
        %plan_id,
        version = version_number,
        model = %generated.model_used,
        "plan regenerated"
    );

    get_plan_for_user(pool, user_id, plan_id).await
}

/// Edit header fields. Activating a plan deactivates the user's others.
pub async fn update_plan(
    pool: &PgPool,
    user_id: Uuid,
    plan_id: Uuid,
    update: &PlanUpdate,
) -> Result<PlanWithVersions, PlanServiceError> {
    if let Some(title) = &update.title {
        validate_title(title)?;
    }

    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    plan_queries::lock_plan_for_user(&mut *tx, plan_id, user_id)
        .await?
        .ok_or(PlanServiceError::NotFound)?;

    if update.is_active == Some(true) {
        plan_queries::deactivate_other_plans(&mut *tx, user_id, Some(plan_id)).await?;
    }

    plan_queries::update_plan_header(
        &mut *tx,
        plan_id,
        &PlanHeaderUpdate {
            title: update.title.as_deref().map(|t| t.trim().to_owned()),
            deadline: update.deadline,
            is_active: update.is_active,
        },
    )
    .await?;

    tx.commit().await.context("failed to commit transaction")?;

    get_plan_for_user(pool, user_id, plan_id).await
}

/// Delete a plan and its versions.
pub async fn delete_plan(pool: &PgPool, user_id: Uuid, plan_id: Uuid) -> Result<(), PlanServiceError> {
    if !plan_queries::delete_plan(pool, plan_id, user_id).await? {
        return Err(PlanServiceError::NotFound);
    }
    info!(%user_id, %plan_id, "plan deleted");
    Ok(())
}

/// A single plan of the user with its versions.
pub async fn get_plan_for_user(
    pool: &PgPool,
    user_id: Uuid,
    plan_id: Uuid,
) -> Result<PlanWithVersions, PlanServiceError> {
    let plan = plan_queries::get_plan_for_user(pool, plan_id, user_id)
        .await?
        .ok_or(PlanServiceError::NotFound)?;
    let versions = version_queries::list_versions(pool, plan_id).await?;
    Ok(PlanWithVersions::new(plan, versions))
}

/// All plans of the user, newest first, each with its versions.
pub async fn list_plans_for_user(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<Vec<PlanWithVersions>, PlanServiceError> {
    let plans = plan_queries::list_plans_for_user(pool, user_id).await?;
    let ids: Vec<Uuid> = plans.iter().map(|p| p.id).collect();

    let mut by_plan: HashMap<Uuid, Vec<PlanVersion>> = HashMap::new();
    for version in version_queries::list_versions_for_plans(pool, &ids).await? {
        by_plan.entry(version.plan_id).or_default().push(version);
    }

    Ok(plans
        .into_iter()
        .map(|plan| {
            let versions = by_plan.remove(&plan.id).unwrap_or_default();
            PlanWithVersions::new(plan, versions)
        })
        .collect())
}
