//! Integration tests for the plan service layer, in mock generation mode.

use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

use studyplan_core::generate::{GeneratedPlan, PlanGenerator, RequestOverrides};
use studyplan_core::plan::{
    self, NewPlanRequest, PlanServiceError, PlanUpdate, RegenerateRequest,
};
use studyplan_db::models::Role;
use studyplan_db::queries::profiles::{self, ProfileUpdate};
use studyplan_db::queries::users::{self, NewUser};
use studyplan_test_utils::TestDb;

async fn seed_user(pool: &PgPool, username: &str) -> Uuid {
    let user = users::insert_user(
        pool,
        &NewUser {
            username,
            email: "learner@example.com",
            password_hash: "unused",
            first_name: "",
            last_name: "",
            role: Role::User,
        },
    )
    .await
    .unwrap();
    profiles::insert_default_profile(pool, user.id).await.unwrap();
    user.id
}

fn ielts(title: &str) -> NewPlanRequest {
    NewPlanRequest {
        title: title.to_owned(),
        goal_text: "IELTS".to_owned(),
        deadline: None,
        overrides: RequestOverrides {
            current_level: None,
            daily_minutes: Some(60),
            focus_areas: Some(vec!["reading".into(), "writing".into()]),
            preferred_resources: Some(vec!["videos".into(), "books".into()]),
        },
    }
}

#[tokio::test]
async fn create_plan_stores_version_one() {
    let db = TestDb::new().await;
    let user_id = seed_user(&db.pool, "ann").await;
    let generator = PlanGenerator::mock();

    let created = plan::create_plan(&db.pool, &generator, user_id, &ielts("IELTS prep"))
        .await
        .unwrap();

    assert!(created.plan.is_active);
    assert_eq!(created.plan.title, "IELTS prep");
    assert_eq!(created.versions.len(), 1);
    let version = created.latest_version.as_ref().unwrap();
    assert_eq!(version.version_number, 1);
    assert_eq!(version.model_used, "mock-mode");

    let content: GeneratedPlan = serde_json::from_value(version.content_json.clone()).unwrap();
    assert_eq!(content.content.weekly_roadmap.len(), 12);
    assert_eq!(content.content.daily_tasks.len(), 14);
    assert_eq!(content.content.topics.len(), 20);
    assert_eq!(content.content.resources.len(), 2);
    assert_eq!(content.content.checkpoints.len(), 4);
    assert!(content.prompt_used.contains("Daily Available Time: 60 minutes"));
    assert_eq!(version.prompt_used, content.prompt_used);

    db.drop().await;
}

#[tokio::test]
async fn second_plan_leaves_one_active() {
    let db = TestDb::new().await;
    let user_id = seed_user(&db.pool, "ann").await;
    let generator = PlanGenerator::mock();

    let first = plan::create_plan(&db.pool, &generator, user_id, &ielts("First"))
        .await
        .unwrap();
    let second = plan::create_plan(&db.pool, &generator, user_id, &ielts("Second"))
        .await
        .unwrap();

    let listed = plan::list_plans_for_user(&db.pool, user_id).await.unwrap();
    assert_eq!(listed.len(), 2);
    let active: Vec<Uuid> = listed
        .iter()
        .filter(|p| p.plan.is_active)
        .map(|p| p.plan.id)
        .collect();
    assert_eq!(active, vec![second.plan.id]);
    assert!(listed.iter().any(|p| p.plan.id == first.plan.id && !p.plan.is_active));
    assert!(listed.iter().all(|p| p.versions.len() == 1));

    db.drop().await;
}

#[tokio::test]
async fn regenerate_appends_next_version() {
    let db = TestDb::new().await;
    let user_id = seed_user(&db.pool, "ann").await;
    let generator = PlanGenerator::mock();

    let created = plan::create_plan(&db.pool, &generator, user_id, &ielts("IELTS"))
        .await
        .unwrap();

    let deadline = NaiveDate::from_ymd_opt(2027, 5, 1).unwrap();
    let regenerated = plan::regenerate_plan(
        &db.pool,
        &generator,
        user_id,
        created.plan.id,
        &RegenerateRequest {
            deadline: Some(deadline),
            overrides: RequestOverrides {
                daily_minutes: Some(60),
                focus_areas: Some(vec!["reading".into(), "writing".into()]),
                preferred_resources: Some(vec!["videos".into(), "books".into()]),
                ..Default::default()
            },
        },
    )
    .await
    .unwrap();

    let numbers: Vec<i32> = regenerated.versions.iter().map(|v| v.version_number).collect();
    assert_eq!(numbers, vec![2, 1]);
    assert_eq!(regenerated.latest_version.as_ref().unwrap().version_number, 2);
    assert_eq!(regenerated.plan.deadline, Some(deadline));

    // Mock output only differs in the prompt (the deadline line).
    let v1: GeneratedPlan =
        serde_json::from_value(regenerated.versions[1].content_json.clone()).unwrap();
    let v2: GeneratedPlan =
        serde_json::from_value(regenerated.versions[0].content_json.clone()).unwrap();
    assert_eq!(v1.content, v2.content);
    assert!(v2.prompt_used.contains("Deadline: 2027-05-01"));

    // The stored deadline is reused when none is given.
    let third = plan::regenerate_plan(
        &db.pool,
        &generator,
        user_id,
        created.plan.id,
        &RegenerateRequest::default(),
    )
    .await
    .unwrap();
    assert_eq!(third.versions.len(), 3);
    assert_eq!(third.plan.deadline, Some(deadline));
    assert!(
        third.versions[0]
            .prompt_used
            .contains("Deadline: 2027-05-01")
    );

    db.drop().await;
}

#[tokio::test]
async fn regenerate_uses_profile_when_no_overrides() {
    let db = TestDb::new().await;
    let user_id = seed_user(&db.pool, "ann").await;
    profiles::upsert_profile(
        &db.pool,
        user_id,
        &ProfileUpdate {
            daily_minutes: Some(25),
            focus_areas: Some(vec!["grammar".into()]),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    let generator = PlanGenerator::mock();

    let created = plan::create_plan(
        &db.pool,
        &generator,
        user_id,
        &NewPlanRequest {
            title: "Grammar".into(),
            goal_text: "Master tenses".into(),
            deadline: None,
            overrides: RequestOverrides::default(),
        },
    )
    .await
    .unwrap();

    let content: GeneratedPlan =
        serde_json::from_value(created.versions[0].content_json.clone()).unwrap();
    let first_day = &content.content.daily_tasks[0];
    assert_eq!(first_day.tasks.len(), 1);
    assert_eq!(first_day.tasks[0].estimated_minutes, 12);
    assert!(content.prompt_used.contains("Focus Areas: grammar"));

    db.drop().await;
}

#[tokio::test]
async fn invalid_requests_are_rejected_before_generation() {
    let db = TestDb::new().await;
    let user_id = seed_user(&db.pool, "ann").await;
    let generator = PlanGenerator::mock();

    let mut long_title = ielts("x");
    long_title.title = "x".repeat(201);
    let mut bad_minutes = ielts("ok");
    bad_minutes.overrides.daily_minutes = Some(0);
    let mut bad_tag = ielts("ok");
    bad_tag.overrides.focus_areas = Some(vec!["juggling".into()]);
    let mut blank_goal = ielts("ok");
    blank_goal.goal_text = "  ".into();

    for req in [long_title, bad_minutes, bad_tag, blank_goal] {
        let err = plan::create_plan(&db.pool, &generator, user_id, &req)
            .await
            .unwrap_err();
        assert!(matches!(err, PlanServiceError::Invalid(_)), "{err:?}");
    }
    assert!(plan::list_plans_for_user(&db.pool, user_id).await.unwrap().is_empty());

    db.drop().await;
}

#[tokio::test]
async fn plans_of_other_users_are_not_found() {
    let db = TestDb::new().await;
    let ann = seed_user(&db.pool, "ann").await;
    let bob = seed_user(&db.pool, "bob").await;
    let generator = PlanGenerator::mock();

    let created = plan::create_plan(&db.pool, &generator, ann, &ielts("Mine"))
        .await
        .unwrap();
    let id = created.plan.id;

    assert!(matches!(
        plan::get_plan_for_user(&db.pool, bob, id).await,
        Err(PlanServiceError::NotFound)
    ));
    assert!(matches!(
        plan::regenerate_plan(&db.pool, &generator, bob, id, &RegenerateRequest::default()).await,
        Err(PlanServiceError::NotFound)
    ));
    assert!(matches!(
        plan::update_plan(&db.pool, bob, id, &PlanUpdate::default()).await,
        Err(PlanServiceError::NotFound)
    ));
    assert!(matches!(
        plan::delete_plan(&db.pool, bob, id).await,
        Err(PlanServiceError::NotFound)
    ));

    plan::delete_plan(&db.pool, ann, id).await.unwrap();
    assert!(matches!(
        plan::get_plan_for_user(&db.pool, ann, id).await,
        Err(PlanServiceError::NotFound)
    ));

    db.drop().await;
}

#[tokio::test]
async fn update_reactivates_and_edits_header() {
    let db = TestDb::new().await;
    let user_id = seed_user(&db.pool, "ann").await;
    let generator = PlanGenerator::mock();

    let first = plan::create_plan(&db.pool, &generator, user_id, &ielts("First"))
        .await
        .unwrap();
    plan::create_plan(&db.pool, &generator, user_id, &ielts("Second"))
        .await
        .unwrap();

    let deadline = NaiveDate::from_ymd_opt(2027, 1, 1).unwrap();
    let updated = plan::update_plan(
        &db.pool,
        user_id,
        first.plan.id,
        &PlanUpdate {
            title: Some("  Renamed ".into()),
            deadline: Some(Some(deadline)),
            is_active: Some(true),
        },
    )
    .await
    .unwrap();
    assert_eq!(updated.plan.title, "Renamed");
    assert_eq!(updated.plan.deadline, Some(deadline));
    assert!(updated.plan.is_active);

    let active: Vec<_> = plan::list_plans_for_user(&db.pool, user_id)
        .await
        .unwrap()
        .into_iter()
        .filter(|p| p.plan.is_active)
        .collect();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].plan.id, first.plan.id);

    let too_long = plan::update_plan(
        &db.pool,
        user_id,
        first.plan.id,
        &PlanUpdate {
            title: Some("y".repeat(300)),
            ..Default::default()
        },
    )
    .await;
    assert!(matches!(too_long, Err(PlanServiceError::Invalid(_))));

    db.drop().await;
}
