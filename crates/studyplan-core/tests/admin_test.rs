//! Integration tests for the super-admin operations.

use chrono::{Duration, Utc};
use sqlx::PgPool;

use studyplan_core::accounts::{self, AuthConfig, Registration};
use studyplan_core::admin::{self, AdminError};
use studyplan_core::generate::{PlanGenerator, RequestOverrides};
use studyplan_core::plan::{self, NewPlanRequest};
use studyplan_core::token::TokenConfig;
use studyplan_db::models::{Role, User};
use studyplan_db::queries::users::{self, UserFilter};
use studyplan_test_utils::TestDb;

async fn account(pool: &PgPool, username: &str, role: Role) -> User {
    let auth = AuthConfig {
        tokens: TokenConfig::new(b"admin-test-secret".to_vec()),
        password_iterations: 1_000,
    };
    let reg = Registration {
        username: username.to_owned(),
        email: format!("{username}@example.com"),
        password: "s3cure-pass".to_owned(),
        password_confirm: "s3cure-pass".to_owned(),
        first_name: String::new(),
        last_name: String::new(),
    };
    accounts::create_account(pool, &auth, &reg, role)
        .await
        .unwrap()
        .user
        .user
}

async fn add_plan(pool: &PgPool, user: &User, title: &str) {
    plan::create_plan(
        pool,
        &PlanGenerator::mock(),
        user.id,
        &NewPlanRequest {
            title: title.to_owned(),
            goal_text: "Learn".to_owned(),
            deadline: None,
            overrides: RequestOverrides::default(),
        },
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn only_super_admins_pass() {
    let db = TestDb::new().await;
    let admin_user = account(&db.pool, "helper", Role::Admin).await;

    assert!(matches!(
        admin::list_users(&db.pool, &admin_user, &UserFilter::default()).await,
        Err(AdminError::Forbidden)
    ));
    assert!(matches!(
        admin::metrics(&db.pool, &admin_user).await,
        Err(AdminError::Forbidden)
    ));

    db.drop().await;
}

#[tokio::test]
async fn listing_includes_plan_stats() {
    let db = TestDb::new().await;
    let boss = account(&db.pool, "boss", Role::SuperAdmin).await;
    let ann = account(&db.pool, "ann", Role::User).await;
    account(&db.pool, "bob", Role::User).await;
    add_plan(&db.pool, &ann, "One").await;
    add_plan(&db.pool, &ann, "Two").await;

    let listed = admin::list_users(&db.pool, &boss, &UserFilter::default())
        .await
        .unwrap();
    assert_eq!(listed.len(), 3);
    let ann_row = listed.iter().find(|s| s.user.id == ann.id).unwrap();
    assert_eq!(ann_row.plans_count, 2);
    assert!(ann_row.last_plan_created.is_some());
    assert_eq!(ann_row.study_profile.as_ref().unwrap().daily_minutes, 30);
    let bob_row = listed.iter().find(|s| s.user.username == "bob").unwrap();
    assert_eq!(bob_row.plans_count, 0);
    assert!(bob_row.last_plan_created.is_none());

    let filtered = admin::list_users(
        &db.pool,
        &boss,
        &UserFilter {
            search: Some("AN".into()),
            role: Some(Role::User),
            is_active: Some(true),
        },
    )
    .await
    .unwrap();
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].user.id, ann.id);

    db.drop().await;
}

#[tokio::test]
async fn detail_summarizes_versions() {
    let db = TestDb::new().await;
    let boss = account(&db.pool, "boss", Role::SuperAdmin).await;
    let ann = account(&db.pool, "ann", Role::User).await;
    add_plan(&db.pool, &ann, "One").await;

    let detail = admin::user_detail(&db.pool, &boss, ann.id).await.unwrap();
    assert_eq!(detail.plans.len(), 1);
    assert_eq!(detail.plans[0].versions_count, 1);
    let latest = detail.plans[0].latest_version.as_ref().unwrap();
    assert_eq!(latest.version_number, 1);
    assert_eq!(latest.model_used, "mock-mode");
    assert!(detail.study_profile.is_some());

    assert!(matches!(
        admin::user_detail(&db.pool, &boss, uuid::Uuid::new_v4()).await,
        Err(AdminError::NotFound)
    ));

    db.drop().await;
}

#[tokio::test]
async fn deactivate_and_delete_protect_super_admins() {
    let db = TestDb::new().await;
    let boss = account(&db.pool, "boss", Role::SuperAdmin).await;
    let other_boss = account(&db.pool, "boss2", Role::SuperAdmin).await;
    let ann = account(&db.pool, "ann", Role::User).await;
    add_plan(&db.pool, &ann, "One").await;

    assert!(matches!(
        admin::deactivate_user(&db.pool, &boss, other_boss.id).await,
        Err(AdminError::Protected(_))
    ));
    assert!(matches!(
        admin::delete_user(&db.pool, &boss, other_boss.id).await,
        Err(AdminError::Protected(_))
    ));

    let deactivated = admin::deactivate_user(&db.pool, &boss, ann.id).await.unwrap();
    assert!(!deactivated.is_active);

    admin::delete_user(&db.pool, &boss, ann.id).await.unwrap();
    assert!(users::get_user(&db.pool, ann.id).await.unwrap().is_none());
    assert!(
        plan::list_plans_for_user(&db.pool, ann.id)
            .await
            .unwrap()
            .is_empty()
    );
    assert!(matches!(
        admin::delete_user(&db.pool, &boss, ann.id).await,
        Err(AdminError::NotFound)
    ));

    db.drop().await;
}

#[tokio::test]
async fn metrics_count_recent_activity() {
    let db = TestDb::new().await;
    let boss = account(&db.pool, "boss", Role::SuperAdmin).await;
    let ann = account(&db.pool, "ann", Role::User).await;
    let bob = account(&db.pool, "bob", Role::User).await;
    users::set_user_active(&db.pool, bob.id, false).await.unwrap();
    users::record_login(&db.pool, ann.id).await.unwrap();

    add_plan(&db.pool, &ann, "Today").await;
    add_plan(&db.pool, &ann, "Last week").await;
    add_plan(&db.pool, &ann, "Long ago").await;
    sqlx::query(
        "UPDATE plans SET created_at = now() - interval '3 days' WHERE title = 'Last week'",
    )
    .execute(&db.pool)
    .await
    .unwrap();
    sqlx::query("UPDATE plans SET created_at = now() - interval '60 days' WHERE title = 'Long ago'")
        .execute(&db.pool)
        .await
        .unwrap();

    let today = Utc::now().date_naive();
    let m = admin::metrics_on(&db.pool, today).await.unwrap();
    assert_eq!(m.total_users, 3);
    assert_eq!(m.active_users, 2);
    assert_eq!(m.total_plans, 3);
    assert_eq!(m.plans_today, 1);
    assert_eq!(m.plans_this_week, 2);
    assert_eq!(m.plans_this_month, 2);
    assert_eq!(m.active_users_today, 1);
    assert_eq!(m.active_users_this_week, 1);
    assert_eq!(m.plans_by_day.len(), 30);
    assert_eq!(m.plans_by_day[&today], 1);
    assert_eq!(m.plans_by_day[&(today - Duration::days(3))], 1);
    assert_eq!(m.users_by_day[&today], 1);

    // The guarded entry point agrees.
    assert_eq!(admin::metrics(&db.pool, &boss).await.unwrap(), m);

    db.drop().await;
}
