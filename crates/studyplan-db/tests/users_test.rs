//! Integration tests for users, profiles, admin aggregates and token revocation.

use chrono::{Duration, Utc};

use studyplan_db::models::{Language, Role, StudyLevel};
use studyplan_db::queries::plans::{self, NewPlan};
use studyplan_db::queries::profiles::{self, ProfileUpdate};
use studyplan_db::queries::users::{self, NewUser, UserFilter, UserUpdate};
use studyplan_db::queries::{metrics, revoked_tokens};
use studyplan_test_utils::TestDb;

fn new_user<'a>(username: &'a str, email: &'a str, role: Role) -> NewUser<'a> {
    NewUser {
        username,
        email,
        password_hash: "hash",
        first_name: "",
        last_name: "",
        role,
    }
}

#[tokio::test]
async fn duplicate_username_is_rejected() {
    let db = TestDb::new().await;

    users::insert_user(&db.pool, &new_user("ann", "ann@example.com", Role::User))
        .await
        .unwrap();
    assert!(users::username_exists(&db.pool, "ann").await.unwrap());
    assert!(!users::username_exists(&db.pool, "bob").await.unwrap());

    let err = users::insert_user(&db.pool, &new_user("ann", "other@example.com", Role::User))
        .await
        .unwrap_err();
    assert!(format!("{err:#}").contains("ann"), "{err:#}");

    db.drop().await;
}

#[tokio::test]
async fn default_profile_then_partial_upsert() {
    let db = TestDb::new().await;
    let user = users::insert_user(&db.pool, &new_user("ann", "ann@example.com", Role::User))
        .await
        .unwrap();

    let profile = profiles::insert_default_profile(&db.pool, user.id).await.unwrap();
    assert_eq!(profile.current_level, StudyLevel::Beginner);
    assert_eq!(profile.daily_minutes, 30);
    assert_eq!(profile.preferred_language, Language::En);
    assert!(profile.focus_areas.is_empty());

    let updated = profiles::upsert_profile(
        &db.pool,
        user.id,
        &ProfileUpdate {
            daily_minutes: Some(45),
            focus_areas: Some(vec!["grammar".into(), "reading".into()]),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(updated.daily_minutes, 45);
    assert_eq!(updated.current_level, StudyLevel::Beginner, "untouched");
    assert_eq!(updated.focus_areas, vec!["grammar", "reading"]);

    db.drop().await;
}

#[tokio::test]
async fn upsert_creates_missing_profile() {
    let db = TestDb::new().await;
    let user = users::insert_user(&db.pool, &new_user("ann", "ann@example.com", Role::User))
        .await
        .unwrap();
    assert!(profiles::get_profile(&db.pool, user.id).await.unwrap().is_none());

    let created = profiles::upsert_profile(
        &db.pool,
        user.id,
        &ProfileUpdate {
            current_level: Some(StudyLevel::Advanced),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(created.current_level, StudyLevel::Advanced);
    assert_eq!(created.daily_minutes, 30);

    db.drop().await;
}

#[tokio::test]
async fn update_user_keeps_unset_fields() {
    let db = TestDb::new().await;
    let user = users::insert_user(&db.pool, &new_user("ann", "ann@example.com", Role::User))
        .await
        .unwrap();

    let updated = users::update_user(
        &db.pool,
        user.id,
        &UserUpdate {
            first_name: Some("Ann".into()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(updated.first_name, "Ann");
    assert_eq!(updated.email, "ann@example.com");

    db.drop().await;
}

#[tokio::test]
async fn list_users_filters_and_plan_stats() {
    let db = TestDb::new().await;
    let ann = users::insert_user(&db.pool, &new_user("ann", "ann@example.com", Role::User))
        .await
        .unwrap();
    let boss = users::insert_user(&db.pool, &new_user("boss", "boss@corp.io", Role::SuperAdmin))
        .await
        .unwrap();
    users::insert_user(&db.pool, &new_user("carl_x", "carl@example.com", Role::Admin))
        .await
        .unwrap();
    users::set_user_active(&db.pool, boss.id, false).await.unwrap();

    let all = users::list_users(&db.pool, &UserFilter::default()).await.unwrap();
    assert_eq!(all.len(), 3);

    let by_search = users::list_users(
        &db.pool,
        &UserFilter {
            search: Some("EXAMPLE".into()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(by_search.len(), 2);

    // Underscore is literal, not a wildcard.
    let literal = users::list_users(
        &db.pool,
        &UserFilter {
            search: Some("l_x".into()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(literal.len(), 1);

    let inactive_supers = users::list_users(
        &db.pool,
        &UserFilter {
            search: None,
            role: Some(Role::SuperAdmin),
            is_active: Some(false),
        },
    )
    .await
    .unwrap();
    assert_eq!(inactive_supers.len(), 1);
    assert_eq!(inactive_supers[0].id, boss.id);

    for title in ["One", "Two"] {
        plans::insert_plan(
            &db.pool,
            &NewPlan {
                user_id: ann.id,
                title,
                goal_text: "goal",
                deadline: None,
                is_active: false,
            },
        )
        .await
        .unwrap();
    }
    let stats = users::plan_stats_for_users(&db.pool, &[ann.id, boss.id]).await.unwrap();
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].user_id, ann.id);
    assert_eq!(stats[0].plans_count, 2);
    assert!(stats[0].last_plan_created.is_some());

    let totals = metrics::user_totals(&db.pool).await.unwrap();
    assert_eq!(totals.total, 3);
    assert_eq!(totals.active, 2);
    assert_eq!(metrics::count_plans(&db.pool).await.unwrap(), 2);

    db.drop().await;
}

#[tokio::test]
async fn per_day_counts_group_by_utc_date() {
    let db = TestDb::new().await;
    let ann = users::insert_user(&db.pool, &new_user("ann", "ann@example.com", Role::User))
        .await
        .unwrap();
    users::record_login(&db.pool, ann.id).await.unwrap();

    let plan = plans::insert_plan(
        &db.pool,
        &NewPlan {
            user_id: ann.id,
            title: "Old",
            goal_text: "goal",
            deadline: None,
            is_active: false,
        },
    )
    .await
    .unwrap();
    sqlx::query("UPDATE plans SET created_at = now() - interval '40 days' WHERE id = $1")
        .bind(plan.id)
        .execute(&db.pool)
        .await
        .unwrap();
    plans::insert_plan(
        &db.pool,
        &NewPlan {
            user_id: ann.id,
            title: "New",
            goal_text: "goal",
            deadline: None,
            is_active: true,
        },
    )
    .await
    .unwrap();

    let today = Utc::now().date_naive();
    let since = today - Duration::days(29);

    let plans_by_day = metrics::plans_per_day(&db.pool, since).await.unwrap();
    assert_eq!(plans_by_day, vec![(today, 1)]);

    let logins = metrics::logins_per_day(&db.pool, since).await.unwrap();
    assert_eq!(logins, vec![(today, 1)]);

    db.drop().await;
}

#[tokio::test]
async fn revoked_tokens_roundtrip_and_purge() {
    let db = TestDb::new().await;

    assert!(!revoked_tokens::is_revoked(&db.pool, "abc").await.unwrap());
    revoked_tokens::revoke(&db.pool, "abc").await.unwrap();
    revoked_tokens::revoke(&db.pool, "abc").await.unwrap();
    assert!(revoked_tokens::is_revoked(&db.pool, "abc").await.unwrap());

    let purged = revoked_tokens::purge_revoked_before(&db.pool, Utc::now() + Duration::minutes(1))
        .await
        .unwrap();
    assert_eq!(purged, 1);
    assert!(!revoked_tokens::is_revoked(&db.pool, "abc").await.unwrap());

    db.drop().await;
}
