//! `studyplan user`: bootstrap accounts from the command line.

use anyhow::{Context, Result};
use sqlx::PgPool;

use studyplan_core::accounts::{self, AuthConfig, Registration};
use studyplan_db::models::{Role, User};
use studyplan_db::queries::users as user_queries;

/// Create an account with the given role. The password goes through the
/// same checks as self-registration.
pub async fn create_user(
    pool: &PgPool,
    auth: &AuthConfig,
    username: &str,
    email: &str,
    password: &str,
    role: Role,
) -> Result<User> {
    let reg = Registration {
        username: username.to_owned(),
        email: email.to_owned(),
        password: password.to_owned(),
        password_confirm: password.to_owned(),
        first_name: String::new(),
        last_name: String::new(),
    };
    let session = accounts::create_account(pool, auth, &reg, role)
        .await
        .with_context(|| format!("failed to create user {username}"))?;
    Ok(session.user.user)
}

/// Change the role of an existing account, looked up by username.
pub async fn set_role(pool: &PgPool, username: &str, role: Role) -> Result<User> {
    let user = user_queries::get_user_by_username(pool, username)
        .await?
        .with_context(|| format!("no user named {username}"))?;
    user_queries::set_user_role(pool, user.id, role).await?;
    user_queries::get_user(pool, user.id)
        .await?
        .with_context(|| format!("user {username} disappeared"))
}
