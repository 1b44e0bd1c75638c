//! Registration, authentication and profile management.

use anyhow::Context;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use studyplan_db::models::{
    FocusArea, Language, ResourceType, Role, StudyLevel, StudyProfile, User, parse_tags,
};
use studyplan_db::queries::profiles::{self as profile_queries, ProfileUpdate};
use studyplan_db::queries::users::{self as user_queries, NewUser, UserUpdate};
use studyplan_db::queries::revoked_tokens;

use crate::generate::request::MAX_DAILY_MINUTES;
use crate::password::{self, PasswordError};
use crate::token::{self, TokenConfig, TokenError, TokenKind, TokenPair};

/// Credential settings shared by the account operations.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub tokens: TokenConfig,
    pub password_iterations: u32,
}

impl AuthConfig {
    pub fn new(tokens: TokenConfig) -> Self {
        Self {
            tokens,
            password_iterations: password::DEFAULT_ITERATIONS,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("{0}")]
    Invalid(String),

    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error("username {0:?} is already taken")]
    UsernameTaken(String),

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("invalid token: {0}")]
    InvalidToken(#[from] TokenError),

    #[error("token has been revoked")]
    Revoked,

    #[error("user not found or inactive")]
    Inactive,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Body of a registration call.
#[derive(Debug, Clone, Deserialize)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(alias = "password2")]
    pub password_confirm: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

/// A user with their study profile.
#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    #[serde(flatten)]
    pub user: User,
    pub study_profile: Option<StudyProfile>,
}

/// Result of a successful registration or login.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub user: UserProfile,
    pub tokens: TokenPair,
}

/// Partial profile edit. Tag lists are checked against the vocabularies.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileChanges {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub current_level: Option<StudyLevel>,
    pub daily_minutes: Option<i32>,
    pub preferred_language: Option<Language>,
    pub study_goal: Option<String>,
    pub focus_areas: Option<Vec<String>>,
    pub preferred_resources: Option<Vec<String>>,
}

fn validate_email(email: &str) -> Result<(), AccountError> {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err(AccountError::Invalid(format!("invalid email address {email:?}"))),
    }
}

/// Hash on the blocking pool; PBKDF2 would otherwise stall the runtime.
async fn hash_off_runtime(password: &str, iterations: u32) -> Result<String, AccountError> {
    let password = password.to_owned();
    let hashed = tokio::task::spawn_blocking(move || password::hash_password(&password, iterations))
        .await
        .context("password hashing task failed")??;
    Ok(hashed)
}

/// Verify on the blocking pool. An unparseable stored hash counts as a
/// failed check.
async fn verify_off_runtime(password: &str, stored: String) -> Result<bool, AccountError> {
    let password = password.to_owned();
    let result = tokio::task::spawn_blocking(move || password::verify_password(&password, &stored))
        .await
        .context("password verification task failed")?;
    Ok(result.unwrap_or_else(|e| {
        warn!(error = %e, "stored password hash is unusable");
        false
    }))
}

fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<sqlx::Error>()
            .and_then(|e| e.as_database_error())
            .is_some_and(|db| db.is_unique_violation())
    })
}

/// Create an account and its default study profile.
pub async fn register(
    pool: &PgPool,
    auth: &AuthConfig,
    reg: &Registration,
) -> Result<Session, AccountError> {
    create_account(pool, auth, reg, Role::User).await
}

/// Create an account with an explicit role. Used by `studyplan user create`.
pub async fn create_account(
    pool: &PgPool,
    auth: &AuthConfig,
    reg: &Registration,
    role: Role,
) -> Result<Session, AccountError> {
    let username = reg.username.trim();
    if username.is_empty() {
        return Err(AccountError::Invalid("username must not be empty".into()));
    }
    validate_email(&reg.email)?;
    password::validate_new_password(&reg.password, &reg.password_confirm)?;

    let password_hash = hash_off_runtime(&reg.password, auth.password_iterations).await?;

    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    if user_queries::username_exists(&mut *tx, username).await? {
        return Err(AccountError::UsernameTaken(username.to_owned()));
    }

    let user = user_queries::insert_user(
        &mut *tx,
        &NewUser {
            username,
            email: reg.email.trim(),
            password_hash: &password_hash,
            first_name: reg.first_name.trim(),
            last_name: reg.last_name.trim(),
            role,
        },
    )
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AccountError::UsernameTaken(username.to_owned())
        } else {
            AccountError::Internal(e)
        }
    })?;
    let profile = profile_queries::insert_default_profile(&mut *tx, user.id).await?;

    tx.commit().await.context("failed to commit transaction")?;

    info!(user_id = %user.id, username, %role, "account created");

    let tokens = token::issue_pair(&auth.tokens, user.id)?;
    Ok(Session {
        user: UserProfile {
            user,
            study_profile: Some(profile),
        },
        tokens,
    })
}

/// Check credentials and start a session.
pub async fn login(
    pool: &PgPool,
    auth: &AuthConfig,
    username: &str,
    password: &str,
) -> Result<Session, AccountError> {
    let user = user_queries::get_user_by_username(pool, username.trim()).await?;

    // Unknown usernames still pay for a full check.
    let stored = match &user {
        Some(user) => user.password_hash.clone(),
        None => password::dummy_hash(auth.password_iterations),
    };
    let matches = verify_off_runtime(password, stored).await?;

    let Some(user) = user.filter(|user| matches && user.is_active) else {
        return Err(AccountError::InvalidCredentials);
    };

    user_queries::record_login(pool, user.id).await?;
    let tokens = token::issue_pair(&auth.tokens, user.id)?;

    info!(user_id = %user.id, "login");

    Ok(Session {
        user: get_profile(pool, user.id).await?,
        tokens,
    })
}

/// Exchange a refresh token for a new access token.
pub async fn refresh(
    pool: &PgPool,
    auth: &AuthConfig,
    refresh_token: &str,
) -> Result<String, AccountError> {
    let claims = token::validate_token(&auth.tokens, TokenKind::Refresh, refresh_token)?;
    if revoked_tokens::is_revoked(pool, &token::token_digest(refresh_token)).await? {
        return Err(AccountError::Revoked);
    }
    active_user(pool, claims.user_id).await?;

    Ok(token::generate_token(
        &auth.tokens,
        TokenKind::Access,
        claims.user_id,
    )?)
}

/// Revoke a refresh token. Invalid tokens are ignored.
///
/// Denylist entries older than the refresh lifetime can only cover expired
/// tokens, so each logout also drops those.
pub async fn logout(
    pool: &PgPool,
    auth: &AuthConfig,
    refresh_token: &str,
) -> Result<(), AccountError> {
    match token::validate_token(&auth.tokens, TokenKind::Refresh, refresh_token) {
        Ok(claims) => {
            revoked_tokens::revoke(pool, &token::token_digest(refresh_token)).await?;
            info!(user_id = %claims.user_id, "logout");
        }
        Err(e) => warn!(error = %e, "logout with unusable refresh token"),
    }

    let purged =
        revoked_tokens::purge_revoked_before(pool, Utc::now() - auth.tokens.refresh_ttl).await?;
    if purged > 0 {
        info!(purged, "expired revoked tokens purged");
    }
    Ok(())
}

/// Resolve a bearer access token to an active user.
pub async fn authenticate(
    pool: &PgPool,
    auth: &AuthConfig,
    access_token: &str,
) -> Result<User, AccountError> {
    let claims = token::validate_token(&auth.tokens, TokenKind::Access, access_token)?;
    active_user(pool, claims.user_id).await
}

async fn active_user(pool: &PgPool, user_id: Uuid) -> Result<User, AccountError> {
    match user_queries::get_user(pool, user_id).await? {
        Some(user) if user.is_active => Ok(user),
        _ => Err(AccountError::Inactive),
    }
}

pub async fn get_profile(pool: &PgPool, user_id: Uuid) -> Result<UserProfile, AccountError> {
    let user = user_queries::get_user(pool, user_id)
        .await?
        .ok_or(AccountError::Inactive)?;
    let study_profile = profile_queries::get_profile(pool, user_id).await?;
    Ok(UserProfile {
        user,
        study_profile,
    })
}

/// Apply a partial edit to the user's names, email and study profile.
pub async fn update_profile(
    pool: &PgPool,
    user_id: Uuid,
    changes: &ProfileChanges,
) -> Result<UserProfile, AccountError> {
    if let Some(email) = &changes.email {
        validate_email(email)?;
    }
    if let Some(minutes) = changes.daily_minutes {
        if !(1..=MAX_DAILY_MINUTES as i32).contains(&minutes) {
            return Err(AccountError::Invalid(format!(
                "daily minutes must be between 1 and {MAX_DAILY_MINUTES}, got {minutes}"
            )));
        }
    }
    let focus_areas = changes
        .focus_areas
        .as_deref()
        .map(canonical_tags::<FocusArea>)
        .transpose()?;
    let preferred_resources = changes
        .preferred_resources
        .as_deref()
        .map(canonical_tags::<ResourceType>)
        .transpose()?;

    let user_update = UserUpdate {
        first_name: changes.first_name.clone(),
        last_name: changes.last_name.clone(),
        email: changes.email.as_deref().map(|e| e.trim().to_owned()),
    };

    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    user_queries::update_user(&mut *tx, user_id, &user_update).await?;

    let profile_update = ProfileUpdate {
        current_level: changes.current_level,
        daily_minutes: changes.daily_minutes,
        preferred_language: changes.preferred_language,
        study_goal: changes.study_goal.clone(),
        focus_areas,
        preferred_resources,
    };
    if !profile_update.is_empty() {
        profile_queries::upsert_profile(&mut tx, user_id, &profile_update).await?;
    }

    tx.commit().await.context("failed to commit transaction")?;

    get_profile(pool, user_id).await
}

/// Parse tags and render them back, dropping duplicates.
fn canonical_tags<T>(tags: &[String]) -> Result<Vec<String>, AccountError>
where
    T: std::str::FromStr<Err = studyplan_db::models::ParseEnumError> + std::fmt::Display + PartialEq,
{
    let parsed: Vec<T> = parse_tags(tags).map_err(|e| AccountError::Invalid(e.to_string()))?;
    let mut out: Vec<String> = Vec::with_capacity(parsed.len());
    for tag in parsed {
        let text = tag.to_string();
        if !out.contains(&text) {
            out.push(text);
        }
    }
    Ok(out)
}
