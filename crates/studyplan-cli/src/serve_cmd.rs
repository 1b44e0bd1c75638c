use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::body::Bytes;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{FromRequest, FromRequestParts, Path, Query, Request, State};
use axum::http::request::Parts;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use tracing::error;
use uuid::Uuid;

use studyplan_core::accounts::{self, AccountError, AuthConfig, ProfileChanges, Registration};
use studyplan_core::admin::{self, AdminError};
use studyplan_core::generate::PlanGenerator;
use studyplan_core::plan::{
    self as plan_service, NewPlanRequest, PlanServiceError, PlanUpdate, RegenerateRequest,
};
use studyplan_core::throttle::{GenerationThrottle, Throttled};
use studyplan_db::models::{Role, User};
use studyplan_db::queries::users::UserFilter;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Shared by every handler. Cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub auth: Arc<AuthConfig>,
    pub generator: Arc<PlanGenerator>,
    pub throttle: Arc<GenerationThrottle>,
}

impl AppState {
    pub fn new(pool: PgPool, auth: AuthConfig, generator: PlanGenerator) -> Self {
        Self {
            pool,
            auth: Arc::new(auth),
            generator: Arc::new(generator),
            throttle: Arc::new(GenerationThrottle::default()),
        }
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, msg)
    }

    /// The cause chain goes to the log only; clients get a fixed message.
    pub fn internal(err: anyhow::Error) -> Self {
        error!(error = %format!("{err:#}"), "request failed");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let body = json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

impl From<AccountError> for AppError {
    fn from(err: AccountError) -> Self {
        let status = match &err {
            AccountError::Invalid(_) | AccountError::Password(_) => StatusCode::BAD_REQUEST,
            AccountError::UsernameTaken(_) => StatusCode::CONFLICT,
            AccountError::InvalidCredentials
            | AccountError::InvalidToken(_)
            | AccountError::Revoked
            | AccountError::Inactive => StatusCode::UNAUTHORIZED,
            AccountError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        match err {
            AccountError::Internal(e) => Self::internal(e),
            other => Self::new(status, other.to_string()),
        }
    }
}

impl From<PlanServiceError> for AppError {
    fn from(err: PlanServiceError) -> Self {
        match err {
            PlanServiceError::Invalid(e) => Self::bad_request(e.to_string()),
            PlanServiceError::NotFound => Self::new(StatusCode::NOT_FOUND, "plan not found"),
            PlanServiceError::Internal(e) => Self::internal(e),
        }
    }
}

impl From<AdminError> for AppError {
    fn from(err: AdminError) -> Self {
        match err {
            AdminError::Forbidden | AdminError::Protected(_) => {
                Self::new(StatusCode::FORBIDDEN, err.to_string())
            }
            AdminError::NotFound => Self::new(StatusCode::NOT_FOUND, err.to_string()),
            AdminError::Internal(e) => Self::internal(e),
        }
    }
}

impl From<Throttled> for AppError {
    fn from(err: Throttled) -> Self {
        Self::new(StatusCode::TOO_MANY_REQUESTS, err.to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

// ---------------------------------------------------------------------------
// Extractors
// ---------------------------------------------------------------------------

/// `Json` whose rejections render as [`AppError`].
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

/// `Path` whose rejections render as [`AppError`].
pub struct ApiPath<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}

/// Parse an optional JSON body: an empty body yields `T::default()`.
fn optional_json<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| AppError::bad_request(format!("invalid JSON body: {e}")))
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then(|| token.trim())
        .filter(|t| !t.is_empty())
}

/// The active user behind the request's bearer access token.
pub struct AuthUser(pub User);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or_else(|| {
            AppError::unauthorized("authentication credentials were not provided")
        })?;
        let user = accounts::authenticate(&state.pool, &state.auth, token).await?;
        Ok(Self(user))
    }
}

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshBody {
    pub refresh: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct LogoutBody {
    #[serde(default)]
    pub refresh: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UserListQuery {
    pub search: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

impl From<UserListQuery> for UserFilter {
    fn from(q: UserListQuery) -> Self {
        Self {
            search: q.search.filter(|s| !s.trim().is_empty()),
            role: q.role,
            is_active: q.is_active,
        }
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/refresh", post(refresh))
        .route("/api/auth/logout", post(logout))
        .route(
            "/api/profile",
            get(get_profile).put(update_profile).patch(update_profile),
        )
        .route(
            "/api/profile/",
            get(get_profile).put(update_profile).patch(update_profile),
        )
        .route("/api/plans", get(list_plans).post(create_plan))
        .route("/api/plans/", get(list_plans).post(create_plan))
        .route(
            "/api/plans/{id}",
            get(get_plan).patch(update_plan).delete(delete_plan),
        )
        .route("/api/plans/{id}/regenerate", post(regenerate_plan))
        .route("/api/admin/users", get(admin_list_users))
        .route(
            "/api/admin/users/{id}",
            get(admin_user_detail).delete(admin_delete_user),
        )
        .route("/api/admin/users/{id}/deactivate", post(admin_deactivate_user))
        .route("/api/admin/users/{id}/delete", delete(admin_delete_user))
        .route("/api/admin/metrics", get(admin_metrics))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub async fn run_serve(state: AppState, bind: &str, port: u16) -> Result<()> {
    let mode = if state.generator.is_mock() { "mock" } else { "external" };
    let app = build_router(state);
    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    tracing::info!(generator = mode, "studyplan serve listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("studyplan serve shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
}

// ---------------------------------------------------------------------------
// Handlers: auth and profile
// ---------------------------------------------------------------------------

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "mock_mode": state.generator.is_mock(),
    }))
}

async fn register(
    State(state): State<AppState>,
    ApiJson(reg): ApiJson<Registration>,
) -> Result<axum::response::Response, AppError> {
    let session = accounts::register(&state.pool, &state.auth, &reg).await?;
    Ok((StatusCode::CREATED, Json(session)).into_response())
}

async fn login(
    State(state): State<AppState>,
    ApiJson(creds): ApiJson<Credentials>,
) -> Result<axum::response::Response, AppError> {
    let session = accounts::login(&state.pool, &state.auth, &creds.username, &creds.password).await?;
    Ok(Json(session).into_response())
}

async fn refresh(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<RefreshBody>,
) -> Result<axum::response::Response, AppError> {
    let access = accounts::refresh(&state.pool, &state.auth, &body.refresh).await?;
    Ok(Json(json!({ "access": access })).into_response())
}

async fn logout(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    body: Bytes,
) -> Result<axum::response::Response, AppError> {
    // A missing or unusable refresh token still logs out.
    let body: LogoutBody = optional_json(&body).unwrap_or_default();
    if let Some(token) = body.refresh {
        accounts::logout(&state.pool, &state.auth, &token).await?;
    }
    Ok(Json(json!({ "message": "Successfully logged out" })).into_response())
}

async fn get_profile(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<axum::response::Response, AppError> {
    let profile = accounts::get_profile(&state.pool, user.id).await?;
    Ok(Json(profile).into_response())
}

async fn update_profile(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiJson(changes): ApiJson<ProfileChanges>,
) -> Result<axum::response::Response, AppError> {
    let profile = accounts::update_profile(&state.pool, user.id, &changes).await?;
    Ok(Json(profile).into_response())
}

// ---------------------------------------------------------------------------
// Handlers: plans
// ---------------------------------------------------------------------------

async fn list_plans(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<axum::response::Response, AppError> {
    let plans = plan_service::list_plans_for_user(&state.pool, user.id).await?;
    Ok(Json(plans).into_response())
}

async fn create_plan(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiJson(new): ApiJson<NewPlanRequest>,
) -> Result<axum::response::Response, AppError> {
    state.throttle.check(user.id)?;
    let plan = plan_service::create_plan(&state.pool, &state.generator, user.id, &new).await?;
    Ok((StatusCode::CREATED, Json(plan)).into_response())
}

async fn get_plan(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<axum::response::Response, AppError> {
    let plan = plan_service::get_plan_for_user(&state.pool, user.id, id).await?;
    Ok(Json(plan).into_response())
}

async fn update_plan(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(update): ApiJson<PlanUpdate>,
) -> Result<axum::response::Response, AppError> {
    let plan = plan_service::update_plan(&state.pool, user.id, id, &update).await?;
    Ok(Json(plan).into_response())
}

async fn delete_plan(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<axum::response::Response, AppError> {
    plan_service::delete_plan(&state.pool, user.id, id).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn regenerate_plan(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    body: Bytes,
) -> Result<axum::response::Response, AppError> {
    let regen: RegenerateRequest = optional_json(&body)?;
    state.throttle.check(user.id)?;
    let plan =
        plan_service::regenerate_plan(&state.pool, &state.generator, user.id, id, &regen).await?;
    Ok(Json(plan).into_response())
}

// ---------------------------------------------------------------------------
// Handlers: admin
// ---------------------------------------------------------------------------

async fn admin_list_users(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    query: Result<Query<UserListQuery>, QueryRejection>,
) -> Result<axum::response::Response, AppError> {
    let Query(query) = query?;
    let users = admin::list_users(&state.pool, &actor, &query.into()).await?;
    Ok(Json(users).into_response())
}

async fn admin_user_detail(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<axum::response::Response, AppError> {
    let detail = admin::user_detail(&state.pool, &actor, id).await?;
    Ok(Json(detail).into_response())
}

async fn admin_deactivate_user(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<axum::response::Response, AppError> {
    let user = admin::deactivate_user(&state.pool, &actor, id).await?;
    Ok(Json(json!({ "message": format!("User {} deactivated", user.username) })).into_response())
}

async fn admin_delete_user(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<axum::response::Response, AppError> {
    admin::delete_user(&state.pool, &actor, id).await?;
    Ok(Json(json!({ "message": format!("User {id} deleted") })).into_response())
}

async fn admin_metrics(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
) -> Result<axum::response::Response, AppError> {
    let metrics = admin::metrics(&state.pool, &actor).await?;
    Ok(Json(metrics).into_response())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
