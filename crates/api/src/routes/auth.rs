//! Authentication route handlers.
//!
//! Email and password accounts. The session carries a `CurrentUser`; the
//! referral code remembered from a `?ref=` link is honored at sign-up.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use crate::db::{RepositoryError, UserRepository};
use crate::error::{Result, clear_sentry_user, set_sentry_user};
use crate::middleware::{RequireUser, clear_current_user, remembered_referral_code, set_current_user};
use crate::models::{CurrentUser, User};
use crate::services::auth::{AuthService, Registration};
use crate::state::AppState;

/// Login form data.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

async fn start_session(session: &Session, user: &User) -> Result<()> {
    let current = CurrentUser::from(user);
    set_current_user(session, &current).await?;
    set_sentry_user(&current);
    Ok(())
}

/// Create a customer account and log it in.
///
/// POST /api/auth/register
#[instrument(skip(state, session, form))]
pub async fn register(
    State(state): State<AppState>,
    session: Session,
    Json(form): Json<Registration>,
) -> Result<(StatusCode, Json<User>)> {
    let link_code = remembered_referral_code(&session).await;
    let user = AuthService::new(state.pool())
        .register(&form, link_code.as_ref())
        .await?;

    start_session(&session, &user).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// Log in with email and password.
///
/// POST /api/auth/login
#[instrument(skip(state, session, form))]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Json(form): Json<LoginForm>,
) -> Result<Json<User>> {
    let user = AuthService::new(state.pool())
        .login(&form.email, &form.password)
        .await?;

    start_session(&session, &user).await?;
    Ok(Json(user))
}

/// Log out.
///
/// POST /api/auth/logout
pub async fn logout(session: Session) -> Result<StatusCode> {
    clear_current_user(&session).await?;
    clear_sentry_user();
    Ok(StatusCode::NO_CONTENT)
}

/// The logged-in account, read fresh so wallet and role are current.
///
/// GET /api/auth/me
pub async fn me(
    State(state): State<AppState>,
    RequireUser(current): RequireUser,
) -> Result<Json<User>> {
    let user = UserRepository::new(state.pool())
        .get_by_id(current.id)
        .await?
        .ok_or(RepositoryError::NotFound)?;
    Ok(Json(user))
}
