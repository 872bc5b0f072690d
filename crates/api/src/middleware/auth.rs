//! Authentication extractors.
//!
//! Each portal has its extractor: `RequireUser` for account routes,
//! `RequireAdmin` for the back-office and `RequireAgent` for the agent
//! dashboard. Rejections are JSON like every other API error.

use axum::{
    Json,
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use serde_json::json;
use tower_sessions::Session;

use nutmart_core::{ReferralCode, UserRole};

use crate::models::{CurrentUser, session_keys};

/// Error returned when a route needs a login or a role the caller lacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRejection {
    /// Not logged in.
    Unauthorized,
    /// Logged in without the required role.
    Forbidden,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "Login required"),
            Self::Forbidden => (StatusCode::FORBIDDEN, "You do not have access to this page"),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

async fn current_user(parts: &Parts) -> Option<CurrentUser> {
    let session = parts.extensions.get::<Session>()?;
    session
        .get::<CurrentUser>(session_keys::CURRENT_USER)
        .await
        .ok()
        .flatten()
}

/// Extractor that requires a logged-in user of any role.
///
/// # Example
///
/// ```rust,ignore
/// async fn my_orders(RequireUser(user): RequireUser) -> impl IntoResponse {
///     format!("Orders of {}", user.email)
/// }
/// ```
pub struct RequireUser(pub CurrentUser);

impl<S> FromRequestParts<S> for RequireUser
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        current_user(parts)
            .await
            .map(Self)
            .ok_or(AuthRejection::Unauthorized)
    }
}

/// Extractor that optionally gets the current user.
///
/// Unlike `RequireUser`, this does not reject guests.
pub struct OptionalUser(pub Option<CurrentUser>);

impl<S> FromRequestParts<S> for OptionalUser
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(current_user(parts).await))
    }
}

/// Extractor that requires an admin.
pub struct RequireAdmin(pub CurrentUser);

impl<S> FromRequestParts<S> for RequireAdmin
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = current_user(parts)
            .await
            .ok_or(AuthRejection::Unauthorized)?;
        if user.role != UserRole::Admin {
            return Err(AuthRejection::Forbidden);
        }
        Ok(Self(user))
    }
}

/// Extractor that requires a sale agent.
pub struct RequireAgent(pub CurrentUser);

impl<S> FromRequestParts<S> for RequireAgent
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = current_user(parts)
            .await
            .ok_or(AuthRejection::Unauthorized)?;
        if !user.role.is_agent() {
            return Err(AuthRejection::Forbidden);
        }
        Ok(Self(user))
    }
}

/// Helper to set the current user in the session.
///
/// The session ID is cycled first so a pre-login session cannot be fixated.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_current_user(
    session: &Session,
    user: &CurrentUser,
) -> Result<(), tower_sessions::session::Error> {
    session.cycle_id().await?;
    session.insert(session_keys::CURRENT_USER, user).await
}

/// Helper to clear the current user from the session (logout).
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn clear_current_user(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session
        .remove::<CurrentUser>(session_keys::CURRENT_USER)
        .await?;
    Ok(())
}

/// Remember the referral code of a `?ref=` link for later checkout or
/// sign-up.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn remember_referral_code(
    session: &Session,
    code: &ReferralCode,
) -> Result<(), tower_sessions::session::Error> {
    session.insert(session_keys::REFERRAL_CODE, code).await
}

/// The referral code remembered in this session, if any.
pub async fn remembered_referral_code(session: &Session) -> Option<ReferralCode> {
    session
        .get::<ReferralCode>(session_keys::REFERRAL_CODE)
        .await
        .ok()
        .flatten()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use axum::http::Request;
    use tower_sessions::MemoryStore;

    use nutmart_core::{Email, UserId};

    use super::*;

    fn user(role: UserRole) -> CurrentUser {
        CurrentUser {
            id: UserId::new(1),
            email: Email::parse("an@nutmart.vn").unwrap(),
            full_name: "Nguyễn Văn An".to_string(),
            role,
        }
    }

    async fn parts_with(user: Option<CurrentUser>) -> Parts {
        let session = Session::new(None, Arc::new(MemoryStore::default()), None);
        if let Some(user) = user {
            session
                .insert(session_keys::CURRENT_USER, &user)
                .await
                .unwrap();
        }
        let (mut parts, ()) = Request::builder().uri("/").body(()).unwrap().into_parts();
        parts.extensions.insert(session);
        parts
    }

    #[tokio::test]
    async fn test_guest_is_unauthorized() {
        let mut parts = parts_with(None).await;
        let rejection = RequireUser::from_request_parts(&mut parts, &())
            .await
            .err()
            .unwrap();
        assert_eq!(rejection, AuthRejection::Unauthorized);

        let OptionalUser(guest) = OptionalUser::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert!(guest.is_none());
    }

    #[tokio::test]
    async fn test_role_guards() {
        let mut parts = parts_with(Some(user(UserRole::Customer))).await;
        assert_eq!(
            RequireAdmin::from_request_parts(&mut parts, &()).await.err(),
            Some(AuthRejection::Forbidden)
        );
        assert_eq!(
            RequireAgent::from_request_parts(&mut parts, &()).await.err(),
            Some(AuthRejection::Forbidden)
        );

        let mut parts = parts_with(Some(user(UserRole::Sale))).await;
        assert!(RequireAgent::from_request_parts(&mut parts, &()).await.is_ok());
        assert!(RequireAdmin::from_request_parts(&mut parts, &()).await.is_err());

        let mut parts = parts_with(Some(user(UserRole::Admin))).await;
        let RequireAdmin(admin) = RequireAdmin::from_request_parts(&mut parts, &())
            .await
            .ok()
            .unwrap();
        assert_eq!(admin.role, UserRole::Admin);
    }

    #[tokio::test]
    async fn test_rejection_status() {
        assert_eq!(
            AuthRejection::Unauthorized.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthRejection::Forbidden.into_response().status(),
            StatusCode::FORBIDDEN
        );
    }
}
