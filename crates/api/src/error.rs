//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures server errors to Sentry
//! before responding to the client. All route handlers return
//! `Result<T, AppError>`; the body is always `{"error": "<message>"}`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::models::{CurrentUser, ValidationError};
use crate::services::affiliate::AffiliateError;
use crate::services::auth::AuthError;
use crate::services::checkout::CheckoutError;
use crate::services::lifecycle::LifecycleError;
use crate::services::shipping::ShippingServiceError;

/// Application-level error type for the API.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Authentication operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Order placement failed.
    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    /// Order status change failed.
    #[error("Order error: {0}")]
    Lifecycle(#[from] LifecycleError),

    /// Agent or withdrawal operation failed.
    #[error("Affiliate error: {0}")]
    Affiliate(#[from] AffiliateError),

    /// Shipping configuration failed.
    #[error("Shipping error: {0}")]
    Shipping(#[from] ShippingServiceError),

    /// Session store failed.
    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    /// Request body failed validation.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// User is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// User lacks the role for this portal.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Conflicts with the current state of a resource.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Rate limited.
    #[error("Rate limited")]
    RateLimited,

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

fn repository_status(err: &RepositoryError) -> StatusCode {
    match err {
        RepositoryError::NotFound => StatusCode::NOT_FOUND,
        RepositoryError::Conflict(_) => StatusCode::CONFLICT,
        RepositoryError::Database(_) | RepositoryError::DataCorruption(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn repository_message(err: &RepositoryError) -> String {
    match err {
        RepositoryError::NotFound => "Not found".to_string(),
        RepositoryError::Conflict(msg) => msg.clone(),
        RepositoryError::Database(_) | RepositoryError::DataCorruption(_) => {
            "Internal server error".to_string()
        }
    }
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Database(err) => repository_status(err),
            Self::Internal(_) | Self::Session(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Auth(err) => match err {
                AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
                AuthError::AccountDisabled => StatusCode::FORBIDDEN,
                AuthError::UserAlreadyExists => StatusCode::CONFLICT,
                AuthError::InvalidEmail(_)
                | AuthError::InvalidPhone(_)
                | AuthError::MissingName
                | AuthError::WeakPassword(_)
                | AuthError::UnknownReferralCode => StatusCode::BAD_REQUEST,
                AuthError::Repository(err) => repository_status(err),
                AuthError::PasswordHash => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Checkout(err) => match err {
                CheckoutError::Repository(err) => repository_status(err),
                CheckoutError::ShippingTable(_) => StatusCode::INTERNAL_SERVER_ERROR,
                CheckoutError::InsufficientStock { .. } => StatusCode::CONFLICT,
                CheckoutError::ProductUnavailable(_) | CheckoutError::PackageUnavailable => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                _ => StatusCode::BAD_REQUEST,
            },
            Self::Lifecycle(err) => match err {
                LifecycleError::Transition(_) | LifecycleError::Concurrent => StatusCode::CONFLICT,
                LifecycleError::Repository(err) => repository_status(err),
            },
            Self::Affiliate(err) => match err {
                AffiliateError::Validation(_) | AffiliateError::InvalidManager(_) => {
                    StatusCode::BAD_REQUEST
                }
                AffiliateError::InsufficientBalance | AffiliateError::AlreadyProcessed => {
                    StatusCode::CONFLICT
                }
                AffiliateError::UnknownUser => StatusCode::NOT_FOUND,
                AffiliateError::Repository(err) => repository_status(err),
            },
            Self::Shipping(err) => match err {
                ShippingServiceError::Invalid(_) => StatusCode::BAD_REQUEST,
                ShippingServiceError::Repository(err) => repository_status(err),
            },
            Self::Validation(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    /// Message shown to the client. Server errors never leak details.
    fn public_message(&self) -> String {
        if self.status().is_server_error() {
            return "Internal server error".to_string();
        }
        match self {
            Self::Database(err) => repository_message(err),
            Self::Auth(AuthError::Repository(err))
            | Self::Checkout(CheckoutError::Repository(err))
            | Self::Lifecycle(LifecycleError::Repository(err))
            | Self::Affiliate(AffiliateError::Repository(err))
            | Self::Shipping(ShippingServiceError::Repository(err)) => repository_message(err),
            Self::Auth(AuthError::InvalidCredentials) => "Invalid email or password".to_string(),
            Self::Auth(AuthError::UserAlreadyExists) => {
                "An account with this email already exists".to_string()
            }
            Self::Auth(err) => err.to_string(),
            Self::Checkout(err) => err.to_string(),
            Self::Lifecycle(err) => err.to_string(),
            Self::Affiliate(err) => err.to_string(),
            Self::Shipping(err) => err.to_string(),
            Self::Validation(err) => err.to_string(),
            Self::Session(_) => "Internal server error".to_string(),
            Self::NotFound(msg)
            | Self::Unauthorized(msg)
            | Self::Forbidden(msg)
            | Self::BadRequest(msg)
            | Self::Conflict(msg)
            | Self::Internal(msg) => msg.clone(),
            Self::RateLimited => "Too many requests, slow down".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        (status, Json(json!({ "error": self.public_message() }))).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Attach the logged-in user to later Sentry events on this hub.
pub fn set_sentry_user(user: &CurrentUser) {
    let user = sentry::User {
        id: Some(user.id.to_string()),
        email: Some(user.email.to_string()),
        ..Default::default()
    };
    sentry::configure_scope(|scope| scope.set_user(Some(user)));
}

/// Forget the Sentry user after logout.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| scope.set_user(None));
}

/// Record a business event so error reports show what led up to them.
pub fn add_breadcrumb(category: &str, message: &str, data: &[(&str, &str)]) {
    sentry::add_breadcrumb(sentry::Breadcrumb {
        category: Some(category.to_owned()),
        message: Some(message.to_owned()),
        data: data
            .iter()
            .map(|(k, v)| ((*k).to_owned(), serde_json::Value::from(*v)))
            .collect(),
        ..Default::default()
    });
}
