//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                         - Liveness
//! GET  /health/ready                   - Database reachability
//!
//! # Storefront
//! GET  /api/banners?position=          - Banners on display
//! GET  /api/blogs                      - Published posts
//! GET  /api/blogs/{slug}               - Post with rendered content
//! GET  /api/events                     - Upcoming events
//! GET  /api/products                   - Active products
//! GET  /api/products/{slug}            - Product detail
//! GET  /api/categories                 - Product categories
//! GET  /api/packages                   - Active packages
//! GET  /api/referrals/{code}           - Resolve and remember a referral code
//! POST /api/shipping/quote             - Shipping fee (rate limited)
//! POST /api/checkout                   - Place a product order (rate limited)
//! POST /api/checkout/package           - Buy a package (login, rate limited)
//!
//! # Auth (rate limited)
//! POST /api/auth/register
//! POST /api/auth/login
//! POST /api/auth/logout
//! GET  /api/auth/me
//!
//! # Account (login)
//! GET  /api/account/orders
//! GET  /api/account/orders/{id}
//! POST /api/account/orders/{id}/cancel
//! GET  /api/account/vouchers
//!
//! # Agent (sale role)
//! GET  /api/agent/dashboard
//! GET  /api/agent/orders
//! GET  /api/agent/commissions
//! GET|POST /api/agent/collaborators
//! DELETE   /api/agent/collaborators/{id}
//! GET|POST /api/agent/withdrawals
//!
//! # Admin (admin role)
//! /api/admin/...                       - See [`admin`]
//! ```

pub mod account;
pub mod admin;
pub mod agent;
pub mod auth;
pub mod catalog;
pub mod checkout;
pub mod content;

use axum::{
    Router,
    routing::{delete, get, post},
};
use serde::Deserialize;

use crate::db::PageRequest;
use crate::middleware::{auth_rate_limiter, checkout_rate_limiter};
use crate::state::AppState;

/// `?page=&per_page=` for list endpoints.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl PageQuery {
    /// The clamped page request.
    #[must_use]
    pub fn request(self) -> PageRequest {
        PageRequest::new(self.page, self.per_page)
    }
}

/// Create the storefront routes router.
pub fn storefront_routes() -> Router<AppState> {
    let ordering = Router::new()
        .route("/shipping/quote", post(checkout::quote))
        .route("/checkout", post(checkout::checkout))
        .route("/checkout/package", post(checkout::checkout_package))
        .layer(checkout_rate_limiter());

    Router::new()
        .route("/banners", get(content::banners))
        .route("/blogs", get(content::blogs))
        .route("/blogs/{slug}", get(content::blog))
        .route("/events", get(content::events))
        .route("/products", get(catalog::products))
        .route("/products/{slug}", get(catalog::product))
        .route("/categories", get(catalog::categories))
        .route("/packages", get(catalog::packages))
        .route("/referrals/{code}", get(checkout::referral))
        .merge(ordering)
}

/// Create the auth routes router.
///
/// Only the endpoints that check or create credentials are throttled.
pub fn auth_routes() -> Router<AppState> {
    let credentials = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .layer(auth_rate_limiter());

    Router::new()
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me))
        .merge(credentials)
}

/// Create the account routes router.
pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/orders", get(account::orders))
        .route("/orders/{id}", get(account::order))
        .route("/orders/{id}/cancel", post(account::cancel_order))
        .route("/vouchers", get(account::vouchers))
}

/// Create the agent routes router.
pub fn agent_routes() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(agent::dashboard))
        .route("/orders", get(agent::orders))
        .route("/commissions", get(agent::commissions))
        .route(
            "/collaborators",
            get(agent::collaborators).post(agent::attach_collaborator),
        )
        .route("/collaborators/{id}", delete(agent::detach_collaborator))
        .route(
            "/withdrawals",
            get(agent::withdrawals).post(agent::request_withdrawal),
        )
}

/// Create all `/api` routes.
pub fn routes() -> Router<AppState> {
    let api = Router::new()
        .merge(storefront_routes())
        .nest("/auth", auth_routes())
        .nest("/account", account_routes())
        .nest("/agent", agent_routes())
        .nest("/admin", admin::routes());

    Router::new().nest("/api", api)
}
