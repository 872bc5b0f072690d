//! Back-office routes. Every handler requires the admin role.
//!
//! ```text
//! GET|POST          /banners                - List, create
//! PATCH|DELETE      /banners/{id}           - Update, delete
//! GET|POST          /blogs                  - List any status, create
//! GET|PATCH|DELETE  /blogs/{id}             - Get, update, delete
//! GET|POST          /events                 - List, create
//! PATCH|DELETE      /events/{id}            - Update, delete
//! GET|POST          /products               - List inactive too, create
//! GET|PATCH|DELETE  /products/{id}          - Get, update, delete
//! GET|POST          /packages               - List, create
//! PATCH|DELETE      /packages/{id}          - Update, delete
//! GET               /users                  - List (role, q, page)
//! GET|PATCH         /users/{id}             - Get, update role/tier/rate/manager/active
//! GET               /orders                 - List (status, kind, q, from, to, page)
//! GET               /orders/{id}            - Detail with items and history
//! PATCH             /orders/{id}/status     - Change status
//! GET|PUT           /shipping               - Config, save settings
//! POST              /shipping/zones         - Create zone
//! PUT|DELETE        /shipping/zones/{id}    - Replace, delete zone
//! GET|POST          /voucher-rules          - List, create
//! PATCH|DELETE      /voucher-rules/{id}     - Update, delete
//! GET|POST          /vouchers               - List, issue
//! GET|POST          /tiers                  - List, create
//! PATCH|DELETE      /tiers/{id}             - Update, delete
//! GET               /withdrawals            - List (status, page)
//! POST              /withdrawals/{id}/approve
//! POST              /withdrawals/{id}/reject
//! GET               /dashboard              - Order counts, month revenue
//! ```

pub mod affiliate;
pub mod catalog;
pub mod content;
pub mod orders;
pub mod shipping;
pub mod users;

use axum::{
    Router,
    routing::{get, patch, post, put},
};

use crate::state::AppState;

/// Create the admin routes router.
pub fn routes() -> Router<AppState> {
    Router::new()
        // Content
        .route(
            "/banners",
            get(content::list_banners).post(content::create_banner),
        )
        .route(
            "/banners/{id}",
            patch(content::update_banner).delete(content::delete_banner),
        )
        .route("/blogs", get(content::list_blogs).post(content::create_blog))
        .route(
            "/blogs/{id}",
            get(content::get_blog)
                .patch(content::update_blog)
                .delete(content::delete_blog),
        )
        .route(
            "/events",
            get(content::list_events).post(content::create_event),
        )
        .route(
            "/events/{id}",
            patch(content::update_event).delete(content::delete_event),
        )
        // Catalog
        .route(
            "/products",
            get(catalog::list_products).post(catalog::create_product),
        )
        .route(
            "/products/{id}",
            get(catalog::get_product)
                .patch(catalog::update_product)
                .delete(catalog::delete_product),
        )
        .route(
            "/packages",
            get(catalog::list_packages).post(catalog::create_package),
        )
        .route(
            "/packages/{id}",
            patch(catalog::update_package).delete(catalog::delete_package),
        )
        // Users and orders
        .route("/users", get(users::list_users))
        .route("/users/{id}", get(users::get_user).patch(users::update_user))
        .route("/orders", get(orders::list_orders))
        .route("/orders/{id}", get(orders::get_order))
        .route("/orders/{id}/status", patch(orders::change_status))
        .route("/dashboard", get(orders::dashboard))
        // Shipping
        .route(
            "/shipping",
            get(shipping::config).put(shipping::save_settings),
        )
        .route("/shipping/zones", post(shipping::create_zone))
        .route(
            "/shipping/zones/{id}",
            put(shipping::replace_zone).delete(shipping::delete_zone),
        )
        // Affiliate programme
        .route(
            "/voucher-rules",
            get(affiliate::list_rules).post(affiliate::create_rule),
        )
        .route(
            "/voucher-rules/{id}",
            patch(affiliate::update_rule).delete(affiliate::delete_rule),
        )
        .route(
            "/vouchers",
            get(affiliate::list_vouchers).post(affiliate::issue_voucher),
        )
        .route(
            "/tiers",
            get(affiliate::list_tiers).post(affiliate::create_tier),
        )
        .route(
            "/tiers/{id}",
            patch(affiliate::update_tier).delete(affiliate::delete_tier),
        )
        .route("/withdrawals", get(affiliate::list_withdrawals))
        .route(
            "/withdrawals/{id}/approve",
            post(affiliate::approve_withdrawal),
        )
        .route(
            "/withdrawals/{id}/reject",
            post(affiliate::reject_withdrawal),
        )
}
