//! Nutmart API library.
//!
//! The storefront, back-office and agent dashboard share one JSON API. The
//! binary in `main.rs` wires configuration, tracing and Sentry around the
//! router built here, so the router can be exercised in-process by tests.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

use std::time::Duration;

use axum::{
    Router,
    extract::State,
    http::{HeaderValue, Method, Request, Response, StatusCode, header},
    routing::get,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::{DefaultOnResponse, OnResponse, TraceLayer};
use tower_sessions::{SessionManagerLayer, SessionStore};
use tracing::Span;

use crate::config::ApiConfig;
use crate::state::AppState;

/// Build the application router with its middleware stack.
///
/// Sentry layers are added by the binary, outside this stack.
pub fn app<S>(state: AppState, session_layer: SessionManagerLayer<S>) -> Router
where
    S: SessionStore + Clone,
{
    with_middleware(routes::routes(), state, session_layer)
}

fn with_middleware<S>(
    router: Router<AppState>,
    state: AppState,
    session_layer: SessionManagerLayer<S>,
) -> Router
where
    S: SessionStore + Clone,
{
    let cors = cors_layer(state.config());

    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .merge(router)
        .layer(session_layer)
        .layer(axum::middleware::from_fn(
            middleware::security_headers_middleware,
        ))
        .layer(cors)
        .layer(axum::middleware::from_fn(middleware::request_id_middleware))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = tracing::field::Empty,
                        status = tracing::field::Empty,
                        latency_ms = tracing::field::Empty,
                    )
                })
                .on_response(|response: &Response<_>, latency: Duration, span: &Span| {
                    span.record("status", response.status().as_u16());
                    span.record(
                        "latency_ms",
                        u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                    );
                    DefaultOnResponse::default().on_response(response, latency, span);
                }),
        )
        .with_state(state)
}

/// Credentialed CORS for the configured storefront and back-office origins.
fn cors_layer(config: &ApiConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true)
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable if the database is not reachable.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    match sqlx::query("SELECT 1").fetch_one(state.pool()).await {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::{
        body::{Body, to_bytes},
        extract::Path,
        routing::post,
    };
    use serde_json::{Value, json};
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;
    use tower_sessions::{MemoryStore, Session};

    use nutmart_core::{Email, UserId, UserRole};

    use super::*;
    use crate::middleware::set_current_user;
    use crate::models::CurrentUser;

    const CLIENT_IP: &str = "203.0.113.9";

    /// Log the session in with the given role.
    async fn login_as(session: Session, Path(role): Path<UserRole>) -> StatusCode {
        let user = CurrentUser {
            id: UserId::new(7),
            email: Email::parse("khach@nutmart.vn").unwrap(),
            full_name: "Phạm Minh Khoa".to_string(),
            role,
        };
        set_current_user(&session, &user).await.unwrap();
        StatusCode::NO_CONTENT
    }

    /// The app with an in-memory session store and a pool that never
    /// connects unless a handler reaches the database.
    fn test_app() -> Router {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://nutmart@localhost/nutmart_test")
            .unwrap();
        let state = AppState::new(ApiConfig::for_tests(), pool);
        let sessions = middleware::session::session_layer(MemoryStore::default(), false);
        let router = routes::routes().route("/test/login/{role}", post(login_as));
        with_middleware(router, state, sessions)
    }

    fn request(method: Method, uri: &str) -> axum::http::request::Builder {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("x-forwarded-for", CLIENT_IP)
    }

    /// Log in through the test route and return the session cookie.
    async fn session_cookie(app: &Router, role: &str) -> String {
        let response = app
            .clone()
            .oneshot(
                request(Method::POST, &format!("/test/login/{role}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let set_cookie = response.headers().get(header::SET_COOKIE).unwrap();
        set_cookie
            .to_str()
            .unwrap()
            .split(';')
            .next()
            .unwrap()
            .to_string()
    }

    async fn json_body(response: Response<Body>) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = test_app()
            .oneshot(request(Method::GET, "/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");
    }

    #[tokio::test]
    async fn test_guest_is_unauthorized_on_account_routes() {
        let app = test_app();
        for uri in ["/api/account/orders", "/api/agent/dashboard", "/api/admin/dashboard"] {
            let response = app
                .clone()
                .oneshot(request(Method::GET, uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");
            assert_eq!(json_body(response).await, json!({ "error": "Login required" }));
        }
    }

    #[tokio::test]
    async fn test_customer_is_forbidden_on_staff_routes() {
        let app = test_app();
        let cookie = session_cookie(&app, "customer").await;

        for uri in ["/api/agent/dashboard", "/api/admin/dashboard", "/api/admin/users"] {
            let response = app
                .clone()
                .oneshot(
                    request(Method::GET, uri)
                        .header(header::COOKIE, &cookie)
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::FORBIDDEN, "{uri}");
        }
    }

    #[tokio::test]
    async fn test_agent_is_forbidden_on_admin_routes() {
        let app = test_app();
        let cookie = session_cookie(&app, "sale").await;

        let response = app
            .oneshot(
                request(Method::PATCH, "/api/admin/orders/1/status")
                    .header(header::COOKIE, &cookie)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"status":"completed"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_empty_cart_is_rejected_before_the_database() {
        let body = json!({
            "items": [],
            "contact_name": "Lê Thu Hà",
            "contact_phone": "0912345678",
            "address": {
                "province": "Hà Nội",
                "district": "Ba Đình",
                "ward": "Kim Mã",
                "street": "12 Kim Mã"
            }
        });
        let response = test_app()
            .oneshot(
                request(Method::POST, "/api/checkout")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_invalid_phone_is_rejected() {
        let body = json!({
            "items": [{ "product_id": 1, "quantity": 2 }],
            "contact_name": "Lê Thu Hà",
            "contact_phone": "12345",
            "address": {
                "province": "Hà Nội",
                "district": "Ba Đình",
                "ward": "Kim Mã",
                "street": "12 Kim Mã"
            }
        });
        let response = test_app()
            .oneshot(
                request(Method::POST, "/api/checkout")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn test_malformed_body_is_unprocessable() {
        let response = test_app()
            .oneshot(
                request(Method::POST, "/api/checkout")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"items": "many"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_package_checkout_requires_login() {
        let response = test_app()
            .oneshot(
                request(Method::POST, "/api/checkout/package")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_bad_path_id_is_rejected() {
        let app = test_app();
        let cookie = session_cookie(&app, "admin").await;

        let response = app
            .oneshot(
                request(Method::GET, "/api/admin/orders/abc")
                    .header(header::COOKIE, &cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_referral_code_format_is_not_found() {
        let response = test_app()
            .oneshot(
                request(Method::GET, "/api/referrals/no!")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_only_credential_routes_are_throttled() {
        let app = test_app();
        let send = |method: Method, uri: &'static str, body: &'static str| {
            app.clone().oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .header("x-forwarded-for", "198.51.100.20")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
        };

        for _ in 0..8 {
            let response = send(Method::GET, "/api/auth/me", "").await.unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }
        for _ in 0..8 {
            let response = send(Method::POST, "/api/auth/logout", "").await.unwrap();
            assert_ne!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        }

        let mut statuses = Vec::new();
        for _ in 0..6 {
            statuses.push(send(Method::POST, "/api/auth/login", "{}").await.unwrap().status());
        }
        let (last, first) = statuses.split_last().unwrap();
        assert!(first.iter().all(|s| *s == StatusCode::UNPROCESSABLE_ENTITY));
        assert_eq!(*last, StatusCode::TOO_MANY_REQUESTS);
    }
}
