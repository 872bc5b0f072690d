//! Cookie sessions.
//!
//! Logins and remembered referral codes live in the session. Production keeps
//! sessions in `PostgreSQL` (the `tower_sessions.session` table is created by
//! migration); router tests swap in a memory store.

use sqlx::PgPool;
use tower_sessions::{
    Expiry, SessionManagerLayer, SessionStore,
    cookie::{SameSite, time::Duration},
};
use tower_sessions_sqlx_store::PostgresStore;

use crate::config::ApiConfig;

/// Session cookie name.
pub const SESSION_COOKIE_NAME: &str = "nm_session";

/// A session idle for this long is dropped.
const IDLE_TIMEOUT: Duration = Duration::days(7);

/// Session layer over any store.
///
/// The cookie is `HttpOnly` and `SameSite=Lax`; `secure` should follow
/// whether the API is served over HTTPS.
pub fn session_layer<S>(store: S, secure: bool) -> SessionManagerLayer<S>
where
    S: SessionStore + Clone,
{
    SessionManagerLayer::new(store)
        .with_name(SESSION_COOKIE_NAME)
        .with_path("/")
        .with_http_only(true)
        .with_same_site(SameSite::Lax)
        .with_secure(secure)
        .with_expiry(Expiry::OnInactivity(IDLE_TIMEOUT))
}

/// Session layer backed by `PostgreSQL`.
#[must_use]
pub fn create_session_layer(pool: &PgPool, config: &ApiConfig) -> SessionManagerLayer<PostgresStore> {
    session_layer(PostgresStore::new(pool.clone()), config.is_secure())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::{
        Router,
        body::Body,
        http::{Request, header::SET_COOKIE},
        routing::post,
    };
    use tower::ServiceExt;
    use tower_sessions::{MemoryStore, Session};

    use super::*;

    async fn touch(session: Session) -> &'static str {
        session.insert("seen", true).await.unwrap();
        "ok"
    }

    async fn set_cookie(secure: bool) -> String {
        let app = Router::new()
            .route("/", post(touch))
            .layer(session_layer(MemoryStore::default(), secure));
        let response = app
            .oneshot(Request::post("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        response
            .headers()
            .get(SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn test_cookie_attributes() {
        let cookie = set_cookie(false).await;
        assert!(cookie.starts_with("nm_session="));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Path=/"));
        assert!(!cookie.contains("Secure"));

        assert!(set_cookie(true).await.contains("Secure"));
    }
}
