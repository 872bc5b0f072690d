//! HTTP middleware stack for the API.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (hub per request, HTTP context)
//! 2. `TraceLayer` (request span with status and latency)
//! 3. Request ID (add unique ID to each request)
//! 4. CORS (credentialed requests from the configured origins)
//! 5. Security headers
//! 6. Session layer (tower-sessions with `PostgreSQL` store)
//! 7. Rate limiting on auth and checkout routes (governor)

pub mod auth;
pub mod rate_limit;
pub mod request_id;
pub mod security_headers;
pub mod session;

pub use auth::{
    OptionalUser, RequireAdmin, RequireAgent, RequireUser, clear_current_user,
    remember_referral_code, remembered_referral_code, set_current_user,
};
pub use rate_limit::{auth_rate_limiter, checkout_rate_limiter};
pub use request_id::request_id_middleware;
pub use security_headers::security_headers_middleware;
pub use session::create_session_layer;
