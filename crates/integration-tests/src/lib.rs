//! Integration tests for Nutmart.
//!
//! The tests drive a running API server over HTTP, one cookie jar per
//! actor, and use the database directly only to create the first admin.
//!
//! # Running Tests
//!
//! ```bash
//! # Start the database and apply migrations
//! nutmart-cli migrate
//!
//! # Start the server
//! cargo run -p nutmart-api
//!
//! # Run integration tests
//! cargo test -p nutmart-integration-tests -- --ignored
//! ```
//!
//! # Environment Variables
//!
//! - `NUTMART_BASE_URL` - API server URL (default `http://localhost:3000`)
//! - `DATABASE_URL` - Database the server uses

#![allow(clippy::missing_panics_doc)]

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, Response, StatusCode};
use secrecy::SecretString;
use serde_json::{Value, json};
use sqlx::PgPool;
use uuid::Uuid;

use nutmart_api::db::{self, UserRepository, users::NewUserRecord};
use nutmart_api::services::auth::hash_password;
use nutmart_core::{Email, Money, UserRole};

/// Password used for every account the tests create.
pub const PASSWORD: &str = "hat-dieu-rang-muoi";

/// Shared handles for one test.
pub struct TestContext {
    pub base_url: String,
    pub pool: PgPool,
}

/// A logged-in client and the user behind it.
pub struct Actor {
    pub client: Client,
    pub user: Value,
}

impl Actor {
    /// The user's numeric ID.
    #[must_use]
    pub fn id(&self) -> i64 {
        self.user["id"].as_i64().expect("user has an id")
    }
}

impl TestContext {
    /// Connect to the database the server uses.
    pub async fn new() -> Self {
        let base_url = std::env::var("NUTMART_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:3000".to_string());
        let database_url = std::env::var("DATABASE_URL")
            .map(SecretString::from)
            .expect("DATABASE_URL must be set");
        let pool = db::create_pool(&database_url)
            .await
            .expect("Failed to connect to database");
        Self { base_url, pool }
    }

    /// Absolute URL for an `/api` path.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}/api{path}", self.base_url)
    }

    /// A fresh client with its own cookie jar.
    ///
    /// Every client presents a different forwarded address so the per-IP
    /// rate limits on login and checkout do not throttle parallel tests.
    #[must_use]
    pub fn client(&self) -> Client {
        let [a, b, c, ..] = Uuid::new_v4().into_bytes();
        let ip = format!("10.{a}.{b}.{c}");
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_str(&ip).expect("valid header value"),
        );
        Client::builder()
            .cookie_store(true)
            .default_headers(headers)
            .build()
            .expect("Failed to create HTTP client")
    }

    /// Log a client in.
    pub async fn login(&self, client: &Client, email: &str) -> Value {
        let resp = client
            .post(self.url("/auth/login"))
            .json(&json!({ "email": email, "password": PASSWORD }))
            .send()
            .await
            .expect("Failed to log in");
        expect_status(resp, StatusCode::OK).await
    }

    /// Create an admin account in the database and log it in.
    pub async fn admin(&self) -> Actor {
        let email = unique_email("admin");
        UserRepository::new(&self.pool)
            .create(&NewUserRecord {
                email: Email::parse(&email).expect("valid email"),
                password_hash: hash_password(PASSWORD).expect("hash password"),
                full_name: "Quản trị viên".to_string(),
                phone: None,
                role: UserRole::Admin,
                referral_code: None,
                referred_by: None,
            })
            .await
            .expect("Failed to create admin");

        let client = self.client();
        let user = self.login(&client, &email).await;
        Actor { client, user }
    }

    /// Register a customer through the API.
    pub async fn customer(&self) -> Actor {
        let client = self.client();
        let resp = client
            .post(self.url("/auth/register"))
            .json(&json!({
                "email": unique_email("khach"),
                "password": PASSWORD,
                "full_name": "Nguyễn Thị Mai",
                "phone": "0901234567",
            }))
            .send()
            .await
            .expect("Failed to register");
        let user = expect_status(resp, StatusCode::CREATED).await;
        Actor { client, user }
    }

    /// Register a customer and have `admin` make them a sale agent earning
    /// `rate_percent` on their own sales.
    pub async fn agent(&self, admin: &Actor, rate_percent: u32) -> Actor {
        let mut agent = self.customer().await;
        let resp = admin
            .client
            .patch(self.url(&format!("/admin/users/{}", agent.id())))
            .json(&json!({ "role": "sale", "personal_rate": rate_percent }))
            .send()
            .await
            .expect("Failed to promote agent");
        agent.user = expect_status(resp, StatusCode::OK).await;
        agent
    }

    /// Have `admin` put `user` under `manager`.
    pub async fn set_manager(&self, admin: &Actor, user: &Actor, manager: &Actor) -> Value {
        let resp = admin
            .client
            .patch(self.url(&format!("/admin/users/{}", user.id())))
            .json(&json!({ "manager_id": manager.id() }))
            .send()
            .await
            .expect("Failed to assign manager");
        expect_status(resp, StatusCode::OK).await
    }

    /// Check out `quantity` of `product` as a guest using `agent`'s referral code.
    pub async fn referred_order(
        &self,
        agent: &Actor,
        product: &Value,
        quantity: u32,
        province: &str,
    ) -> Value {
        let mut body = Self::checkout_body(product, quantity, province);
        body["referral_code"] = self.dashboard(agent).await["referral_code"].clone();
        let resp = self
            .client()
            .post(self.url("/checkout"))
            .json(&body)
            .send()
            .await
            .expect("Failed to check out");
        expect_status(resp, StatusCode::CREATED).await
    }

    /// Create an active product.
    pub async fn product(&self, admin: &Actor, price: i64, stock: u32) -> Value {
        let resp = admin
            .client
            .post(self.url("/admin/products"))
            .json(&json!({
                "name": format!("Hạt điều rang muối {}", short_id()),
                "category": "Hạt điều",
                "price": price,
                "weight_grams": 500,
                "stock": stock,
            }))
            .send()
            .await
            .expect("Failed to create product");
        expect_status(resp, StatusCode::CREATED).await
    }

    /// Create a shipping zone for a province no other test uses and return
    /// the province name.
    pub async fn province(&self, admin: &Actor) -> String {
        let province = format!("Tỉnh Kiểm Thử {}", short_id());
        let resp = admin
            .client
            .post(self.url("/admin/shipping/zones"))
            .json(&json!({
                "name": format!("Vùng {province}"),
                "provinces": [province],
                "tiers": [{ "max_grams": 2000, "fee": 30000 }],
            }))
            .send()
            .await
            .expect("Failed to create shipping zone");
        expect_status(resp, StatusCode::CREATED).await;
        province
    }

    /// A checkout body for `quantity` of `product` delivered to `province`.
    #[must_use]
    pub fn checkout_body(product: &Value, quantity: u32, province: &str) -> Value {
        json!({
            "items": [{ "product_id": product["id"], "quantity": quantity }],
            "contact_name": "Nguyễn Thị Mai",
            "contact_phone": "0901234567",
            "address": {
                "province": province,
                "district": "Quận 1",
                "ward": "Phường Bến Nghé",
                "street": "12 Lê Lợi",
            },
        })
    }

    /// Walk an order through the given statuses as `admin`.
    pub async fn advance(&self, admin: &Actor, order: &Value, statuses: &[&str]) -> Value {
        let mut last = order.clone();
        for status in statuses {
            let resp = admin
                .client
                .patch(self.url(&format!("/admin/orders/{}/status", order["id"])))
                .json(&json!({ "status": status }))
                .send()
                .await
                .expect("Failed to change order status");
            last = expect_status(resp, StatusCode::OK).await;
        }
        last
    }

    /// The agent's dashboard.
    pub async fn dashboard(&self, agent: &Actor) -> Value {
        let resp = agent
            .client
            .get(self.url("/agent/dashboard"))
            .send()
            .await
            .expect("Failed to load dashboard");
        expect_status(resp, StatusCode::OK).await
    }
}

/// Assert the status and return the JSON body.
pub async fn expect_status(resp: Response, status: StatusCode) -> Value {
    let actual = resp.status();
    let body = resp.text().await.expect("Failed to read response");
    assert_eq!(actual, status, "unexpected status, body: {body}");
    if body.is_empty() {
        return Value::Null;
    }
    serde_json::from_str(&body).expect("response is JSON")
}

/// Read a money field.
#[must_use]
pub fn money(value: &Value) -> Money {
    serde_json::from_value(value.clone()).expect("money field")
}

/// An email no other run uses.
#[must_use]
pub fn unique_email(prefix: &str) -> String {
    format!("{prefix}-{}@kiemthu.nutmart.vn", short_id())
}

/// A short random suffix for names that must be unique.
#[must_use]
pub fn short_id() -> String {
    Uuid::new_v4().simple().to_string().chars().take(10).collect()
}
