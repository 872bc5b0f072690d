//! Integration tests for checkout and the order lifecycle.
//!
//! These tests require:
//! - A migrated `PostgreSQL` database (`nutmart-cli migrate`)
//! - The API server running (`cargo run -p nutmart-api`)
//!
//! Run with: cargo test -p nutmart-integration-tests -- --ignored

use reqwest::StatusCode;
use serde_json::json;

use nutmart_core::Money;
use nutmart_integration_tests::{TestContext, expect_status, money};

// ============================================================================
// Referral & Commission Tests
// ============================================================================

#[tokio::test]
#[ignore = "Requires running API server and database"]
async fn test_referred_order_credits_agent_on_completion() {
    let ctx = TestContext::new().await;
    let admin = ctx.admin().await;
    let agent = ctx.agent(&admin, 10).await;
    let province = ctx.province(&admin).await;
    let product = ctx.product(&admin, 200_000, 5).await;

    let dashboard = ctx.dashboard(&agent).await;
    let code = dashboard["referral_code"]
        .as_str()
        .expect("agent has a referral code")
        .to_string();

    // Guest follows the agent's link, then checks out in the same session
    let guest = ctx.client();
    let resp = guest
        .get(ctx.url(&format!("/referrals/{code}")))
        .send()
        .await
        .expect("Failed to open referral link");
    let info = expect_status(resp, StatusCode::OK).await;
    assert_eq!(info["code"], code.as_str());

    let resp = guest
        .post(ctx.url("/checkout"))
        .json(&TestContext::checkout_body(&product, 2, &province))
        .send()
        .await
        .expect("Failed to check out");
    let order = expect_status(resp, StatusCode::CREATED).await;

    assert_eq!(order["status"], "pending");
    assert_eq!(order["referrer_id"].as_i64(), Some(agent.id()));
    assert_eq!(money(&order["subtotal"]), Money::from_dong(400_000));
    assert_eq!(
        money(&order["total"]) + money(&order["discount"]),
        money(&order["subtotal"]) + money(&order["shipping_fee"])
    );

    // Stock is reserved at checkout
    let resp = guest
        .get(ctx.url(&format!("/products/{}", product["slug"].as_str().expect("slug"))))
        .send()
        .await
        .expect("Failed to load product");
    assert_eq!(expect_status(resp, StatusCode::OK).await["stock"], 3);

    let dashboard = ctx.dashboard(&agent).await;
    assert_eq!(money(&dashboard["pending_commission"]), Money::from_dong(40_000));
    assert_eq!(money(&dashboard["wallet_balance"]), Money::ZERO);

    let order = ctx
        .advance(&admin, &order, &["confirmed", "shipping", "completed"])
        .await;
    assert_eq!(order["status"], "completed");

    let dashboard = ctx.dashboard(&agent).await;
    assert_eq!(money(&dashboard["wallet_balance"]), Money::from_dong(40_000));
    assert_eq!(money(&dashboard["pending_commission"]), Money::ZERO);
}

// ============================================================================
// Cancellation Tests
// ============================================================================

#[tokio::test]
#[ignore = "Requires running API server and database"]
async fn test_customer_cancel_restocks_and_checks_ownership() {
    let ctx = TestContext::new().await;
    let admin = ctx.admin().await;
    let province = ctx.province(&admin).await;
    let product = ctx.product(&admin, 150_000, 5).await;
    let slug = product["slug"].as_str().expect("slug").to_string();

    let buyer = ctx.customer().await;
    let resp = buyer
        .client
        .post(ctx.url("/checkout"))
        .json(&TestContext::checkout_body(&product, 2, &province))
        .send()
        .await
        .expect("Failed to check out");
    let order = expect_status(resp, StatusCode::CREATED).await;
    assert_eq!(order["user_id"].as_i64(), Some(buyer.id()));

    // Someone else's order looks like it does not exist
    let stranger = ctx.customer().await;
    let resp = stranger
        .client
        .post(ctx.url(&format!("/account/orders/{}/cancel", order["id"])))
        .send()
        .await
        .expect("Failed to send cancel");
    expect_status(resp, StatusCode::NOT_FOUND).await;

    let resp = buyer
        .client
        .post(ctx.url(&format!("/account/orders/{}/cancel", order["id"])))
        .send()
        .await
        .expect("Failed to cancel");
    let cancelled = expect_status(resp, StatusCode::OK).await;
    assert_eq!(cancelled["status"], "cancelled");

    let resp = buyer
        .client
        .get(ctx.url(&format!("/products/{slug}")))
        .send()
        .await
        .expect("Failed to load product");
    assert_eq!(expect_status(resp, StatusCode::OK).await["stock"], 5);

    // Cancelled is final
    let resp = buyer
        .client
        .post(ctx.url(&format!("/account/orders/{}/cancel", order["id"])))
        .send()
        .await
        .expect("Failed to send cancel");
    expect_status(resp, StatusCode::CONFLICT).await;
}

#[tokio::test]
#[ignore = "Requires running API server and database"]
async fn test_order_cannot_leave_completed() {
    let ctx = TestContext::new().await;
    let admin = ctx.admin().await;
    let province = ctx.province(&admin).await;
    let product = ctx.product(&admin, 90_000, 3).await;

    let resp = ctx
        .client()
        .post(ctx.url("/checkout"))
        .json(&TestContext::checkout_body(&product, 1, &province))
        .send()
        .await
        .expect("Failed to check out");
    let order = expect_status(resp, StatusCode::CREATED).await;

    // Skipping a step is not allowed
    let resp = admin
        .client
        .patch(ctx.url(&format!("/admin/orders/{}/status", order["id"])))
        .json(&json!({ "status": "completed" }))
        .send()
        .await
        .expect("Failed to change status");
    expect_status(resp, StatusCode::CONFLICT).await;

    ctx.advance(&admin, &order, &["confirmed", "shipping", "completed"])
        .await;

    let resp = admin
        .client
        .patch(ctx.url(&format!("/admin/orders/{}/status", order["id"])))
        .json(&json!({ "status": "cancelled" }))
        .send()
        .await
        .expect("Failed to change status");
    expect_status(resp, StatusCode::CONFLICT).await;
}

#[tokio::test]
#[ignore = "Requires running API server and database"]
async fn test_checkout_rejects_more_than_stock() {
    let ctx = TestContext::new().await;
    let admin = ctx.admin().await;
    let province = ctx.province(&admin).await;
    let product = ctx.product(&admin, 120_000, 1).await;

    let resp = ctx
        .client()
        .post(ctx.url("/checkout"))
        .json(&TestContext::checkout_body(&product, 2, &province))
        .send()
        .await
        .expect("Failed to check out");
    let body = expect_status(resp, StatusCode::CONFLICT).await;
    assert!(body["error"].is_string());
}
