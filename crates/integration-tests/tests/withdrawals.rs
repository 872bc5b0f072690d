//! Integration tests for agent withdrawals.
//!
//! These tests require:
//! - A migrated `PostgreSQL` database (`nutmart-cli migrate`)
//! - The API server running (`cargo run -p nutmart-api`)
//!
//! Run with: cargo test -p nutmart-integration-tests -- --ignored

use reqwest::StatusCode;
use serde_json::{Value, json};

use nutmart_core::Money;
use nutmart_integration_tests::{Actor, TestContext, expect_status, money};

/// An agent whose wallet holds 200.000 ₫ of earned commission.
async fn funded_agent(ctx: &TestContext, admin: &Actor) -> Actor {
    let agent = ctx.agent(admin, 10).await;
    let province = ctx.province(admin).await;
    let product = ctx.product(admin, 2_000_000, 2).await;

    let mut body = TestContext::checkout_body(&product, 1, &province);
    body["referral_code"] = ctx.dashboard(&agent).await["referral_code"].clone();
    let resp = ctx
        .client()
        .post(ctx.url("/checkout"))
        .json(&body)
        .send()
        .await
        .expect("Failed to check out");
    let order = expect_status(resp, StatusCode::CREATED).await;
    ctx.advance(admin, &order, &["confirmed", "shipping", "completed"])
        .await;

    let dashboard = ctx.dashboard(&agent).await;
    assert_eq!(money(&dashboard["wallet_balance"]), Money::from_dong(200_000));
    agent
}

async fn request_withdrawal(ctx: &TestContext, agent: &Actor, amount: i64) -> reqwest::Response {
    agent
        .client
        .post(ctx.url("/agent/withdrawals"))
        .json(&json!({
            "amount": amount,
            "bank_name": "Vietcombank",
            "account_number": "0071 0001 23456",
            "account_holder": "NGUYEN THI MAI",
        }))
        .send()
        .await
        .expect("Failed to request withdrawal")
}

async fn decide(ctx: &TestContext, admin: &Actor, withdrawal: &Value, action: &str) -> reqwest::Response {
    admin
        .client
        .post(ctx.url(&format!("/admin/withdrawals/{}/{action}", withdrawal["id"])))
        .json(&json!({ "note": "Đã kiểm tra" }))
        .send()
        .await
        .expect("Failed to decide withdrawal")
}

#[tokio::test]
#[ignore = "Requires running API server and database"]
async fn test_rejected_withdrawal_refunds_wallet() {
    let ctx = TestContext::new().await;
    let admin = ctx.admin().await;
    let agent = funded_agent(&ctx, &admin).await;

    let resp = request_withdrawal(&ctx, &agent, 150_000).await;
    let withdrawal = expect_status(resp, StatusCode::CREATED).await;
    assert_eq!(withdrawal["status"], "pending");
    assert_eq!(withdrawal["account_number"], "0071000123456");

    // The amount leaves the wallet at request time
    let dashboard = ctx.dashboard(&agent).await;
    assert_eq!(money(&dashboard["wallet_balance"]), Money::from_dong(50_000));

    let resp = request_withdrawal(&ctx, &agent, 100_000).await;
    expect_status(resp, StatusCode::CONFLICT).await;

    let resp = decide(&ctx, &admin, &withdrawal, "reject").await;
    let rejected = expect_status(resp, StatusCode::OK).await;
    assert_eq!(rejected["status"], "rejected");

    let dashboard = ctx.dashboard(&agent).await;
    assert_eq!(money(&dashboard["wallet_balance"]), Money::from_dong(200_000));

    // A decision is final
    let resp = decide(&ctx, &admin, &withdrawal, "approve").await;
    expect_status(resp, StatusCode::CONFLICT).await;
    let dashboard = ctx.dashboard(&agent).await;
    assert_eq!(money(&dashboard["wallet_balance"]), Money::from_dong(200_000));
}

#[tokio::test]
#[ignore = "Requires running API server and database"]
async fn test_approved_withdrawal_keeps_wallet_debited() {
    let ctx = TestContext::new().await;
    let admin = ctx.admin().await;
    let agent = funded_agent(&ctx, &admin).await;

    let resp = request_withdrawal(&ctx, &agent, 50_000).await;
    expect_status(resp, StatusCode::BAD_REQUEST).await;

    let resp = request_withdrawal(&ctx, &agent, 120_000).await;
    let withdrawal = expect_status(resp, StatusCode::CREATED).await;

    let resp = decide(&ctx, &admin, &withdrawal, "approve").await;
    let approved = expect_status(resp, StatusCode::OK).await;
    assert_eq!(approved["status"], "approved");

    let dashboard = ctx.dashboard(&agent).await;
    assert_eq!(money(&dashboard["wallet_balance"]), Money::from_dong(80_000));

    let resp = agent
        .client
        .get(ctx.url("/agent/withdrawals?status=approved"))
        .send()
        .await
        .expect("Failed to list withdrawals");
    let page = expect_status(resp, StatusCode::OK).await;
    assert_eq!(page["items"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
#[ignore = "Requires running API server and database"]
async fn test_customers_cannot_withdraw() {
    let ctx = TestContext::new().await;
    let customer = ctx.customer().await;

    let resp = request_withdrawal(&ctx, &customer, 150_000).await;
    expect_status(resp, StatusCode::FORBIDDEN).await;
}
