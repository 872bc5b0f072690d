//! Integration tests for the affiliate programme: management chains,
//! package rewards, monthly reward rules and manager commissions.
//!
//! These tests require:
//! - A migrated `PostgreSQL` database (`nutmart-cli migrate`)
//! - The API server running (`cargo run -p nutmart-api`)
//!
//! Run with: cargo test -p nutmart-integration-tests -- --ignored

use reqwest::StatusCode;
use serde_json::{Value, json};
use uuid::Uuid;

use nutmart_core::Money;
use nutmart_integration_tests::{Actor, TestContext, expect_status, money, short_id};

/// A reward voucher value no other rule uses, so leftover rules from
/// earlier runs cannot be mistaken for this one.
fn unique_voucher_value() -> i64 {
    let [a, b, ..] = Uuid::new_v4().into_bytes();
    100_000 + i64::from(a) * 1_000 + i64::from(b)
}

async fn reward_vouchers(ctx: &TestContext, agent: &Actor, value: i64) -> Vec<Value> {
    let resp = agent
        .client
        .get(ctx.url("/account/vouchers"))
        .send()
        .await
        .expect("Failed to list vouchers");
    let vouchers = expect_status(resp, StatusCode::OK).await;
    vouchers
        .as_array()
        .expect("voucher list")
        .iter()
        .filter(|v| v["source"] == "reward" && money(&v["value"]) == Money::from_dong(value))
        .cloned()
        .collect()
}

async fn set_rule_active(ctx: &TestContext, admin: &Actor, rule: &Value, active: bool) {
    let resp = admin
        .client
        .patch(ctx.url(&format!("/admin/voucher-rules/{}", rule["id"])))
        .json(&json!({ "active": active }))
        .send()
        .await
        .expect("Failed to update reward rule");
    expect_status(resp, StatusCode::OK).await;
}

// ============================================================================
// Management Chain Tests
// ============================================================================

#[tokio::test]
#[ignore = "Requires running API server and database"]
async fn test_agent_cannot_attach_own_manager() {
    let ctx = TestContext::new().await;
    let admin = ctx.admin().await;
    let top = ctx.agent(&admin, 15).await;
    let below = ctx.agent(&admin, 10).await;
    let placed = ctx.set_manager(&admin, &below, &top).await;
    assert_eq!(placed["manager_id"].as_i64(), Some(top.id()));

    // top has no manager, but taking one from below them would close a loop
    let resp = below
        .client
        .post(ctx.url("/agent/collaborators"))
        .json(&json!({ "email": top.user["email"] }))
        .send()
        .await
        .expect("Failed to attach collaborator");
    expect_status(resp, StatusCode::BAD_REQUEST).await;

    let resp = admin
        .client
        .get(ctx.url(&format!("/admin/users/{}", top.id())))
        .send()
        .await
        .expect("Failed to load user");
    assert_eq!(expect_status(resp, StatusCode::OK).await["manager_id"], Value::Null);
}

#[tokio::test]
#[ignore = "Requires running API server and database"]
async fn test_unrelated_edit_keeps_deactivated_manager() {
    let ctx = TestContext::new().await;
    let admin = ctx.admin().await;
    let manager = ctx.agent(&admin, 15).await;
    let agent = ctx.agent(&admin, 10).await;
    ctx.set_manager(&admin, &agent, &manager).await;

    let resp = admin
        .client
        .patch(ctx.url(&format!("/admin/users/{}", manager.id())))
        .json(&json!({ "active": false }))
        .send()
        .await
        .expect("Failed to deactivate manager");
    expect_status(resp, StatusCode::OK).await;

    let resp = admin
        .client
        .patch(ctx.url(&format!("/admin/users/{}", agent.id())))
        .json(&json!({ "full_name": "Trần Văn Bình" }))
        .send()
        .await
        .expect("Failed to rename agent");
    let user = expect_status(resp, StatusCode::OK).await;
    assert_eq!(user["full_name"], "Trần Văn Bình");
    assert_eq!(user["manager_id"].as_i64(), Some(manager.id()));
}

// ============================================================================
// Commission & Reward Tests
// ============================================================================

#[tokio::test]
#[ignore = "Requires running API server and database"]
async fn test_manager_earns_rate_difference() {
    let ctx = TestContext::new().await;
    let admin = ctx.admin().await;
    let manager = ctx.agent(&admin, 15).await;
    let seller = ctx.agent(&admin, 10).await;
    ctx.set_manager(&admin, &seller, &manager).await;
    let province = ctx.province(&admin).await;
    let product = ctx.product(&admin, 200_000, 5).await;

    let order = ctx.referred_order(&seller, &product, 1, &province).await;
    assert_eq!(order["referrer_id"].as_i64(), Some(seller.id()));

    // Nothing is paid before completion
    let dashboard = ctx.dashboard(&manager).await;
    assert_eq!(money(&dashboard["pending_commission"]), Money::from_dong(10_000));
    assert_eq!(money(&dashboard["wallet_balance"]), Money::ZERO);

    ctx.advance(&admin, &order, &["confirmed", "shipping", "completed"])
        .await;

    let dashboard = ctx.dashboard(&seller).await;
    assert_eq!(money(&dashboard["wallet_balance"]), Money::from_dong(20_000));
    let dashboard = ctx.dashboard(&manager).await;
    assert_eq!(money(&dashboard["wallet_balance"]), Money::from_dong(10_000));
    assert_eq!(money(&dashboard["pending_commission"]), Money::ZERO);
}

#[tokio::test]
#[ignore = "Requires running API server and database"]
async fn test_reward_rule_issues_once_per_month() {
    let ctx = TestContext::new().await;
    let admin = ctx.admin().await;
    let agent = ctx.agent(&admin, 10).await;
    let province = ctx.province(&admin).await;
    let product = ctx.product(&admin, 200_000, 10).await;
    let value = unique_voucher_value();

    let resp = admin
        .client
        .post(ctx.url("/admin/voucher-rules"))
        .json(&json!({
            "name": format!("Mốc doanh số {}", short_id()),
            "threshold": 300_000,
            "voucher_value": value,
            "valid_days": 30,
        }))
        .send()
        .await
        .expect("Failed to create reward rule");
    let rule = expect_status(resp, StatusCode::CREATED).await;

    let first = ctx.referred_order(&agent, &product, 1, &province).await;
    let second = ctx.referred_order(&agent, &product, 1, &province).await;
    let third = ctx.referred_order(&agent, &product, 1, &province).await;
    for order in [&first, &second, &third] {
        ctx.advance(&admin, order, &["confirmed", "shipping"]).await;
    }

    // Each order alone stays under the threshold; together they cross it
    tokio::join!(
        ctx.advance(&admin, &first, &["completed"]),
        ctx.advance(&admin, &second, &["completed"]),
    );
    let issued = reward_vouchers(&ctx, &agent, value).await;
    assert_eq!(issued.len(), 1, "vouchers: {issued:?}");

    // Still the same month, so the rule does not pay again
    ctx.advance(&admin, &third, &["completed"]).await;
    assert_eq!(reward_vouchers(&ctx, &agent, value).await.len(), 1);

    set_rule_active(&ctx, &admin, &rule, false).await;
}

#[tokio::test]
#[ignore = "Requires running API server and database"]
async fn test_completed_package_issues_vouchers_and_tier() {
    let ctx = TestContext::new().await;
    let admin = ctx.admin().await;
    let buyer = ctx.customer().await;

    let resp = admin
        .client
        .post(ctx.url("/admin/tiers"))
        .json(&json!({ "name": format!("Đại lý {}", short_id()), "rate": 12 }))
        .send()
        .await
        .expect("Failed to create tier");
    let tier = expect_status(resp, StatusCode::CREATED).await;

    let resp = admin
        .client
        .post(ctx.url("/admin/packages"))
        .json(&json!({
            "name": format!("Gói Đại lý {}", short_id()),
            "price": 1_000_000,
            "voucher_count": 2,
            "voucher_value": 50_000,
            "voucher_min_order": 300_000,
            "voucher_valid_days": 60,
            "tier_id": tier["id"],
        }))
        .send()
        .await
        .expect("Failed to create package");
    let package = expect_status(resp, StatusCode::CREATED).await;

    let resp = buyer
        .client
        .post(ctx.url("/checkout/package"))
        .json(&json!({
            "package_id": package["id"],
            "contact_name": "Nguyễn Thị Mai",
            "contact_phone": "0901234567",
        }))
        .send()
        .await
        .expect("Failed to buy package");
    let order = expect_status(resp, StatusCode::CREATED).await;
    assert_eq!(order["kind"], "package");

    // Nothing is granted while the order is open
    let resp = buyer
        .client
        .get(ctx.url("/account/vouchers"))
        .send()
        .await
        .expect("Failed to list vouchers");
    assert_eq!(expect_status(resp, StatusCode::OK).await, json!([]));

    ctx.advance(&admin, &order, &["confirmed", "shipping", "completed"])
        .await;

    let resp = buyer
        .client
        .get(ctx.url("/account/vouchers"))
        .send()
        .await
        .expect("Failed to list vouchers");
    let vouchers = expect_status(resp, StatusCode::OK).await;
    let vouchers = vouchers.as_array().expect("voucher list");
    assert_eq!(vouchers.len(), 2);
    assert!(vouchers.iter().all(|v| v["source"] == "package"
        && money(&v["value"]) == Money::from_dong(50_000)
        && money(&v["min_order_total"]) == Money::from_dong(300_000)));

    let resp = buyer
        .client
        .get(ctx.url("/auth/me"))
        .send()
        .await
        .expect("Failed to load profile");
    let me = expect_status(resp, StatusCode::OK).await;
    assert_eq!(me["role"], "sale");
    assert_eq!(me["tier_id"], tier["id"]);
    assert!(me["referral_code"].is_string());
}
