// Request-validation tests for the exposed APIs
//
// These run against a router wired onto a lazy pool: every request here is
// rejected by validation before any repository call, so no database is
// needed. Flows that do reach Postgres (checkout, transitions, inventory)
// live in the database-backed integration suite.

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::json;

use storefront_api::models::Address;
use storefront_api::{create_router, AppState};

fn test_server() -> TestServer {
    let pool = sqlx::PgPool::connect_lazy("postgresql://localhost/storefront_unused")
        .expect("lazy pool never connects in these tests");
    let state = AppState::new(pool, Address::new("US"));
    TestServer::new(create_router(state)).expect("router should build")
}

#[tokio::test]
async fn create_cart_rejects_malformed_currency() {
    let server = test_server();
    let response = server
        .post("/api/carts")
        .json(&json!({"user_id": 1, "currency": "DOLLARS"}))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn create_cart_rejects_ownerless_cart() {
    let server = test_server();
    let response = server
        .post("/api/carts")
        .json(&json!({"currency": "USD"}))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn create_cart_rejects_dual_ownership() {
    let server = test_server();
    let response = server
        .post("/api/carts")
        .json(&json!({
            "user_id": 1,
            "session_token": "tok-aaaaaaaaaaaaaaaa",
            "currency": "USD"
        }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn add_item_rejects_non_positive_quantity() {
    let server = test_server();
    let response = server
        .post("/api/carts/6d9c17b3-33d2-4c0a-9c80-97a48b5a48cf/items")
        .json(&json!({"product_id": 1, "quantity": 0}))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn apply_coupon_rejects_empty_code() {
    let server = test_server();
    let response = server
        .post("/api/carts/6d9c17b3-33d2-4c0a-9c80-97a48b5a48cf/coupons")
        .json(&json!({"code": ""}))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn checkout_rejects_malformed_country() {
    let server = test_server();
    let response = server
        .post("/api/carts/6d9c17b3-33d2-4c0a-9c80-97a48b5a48cf/checkout")
        .json(&json!({"address": {"country": "USA"}}))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn refund_rejects_non_positive_line_quantity() {
    let server = test_server();
    let response = server
        .post("/api/orders/6d9c17b3-33d2-4c0a-9c80-97a48b5a48cf/refund")
        .json(&json!({"lines": [{"order_item_id": 1, "quantity": 0}]}))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}
