//! Integration tests for the HTTP surface, driven in-process.

use axum::http::StatusCode;
use emporium_core::{ProductId, UserId};
use emporium_core::CartLine;
use emporium_integration_tests::{
    TestApp, VALID_ACCESS_TOKEN, checkout_completed_event, get_request, json_body, json_request,
    qty, session_cookie, signed_webhook_request, spawn_auth_provider, test_config,
};
use emporium_storefront::db::NewOrderItem;
use emporium_storefront::error::CART_UNAVAILABLE_MESSAGE;
use emporium_storefront::routes::cart::CART_NOTICE_HEADER;
use serde_json::json;

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health() {
    let app = TestApp::new();

    let response = app.send(get_request("/health", None)).await;

    assert_eq!(response.status(), StatusCode::OK);
}

// =============================================================================
// Guest cart
// =============================================================================

#[tokio::test]
async fn test_guest_add_then_count_in_same_session() {
    let app = TestApp::new();
    let mug = emporium_integration_tests::product(&app.catalog, "Mug", 1200);

    let response = app
        .send(json_request(
            "POST",
            "/cart/add",
            &json!({ "product_id": mug.id, "quantity": 2 }),
            None,
        ))
        .await;
    assert_eq!(response.headers()[CART_NOTICE_HEADER], "added");
    let cookie = session_cookie(&response).unwrap();
    let (status, cart) = json_body(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["item_count"], 2);

    let response = app
        .send(json_request(
            "POST",
            "/cart/add",
            &json!({ "product_id": mug.id }),
            Some(&cookie),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let (status, count) = json_body(app.send(get_request("/cart/count", Some(&cookie))).await).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(count, json!({ "item_count": 3 }));
}

#[tokio::test]
async fn test_update_to_zero_removes_line() {
    let app = TestApp::new();
    let mug = emporium_integration_tests::product(&app.catalog, "Mug", 1200);
    let response = app
        .send(json_request(
            "POST",
            "/cart/add",
            &json!({ "product_id": mug.id }),
            None,
        ))
        .await;
    let cookie = session_cookie(&response).unwrap();

    let response = app
        .send(json_request(
            "POST",
            "/cart/update",
            &json!({ "product_id": mug.id, "quantity": 0 }),
            Some(&cookie),
        ))
        .await;

    assert_eq!(response.headers()[CART_NOTICE_HEADER], "removed");
    let (status, cart) = json_body(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["items"], json!([]));
    assert_eq!(cart["item_count"], 0);
}

#[tokio::test]
async fn test_fresh_visitor_has_empty_cart() {
    let app = TestApp::new();

    let (status, cart) = json_body(app.send(get_request("/cart", None)).await).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["item_count"], 0);
}

// =============================================================================
// Errors
// =============================================================================

#[tokio::test]
async fn test_invalid_quantity_is_bad_request() {
    let app = TestApp::new();
    let mug = emporium_integration_tests::product(&app.catalog, "Mug", 1200);

    for quantity in [0, -3] {
        let response = app
            .send(json_request(
                "POST",
                "/cart/add",
                &json!({ "product_id": mug.id, "quantity": quantity }),
                None,
            ))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn test_malformed_product_id_is_bad_request() {
    let app = TestApp::new();

    let response = app
        .send(json_request(
            "POST",
            "/cart/remove",
            &json!({ "product_id": "not-a-uuid" }),
            None,
        ))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_product_is_not_found() {
    let app = TestApp::new();

    let response = app
        .send(json_request(
            "POST",
            "/cart/add",
            &json!({ "product_id": ProductId::generate() }),
            None,
        ))
        .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_catalog_outage_is_service_unavailable() {
    let app = TestApp::new();
    let mug = emporium_integration_tests::product(&app.catalog, "Mug", 1200);
    app.catalog.set_unavailable(true);

    let (status, body) = json_body(
        app.send(json_request(
            "POST",
            "/cart/add",
            &json!({ "product_id": mug.id }),
            None,
        ))
        .await,
    )
    .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], CART_UNAVAILABLE_MESSAGE);
}

// =============================================================================
// Auth
// =============================================================================

#[tokio::test]
async fn test_checkout_requires_sign_in() {
    let app = TestApp::new();

    let response = app
        .send(json_request("POST", "/checkout", &json!({}), None))
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_me_is_null_for_guests() {
    let app = TestApp::new();

    let (status, body) = json_body(app.send(get_request("/auth/me", None)).await).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::Value::Null);
}

async fn app_with_auth_provider(user: UserId) -> TestApp {
    let mut config = test_config();
    config.auth.url = spawn_auth_provider(user).await;
    TestApp::with_config(config)
}

#[tokio::test]
async fn test_sign_in_merges_guest_cart_then_logout_leaves_it() {
    let user = UserId::generate();
    let app = app_with_auth_provider(user).await;
    let mug = emporium_integration_tests::product(&app.catalog, "Mug", 1200);
    app.remote.seed(user, mug.id, qty(5));

    // Guest adds two mugs.
    let response = app
        .send(json_request(
            "POST",
            "/cart/add",
            &json!({ "product_id": mug.id, "quantity": 2 }),
            None,
        ))
        .await;
    let guest_cookie = session_cookie(&response).unwrap();

    // Sign-in merges with the guest quantity winning.
    let response = app
        .send(json_request(
            "POST",
            "/auth/session",
            &json!({ "access_token": VALID_ACCESS_TOKEN }),
            Some(&guest_cookie),
        ))
        .await;
    let cookie = session_cookie(&response).unwrap_or(guest_cookie.clone());
    assert_ne!(cookie, guest_cookie);
    let (status, body) = json_body(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["id"], user.to_string());
    assert_eq!(body["cart"]["item_count"], 2);
    assert_eq!(body["reconciliation"]["merged"], json!([mug.id]));
    assert_eq!(body["reconciliation"]["guest_cart_cleared"], true);
    assert!(body["warning"].is_null());
    assert_eq!(app.remote.lines(user), vec![CartLine::new(mug.id, qty(2))]);

    let (_, me) = json_body(app.send(get_request("/auth/me", Some(&cookie))).await).await;
    assert_eq!(me["id"], user.to_string());
    let (_, cart) = json_body(app.send(get_request("/cart", Some(&cookie))).await).await;
    assert_eq!(cart["item_count"], 2);

    // Logout moves nothing; the session falls back to the emptied guest cart.
    let response = app
        .send(json_request("POST", "/auth/logout", &json!({}), Some(&cookie)))
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let cookie = session_cookie(&response).unwrap_or(cookie);

    let (status, cart) = json_body(app.send(get_request("/cart", Some(&cookie))).await).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["item_count"], 0);
    assert_eq!(app.remote.lines(user), vec![CartLine::new(mug.id, qty(2))]);
}

#[tokio::test]
async fn test_sign_in_with_rejected_token_keeps_guest_cart() {
    let user = UserId::generate();
    let app = app_with_auth_provider(user).await;
    let mug = emporium_integration_tests::product(&app.catalog, "Mug", 1200);
    let response = app
        .send(json_request(
            "POST",
            "/cart/add",
            &json!({ "product_id": mug.id }),
            None,
        ))
        .await;
    let cookie = session_cookie(&response).unwrap();

    let response = app
        .send(json_request(
            "POST",
            "/auth/session",
            &json!({ "access_token": "forged" }),
            Some(&cookie),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(app.remote.lines(user).is_empty());
    let (_, cart) = json_body(app.send(get_request("/cart", Some(&cookie))).await).await;
    assert_eq!(cart["item_count"], 1);
}

#[tokio::test]
async fn test_orders_require_sign_in() {
    let app = TestApp::new();

    let response = app.send(get_request("/orders", None)).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_signed_in_user_sees_only_their_orders() {
    let user = UserId::generate();
    let app = app_with_auth_provider(user).await;
    let mug = emporium_integration_tests::product(&app.catalog, "Mug", 1200);
    let items = [NewOrderItem {
        product_id: mug.id,
        quantity: qty(2),
        price: mug.price,
    }];
    app.send(signed_webhook_request(checkout_completed_event(
        "cs_test_mine",
        user,
        &items,
    )))
    .await;
    app.send(signed_webhook_request(checkout_completed_event(
        "cs_test_theirs",
        UserId::generate(),
        &items,
    )))
    .await;

    let response = app
        .send(json_request(
            "POST",
            "/auth/session",
            &json!({ "access_token": VALID_ACCESS_TOKEN }),
            None,
        ))
        .await;
    let cookie = session_cookie(&response).unwrap();

    let (status, orders) = json_body(app.send(get_request("/orders", Some(&cookie))).await).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(orders.as_array().unwrap().len(), 1);
    assert_eq!(orders[0]["status"], "processing");
    assert_eq!(orders[0]["total"], "24.00");
    assert_eq!(orders[0]["items"][0]["quantity"], 2);
    assert_eq!(orders[0]["items"][0]["product"]["name"], "Mug");
}

// =============================================================================
// Products
// =============================================================================

#[tokio::test]
async fn test_products_lists_active_products() {
    let app = TestApp::new();
    emporium_integration_tests::product(&app.catalog, "Tea Mug", 1200);
    emporium_integration_tests::product(&app.catalog, "Teapot", 3500);
    emporium_integration_tests::product(&app.catalog, "Coaster", 300);

    let (status, page) = json_body(
        app.send(get_request("/products?search=tea&sort=price-desc&limit=1", None))
            .await,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 2);
    assert_eq!(page["limit"], 1);
    assert_eq!(page["products"][0]["name"], "Teapot");
}

#[tokio::test]
async fn test_products_with_unknown_sort_is_bad_request() {
    let app = TestApp::new();

    let response = app.send(get_request("/products?sort=cheapest", None)).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// =============================================================================
// Payment webhook
// =============================================================================

#[tokio::test]
async fn test_webhook_records_order() {
    let app = TestApp::new();
    let user = UserId::generate();
    let mug = emporium_integration_tests::product(&app.catalog, "Mug", 1200);
    app.remote.seed(user, mug.id, qty(2));
    let payload = checkout_completed_event(
        "cs_test_http",
        user,
        &[NewOrderItem {
            product_id: mug.id,
            quantity: qty(2),
            price: mug.price,
        }],
    );

    let (status, body) = json_body(app.send(signed_webhook_request(payload)).await).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], true);
    assert_eq!(body["outcome"]["status"], "recorded");
    assert_eq!(app.orders.order_count(), 1);
    assert!(app.remote.lines(user).is_empty());
}

#[tokio::test]
async fn test_webhook_without_signature_is_bad_request() {
    let app = TestApp::new();
    let payload = checkout_completed_event("cs_test_nosig", UserId::generate(), &[]);

    let response = app
        .send(json_request(
            "POST",
            "/webhooks/payment",
            &serde_json::from_slice(&payload).unwrap(),
            None,
        ))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.orders.order_count(), 0);
}

#[tokio::test]
async fn test_webhook_with_tampered_body_is_bad_request() {
    let app = TestApp::new();
    let payload = checkout_completed_event("cs_test_tamper", UserId::generate(), &[]);
    let mut request = signed_webhook_request(payload);
    *request.body_mut() = axum::body::Body::from(r#"{"type":"checkout.session.completed"}"#);

    let response = app.send(request).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_webhook_order_outage_asks_for_redelivery() {
    let app = TestApp::new();
    app.orders.set_unavailable(true);
    let payload = checkout_completed_event("cs_test_retry", UserId::generate(), &[]);

    let response = app.send(signed_webhook_request(payload)).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
