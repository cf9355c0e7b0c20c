mod common;

use axum::body::Body;
use http::{header, Request, StatusCode};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tower::util::ServiceExt;
use uuid::Uuid;

use boutique_api::app;

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should be readable");
    serde_json::from_slice(&bytes).expect("body should be JSON")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn authed(method: &str, uri: &str, token: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token));
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

#[tokio::test]
async fn status_and_health_respond() {
    let harness = common::setup().await;
    let router = app(harness.state.clone());

    let response = router.clone().oneshot(get("/api/v1/status")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");

    let response = router.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn catalog_is_public_but_carts_are_not() {
    let harness = common::setup().await;
    harness.seed_product("Hoodie", dec!(50.00), 5).await;
    let router = app(harness.state.clone());

    let response = router
        .clone()
        .oneshot(get("/api/v1/products"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body.as_array().unwrap().len(), 1);

    let response = router.oneshot(get("/api/v1/cart")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn customers_cannot_reach_admin_routes() {
    let harness = common::setup().await;
    let token = harness.customer_token(Uuid::new_v4(), "Ana");
    let router = app(harness.state.clone());

    let response = router
        .oneshot(authed("GET", "/api/v1/admin/orders", &token, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn cart_to_order_flow_over_http() {
    let harness = common::setup().await;
    let product = harness.seed_product("Hoodie", dec!(50.00), 5).await;
    let user = Uuid::new_v4();
    let token = harness.customer_token(user, "Ana");
    let router = app(harness.state.clone());

    let response = router
        .clone()
        .oneshot(authed(
            "POST",
            "/api/v1/cart/items",
            &token,
            Some(json!({
                "product_id": product.id,
                "quantity": 2,
                "size": "M",
                "color": "black",
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let subtotal: f64 = body["cart"]["subtotal"]
        .as_str()
        .expect("decimals serialize as strings")
        .parse()
        .unwrap();
    assert_eq!(subtotal, 100.0);

    let response = router
        .clone()
        .oneshot(authed("POST", "/api/v1/orders", &token, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["order"]["status"], "en-curso");
    let order_number = body["order"]["order_number"]
        .as_str()
        .expect("order number present")
        .to_string();

    let response = router
        .clone()
        .oneshot(authed(
            "GET",
            &format!("/api/v1/orders/by-number/{}", order_number),
            &token,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // The cart came back empty.
    let response = router
        .oneshot(authed("GET", "/api/v1/cart", &token, None))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert!(body["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn invalid_chat_channel_is_a_bad_request() {
    let harness = common::setup().await;
    let token = harness.customer_token(Uuid::new_v4(), "Ana");
    let router = app(harness.state.clone());

    let response = router
        .oneshot(authed("GET", "/api/v1/chats/billing", &token, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
