mod common;

use assert_matches::assert_matches;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, Set};
use uuid::Uuid;

use boutique_api::entities::{product, OrderStatus};
use boutique_api::errors::ServiceError;
use boutique_api::services::carts::AddItemInput;

async fn fill_cart(app: &common::TestApp, user: Uuid, product_id: Uuid, quantity: i32) {
    app.state
        .services
        .carts
        .add_item(
            user,
            AddItemInput {
                product_id,
                quantity,
                size: "M".to_string(),
                color: "black".to_string(),
            },
        )
        .await
        .expect("adding to cart should succeed");
}

#[tokio::test]
async fn checkout_snapshots_the_cart_and_reserves_stock() {
    let app = common::setup().await;
    let user = Uuid::new_v4();
    let product = app.seed_product("Hoodie", dec!(50.00), 5).await;
    fill_cart(&app, user, product.id, 2).await;

    let detail = app.state.services.orders.create_order(user).await.unwrap();

    assert_eq!(detail.order.user_id, user);
    assert_eq!(detail.order.status, OrderStatus::InProgress);
    assert_eq!(detail.order.subtotal, dec!(100.00));
    assert_eq!(detail.order.tax, dec!(16.00));
    assert_eq!(detail.order.total, dec!(116.00));

    assert_eq!(detail.items.len(), 1);
    assert_eq!(detail.items[0].product_name, "Hoodie");
    assert_eq!(detail.items[0].quantity, 2);
    assert_eq!(detail.items[0].subtotal, dec!(100.00));

    // Stock was reserved and the cart consumed.
    let product = app
        .state
        .services
        .products
        .get_product(product.id)
        .await
        .unwrap();
    assert_eq!(product.stock, 3);
    assert!(product.available);

    let cart = app.state.services.carts.get_cart(user).await.unwrap();
    assert!(cart.items.is_empty());
    assert_eq!(cart.cart.total, dec!(0));
}

#[tokio::test]
async fn order_numbers_are_human_facing_and_sequential_per_user() {
    let app = common::setup().await;
    let user = Uuid::new_v4();
    let product = app.seed_product("Hoodie", dec!(50.00), 10).await;

    fill_cart(&app, user, product.id, 1).await;
    let first = app.state.services.orders.create_order(user).await.unwrap();
    fill_cart(&app, user, product.id, 1).await;
    let second = app.state.services.orders.create_order(user).await.unwrap();

    for number in [&first.order.order_number, &second.order.order_number] {
        assert!(number.starts_with("ORD-"), "got {}", number);
        assert_eq!(number.split('-').count(), 4, "got {}", number);
    }
    assert!(first.order.order_number.ends_with("-1"));
    assert!(second.order.order_number.ends_with("-2"));
    assert_ne!(first.order.order_number, second.order.order_number);
}

#[tokio::test]
async fn empty_cart_cannot_check_out() {
    let app = common::setup().await;
    let user = Uuid::new_v4();

    // No cart at all.
    let err = app.state.services.orders.create_order(user).await.unwrap_err();
    assert_matches!(err, ServiceError::EmptyCart);

    // A cart that exists but holds nothing.
    app.state.services.carts.get_cart(user).await.unwrap();
    let err = app.state.services.orders.create_order(user).await.unwrap_err();
    assert_matches!(err, ServiceError::EmptyCart);
}

#[tokio::test]
async fn failed_checkout_leaves_nothing_behind() {
    let app = common::setup().await;
    let user = Uuid::new_v4();
    let plenty = app.seed_product("Hoodie", dec!(50.00), 10).await;
    let scarce = app.seed_product("Limited Tee", dec!(30.00), 1).await;

    fill_cart(&app, user, plenty.id, 2).await;
    fill_cart(&app, user, scarce.id, 1).await;

    // A competing purchase drains the scarce product before checkout.
    let rival = Uuid::new_v4();
    fill_cart(&app, rival, scarce.id, 1).await;
    app.state.services.orders.create_order(rival).await.unwrap();

    let err = app.state.services.orders.create_order(user).await.unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock(_));

    // The first line's reservation rolled back with everything else.
    let plenty = app
        .state
        .services
        .products
        .get_product(plenty.id)
        .await
        .unwrap();
    assert_eq!(plenty.stock, 10);

    let cart = app.state.services.carts.get_cart(user).await.unwrap();
    assert_eq!(cart.items.len(), 2);

    let orders = app.state.services.orders.my_orders(user).await.unwrap();
    assert!(orders.is_empty());
}

#[tokio::test]
async fn unavailable_products_cannot_be_ordered() {
    let app = common::setup().await;
    let user = Uuid::new_v4();
    let product = app.seed_product("Hoodie", dec!(50.00), 5).await;
    fill_cart(&app, user, product.id, 1).await;

    // Pulled from sale with stock remaining; the flag alone blocks checkout.
    let mut pulled: product::ActiveModel = app
        .state
        .services
        .products
        .get_product(product.id)
        .await
        .unwrap()
        .into();
    pulled.available = Set(false);
    pulled.update(&*app.db).await.unwrap();

    let err = app.state.services.orders.create_order(user).await.unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock(_));

    // Nothing was consumed by the rejected checkout.
    let cart = app.state.services.carts.get_cart(user).await.unwrap();
    assert_eq!(cart.items.len(), 1);
    let untouched = app
        .state
        .services
        .products
        .get_product(product.id)
        .await
        .unwrap();
    assert_eq!(untouched.stock, 5);
}

#[tokio::test]
async fn concurrent_checkouts_cannot_oversell() {
    let app = common::setup().await;
    let product = app.seed_product("Last One", dec!(80.00), 1).await;

    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    fill_cart(&app, alice, product.id, 1).await;
    fill_cart(&app, bob, product.id, 1).await;

    let orders = &app.state.services.orders;
    let (a, b) = tokio::join!(orders.create_order(alice), orders.create_order(bob));

    let successes = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(successes, 1, "exactly one checkout may win the last unit");

    let failure = if a.is_err() { a } else { b };
    assert_matches!(failure.unwrap_err(), ServiceError::InsufficientStock(_));

    let product = app
        .state
        .services
        .products
        .get_product(product.id)
        .await
        .unwrap();
    assert_eq!(product.stock, 0);
    assert!(!product.available);
}

#[tokio::test]
async fn cancelling_restores_stock_and_availability() {
    let app = common::setup().await;
    let user = Uuid::new_v4();
    let product = app.seed_product("Last One", dec!(80.00), 1).await;
    fill_cart(&app, user, product.id, 1).await;

    let detail = app.state.services.orders.create_order(user).await.unwrap();
    let drained = app
        .state
        .services
        .products
        .get_product(product.id)
        .await
        .unwrap();
    assert_eq!(drained.stock, 0);
    assert!(!drained.available);

    let cancelled = app
        .state
        .services
        .orders
        .cancel_order(user, detail.order.id, Some("changed my mind".into()))
        .await
        .unwrap();
    assert_eq!(cancelled.order.status, OrderStatus::Cancelled);
    assert!(cancelled.order.cancelled_at.is_some());
    assert_eq!(
        cancelled.order.cancellation_reason.as_deref(),
        Some("changed my mind")
    );

    let restored = app
        .state
        .services
        .products
        .get_product(product.id)
        .await
        .unwrap();
    assert_eq!(restored.stock, 1);
    assert!(restored.available);
}

#[tokio::test]
async fn only_the_owner_may_cancel() {
    let app = common::setup().await;
    let user = Uuid::new_v4();
    let product = app.seed_product("Hoodie", dec!(50.00), 5).await;
    fill_cart(&app, user, product.id, 1).await;
    let detail = app.state.services.orders.create_order(user).await.unwrap();

    let err = app
        .state
        .services
        .orders
        .cancel_order(Uuid::new_v4(), detail.order.id, None)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Forbidden(_));
}

#[tokio::test]
async fn terminal_orders_reject_further_transitions() {
    let app = common::setup().await;
    let user = Uuid::new_v4();
    let product = app.seed_product("Hoodie", dec!(50.00), 5).await;

    fill_cart(&app, user, product.id, 1).await;
    let completed = app.state.services.orders.create_order(user).await.unwrap();
    app.state
        .services
        .orders
        .complete_order(completed.order.id)
        .await
        .unwrap();

    let err = app
        .state
        .services
        .orders
        .cancel_order(user, completed.order.id, None)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidTransition(_));

    let err = app
        .state
        .services
        .orders
        .complete_order(completed.order.id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidTransition(_));

    // A completed order keeps its reserved stock.
    let product = app
        .state
        .services
        .products
        .get_product(product.id)
        .await
        .unwrap();
    assert_eq!(product.stock, 4);
}

#[tokio::test]
async fn completion_stamps_the_order() {
    let app = common::setup().await;
    let user = Uuid::new_v4();
    let product = app.seed_product("Hoodie", dec!(50.00), 5).await;
    fill_cart(&app, user, product.id, 1).await;
    let detail = app.state.services.orders.create_order(user).await.unwrap();

    let done = app
        .state
        .services
        .orders
        .complete_order(detail.order.id)
        .await
        .unwrap();
    assert_eq!(done.order.status, OrderStatus::Completed);
    assert!(done.order.completed_at.is_some());
}

#[tokio::test]
async fn order_reads_are_owner_or_admin_only() {
    let app = common::setup().await;
    let user = Uuid::new_v4();
    let stranger = Uuid::new_v4();
    let admin = Uuid::new_v4();
    let product = app.seed_product("Hoodie", dec!(50.00), 5).await;
    fill_cart(&app, user, product.id, 1).await;
    let detail = app.state.services.orders.create_order(user).await.unwrap();

    let orders = &app.state.services.orders;

    orders.get_order(detail.order.id, user, false).await.unwrap();
    orders.get_order(detail.order.id, admin, true).await.unwrap();
    let err = orders
        .get_order(detail.order.id, stranger, false)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Forbidden(_));

    let by_number = orders
        .get_order_by_number(&detail.order.order_number, user, false)
        .await
        .unwrap();
    assert_eq!(by_number.order.id, detail.order.id);

    let err = orders
        .get_order_by_number("ORD-000000-000-0", user, false)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn admin_listing_filters_by_status() {
    let app = common::setup().await;
    let product = app.seed_product("Hoodie", dec!(50.00), 10).await;

    let keep = Uuid::new_v4();
    fill_cart(&app, keep, product.id, 1).await;
    app.state.services.orders.create_order(keep).await.unwrap();

    let drop = Uuid::new_v4();
    fill_cart(&app, drop, product.id, 1).await;
    let cancelled = app.state.services.orders.create_order(drop).await.unwrap();
    app.state
        .services
        .orders
        .cancel_order(drop, cancelled.order.id, None)
        .await
        .unwrap();

    let all = app.state.services.orders.list_all(None).await.unwrap();
    assert_eq!(all.len(), 2);

    let in_progress = app
        .state
        .services
        .orders
        .list_all(Some(OrderStatus::InProgress))
        .await
        .unwrap();
    assert_eq!(in_progress.len(), 1);
    assert_eq!(in_progress[0].user_id, keep);
}
