mod common;

use common::{checkout_body, FailingGateway, TestApp};
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter};
use serde_json::json;
use std::sync::Arc;
use storefront_api::entities::{order, order_item, order_tracking_event, promo_code};

#[tokio::test]
async fn cod_checkout_creates_pending_order_with_correct_totals() {
    let app = TestApp::new().await;
    let product = app.seed_product("Linen Shirt", dec!(100), true).await;
    let variant = app.seed_variant(product.id, "M / Black", dec!(10), 5).await;
    app.seed_shipping_rate("standard", dec!(50)).await;
    app.seed_promo(
        "SAVE10",
        promo_code::DiscountType::Percentage,
        dec!(10),
        Some(dec!(50)),
        None,
    )
    .await;

    let mut body = checkout_body(
        json!([{ "product_id": product.id, "variant_id": variant.id, "quantity": 2 }]),
        "cod",
    );
    body["promo_code"] = json!("save10");

    let (status, response) = app.post_json("/api/v1/checkout", body).await;
    assert_eq!(status, 201, "unexpected response: {response}");
    assert_eq!(response["payment_method"], "cod");
    assert!(response.get("payment_url").is_none());
    assert!(response.get("promo_error").is_none());

    let order_number = response["order_number"].as_str().unwrap();
    let stored = order::Entity::find()
        .filter(order::Column::OrderNumber.eq(order_number))
        .one(&*app.db)
        .await
        .unwrap()
        .expect("order persisted");

    assert_eq!(stored.subtotal, dec!(220));
    assert_eq!(stored.shipping_cost, dec!(50));
    assert_eq!(stored.discount_amount, dec!(22));
    assert_eq!(stored.total, dec!(248));
    assert_eq!(stored.status, "pending");
    assert_eq!(stored.payment_status, "pending");
    assert_eq!(stored.promo_code.as_deref(), Some("SAVE10"));
    assert_eq!(stored.guest_email.as_deref(), Some("customer@example.com"));

    let redeemed = promo_code::Entity::find()
        .filter(promo_code::Column::Code.eq("SAVE10"))
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(redeemed.used_count, 1);
}

#[tokio::test]
async fn rejected_cart_fails_closed_and_creates_nothing() {
    let app = TestApp::new().await;
    let product = app.seed_product("Linen Shirt", dec!(100), true).await;
    let variant = app.seed_variant(product.id, "M / Black", dec!(0), 1).await;

    // One valid line, one over stock. The whole checkout must be refused.
    let body = checkout_body(
        json!([
            { "product_id": product.id, "quantity": 1 },
            { "product_id": product.id, "variant_id": variant.id, "quantity": 5 }
        ]),
        "cod",
    );

    let (status, response) = app.post_json("/api/v1/checkout", body).await;
    assert_eq!(status, 400);
    let details = response["details"].as_array().expect("per-line details");
    assert_eq!(details.len(), 1);
    assert_eq!(details[0]["kind"], "insufficient_stock");

    let orders = order::Entity::find().count(&*app.db).await.unwrap();
    assert_eq!(orders, 0);
}

#[tokio::test]
async fn invalid_promo_is_non_fatal() {
    let app = TestApp::new().await;
    let product = app.seed_product("Linen Shirt", dec!(100), true).await;
    app.seed_shipping_rate("standard", dec!(50)).await;

    let mut body = checkout_body(json!([{ "product_id": product.id, "quantity": 1 }]), "cod");
    body["promo_code"] = json!("NOSUCHCODE");

    let (status, response) = app.post_json("/api/v1/checkout", body).await;
    assert_eq!(status, 201);
    assert_eq!(response["promo_error"], "invalid_code");

    let stored = order::Entity::find().one(&*app.db).await.unwrap().unwrap();
    assert_eq!(stored.discount_amount, dec!(0));
    assert!(stored.promo_code.is_none());
}

#[tokio::test]
async fn card_checkout_returns_payment_url_and_stores_gateway_ref() {
    let app = TestApp::new().await;
    let product = app.seed_product("Linen Shirt", dec!(100), true).await;
    app.seed_shipping_rate("standard", dec!(50)).await;

    let body = checkout_body(json!([{ "product_id": product.id, "quantity": 1 }]), "card");
    let (status, response) = app.post_json("/api/v1/checkout", body).await;
    assert_eq!(status, 201, "unexpected response: {response}");

    let payment_url = response["payment_url"].as_str().unwrap();
    assert!(payment_url.contains("payment_token="));
    assert!(response["payment_key"].as_str().is_some());

    let stored = order::Entity::find().one(&*app.db).await.unwrap().unwrap();
    assert_eq!(stored.gateway_order_ref.as_deref(), Some("555777"));
    assert_eq!(stored.payment_status, "pending");
}

#[tokio::test]
async fn gateway_failure_returns_502_and_leaves_order_pending() {
    let app = TestApp::with_gateway(Arc::new(FailingGateway)).await;
    let product = app.seed_product("Linen Shirt", dec!(100), true).await;

    let body = checkout_body(json!([{ "product_id": product.id, "quantity": 1 }]), "card");
    let (status, response) = app.post_json("/api/v1/checkout", body).await;
    assert_eq!(status, 502);
    assert_eq!(
        response["message"],
        "Payment could not be initialized, please try again"
    );

    // The order row stays behind, pending and never registered.
    let stored = order::Entity::find().one(&*app.db).await.unwrap().unwrap();
    assert_eq!(stored.payment_status, "pending");
    assert!(stored.gateway_order_ref.is_none());
}

#[tokio::test]
async fn free_shipping_threshold_is_inclusive() {
    let app = TestApp::new().await;
    let product = app.seed_product("Wool Coat", dec!(500), true).await;
    let cheaper = app.seed_product("Socks", dec!(499.99), true).await;
    app.seed_shipping_rate("standard", dec!(50)).await;
    app.seed_free_shipping(dec!(500)).await;

    let body = checkout_body(json!([{ "product_id": product.id, "quantity": 1 }]), "cod");
    let (status, response) = app.post_json("/api/v1/checkout", body).await;
    assert_eq!(status, 201);
    let at_threshold = order::Entity::find()
        .filter(order::Column::OrderNumber.eq(response["order_number"].as_str().unwrap()))
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(at_threshold.shipping_cost, dec!(0));
    assert_eq!(at_threshold.total, dec!(500));

    let body = checkout_body(json!([{ "product_id": cheaper.id, "quantity": 1 }]), "cod");
    let (status, response) = app.post_json("/api/v1/checkout", body).await;
    assert_eq!(status, 201);
    let below = order::Entity::find()
        .filter(order::Column::OrderNumber.eq(response["order_number"].as_str().unwrap()))
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(below.shipping_cost, dec!(50));
}

#[tokio::test]
async fn order_rows_include_item_snapshots_and_tracking_event() {
    let app = TestApp::new().await;
    let shirt = app.seed_product("Linen Shirt", dec!(100), true).await;
    let coat = app.seed_product("Wool Coat", dec!(500), true).await;
    app.seed_shipping_rate("standard", dec!(50)).await;

    let body = checkout_body(
        json!([
            { "product_id": shirt.id, "quantity": 2 },
            { "product_id": coat.id, "quantity": 1 }
        ]),
        "cod",
    );
    let (status, _) = app.post_json("/api/v1/checkout", body).await;
    assert_eq!(status, 201);

    assert_eq!(order::Entity::find().count(&*app.db).await.unwrap(), 1);
    let items = order_item::Entity::find().all(&*app.db).await.unwrap();
    assert_eq!(items.len(), 2);
    let shirt_item = items.iter().find(|i| i.product_id == shirt.id).unwrap();
    assert_eq!(shirt_item.unit_price, dec!(100));
    assert_eq!(shirt_item.line_total, dec!(200));
    assert_eq!(shirt_item.product_name, "Linen Shirt");

    let events = order_tracking_event::Entity::find().all(&*app.db).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].status, "pending");
}

#[tokio::test]
async fn failed_item_insert_leaves_no_orphan_order() {
    let app = TestApp::new().await;
    let product = app.seed_product("Linen Shirt", dec!(100), true).await;
    app.seed_shipping_rate("standard", dec!(50)).await;

    // Break the item insert mid-transaction; the order row must roll back
    // with it.
    app.db
        .execute_unprepared("DROP TABLE order_items")
        .await
        .unwrap();

    let body = checkout_body(json!([{ "product_id": product.id, "quantity": 1 }]), "cod");
    let (status, _) = app.post_json("/api/v1/checkout", body).await;
    assert_eq!(status, 500);

    let orders = order::Entity::find().count(&*app.db).await.unwrap();
    assert_eq!(orders, 0);
}

#[tokio::test]
async fn order_lookup_by_number() {
    let app = TestApp::new().await;
    let product = app.seed_product("Linen Shirt", dec!(100), true).await;
    app.seed_shipping_rate("standard", dec!(50)).await;

    let body = checkout_body(json!([{ "product_id": product.id, "quantity": 1 }]), "cod");
    let (_, response) = app.post_json("/api/v1/checkout", body).await;
    let order_number = response["order_number"].as_str().unwrap();

    let (status, found) = app.get(&format!("/api/v1/orders/{order_number}")).await;
    assert_eq!(status, 200);
    assert_eq!(found["order_number"], order_number);
    assert_eq!(found["items"].as_array().unwrap().len(), 1);
    assert_eq!(found["tracking"].as_array().unwrap().len(), 1);

    let (status, _) = app.get("/api/v1/orders/SF-19700101-XXXXXX").await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn malformed_input_is_rejected_upfront() {
    let app = TestApp::new().await;

    // Empty cart
    let body = checkout_body(json!([]), "cod");
    let (status, _) = app.post_json("/api/v1/checkout", body).await;
    assert_eq!(status, 400);

    // Bad email
    let mut body = checkout_body(
        json!([{ "product_id": uuid::Uuid::new_v4(), "quantity": 1 }]),
        "cod",
    );
    body["email"] = json!("not-an-email");
    let (status, _) = app.post_json("/api/v1/checkout", body).await;
    assert_eq!(status, 400);

    let orders = order::Entity::find().count(&*app.db).await.unwrap();
    assert_eq!(orders, 0);
}
