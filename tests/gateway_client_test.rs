use rust_decimal_macros::dec;
use serde_json::json;
use wiremock::{
    matchers::{body_partial_json, method, path},
    Mock, MockServer, ResponseTemplate,
};

use storefront_api::{
    config::GatewayConfig,
    errors::ServiceError,
    services::gateway::{
        GatewayOrderItem, PaymentGateway, PaymentGatewayClient, PaymentInitRequest,
    },
};

fn init_request() -> PaymentInitRequest {
    PaymentInitRequest {
        amount: dec!(248),
        currency: "EGP".to_string(),
        merchant_order_id: "SF-20240501-AB12CD".to_string(),
        email: "customer@example.com".to_string(),
        full_name: "Mona El Sayed".to_string(),
        phone: "+201001234567".to_string(),
        address_line_1: "12 Tahrir St".to_string(),
        city: "Cairo".to_string(),
        governorate: "Cairo".to_string(),
        items: vec![GatewayOrderItem {
            name: "Linen Shirt".to_string(),
            amount_cents: 11000,
            quantity: 2,
        }],
    }
}

fn gateway_config(base_url: String) -> GatewayConfig {
    GatewayConfig {
        base_url,
        api_key: "key_test".to_string(),
        integration_id: 12345,
        iframe_url: "https://pay.example.com/iframe/77".to_string(),
        hmac_secret: None,
        token_expiration_secs: 3600,
    }
}

#[tokio::test]
async fn handshake_runs_three_steps_and_builds_redirect() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/tokens"))
        .and(body_partial_json(json!({ "api_key": "key_test" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "auth_tok" })))
        .expect(1)
        .mount(&server)
        .await;

    // Amount crosses in minor units: 248.00 -> 24800.
    Mock::given(method("POST"))
        .and(path("/ecommerce/orders"))
        .and(body_partial_json(json!({
            "auth_token": "auth_tok",
            "amount_cents": 24800,
            "currency": "EGP",
            "merchant_order_id": "SF-20240501-AB12CD"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 555777 })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/acceptance/payment_keys"))
        .and(body_partial_json(json!({
            "auth_token": "auth_tok",
            "amount_cents": 24800,
            "order_id": 555777,
            "integration_id": 12345,
            "expiration": 3600,
            "billing_data": {
                "email": "customer@example.com",
                "first_name": "Mona",
                "last_name": "El Sayed",
                "postal_code": "NA"
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "pay_tok" })))
        .expect(1)
        .mount(&server)
        .await;

    let client = PaymentGatewayClient::new(gateway_config(server.uri()));
    let init = client.initialize(&init_request()).await.unwrap();

    assert_eq!(init.gateway_order_ref, "555777");
    assert_eq!(init.payment_token, "pay_tok");
    assert_eq!(
        init.redirect_url,
        "https://pay.example.com/iframe/77?payment_token=pay_tok"
    );
}

#[tokio::test]
async fn auth_failure_is_an_external_service_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/tokens"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = PaymentGatewayClient::new(gateway_config(server.uri()));
    let err = client.initialize(&init_request()).await.unwrap_err();
    assert!(matches!(err, ServiceError::ExternalServiceError(_)));
}

#[tokio::test]
async fn order_registration_failure_aborts_before_payment_key() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/tokens"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "auth_tok" })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/ecommerce/orders"))
        .respond_with(ResponseTemplate::new(422))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/acceptance/payment_keys"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "pay_tok" })))
        .expect(0)
        .mount(&server)
        .await;

    let client = PaymentGatewayClient::new(gateway_config(server.uri()));
    let err = client.initialize(&init_request()).await.unwrap_err();
    assert!(matches!(err, ServiceError::ExternalServiceError(_)));
}
