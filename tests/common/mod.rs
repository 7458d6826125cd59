#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

use storefront_api::{
    app_router,
    config::AppConfig,
    db::{establish_connection, run_migrations, DbPool},
    entities::{free_shipping_setting, product, product_variant, promo_code, shipping_rate},
    errors::ServiceError,
    events::EventSender,
    handlers::AppServices,
    services::gateway::{PaymentGateway, PaymentInitRequest, PaymentInitialization},
    AppState,
};

pub const TEST_HMAC_SECRET: &str = "test-hmac-secret";

/// Gateway stub that always succeeds with a fixed remote order reference.
pub struct StubGateway {
    pub gateway_order_ref: String,
}

impl StubGateway {
    pub fn new(gateway_order_ref: &str) -> Self {
        Self {
            gateway_order_ref: gateway_order_ref.to_string(),
        }
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn initialize(
        &self,
        _request: &PaymentInitRequest,
    ) -> Result<PaymentInitialization, ServiceError> {
        Ok(PaymentInitialization {
            redirect_url: format!(
                "https://pay.example.com/iframe?payment_token=tok_{}",
                self.gateway_order_ref
            ),
            gateway_order_ref: self.gateway_order_ref.clone(),
            payment_token: format!("tok_{}", self.gateway_order_ref),
        })
    }
}

/// Gateway stub whose handshake always fails.
pub struct FailingGateway;

#[async_trait]
impl PaymentGateway for FailingGateway {
    async fn initialize(
        &self,
        _request: &PaymentInitRequest,
    ) -> Result<PaymentInitialization, ServiceError> {
        Err(ServiceError::ExternalServiceError(
            "auth token request returned 500".to_string(),
        ))
    }
}

pub struct TestApp {
    pub router: Router,
    pub db: Arc<DbPool>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_gateway(Arc::new(StubGateway::new("555777"))).await
    }

    pub async fn with_gateway(gateway: Arc<dyn PaymentGateway>) -> Self {
        let mut config = AppConfig::new("sqlite::memory:", "test");
        // A pooled in-memory SQLite gives each connection its own database;
        // pin the pool to a single connection so state is shared.
        config.db_max_connections = 1;
        config.db_min_connections = 1;
        config.gateway.hmac_secret = Some(TEST_HMAC_SECRET.to_string());

        let db = Arc::new(
            establish_connection(&config)
                .await
                .expect("test database connection"),
        );
        run_migrations(&db).await.expect("test migrations");

        let (tx, mut rx) = mpsc::channel(64);
        tokio::spawn(async move { while rx.recv().await.is_some() {} });
        let event_sender = EventSender::new(tx);

        let services = AppServices::new(db.clone(), event_sender.clone(), gateway, &config);
        let state = AppState {
            db: db.clone(),
            config: Arc::new(config),
            event_sender,
            services,
        };

        Self {
            router: app_router(state),
            db,
        }
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request");
        self.send(request).await
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .expect("request");
        self.send(request).await
    }

    /// Sends a request and returns the status plus the location header,
    /// for redirect endpoints.
    pub async fn get_redirect(&self, uri: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .expect("request");
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("response");
        let status = response.status();
        let location = response
            .headers()
            .get("location")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        (status, location)
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    pub async fn seed_product(
        &self,
        name: &str,
        base_price: Decimal,
        is_active: bool,
    ) -> product::Model {
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            description: Set(None),
            base_price: Set(base_price),
            compare_at_price: Set(None),
            images: Set(None),
            is_active: Set(is_active),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .expect("seed product")
    }

    pub async fn seed_variant(
        &self,
        product_id: Uuid,
        label: &str,
        price_adjustment: Decimal,
        stock_quantity: i32,
    ) -> product_variant::Model {
        product_variant::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(product_id),
            label: Set(label.to_string()),
            price_adjustment: Set(price_adjustment),
            stock_quantity: Set(stock_quantity),
            is_active: Set(true),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .expect("seed variant")
    }

    pub async fn seed_promo(
        &self,
        code: &str,
        discount_type: promo_code::DiscountType,
        discount_value: Decimal,
        min_order_amount: Option<Decimal>,
        expires_at: Option<DateTime<Utc>>,
    ) -> promo_code::Model {
        promo_code::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code.to_string()),
            discount_type: Set(discount_type),
            discount_value: Set(discount_value),
            min_order_amount: Set(min_order_amount),
            starts_at: Set(None),
            expires_at: Set(expires_at),
            max_uses: Set(None),
            used_count: Set(0),
            is_active: Set(true),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .expect("seed promo")
    }

    pub async fn seed_shipping_rate(&self, method: &str, rate: Decimal) -> shipping_rate::Model {
        shipping_rate::ActiveModel {
            id: Set(Uuid::new_v4()),
            method: Set(method.to_string()),
            rate: Set(rate),
            is_active: Set(true),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .expect("seed shipping rate")
    }

    pub async fn seed_free_shipping(&self, min_order_amount: Decimal) {
        free_shipping_setting::ActiveModel {
            id: Set(Uuid::new_v4()),
            is_active: Set(true),
            min_order_amount: Set(min_order_amount),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .expect("seed free shipping setting");
    }
}

/// Minimal valid checkout body; tests override fields as needed.
pub fn checkout_body(items: Value, payment_method: &str) -> Value {
    serde_json::json!({
        "email": "customer@example.com",
        "shipping": {
            "full_name": "Mona El Sayed",
            "phone": "+201001234567",
            "address_line_1": "12 Tahrir St",
            "city": "Cairo",
            "governorate": "Cairo"
        },
        "shipping_method": "standard",
        "payment_method": payment_method,
        "items": items
    })
}
