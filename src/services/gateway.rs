use crate::{config::GatewayConfig, errors::ServiceError};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use rust_decimal::{prelude::ToPrimitive, Decimal};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::Sha512;
use tracing::{error, instrument};
use utoipa::ToSchema;

type HmacSha512 = Hmac<Sha512>;

/// Line item forwarded to the gateway's order registration step.
#[derive(Debug, Clone, Serialize)]
pub struct GatewayOrderItem {
    pub name: String,
    pub amount_cents: i64,
    pub quantity: i32,
}

/// Everything the gateway needs to set up a hosted payment session.
#[derive(Debug, Clone)]
pub struct PaymentInitRequest {
    pub amount: Decimal,
    pub currency: String,
    /// Our order number; echoed back by the gateway as merchant_order_id.
    pub merchant_order_id: String,
    pub email: String,
    pub full_name: String,
    pub phone: String,
    pub address_line_1: String,
    pub city: String,
    pub governorate: String,
    pub items: Vec<GatewayOrderItem>,
}

/// Result of a completed gateway handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentInitialization {
    /// Hosted payment page the customer is sent to.
    pub redirect_url: String,
    /// The gateway's identifier for the registered order; callbacks are
    /// matched on this.
    pub gateway_order_ref: String,
    pub payment_token: String,
}

/// Seam for payment processing, so checkout logic can be exercised against a
/// stub while the real client talks HTTP.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn initialize(
        &self,
        request: &PaymentInitRequest,
    ) -> Result<PaymentInitialization, ServiceError>;
}

/// HTTP client for the hosted-payment gateway. The handshake is three calls:
/// authenticate, register the order, mint a payment key.
#[derive(Clone)]
pub struct PaymentGatewayClient {
    http: reqwest::Client,
    config: GatewayConfig,
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
struct OrderRegistration {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct PaymentKeyResponse {
    token: String,
}

impl PaymentGatewayClient {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    async fn authenticate(&self) -> Result<String, ServiceError> {
        let response = self
            .http
            .post(format!("{}/auth/tokens", self.config.base_url))
            .json(&json!({ "api_key": self.config.api_key }))
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("auth request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ServiceError::ExternalServiceError(format!(
                "auth token request returned {}",
                response.status()
            )));
        }
        let auth: AuthResponse = response.json().await.map_err(|e| {
            ServiceError::ExternalServiceError(format!("auth response malformed: {e}"))
        })?;
        Ok(auth.token)
    }

    async fn register_order(
        &self,
        auth_token: &str,
        request: &PaymentInitRequest,
        amount_cents: i64,
    ) -> Result<i64, ServiceError> {
        let response = self
            .http
            .post(format!("{}/ecommerce/orders", self.config.base_url))
            .json(&json!({
                "auth_token": auth_token,
                "delivery_needed": "false",
                "amount_cents": amount_cents,
                "currency": request.currency,
                "merchant_order_id": request.merchant_order_id,
                "items": request.items,
            }))
            .send()
            .await
            .map_err(|e| {
                ServiceError::ExternalServiceError(format!("order registration failed: {e}"))
            })?;

        if !response.status().is_success() {
            return Err(ServiceError::ExternalServiceError(format!(
                "order registration returned {}",
                response.status()
            )));
        }
        let registration: OrderRegistration = response.json().await.map_err(|e| {
            ServiceError::ExternalServiceError(format!("order registration malformed: {e}"))
        })?;
        Ok(registration.id)
    }

    async fn mint_payment_key(
        &self,
        auth_token: &str,
        request: &PaymentInitRequest,
        gateway_order_id: i64,
        amount_cents: i64,
    ) -> Result<String, ServiceError> {
        let (first_name, last_name) = split_name(&request.full_name);

        // Gateway rejects empty billing fields; absent values are sent as
        // the literal "NA".
        let response = self
            .http
            .post(format!("{}/acceptance/payment_keys", self.config.base_url))
            .json(&json!({
                "auth_token": auth_token,
                "amount_cents": amount_cents,
                "currency": request.currency,
                "order_id": gateway_order_id,
                "integration_id": self.config.integration_id,
                "expiration": self.config.token_expiration_secs,
                "billing_data": {
                    "email": request.email,
                    "first_name": first_name,
                    "last_name": last_name,
                    "phone_number": request.phone,
                    "street": request.address_line_1,
                    "city": request.city,
                    "state": request.governorate,
                    "country": "NA",
                    "apartment": "NA",
                    "floor": "NA",
                    "building": "NA",
                    "shipping_method": "NA",
                    "postal_code": "NA",
                },
            }))
            .send()
            .await
            .map_err(|e| {
                ServiceError::ExternalServiceError(format!("payment key request failed: {e}"))
            })?;

        if !response.status().is_success() {
            return Err(ServiceError::ExternalServiceError(format!(
                "payment key request returned {}",
                response.status()
            )));
        }
        let key: PaymentKeyResponse = response.json().await.map_err(|e| {
            ServiceError::ExternalServiceError(format!("payment key response malformed: {e}"))
        })?;
        Ok(key.token)
    }
}

#[async_trait]
impl PaymentGateway for PaymentGatewayClient {
    #[instrument(skip(self, request), fields(merchant_order_id = %request.merchant_order_id))]
    async fn initialize(
        &self,
        request: &PaymentInitRequest,
    ) -> Result<PaymentInitialization, ServiceError> {
        // Amounts cross to the gateway in minor units exactly once, here.
        let amount_cents = to_minor_units(request.amount)?;

        let auth_token = self.authenticate().await?;
        let gateway_order_id = self
            .register_order(&auth_token, request, amount_cents)
            .await?;
        let payment_token = self
            .mint_payment_key(&auth_token, request, gateway_order_id, amount_cents)
            .await
            .map_err(|e| {
                // The remote order is already registered at this point. It is
                // abandoned on the gateway side; a retry goes through a fresh
                // checkout and a fresh remote order.
                error!(gateway_order_id, "Payment key step failed after order registration");
                e
            })?;

        Ok(PaymentInitialization {
            redirect_url: build_redirect_url(&self.config.iframe_url, &payment_token),
            gateway_order_ref: gateway_order_id.to_string(),
            payment_token,
        })
    }
}

/// Converts a decimal major-unit amount to integer minor units (piasters,
/// cents). Fails on amounts that cannot be represented exactly.
pub fn to_minor_units(amount: Decimal) -> Result<i64, ServiceError> {
    let cents = (amount * Decimal::from(100)).round();
    cents.to_i64().ok_or_else(|| {
        ServiceError::InternalError(format!("amount {} not representable in minor units", amount))
    })
}

pub(crate) fn build_redirect_url(iframe_url: &str, payment_token: &str) -> String {
    format!("{}?payment_token={}", iframe_url, payment_token)
}

fn split_name(full_name: &str) -> (String, String) {
    match full_name.trim().split_once(' ') {
        Some((first, rest)) => (first.to_string(), rest.to_string()),
        None => (full_name.trim().to_string(), "NA".to_string()),
    }
}

/// Transaction callback as delivered by the gateway, both on the browser
/// redirect (query string) and the server-to-server webhook. All fields
/// arrive stringly-typed and default to empty so a partial payload still
/// deserializes and then fails verification.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct CallbackPayload {
    #[serde(default)]
    pub amount_cents: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub error_occured: String,
    #[serde(default)]
    pub has_parent_transaction: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub integration_id: String,
    #[serde(default)]
    pub is_3d_secure: String,
    #[serde(default)]
    pub is_auth: String,
    #[serde(default)]
    pub is_capture: String,
    #[serde(default)]
    pub is_refunded: String,
    #[serde(default)]
    pub is_standalone_payment: String,
    #[serde(default)]
    pub is_voided: String,
    /// The gateway's order id; matches `gateway_order_ref` on our order row.
    #[serde(default)]
    pub order: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub pending: String,
    #[serde(default, rename = "source_data.pan")]
    pub source_data_pan: String,
    #[serde(default, rename = "source_data.sub_type")]
    pub source_data_sub_type: String,
    #[serde(default, rename = "source_data.type")]
    pub source_data_type: String,
    #[serde(default)]
    pub success: String,
    #[serde(default)]
    pub hmac: String,
}

impl CallbackPayload {
    pub fn is_success(&self) -> bool {
        self.success == "true"
    }

    /// Concatenates the signed fields in the order fixed by the gateway's
    /// HMAC scheme. Field order is part of the contract; do not sort.
    fn signed_message(&self) -> String {
        [
            self.amount_cents.as_str(),
            self.created_at.as_str(),
            self.currency.as_str(),
            self.error_occured.as_str(),
            self.has_parent_transaction.as_str(),
            self.id.as_str(),
            self.integration_id.as_str(),
            self.is_3d_secure.as_str(),
            self.is_auth.as_str(),
            self.is_capture.as_str(),
            self.is_refunded.as_str(),
            self.is_standalone_payment.as_str(),
            self.is_voided.as_str(),
            self.order.as_str(),
            self.owner.as_str(),
            self.pending.as_str(),
            self.source_data_pan.as_str(),
            self.source_data_sub_type.as_str(),
            self.source_data_type.as_str(),
            self.success.as_str(),
        ]
        .concat()
    }

    /// Verifies the payload signature. Comparison runs in constant time via
    /// the MAC's own verifier.
    pub fn verify(&self, secret: &str) -> bool {
        let Ok(provided) = hex::decode(self.hmac.trim()) else {
            return false;
        };
        let Ok(mut mac) = HmacSha512::new_from_slice(secret.as_bytes()) else {
            return false;
        };
        mac.update(self.signed_message().as_bytes());
        mac.verify_slice(&provided).is_ok()
    }

    /// Test and tooling helper: computes the hex signature for this payload.
    pub fn sign(&self, secret: &str) -> String {
        let mut mac = HmacSha512::new_from_slice(secret.as_bytes())
            .unwrap_or_else(|_| unreachable!("hmac accepts any key length"));
        mac.update(self.signed_message().as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}
