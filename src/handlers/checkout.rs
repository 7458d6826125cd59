use crate::{
    errors::ServiceError,
    handlers::common::{created_response, validate_input},
    services::{
        cart::CartLine,
        checkout::{CheckoutSubmission, PaymentMethod},
        orders::ShippingDetails,
        promotions::PromoError,
        shipping::ShippingMethod,
    },
    AppState,
};
use axum::{extract::State, response::IntoResponse, Json};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Shipping address as submitted by the storefront.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct ShippingAddressRequest {
    #[validate(length(min = 1, max = 120, message = "Full name is required"))]
    pub full_name: String,
    #[validate(length(min = 5, max = 20, message = "A valid phone number is required"))]
    pub phone: String,
    #[validate(length(min = 1, max = 255, message = "Address line is required"))]
    pub address_line_1: String,
    pub address_line_2: Option<String>,
    #[validate(length(min = 1, max = 100, message = "City is required"))]
    pub city: String,
    #[validate(length(min = 1, max = 100, message = "Governorate is required"))]
    pub governorate: String,
    pub postal_code: Option<String>,
}

impl From<ShippingAddressRequest> for ShippingDetails {
    fn from(req: ShippingAddressRequest) -> Self {
        Self {
            full_name: req.full_name,
            phone: req.phone,
            address_line_1: req.address_line_1,
            address_line_2: req.address_line_2,
            city: req.city,
            governorate: req.governorate,
            postal_code: req.postal_code,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CheckoutRequest {
    #[validate(email(message = "A valid email is required"))]
    pub email: String,
    #[validate]
    pub shipping: ShippingAddressRequest,
    pub shipping_method: ShippingMethod,
    pub payment_method: PaymentMethod,
    pub promo_code: Option<String>,
    pub notes: Option<String>,
    #[validate(length(min = 1, message = "Cart must contain at least one item"))]
    pub items: Vec<CartLine>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CheckoutResponse {
    pub order_id: Uuid,
    pub order_number: String,
    pub payment_method: String,
    pub total: Decimal,
    /// Hosted payment page URL; absent for cash-on-delivery orders.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_key: Option<String>,
    /// Set when the submitted promo code was rejected; the order proceeded
    /// without the discount.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promo_error: Option<PromoError>,
}

/// Submit a checkout and create an order
#[utoipa::path(
    post,
    path = "/api/v1/checkout",
    request_body = CheckoutRequest,
    responses(
        (status = 201, description = "Order created", body = CheckoutResponse),
        (status = 400, description = "Invalid input or rejected cart"),
        (status = 502, description = "Payment gateway unavailable")
    ),
    tag = "checkout"
)]
#[instrument(skip(state, payload), fields(items = payload.items.len()))]
pub async fn submit_checkout(
    State(state): State<AppState>,
    Json(payload): Json<CheckoutRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    for item in &payload.items {
        validate_input(item)?;
    }

    let submission = CheckoutSubmission {
        user_id: None,
        email: payload.email,
        shipping: payload.shipping.into(),
        shipping_method: payload.shipping_method,
        payment_method: payload.payment_method,
        promo_code: payload.promo_code,
        notes: payload.notes,
        lines: payload.items,
    };

    let outcome = state.services.checkout.submit(submission).await?;

    Ok(created_response(CheckoutResponse {
        order_id: outcome.order.id,
        order_number: outcome.order.order_number,
        payment_method: outcome.order.payment_method,
        total: outcome.order.total,
        payment_url: outcome.payment.as_ref().map(|p| p.redirect_url.clone()),
        payment_key: outcome.payment.as_ref().map(|p| p.payment_token.clone()),
        promo_error: outcome.promo_error,
    }))
}
