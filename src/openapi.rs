use utoipa::OpenApi;

use crate::{
    errors::ErrorResponse,
    handlers,
    services::{
        cart::{CartErrorKind, CartLine, CartLineError},
        checkout::PaymentMethod,
        gateway::CallbackPayload,
        promotions::PromoError,
        shipping::ShippingMethod,
    },
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront API",
        description = "Checkout, payment and order tracking API"
    ),
    paths(
        handlers::checkout::submit_checkout,
        handlers::payments::payment_callback,
        handlers::payments::payment_webhook,
        handlers::orders::get_order,
        handlers::health::health_check,
    ),
    components(schemas(
        handlers::checkout::CheckoutRequest,
        handlers::checkout::CheckoutResponse,
        handlers::checkout::ShippingAddressRequest,
        handlers::orders::OrderView,
        CartLine,
        CartLineError,
        CartErrorKind,
        CallbackPayload,
        PaymentMethod,
        PromoError,
        ShippingMethod,
        ErrorResponse,
    )),
    tags(
        (name = "checkout", description = "Cart validation and order creation"),
        (name = "payments", description = "Gateway callbacks and webhooks"),
        (name = "orders", description = "Order lookup"),
        (name = "health", description = "Service health")
    )
)]
pub struct ApiDoc;
