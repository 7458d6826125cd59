use crate::{
    entities::order,
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        cart::{CartLine, CartValidator},
        gateway::{
            to_minor_units, GatewayOrderItem, PaymentGateway, PaymentInitRequest,
            PaymentInitialization,
        },
        orders::{CreateOrderInput, OrderLedger, ShippingDetails},
        promotions::{PromoError, PromotionService},
        shipping::{ShippingMethod, ShippingService},
    },
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// How the customer pays. `cod` defers payment to delivery and skips the
/// gateway entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Card,
    Wallet,
    Cod,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Card => "card",
            Self::Wallet => "wallet",
            Self::Cod => "cod",
        }
    }

    /// True when payment is collected on delivery rather than online.
    pub fn is_deferred(&self) -> bool {
        matches!(self, Self::Cod)
    }
}

/// Checkout submission after transport-level validation.
#[derive(Debug, Clone)]
pub struct CheckoutSubmission {
    pub user_id: Option<Uuid>,
    pub email: String,
    pub shipping: ShippingDetails,
    pub shipping_method: ShippingMethod,
    pub payment_method: PaymentMethod,
    pub promo_code: Option<String>,
    pub notes: Option<String>,
    pub lines: Vec<CartLine>,
}

/// Result of a successful checkout. `payment` is populated for gateway
/// methods and absent for deferred ones.
#[derive(Debug, Clone)]
pub struct CheckoutOutcome {
    pub order: order::Model,
    pub payment: Option<PaymentInitialization>,
    /// Set when a submitted promo code was rejected; the order still went
    /// through, undiscounted.
    pub promo_error: Option<PromoError>,
}

/// Orchestrates the checkout pipeline: cart validation, promo evaluation,
/// shipping, order creation and gateway handoff.
#[derive(Clone)]
pub struct CheckoutService {
    cart: CartValidator,
    promotions: PromotionService,
    shipping: ShippingService,
    ledger: Arc<OrderLedger>,
    gateway: Arc<dyn PaymentGateway>,
    event_sender: EventSender,
    currency: String,
}

impl CheckoutService {
    pub fn new(
        cart: CartValidator,
        promotions: PromotionService,
        shipping: ShippingService,
        ledger: Arc<OrderLedger>,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: EventSender,
        currency: String,
    ) -> Self {
        Self {
            cart,
            promotions,
            shipping,
            ledger,
            gateway,
            event_sender,
            currency,
        }
    }

    /// Runs the full pipeline. Fails closed on any invalid cart line; a bad
    /// promo code is the one non-fatal input, reported back inline.
    ///
    /// For gateway methods, the order is created before the gateway is
    /// called. A gateway failure therefore leaves a pending, unpaid order
    /// behind; the customer retries through a fresh checkout, and the
    /// abandoned order never confirms.
    #[instrument(skip(self, submission), fields(payment_method = %submission.payment_method.as_str()))]
    pub async fn submit(
        &self,
        submission: CheckoutSubmission,
    ) -> Result<CheckoutOutcome, ServiceError> {
        let validation = self.cart.validate(&submission.lines).await?;
        if !validation.is_valid() {
            return Err(ServiceError::CartRejected(validation.errors));
        }
        let subtotal = validation.subtotal;

        let mut discount = Decimal::ZERO;
        let mut promo = None;
        let mut promo_error = None;
        if let Some(code) = submission.promo_code.as_deref() {
            let evaluation = self.promotions.validate_code(code, subtotal).await?;
            match evaluation.error {
                Some(e) => promo_error = Some(e),
                None => {
                    discount = evaluation.discount;
                    promo = evaluation.promo;
                }
            }
        }

        let shipping_cost = self
            .shipping
            .cost(submission.shipping_method, subtotal)
            .await?;

        let order = self
            .ledger
            .create_order(CreateOrderInput {
                user_id: submission.user_id,
                guest_email: if submission.user_id.is_none() {
                    Some(submission.email.clone())
                } else {
                    None
                },
                shipping: submission.shipping.clone(),
                payment_method: submission.payment_method.as_str().to_string(),
                shipping_method: submission.shipping_method,
                lines: validation.valid_lines.clone(),
                subtotal,
                shipping_cost,
                discount_amount: discount,
                promo_code: promo.as_ref().map(|p| p.code.clone()),
                notes: submission.notes.clone(),
            })
            .await?;

        // Redemption is counted only after the order referencing the code is
        // durable. If the cap was hit in between, the customer keeps the
        // discount that was quoted; the window closes for everyone after.
        if let Some(promo) = &promo {
            match self.promotions.redeem(promo.id).await {
                Ok(true) => {
                    if let Err(e) = self
                        .event_sender
                        .send(Event::PromoCodeRedeemed {
                            code: promo.code.clone(),
                        })
                        .await
                    {
                        error!("Failed to send PromoCodeRedeemed event: {}", e);
                    }
                }
                Ok(false) => {
                    warn!(code = %promo.code, order_number = %order.order_number,
                        "Promo cap reached after order creation; discount honored");
                }
                Err(e) => {
                    error!(code = %promo.code, "Promo redemption failed: {}", e);
                }
            }
        }

        if submission.payment_method.is_deferred() {
            return Ok(CheckoutOutcome {
                order,
                payment: None,
                promo_error,
            });
        }

        let init_request = self.build_init_request(&order, &validation.valid_lines, &submission)?;
        let payment = self.gateway.initialize(&init_request).await?;
        self.ledger
            .record_gateway_registration(order.id, &payment.gateway_order_ref)
            .await?;

        Ok(CheckoutOutcome {
            order,
            payment: Some(payment),
            promo_error,
        })
    }

    fn build_init_request(
        &self,
        order: &order::Model,
        lines: &[crate::services::cart::ValidatedCartLine],
        submission: &CheckoutSubmission,
    ) -> Result<PaymentInitRequest, ServiceError> {
        let items = lines
            .iter()
            .map(|line| {
                Ok(GatewayOrderItem {
                    name: line.product_name.clone(),
                    amount_cents: to_minor_units(line.unit_price)?,
                    quantity: line.quantity,
                })
            })
            .collect::<Result<Vec<_>, ServiceError>>()?;

        Ok(PaymentInitRequest {
            amount: order.total,
            currency: self.currency.clone(),
            merchant_order_id: order.order_number.clone(),
            email: submission.email.clone(),
            full_name: submission.shipping.full_name.clone(),
            phone: submission.shipping.phone.clone(),
            address_line_1: submission.shipping.address_line_1.clone(),
            city: submission.shipping.city.clone(),
            governorate: submission.shipping.governorate.clone(),
            items,
        })
    }
}
