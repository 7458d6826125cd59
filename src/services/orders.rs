use crate::{
    db::DbPool,
    entities::{order, order_item, order_tracking_event, product_variant},
    errors::ServiceError,
    events::{Event, EventSender},
    services::{cart::ValidatedCartLine, shipping::ShippingMethod},
};
use chrono::Utc;
use rand::{distributions::Alphanumeric, Rng};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

const ORDER_NUMBER_ATTEMPTS: usize = 5;

/// Shipping snapshot captured at order time.
#[derive(Debug, Clone)]
pub struct ShippingDetails {
    pub full_name: String,
    pub phone: String,
    pub address_line_1: String,
    pub address_line_2: Option<String>,
    pub city: String,
    pub governorate: String,
    pub postal_code: Option<String>,
}

/// Everything the ledger needs to persist an order. Prices arrive already
/// resolved: lines come from cart validation and the shipping/discount
/// amounts from their respective services.
#[derive(Debug, Clone)]
pub struct CreateOrderInput {
    pub user_id: Option<Uuid>,
    pub guest_email: Option<String>,
    pub shipping: ShippingDetails,
    pub payment_method: String,
    pub shipping_method: ShippingMethod,
    pub lines: Vec<ValidatedCartLine>,
    pub subtotal: Decimal,
    pub shipping_cost: Decimal,
    pub discount_amount: Decimal,
    pub promo_code: Option<String>,
    pub notes: Option<String>,
}

/// Result of applying a gateway verdict to an order.
#[derive(Debug, Clone)]
pub struct PaymentApplication {
    pub order: order::Model,
    /// True when this exact verdict had already been recorded, so nothing
    /// changed on this call.
    pub already_applied: bool,
}

/// Owns every order state transition. Status and payment_status are only
/// written here; handlers and other services go through these methods.
#[derive(Clone)]
pub struct OrderLedger {
    db: Arc<DbPool>,
    event_sender: EventSender,
}

impl OrderLedger {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Persists the order, its line-item snapshots and the initial tracking
    /// event in one transaction. The order always starts with
    /// `status = pending`, `payment_status = pending`; only the tracking note
    /// differs between deferred (cod) and gateway payment methods.
    #[instrument(skip(self, input), fields(payment_method = %input.payment_method, lines = input.lines.len()))]
    pub async fn create_order(&self, input: CreateOrderInput) -> Result<order::Model, ServiceError> {
        let order_number = self.generate_order_number().await?;
        let order_id = Uuid::new_v4();
        let now = Utc::now();

        let total = (input.subtotal + input.shipping_cost - input.discount_amount)
            .max(Decimal::ZERO);

        let txn = self.db.begin().await?;

        let order = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(order_number.clone()),
            user_id: Set(input.user_id),
            guest_email: Set(input.guest_email),
            status: Set("pending".to_string()),
            payment_status: Set("pending".to_string()),
            payment_method: Set(input.payment_method.clone()),
            shipping_method: Set(input.shipping_method.as_str().to_string()),
            subtotal: Set(input.subtotal),
            shipping_cost: Set(input.shipping_cost),
            discount_amount: Set(input.discount_amount),
            total: Set(total),
            promo_code: Set(input.promo_code),
            ship_to_name: Set(input.shipping.full_name),
            ship_to_phone: Set(input.shipping.phone),
            address_line_1: Set(input.shipping.address_line_1),
            address_line_2: Set(input.shipping.address_line_2),
            city: Set(input.shipping.city),
            governorate: Set(input.shipping.governorate),
            postal_code: Set(input.shipping.postal_code),
            notes: Set(input.notes),
            gateway_order_ref: Set(None),
            gateway_transaction_id: Set(None),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        }
        .insert(&txn)
        .await?;

        for line in &input.lines {
            order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(line.product_id),
                variant_id: Set(line.variant_id),
                product_name: Set(line.product_name.clone()),
                variant_label: Set(line.variant_label.clone()),
                unit_price: Set(line.unit_price),
                quantity: Set(line.quantity),
                line_total: Set(line.line_total),
                created_at: Set(now),
            }
            .insert(&txn)
            .await?;
        }

        let description = if input.payment_method == "cod" {
            "Order placed, payment due on delivery".to_string()
        } else {
            "Order created, awaiting payment".to_string()
        };
        order_tracking_event::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            status: Set("pending".to_string()),
            description: Set(description),
            created_at: Set(now),
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;

        info!(order_id = %order_id, order_number = %order.order_number, "Order created");
        if let Err(e) = self.event_sender.send(Event::OrderCreated(order_id)).await {
            error!("Failed to send OrderCreated event: {}", e);
        }

        Ok(order)
    }

    /// Stores the payment processor's remote order reference once the
    /// gateway handshake completes.
    #[instrument(skip(self))]
    pub async fn record_gateway_registration(
        &self,
        order_id: Uuid,
        gateway_order_ref: &str,
    ) -> Result<(), ServiceError> {
        let order = order::Entity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let mut active: order::ActiveModel = order.into();
        active.gateway_order_ref = Set(Some(gateway_order_ref.to_string()));
        active.updated_at = Set(Some(Utc::now()));
        active.update(&*self.db).await?;
        Ok(())
    }

    /// Applies a verified gateway verdict to the order registered under
    /// `gateway_order_ref`. Idempotent: re-delivered verdicts are detected
    /// and return `already_applied = true` without touching the row.
    ///
    /// A successful payment confirms the order and decrements variant stock;
    /// a failed one records the failure and leaves the order `pending` so the
    /// customer can retry from a fresh checkout.
    #[instrument(skip(self))]
    pub async fn apply_payment_result(
        &self,
        gateway_order_ref: &str,
        success: bool,
        transaction_id: Option<&str>,
    ) -> Result<PaymentApplication, ServiceError> {
        let order = order::Entity::find()
            .filter(order::Column::GatewayOrderRef.eq(gateway_order_ref))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "No order registered under gateway reference {}",
                    gateway_order_ref
                ))
            })?;

        if success {
            self.apply_success(order, transaction_id).await
        } else {
            self.apply_failure(order, transaction_id).await
        }
    }

    async fn apply_success(
        &self,
        order: order::Model,
        transaction_id: Option<&str>,
    ) -> Result<PaymentApplication, ServiceError> {
        if order.payment_status == "paid" {
            info!(order_number = %order.order_number, "Payment already applied; skipping");
            return Ok(PaymentApplication {
                order,
                already_applied: true,
            });
        }

        let order_id = order.id;
        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?;

        let txn = self.db.begin().await?;

        // Compare-on-status transition: the redirect and the webhook deliver
        // the same verdict concurrently, and only one may confirm the order
        // and consume stock.
        let transition = order::Entity::update_many()
            .col_expr(order::Column::PaymentStatus, Expr::value("paid"))
            .col_expr(order::Column::Status, Expr::value("confirmed"))
            .col_expr(
                order::Column::GatewayTransactionId,
                Expr::value(transaction_id.map(|t| t.to_string())),
            )
            .col_expr(order::Column::UpdatedAt, Expr::value(Some(Utc::now())))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::PaymentStatus.ne("paid"))
            .exec(&txn)
            .await?;

        if transition.rows_affected == 0 {
            txn.commit().await?;
            let current = self.reload_order(order_id).await?;
            info!(order_number = %current.order_number, "Payment already applied; skipping");
            return Ok(PaymentApplication {
                order: current,
                already_applied: true,
            });
        }

        order_tracking_event::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            status: Set("confirmed".to_string()),
            description: Set("Payment received, order confirmed".to_string()),
            created_at: Set(Utc::now()),
        }
        .insert(&txn)
        .await?;

        let mut oversold = Vec::new();
        for item in &items {
            if let Some(variant_id) = item.variant_id {
                if !decrement_stock(&txn, variant_id, item.quantity).await? {
                    // Sold more than was on hand between validation and
                    // payment. Floor the count and flag for follow-up rather
                    // than failing a payment that already settled.
                    warn!(
                        variant_id = %variant_id,
                        requested = item.quantity,
                        "Stock underflow on paid order; flooring at zero"
                    );
                    floor_stock(&txn, variant_id).await?;
                    oversold.push((variant_id, item.quantity));
                }
            }
        }

        txn.commit().await?;

        let updated = self.reload_order(order_id).await?;
        info!(order_number = %updated.order_number, "Payment applied, order confirmed");
        if let Err(e) = self
            .event_sender
            .send(Event::OrderPaymentSucceeded {
                order_id,
                transaction_id: updated
                    .gateway_transaction_id
                    .clone()
                    .unwrap_or_default(),
            })
            .await
        {
            error!("Failed to send OrderPaymentSucceeded event: {}", e);
        }
        for (variant_id, requested) in oversold {
            if let Err(e) = self
                .event_sender
                .send(Event::VariantOversold {
                    variant_id,
                    requested,
                })
                .await
            {
                error!("Failed to send VariantOversold event: {}", e);
            }
        }

        Ok(PaymentApplication {
            order: updated,
            already_applied: false,
        })
    }

    async fn apply_failure(
        &self,
        order: order::Model,
        transaction_id: Option<&str>,
    ) -> Result<PaymentApplication, ServiceError> {
        if order.payment_status == "paid" {
            // A failure verdict after a recorded success is a gateway replay
            // anomaly; the settled payment wins.
            warn!(order_number = %order.order_number, "Ignoring failure verdict for a paid order");
            return Ok(PaymentApplication {
                order,
                already_applied: true,
            });
        }
        if order.payment_status == "failed"
            && order.gateway_transaction_id.as_deref() == transaction_id
        {
            return Ok(PaymentApplication {
                order,
                already_applied: true,
            });
        }

        let order_id = order.id;
        let txn = self.db.begin().await?;

        // A settled payment always wins over a late failure verdict.
        let transition = order::Entity::update_many()
            .col_expr(order::Column::PaymentStatus, Expr::value("failed"))
            .col_expr(
                order::Column::GatewayTransactionId,
                Expr::value(transaction_id.map(|t| t.to_string())),
            )
            .col_expr(order::Column::UpdatedAt, Expr::value(Some(Utc::now())))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::PaymentStatus.ne("paid"))
            .exec(&txn)
            .await?;

        if transition.rows_affected == 0 {
            txn.commit().await?;
            let current = self.reload_order(order_id).await?;
            warn!(order_number = %current.order_number, "Ignoring failure verdict for a paid order");
            return Ok(PaymentApplication {
                order: current,
                already_applied: true,
            });
        }

        order_tracking_event::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            status: Set("pending".to_string()),
            description: Set("Payment attempt failed".to_string()),
            created_at: Set(Utc::now()),
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;

        let updated = self.reload_order(order_id).await?;
        info!(order_number = %updated.order_number, "Payment failure recorded");
        if let Err(e) = self
            .event_sender
            .send(Event::OrderPaymentFailed {
                order_id,
                transaction_id: transaction_id.map(|t| t.to_string()),
            })
            .await
        {
            error!("Failed to send OrderPaymentFailed event: {}", e);
        }

        Ok(PaymentApplication {
            order: updated,
            already_applied: false,
        })
    }

    /// Confirmation-page read: the order with its line items and tracking
    /// history.
    #[instrument(skip(self))]
    pub async fn get_by_order_number(
        &self,
        order_number: &str,
    ) -> Result<
        (
            order::Model,
            Vec<order_item::Model>,
            Vec<order_tracking_event::Model>,
        ),
        ServiceError,
    > {
        let order = order::Entity::find()
            .filter(order::Column::OrderNumber.eq(order_number))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_number)))?;

        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order.id))
            .all(&*self.db)
            .await?;

        let tracking = order_tracking_event::Entity::find()
            .filter(order_tracking_event::Column::OrderId.eq(order.id))
            .order_by_asc(order_tracking_event::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        Ok((order, items, tracking))
    }

    async fn reload_order(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        order::Entity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    /// Generates a unique, customer-facing order number. Collisions are
    /// vanishingly rare with a 6-character suffix, but the unique index is
    /// the real guarantee; this just avoids tripping it.
    async fn generate_order_number(&self) -> Result<String, ServiceError> {
        for _ in 0..ORDER_NUMBER_ATTEMPTS {
            let candidate = new_order_number();
            let exists = order::Entity::find()
                .filter(order::Column::OrderNumber.eq(candidate.clone()))
                .one(&*self.db)
                .await?
                .is_some();
            if !exists {
                return Ok(candidate);
            }
        }
        Err(ServiceError::Conflict(
            "Could not allocate a unique order number".to_string(),
        ))
    }
}

fn new_order_number() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(|c| (c as char).to_ascii_uppercase())
        .collect();
    format!("SF-{}-{}", Utc::now().format("%Y%m%d"), suffix)
}

/// Conditional decrement: only succeeds when enough stock remains, so
/// concurrent confirmations cannot drive the count negative.
async fn decrement_stock<C: sea_orm::ConnectionTrait>(
    db: &C,
    variant_id: Uuid,
    quantity: i32,
) -> Result<bool, ServiceError> {
    let result = product_variant::Entity::update_many()
        .col_expr(
            product_variant::Column::StockQuantity,
            Expr::col(product_variant::Column::StockQuantity).sub(quantity),
        )
        .col_expr(product_variant::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(product_variant::Column::Id.eq(variant_id))
        .filter(product_variant::Column::StockQuantity.gte(quantity))
        .exec(db)
        .await?;
    Ok(result.rows_affected > 0)
}

async fn floor_stock<C: sea_orm::ConnectionTrait>(
    db: &C,
    variant_id: Uuid,
) -> Result<(), ServiceError> {
    product_variant::Entity::update_many()
        .col_expr(product_variant::Column::StockQuantity, Expr::value(0))
        .col_expr(product_variant::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(product_variant::Column::Id.eq(variant_id))
        .exec(db)
        .await?;
    Ok(())
}
