use crate::{
    config::AppConfig,
    db::DbPool,
    events::EventSender,
    services::{
        cart::CartValidator,
        catalog::CatalogService,
        checkout::CheckoutService,
        gateway::PaymentGateway,
        orders::OrderLedger,
        payments::PaymentReconciler,
        promotions::PromotionService,
        shipping::ShippingService,
    },
};
use std::sync::Arc;

pub mod checkout;
pub mod common;
pub mod health;
pub mod orders;
pub mod payments;

/// Service container shared across handlers through application state.
#[derive(Clone)]
pub struct AppServices {
    pub checkout: Arc<CheckoutService>,
    pub ledger: Arc<OrderLedger>,
    pub reconciler: Arc<PaymentReconciler>,
}

impl AppServices {
    pub fn new(
        db: Arc<DbPool>,
        event_sender: EventSender,
        gateway: Arc<dyn PaymentGateway>,
        config: &AppConfig,
    ) -> Self {
        let catalog = Arc::new(CatalogService::new(db.clone()));
        let cart = CartValidator::new(catalog);
        let promotions = PromotionService::new(db.clone());
        let shipping = ShippingService::new(db.clone());
        let ledger = Arc::new(OrderLedger::new(db, event_sender.clone()));

        let checkout = Arc::new(CheckoutService::new(
            cart,
            promotions,
            shipping,
            ledger.clone(),
            gateway,
            event_sender,
            config.currency.clone(),
        ));
        let reconciler = Arc::new(PaymentReconciler::new(
            ledger.clone(),
            config.gateway.hmac_secret.clone(),
            config.store.clone(),
        ));

        Self {
            checkout,
            ledger,
            reconciler,
        }
    }
}
