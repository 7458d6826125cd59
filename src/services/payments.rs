use crate::{
    config::StoreConfig,
    errors::ServiceError,
    services::{gateway::CallbackPayload, orders::OrderLedger},
};
use std::sync::Arc;
use tracing::{instrument, warn};

/// What a callback amounted to after verification and reconciliation.
#[derive(Debug, Clone)]
pub enum CallbackOutcome {
    Applied {
        order_number: String,
        success: bool,
        already_applied: bool,
    },
    SignatureMismatch,
    OrderNotFound,
}

/// Verifies gateway callbacks and applies their verdicts to the ledger.
/// Browser redirects and server-to-server webhooks both land here; the
/// first verified delivery wins and later duplicates are no-ops.
#[derive(Clone)]
pub struct PaymentReconciler {
    ledger: Arc<OrderLedger>,
    hmac_secret: Option<String>,
    store: StoreConfig,
}

impl PaymentReconciler {
    pub fn new(ledger: Arc<OrderLedger>, hmac_secret: Option<String>, store: StoreConfig) -> Self {
        Self {
            ledger,
            hmac_secret,
            store,
        }
    }

    #[instrument(skip(self, payload), fields(gateway_order = %payload.order, success = %payload.success))]
    pub async fn reconcile(
        &self,
        payload: &CallbackPayload,
    ) -> Result<CallbackOutcome, ServiceError> {
        if let Some(secret) = &self.hmac_secret {
            if !payload.verify(secret) {
                warn!("Callback signature verification failed");
                return Ok(CallbackOutcome::SignatureMismatch);
            }
        } else {
            warn!("No HMAC secret configured; accepting callback unverified");
        }

        let transaction_id = if payload.id.is_empty() {
            None
        } else {
            Some(payload.id.as_str())
        };

        match self
            .ledger
            .apply_payment_result(&payload.order, payload.is_success(), transaction_id)
            .await
        {
            Ok(application) => Ok(CallbackOutcome::Applied {
                order_number: application.order.order_number,
                success: payload.is_success(),
                already_applied: application.already_applied,
            }),
            Err(ServiceError::NotFound(_)) => {
                warn!("Callback for unknown gateway order reference");
                Ok(CallbackOutcome::OrderNotFound)
            }
            Err(e) => Err(e),
        }
    }

    /// Where to send the customer's browser after a redirect callback.
    /// Redirect responses never surface internals; failures all land back on
    /// the checkout page with a coarse error code.
    pub fn redirect_target(&self, outcome: &CallbackOutcome) -> String {
        match outcome {
            CallbackOutcome::Applied {
                order_number,
                success: true,
                ..
            } => format!(
                "{}?order={}&status=success",
                self.store.confirmation_url, order_number
            ),
            CallbackOutcome::Applied {
                order_number,
                success: false,
                ..
            } => format!(
                "{}?error=payment_failed&order={}",
                self.store.checkout_url, order_number
            ),
            CallbackOutcome::SignatureMismatch => {
                format!("{}?error=verification_failed", self.store.checkout_url)
            }
            CallbackOutcome::OrderNotFound => {
                format!("{}?error=order_not_found", self.store.checkout_url)
            }
        }
    }

    /// Fallback redirect for unexpected reconciliation errors.
    pub fn error_redirect_target(&self) -> String {
        format!("{}?error=server_error", self.store.checkout_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::db::DbPool;
    use crate::events::EventSender;
    use sea_orm::DatabaseConnection;
    use tokio::sync::mpsc;

    fn reconciler() -> PaymentReconciler {
        let (tx, _rx) = mpsc::channel(4);
        let db: Arc<DbPool> = Arc::new(DatabaseConnection::Disconnected);
        let ledger = Arc::new(OrderLedger::new(db, EventSender::new(tx)));
        PaymentReconciler::new(ledger, Some("secret".to_string()), StoreConfig::default())
    }

    #[test]
    fn success_redirects_to_confirmation() {
        let r = reconciler();
        let target = r.redirect_target(&CallbackOutcome::Applied {
            order_number: "SF-20240501-AB12CD".to_string(),
            success: true,
            already_applied: false,
        });
        assert_eq!(
            target,
            "http://localhost:3000/confirmation?order=SF-20240501-AB12CD&status=success"
        );
    }

    #[test]
    fn failure_redirects_back_to_checkout() {
        let r = reconciler();
        let target = r.redirect_target(&CallbackOutcome::Applied {
            order_number: "SF-20240501-AB12CD".to_string(),
            success: false,
            already_applied: false,
        });
        assert_eq!(
            target,
            "http://localhost:3000/checkout?error=payment_failed&order=SF-20240501-AB12CD"
        );
    }

    #[test]
    fn mismatch_and_unknown_redirect_with_coarse_errors() {
        let r = reconciler();
        assert_eq!(
            r.redirect_target(&CallbackOutcome::SignatureMismatch),
            "http://localhost:3000/checkout?error=verification_failed"
        );
        assert_eq!(
            r.redirect_target(&CallbackOutcome::OrderNotFound),
            "http://localhost:3000/checkout?error=order_not_found"
        );
        assert_eq!(
            r.error_redirect_target(),
            "http://localhost:3000/checkout?error=server_error"
        );
    }
}
