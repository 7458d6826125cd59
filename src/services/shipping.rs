use crate::{
    db::DbPool,
    entities::{free_shipping_setting, shipping_rate},
    errors::ServiceError,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};
use tracing::{instrument, warn};
use utoipa::ToSchema;

/// Supported delivery methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ShippingMethod {
    Standard,
    Express,
}

impl ShippingMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Express => "express",
        }
    }

    fn fallback_rate(&self) -> Decimal {
        match self {
            Self::Standard => dec!(50),
            Self::Express => dec!(100),
        }
    }
}

impl fmt::Display for ShippingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Computes the shipping cost for an order.
#[derive(Clone)]
pub struct ShippingService {
    db: Arc<DbPool>,
}

impl ShippingService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Cost for the chosen method given the post-validation subtotal.
    /// Free shipping, when an active setting exists and the subtotal meets
    /// its threshold, overrides the method rate entirely.
    #[instrument(skip(self))]
    pub async fn cost(
        &self,
        method: ShippingMethod,
        subtotal: Decimal,
    ) -> Result<Decimal, ServiceError> {
        let free_setting = free_shipping_setting::Entity::find()
            .filter(free_shipping_setting::Column::IsActive.eq(true))
            .one(&*self.db)
            .await?;

        let rate = shipping_rate::Entity::find()
            .filter(shipping_rate::Column::Method.eq(method.as_str()))
            .filter(shipping_rate::Column::IsActive.eq(true))
            .one(&*self.db)
            .await?;

        if rate.is_none() {
            warn!(method = %method, "No active shipping rate configured; using fallback");
        }

        Ok(resolve_cost(
            method,
            subtotal,
            free_setting.as_ref(),
            rate.as_ref(),
        ))
    }
}

/// Pure rate resolution: free-shipping threshold first, then the configured
/// rate row, then a hardcoded fallback so checkout never blocks on missing
/// settings.
pub(crate) fn resolve_cost(
    method: ShippingMethod,
    subtotal: Decimal,
    free_setting: Option<&free_shipping_setting::Model>,
    rate: Option<&shipping_rate::Model>,
) -> Decimal {
    if let Some(setting) = free_setting {
        if setting.is_active && subtotal >= setting.min_order_amount {
            return Decimal::ZERO;
        }
    }
    rate.map(|r| r.rate).unwrap_or_else(|| method.fallback_rate())
}
