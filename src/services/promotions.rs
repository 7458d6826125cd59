use crate::{
    db::DbPool,
    entities::promo_code::{self, DiscountType},
    errors::ServiceError,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ColumnTrait, Condition, EntityTrait, QueryFilter,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// Why a promo code was rejected. Non-fatal for checkout: the order proceeds
/// without the discount and the reason is surfaced inline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PromoError {
    InvalidCode,
    Expired,
    NotYetActive,
    BelowMinimum,
    Exhausted,
}

impl PromoError {
    pub fn message(&self) -> &'static str {
        match self {
            Self::InvalidCode => "This promo code is not valid",
            Self::Expired => "This promo code has expired",
            Self::NotYetActive => "This promo code is not active yet",
            Self::BelowMinimum => "Order does not meet the minimum amount for this code",
            Self::Exhausted => "This promo code has reached its usage limit",
        }
    }
}

/// Outcome of a read-only promo evaluation.
#[derive(Debug, Clone)]
pub struct PromoEvaluation {
    pub promo: Option<promo_code::Model>,
    pub discount: Decimal,
    pub error: Option<PromoError>,
}

impl PromoEvaluation {
    fn rejected(error: PromoError) -> Self {
        Self {
            promo: None,
            discount: Decimal::ZERO,
            error: Some(error),
        }
    }
}

#[derive(Clone)]
pub struct PromotionService {
    db: Arc<DbPool>,
}

impl PromotionService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Validates a code against the post-validation subtotal. Read-only:
    /// `used_count` is only touched by [`redeem`](Self::redeem), after the
    /// order referencing the code has been durably created.
    #[instrument(skip(self))]
    pub async fn validate_code(
        &self,
        code: &str,
        subtotal: Decimal,
    ) -> Result<PromoEvaluation, ServiceError> {
        let normalized = code.trim().to_uppercase();
        let promo = promo_code::Entity::find()
            .filter(promo_code::Column::Code.eq(normalized))
            .one(&*self.db)
            .await?;

        let Some(promo) = promo else {
            return Ok(PromoEvaluation::rejected(PromoError::InvalidCode));
        };

        match evaluate(&promo, Utc::now(), subtotal) {
            Ok(discount) => Ok(PromoEvaluation {
                promo: Some(promo),
                discount,
                error: None,
            }),
            Err(error) => Ok(PromoEvaluation::rejected(error)),
        }
    }

    /// Increments `used_count` with a usage-cap guard in a single statement,
    /// so concurrent redemptions cannot overshoot `max_uses`. Returns whether
    /// a row was actually updated.
    #[instrument(skip(self))]
    pub async fn redeem(&self, promo_id: Uuid) -> Result<bool, ServiceError> {
        let result = promo_code::Entity::update_many()
            .col_expr(
                promo_code::Column::UsedCount,
                Expr::col(promo_code::Column::UsedCount).add(1),
            )
            .col_expr(promo_code::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(promo_code::Column::Id.eq(promo_id))
            .filter(promo_code::Column::IsActive.eq(true))
            .filter(
                Condition::any()
                    .add(promo_code::Column::MaxUses.is_null())
                    .add(
                        Expr::col(promo_code::Column::UsedCount)
                            .lt(Expr::col(promo_code::Column::MaxUses)),
                    ),
            )
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            warn!(promo_id = %promo_id, "Promo redemption skipped: code exhausted or deactivated");
            return Ok(false);
        }
        info!(promo_id = %promo_id, "Promo code redeemed");
        Ok(true)
    }
}

/// Pure evaluation of a promo record against a subtotal at a point in time.
/// The discount is always clamped to the subtotal so a total can never go
/// negative.
pub(crate) fn evaluate(
    promo: &promo_code::Model,
    now: DateTime<Utc>,
    subtotal: Decimal,
) -> Result<Decimal, PromoError> {
    if !promo.is_active {
        return Err(PromoError::InvalidCode);
    }
    if let Some(starts_at) = promo.starts_at {
        if starts_at > now {
            return Err(PromoError::NotYetActive);
        }
    }
    if let Some(expires_at) = promo.expires_at {
        if expires_at < now {
            return Err(PromoError::Expired);
        }
    }
    if let Some(min) = promo.min_order_amount {
        if subtotal < min {
            return Err(PromoError::BelowMinimum);
        }
    }
    if let Some(max_uses) = promo.max_uses {
        if promo.used_count >= max_uses {
            return Err(PromoError::Exhausted);
        }
    }

    let discount = match promo.discount_type {
        DiscountType::Percentage => subtotal * promo.discount_value / Decimal::from(100),
        DiscountType::Fixed => promo.discount_value,
    };

    Ok(discount.min(subtotal))
}
