use crate::{
    entities::{product, product_variant},
    errors::ServiceError,
    services::catalog::CatalogService,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Client-supplied cart line. Carries no price.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CartLine {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    #[validate(range(min = 1, max = 99, message = "Quantity must be between 1 and 99"))]
    pub quantity: i32,
}

/// Cart line resolved against the catalog, with the price snapshot that will
/// be copied onto the order item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatedCartLine {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub quantity: i32,
    pub product_name: String,
    pub variant_label: Option<String>,
    /// base_price + price_adjustment
    pub unit_price: Decimal,
    pub compare_at_price: Option<Decimal>,
    pub images: Option<serde_json::Value>,
    pub line_total: Decimal,
}

/// Per-line failure classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CartErrorKind {
    NotFound,
    Inactive,
    OutOfStock,
    InsufficientStock,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CartLineError {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub kind: CartErrorKind,
}

/// Result of validating a whole cart. `subtotal` covers valid lines only.
/// A non-empty `errors` list means the checkout must be refused as a whole;
/// failed lines are never silently dropped.
#[derive(Debug, Clone, Serialize)]
pub struct CartValidationResult {
    pub valid_lines: Vec<ValidatedCartLine>,
    pub subtotal: Decimal,
    pub errors: Vec<CartLineError>,
}

impl CartValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Resolves cart lines against the catalog and prices them.
#[derive(Clone)]
pub struct CartValidator {
    catalog: Arc<CatalogService>,
}

impl CartValidator {
    pub fn new(catalog: Arc<CatalogService>) -> Self {
        Self { catalog }
    }

    /// Validates every line independently; a failed line is recorded and the
    /// remaining lines are still processed.
    #[instrument(skip(self, lines), fields(line_count = lines.len()))]
    pub async fn validate(&self, lines: &[CartLine]) -> Result<CartValidationResult, ServiceError> {
        let mut valid_lines = Vec::with_capacity(lines.len());
        let mut errors = Vec::new();
        let mut subtotal = Decimal::ZERO;

        for line in lines {
            let product = self.catalog.find_product(line.product_id).await?;
            let variant = match (&product, line.variant_id) {
                (Some(p), Some(variant_id)) => self.catalog.find_variant(p.id, variant_id).await?,
                _ => None,
            };

            match resolve_line(line, product.as_ref(), variant.as_ref()) {
                Ok(validated) => {
                    subtotal += validated.line_total;
                    valid_lines.push(validated);
                }
                Err(error) => errors.push(error),
            }
        }

        Ok(CartValidationResult {
            valid_lines,
            subtotal,
            errors,
        })
    }
}

/// Classifies a single cart line against its resolved product and variant.
pub(crate) fn resolve_line(
    line: &CartLine,
    product: Option<&product::Model>,
    variant: Option<&product_variant::Model>,
) -> Result<ValidatedCartLine, CartLineError> {
    let fail = |kind| CartLineError {
        product_id: line.product_id,
        variant_id: line.variant_id,
        kind,
    };

    let product = product.ok_or_else(|| fail(CartErrorKind::NotFound))?;
    if !product.is_active {
        return Err(fail(CartErrorKind::Inactive));
    }

    let mut unit_price = product.base_price;
    let mut variant_label = None;

    if line.variant_id.is_some() {
        let variant = variant.ok_or_else(|| fail(CartErrorKind::NotFound))?;
        if !variant.is_active {
            return Err(fail(CartErrorKind::NotFound));
        }
        if variant.stock_quantity == 0 {
            return Err(fail(CartErrorKind::OutOfStock));
        }
        if variant.stock_quantity < line.quantity {
            return Err(fail(CartErrorKind::InsufficientStock));
        }
        unit_price += variant.price_adjustment;
        variant_label = Some(variant.label.clone());
    }

    let line_total = unit_price * Decimal::from(line.quantity);

    Ok(ValidatedCartLine {
        product_id: line.product_id,
        variant_id: line.variant_id,
        quantity: line.quantity,
        product_name: product.name.clone(),
        variant_label,
        unit_price,
        compare_at_price: product.compare_at_price,
        images: product.images.clone(),
        line_total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn test_product(base_price: Decimal, is_active: bool) -> product::Model {
        product::Model {
            id: Uuid::new_v4(),
            name: "Linen Shirt".to_string(),
            description: None,
            base_price,
            compare_at_price: None,
            images: None,
            is_active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn test_variant(
        product_id: Uuid,
        adjustment: Decimal,
        stock: i32,
        is_active: bool,
    ) -> product_variant::Model {
        product_variant::Model {
            id: Uuid::new_v4(),
            product_id,
            label: "M / Black".to_string(),
            price_adjustment: adjustment,
            stock_quantity: stock,
            is_active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn line_for(product: &product::Model, variant: Option<&product_variant::Model>, qty: i32) -> CartLine {
        CartLine {
            product_id: product.id,
            variant_id: variant.map(|v| v.id),
            quantity: qty,
        }
    }

    #[test]
    fn valid_line_prices_base_plus_adjustment() {
        let product = test_product(dec!(100), true);
        let variant = test_variant(product.id, dec!(10), 5, true);
        let line = line_for(&product, Some(&variant), 2);

        let validated = resolve_line(&line, Some(&product), Some(&variant)).unwrap();
        assert_eq!(validated.unit_price, dec!(110));
        assert_eq!(validated.line_total, dec!(220));
        assert_eq!(validated.variant_label.as_deref(), Some("M / Black"));
    }

    #[test]
    fn missing_product_is_not_found() {
        let product = test_product(dec!(100), true);
        let line = line_for(&product, None, 1);
        let err = resolve_line(&line, None, None).unwrap_err();
        assert_eq!(err.kind, CartErrorKind::NotFound);
    }

    #[test]
    fn inactive_product_is_classified_inactive() {
        let product = test_product(dec!(100), false);
        let line = line_for(&product, None, 1);
        let err = resolve_line(&line, Some(&product), None).unwrap_err();
        assert_eq!(err.kind, CartErrorKind::Inactive);
    }

    #[test]
    fn inactive_variant_is_not_found() {
        let product = test_product(dec!(100), true);
        let variant = test_variant(product.id, dec!(0), 5, false);
        let line = line_for(&product, Some(&variant), 1);
        let err = resolve_line(&line, Some(&product), Some(&variant)).unwrap_err();
        assert_eq!(err.kind, CartErrorKind::NotFound);
    }

    #[test]
    fn zero_stock_is_out_of_stock() {
        let product = test_product(dec!(100), true);
        let variant = test_variant(product.id, dec!(0), 0, true);
        let line = line_for(&product, Some(&variant), 1);
        let err = resolve_line(&line, Some(&product), Some(&variant)).unwrap_err();
        assert_eq!(err.kind, CartErrorKind::OutOfStock);
    }

    #[test]
    fn short_stock_is_insufficient() {
        let product = test_product(dec!(100), true);
        let variant = test_variant(product.id, dec!(0), 2, true);
        let line = line_for(&product, Some(&variant), 3);
        let err = resolve_line(&line, Some(&product), Some(&variant)).unwrap_err();
        assert_eq!(err.kind, CartErrorKind::InsufficientStock);
    }

    #[test]
    fn line_without_variant_uses_base_price() {
        let product = test_product(dec!(75.50), true);
        let line = line_for(&product, None, 3);
        let validated = resolve_line(&line, Some(&product), None).unwrap();
        assert_eq!(validated.unit_price, dec!(75.50));
        assert_eq!(validated.line_total, dec!(226.50));
        assert!(validated.variant_label.is_none());
    }
}
