use crate::{
    db::DbPool,
    entities::{product, product_variant},
    errors::ServiceError,
};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use std::sync::Arc;
use uuid::Uuid;

/// Read-only access to the product catalog. Price, stock and active flags
/// always come from here; client-submitted prices are never trusted.
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DbPool>,
}

impl CatalogService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Fetches a product regardless of its active flag. The caller decides
    /// how to classify an inactive product versus a missing one.
    pub async fn find_product(
        &self,
        product_id: Uuid,
    ) -> Result<Option<product::Model>, ServiceError> {
        Ok(product::Entity::find_by_id(product_id)
            .one(&*self.db)
            .await?)
    }

    /// Fetches a variant scoped to its product. A variant id that exists
    /// under a different product resolves to `None`.
    pub async fn find_variant(
        &self,
        product_id: Uuid,
        variant_id: Uuid,
    ) -> Result<Option<product_variant::Model>, ServiceError> {
        Ok(product_variant::Entity::find_by_id(variant_id)
            .filter(product_variant::Column::ProductId.eq(product_id))
            .one(&*self.db)
            .await?)
    }
}
