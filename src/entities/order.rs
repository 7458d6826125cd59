use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Order aggregate root.
///
/// Customer reference is `user_id` XOR `guest_email`. The shipping fields are
/// a snapshot captured at order time and are decoupled from any later profile
/// edits. Mutated only by `OrderLedger` transitions; tracking events are
/// appended, never rewritten.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, Validate, utoipa::ToSchema)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(unique)]
    #[validate(length(min = 1, max = 50))]
    pub order_number: String,

    pub user_id: Option<Uuid>,
    pub guest_email: Option<String>,

    /// pending -> confirmed -> ... -> cancelled/delivered
    pub status: String,
    /// pending -> paid | failed
    pub payment_status: String,
    /// card | wallet | cod
    pub payment_method: String,
    /// standard | express
    pub shipping_method: String,

    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub subtotal: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub shipping_cost: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub discount_amount: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub total: Decimal,
    pub promo_code: Option<String>,

    pub ship_to_name: String,
    pub ship_to_phone: String,
    pub address_line_1: String,
    pub address_line_2: Option<String>,
    pub city: String,
    pub governorate: String,
    pub postal_code: Option<String>,

    pub notes: Option<String>,

    /// The payment processor's identifier for the registered remote order.
    /// Null until the gateway handshake has run.
    pub gateway_order_ref: Option<String>,
    /// Null until a payment completes.
    pub gateway_transaction_id: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItems,
    #[sea_orm(has_many = "super::order_tracking_event::Entity")]
    TrackingEvents,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

impl Related<super::order_tracking_event::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TrackingEvents.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
