use crate::{
    entities::{order, order_item, order_tracking_event},
    errors::ServiceError,
    handlers::common::success_response,
    AppState,
};
use axum::{
    extract::{Path, State},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use utoipa::ToSchema;

/// Confirmation-page view of an order.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderView {
    #[serde(flatten)]
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
    pub tracking: Vec<order_tracking_event::Model>,
}

/// Fetch an order by its customer-facing number
#[utoipa::path(
    get,
    path = "/api/v1/orders/{order_number}",
    params(
        ("order_number" = String, Path, description = "Customer-facing order number")
    ),
    responses(
        (status = 200, description = "Order found", body = OrderView),
        (status = 404, description = "Order not found")
    ),
    tag = "orders"
)]
#[instrument(skip(state))]
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_number): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let (order, items, tracking) = state
        .services
        .ledger
        .get_by_order_number(&order_number)
        .await?;
    Ok(success_response(OrderView {
        order,
        items,
        tracking,
    }))
}
