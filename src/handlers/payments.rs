use crate::{
    errors::ServiceError,
    services::{gateway::CallbackPayload, payments::CallbackOutcome},
    AppState,
};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect},
    Json,
};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{error, instrument};

/// Browser redirect callback after a hosted payment attempt
///
/// Always answers with a redirect back to the storefront, whatever the
/// verdict; errors are folded into coarse query-string codes.
#[utoipa::path(
    get,
    path = "/api/v1/payments/callback",
    responses(
        (status = 303, description = "Redirect to the storefront")
    ),
    tag = "payments"
)]
#[instrument(skip(state, payload), fields(gateway_order = %payload.order))]
pub async fn payment_callback(
    State(state): State<AppState>,
    Query(payload): Query<CallbackPayload>,
) -> Redirect {
    let reconciler = &state.services.reconciler;
    let target = match reconciler.reconcile(&payload).await {
        Ok(outcome) => reconciler.redirect_target(&outcome),
        Err(e) => {
            error!("Callback reconciliation failed: {}", e);
            reconciler.error_redirect_target()
        }
    };
    Redirect::to(&target)
}

/// Server-to-server webhook notification
///
/// The transaction object arrives under `obj` in the JSON body; the
/// signature usually rides in the query string.
#[utoipa::path(
    post,
    path = "/api/v1/payments/webhook",
    responses(
        (status = 200, description = "Verdict applied"),
        (status = 401, description = "Signature verification failed"),
        (status = 404, description = "Unknown gateway order reference")
    ),
    tag = "payments"
)]
#[instrument(skip(state, params, body))]
pub async fn payment_webhook(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, ServiceError> {
    let payload = payload_from_webhook(&params, &body);

    match state.services.reconciler.reconcile(&payload).await? {
        CallbackOutcome::Applied { .. } => Ok(StatusCode::OK),
        CallbackOutcome::SignatureMismatch => Err(ServiceError::Unauthorized(
            "Webhook signature verification failed".to_string(),
        )),
        CallbackOutcome::OrderNotFound => Err(ServiceError::NotFound(
            "No order matches the webhook's gateway reference".to_string(),
        )),
    }
}

/// Maps the webhook's nested JSON body onto the flat, stringly-typed shape
/// the redirect callback uses, so one verification path serves both.
fn payload_from_webhook(params: &HashMap<String, String>, body: &Value) -> CallbackPayload {
    let obj = body.get("obj").unwrap_or(body);

    let hmac = params
        .get("hmac")
        .cloned()
        .or_else(|| body.get("hmac").and_then(Value::as_str).map(String::from))
        .unwrap_or_default();

    CallbackPayload {
        amount_cents: stringify(obj.get("amount_cents")),
        created_at: stringify(obj.get("created_at")),
        currency: stringify(obj.get("currency")),
        error_occured: stringify(obj.get("error_occured")),
        has_parent_transaction: stringify(obj.get("has_parent_transaction")),
        id: stringify(obj.get("id")),
        integration_id: stringify(obj.get("integration_id")),
        is_3d_secure: stringify(obj.get("is_3d_secure")),
        is_auth: stringify(obj.get("is_auth")),
        is_capture: stringify(obj.get("is_capture")),
        is_refunded: stringify(obj.get("is_refunded")),
        is_standalone_payment: stringify(obj.get("is_standalone_payment")),
        is_voided: stringify(obj.get("is_voided")),
        order: stringify_order(obj.get("order")),
        owner: stringify(obj.get("owner")),
        pending: stringify(obj.get("pending")),
        source_data_pan: stringify(obj.pointer("/source_data/pan")),
        source_data_sub_type: stringify(obj.pointer("/source_data/sub_type")),
        source_data_type: stringify(obj.pointer("/source_data/type")),
        success: stringify(obj.get("success")),
        hmac,
    }
}

/// Renders a JSON scalar the way it appears in the signed query-string form:
/// bare strings, lowercase booleans, plain numbers.
fn stringify(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// `order` arrives either as a bare id or as an embedded object with `id`.
fn stringify_order(value: Option<&Value>) -> String {
    match value {
        Some(Value::Object(map)) => stringify(map.get("id")),
        other => stringify(other),
    }
}
