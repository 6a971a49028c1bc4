use arena_core::{Capability, PaymentStatus};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{ErrorResponse, IntoResponse, Response},
    Json,
};
use log::{debug, error};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::{
    api::extractors::{ApiJson, AuthUser},
    domain::{ConfirmPaymentRequest, CreateIntentRequest},
    infra::gateway::SIGNATURE_HEADER,
    startup::AppState,
};

pub async fn create_payment_intent(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiJson(body): ApiJson<CreateIntentRequest>,
) -> Result<Json<Value>, ErrorResponse> {
    let payer = auth.require(Capability::Pay)?;
    debug!(
        "create intent: user {} contest {} type {}",
        payer.user_id, body.contest_id, body.payment_type
    );

    state
        .payments
        .create_intent(payer, body)
        .await
        .map(|intent| {
            Json(json!({
                "success": true,
                "clientSecret": intent.client_secret,
                "paymentId": intent.payment_id,
            }))
        })
        .map_err(|e| {
            error!("Failed to create payment intent: {:?}", e);
            e.into()
        })
}

pub async fn confirm_payment(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiJson(body): ApiJson<ConfirmPaymentRequest>,
) -> Result<Response, ErrorResponse> {
    let payer = auth.require(Capability::Pay)?;

    let payment = state
        .payments
        .confirm(payer, body.payment_id, body.transaction_id)
        .await
        .map_err(|e| {
            error!("Failed to confirm payment {}: {:?}", body.payment_id, e);
            e
        })?;

    if payment.payment_status == PaymentStatus::Failed {
        let body = Json(json!({
            "success": false,
            "message": "Payment not completed",
            "payment": payment,
        }));
        return Ok((StatusCode::BAD_REQUEST, body).into_response());
    }

    Ok(Json(json!({
        "success": true,
        "message": "Payment confirmed successfully",
        "payment": payment,
    }))
    .into_response())
}

pub async fn my_payments(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<Value>, ErrorResponse> {
    let payer = auth.require(Capability::Pay)?;

    state
        .payments
        .payment_history(payer)
        .await
        .map(|payments| {
            Json(json!({
                "success": true,
                "count": payments.len(),
                "data": payments,
            }))
        })
        .map_err(|e| {
            error!("Failed to fetch payments for {}: {:?}", payer.user_id, e);
            e.into()
        })
}

/// Gateway push notifications. The raw body is needed for signature verification.
pub async fn payment_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ErrorResponse> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    state
        .payments
        .handle_webhook(&body, signature)
        .await
        .map(|_| Json(json!({ "received": true })))
        .map_err(|e| {
            error!("Failed to process webhook: {:?}", e);
            e.into()
        })
}
