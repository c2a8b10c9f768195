// handlers/mpesa_handlers.rs
use axum::{
    extract::{Json, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};
use validator::Validate;

use crate::errors::{AppError, Result};
use crate::models::mpesa_transactions::{CallbackPayload, MpesaCallback};
use crate::models::payment::{PaymentRequest, PaymentStatus};
use crate::services::mpesa_service::payable_amount;
use crate::services::phone::{normalize_phone_number, validate_phone_number};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CheckPaymentStatusRequest {
    pub checkout_request_id: String,
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub checkout_request_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ValidatePhoneRequest {
    pub phone_number: String,
}

pub async fn initiate_stk_push(
    State(state): State<AppState>,
    Json(request): Json<PaymentRequest>,
) -> Result<impl IntoResponse> {
    info!("Received STK push request for order {}", request.order_id);

    request.validate()?;

    let validation = validate_phone_number(&request.phone_number);
    if !validation.valid {
        return Err(AppError::invalid_data(
            validation
                .message
                .unwrap_or_else(|| "Invalid phone number".to_string()),
        ));
    }
    if payable_amount(request.amount).is_none() {
        return Err(AppError::invalid_data("Amount must be greater than 0"));
    }

    let mpesa_service = state.mpesa()?;
    let response = mpesa_service.initiate_payment(&request).await?;

    let status = if response.success {
        StatusCode::OK
    } else {
        StatusCode::BAD_GATEWAY
    };
    Ok((status, Json(response)))
}

pub async fn check_payment_status(
    State(state): State<AppState>,
    Json(request): Json<CheckPaymentStatusRequest>,
) -> Result<Json<PaymentStatus>> {
    if request.checkout_request_id.trim().is_empty() {
        return Err(AppError::invalid_data("checkout_request_id is required"));
    }

    let mpesa_service = state.mpesa()?;
    let status = mpesa_service
        .query_payment_status(&request.checkout_request_id)
        .await?;
    Ok(Json(status))
}

/// Always acknowledges, otherwise the gateway keeps redelivering.
pub async fn mpesa_callback(
    State(state): State<AppState>,
    Json(raw): Json<serde_json::Value>,
) -> impl IntoResponse {
    match serde_json::from_value::<MpesaCallback>(raw) {
        Ok(callback) => {
            let payload = match &state.mpesa_service {
                Some(service) => service.process_callback(&callback),
                None => CallbackPayload::from(&callback),
            };
            let transaction = state.ledger.record(payload).await;
            info!(
                "Recorded {} as {:?}",
                transaction.checkout_request_id, transaction.status
            );
        }
        Err(e) => warn!("Ignoring malformed M-Pesa callback: {}", e),
    }

    Json(json!({
        "ResultCode": 0,
        "ResultDesc": "Accepted"
    }))
}

pub async fn check_transaction_status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> Result<impl IntoResponse> {
    let transaction = state
        .ledger
        .get(&query.checkout_request_id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("transaction {}", query.checkout_request_id)))?;
    Ok(Json(transaction))
}

pub async fn get_transactions(State(state): State<AppState>) -> impl IntoResponse {
    let transactions = state.ledger.list().await;
    Json(json!({
        "count": transactions.len(),
        "transactions": transactions,
    }))
}

pub async fn get_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.ledger.stats().await)
}

pub async fn validate_phone(Json(request): Json<ValidatePhoneRequest>) -> impl IntoResponse {
    let validation = validate_phone_number(&request.phone_number);
    Json(json!({
        "valid": validation.valid,
        "message": validation.message,
        "normalized": normalize_phone_number(&request.phone_number),
    }))
}
