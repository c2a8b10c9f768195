use axum::{
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::json;

use crate::handlers::mpesa_handlers;
use crate::state::AppState;

pub fn mpesa_routes() -> Router<AppState> {
    Router::new()
        // Health
        .route("/health", get(mpesa_health))

        // STK push
        .route("/stk-push", post(mpesa_handlers::initiate_stk_push))
        .route("/check-payment-status", post(mpesa_handlers::check_payment_status))
        .route("/callback", post(mpesa_handlers::mpesa_callback))

        // Recorded callbacks
        .route("/status", get(mpesa_handlers::check_transaction_status))
        .route("/transactions", get(mpesa_handlers::get_transactions))
        .route("/stats", get(mpesa_handlers::get_stats))

        .route("/validate-phone", post(mpesa_handlers::validate_phone))
}

async fn mpesa_health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "mpesa",
        "timestamp": Utc::now().to_rfc3339(),
        "features": ["stk-push", "payment-status-check", "callback", "transactions", "validate-phone"]
    }))
}
