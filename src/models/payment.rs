use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::mpesa_transactions::{StkPushResponse, StkQueryResponse};

/// Gateway error code for a push whose PIN prompt is still open.
pub const PENDING_ERROR_CODE: &str = "500.001.1001";

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PaymentRequest {
    pub phone_number: String,
    pub amount: f64,
    /// Sent as the account reference, which Daraja caps at 12 characters.
    #[validate(length(min = 1, max = 12))]
    pub order_id: String,
    #[validate(length(max = 100))]
    pub description: Option<String>,
}

impl PaymentRequest {
    pub fn new(phone_number: impl Into<String>, amount: f64, order_id: impl Into<String>) -> Self {
        PaymentRequest {
            phone_number: phone_number.into(),
            amount,
            order_id: order_id.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn transaction_desc(&self) -> String {
        self.description
            .clone()
            .unwrap_or_else(|| format!("Payment for order {}", self.order_id))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merchant_request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PaymentResponse {
    pub fn failure(error: impl Into<String>) -> Self {
        PaymentResponse {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

impl From<StkPushResponse> for PaymentResponse {
    fn from(response: StkPushResponse) -> Self {
        if response.response_code.as_deref() == Some("0") {
            return PaymentResponse {
                success: true,
                merchant_request_id: response.merchant_request_id,
                checkout_request_id: response.checkout_request_id,
                response_code: response.response_code,
                response_description: response.response_description,
                customer_message: response.customer_message,
                error: None,
            };
        }

        let error = response
            .error_message
            .clone()
            .or_else(|| response.response_description.clone())
            .unwrap_or_else(|| "Payment request failed".to_string());

        PaymentResponse {
            success: false,
            response_code: response.response_code.or(response.error_code),
            response_description: response.response_description,
            error: Some(error),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentStatus {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_desc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merchant_request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PaymentStatus {
    pub fn failure(error: impl Into<String>) -> Self {
        PaymentStatus {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// True while the payer has not yet answered the PIN prompt.
    pub fn is_pending(&self) -> bool {
        self.error_code.as_deref() == Some(PENDING_ERROR_CODE)
    }
}

impl From<StkQueryResponse> for PaymentStatus {
    fn from(response: StkQueryResponse) -> Self {
        PaymentStatus {
            success: response.result_code.as_deref() == Some("0"),
            result_code: response.result_code,
            result_desc: response.result_desc,
            response_code: response.response_code,
            response_description: response.response_description,
            merchant_request_id: response.merchant_request_id,
            checkout_request_id: response.checkout_request_id,
            error_code: response.error_code,
            error: response.error_message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneValidation {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl PhoneValidation {
    pub fn valid() -> Self {
        PhoneValidation { valid: true, message: None }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        PhoneValidation {
            valid: false,
            message: Some(message.into()),
        }
    }
}
