use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};
use std::fmt;

/// Daraja is inconsistent about numeric fields: `expires_in` and the query
/// `ResultCode` arrive as strings in the sandbox but as numbers elsewhere.
#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(serde_json::Number),
    Text(String),
}

impl NumberOrString {
    fn into_string(self) -> String {
        match self {
            NumberOrString::Number(n) => n.to_string(),
            NumberOrString::Text(s) => s,
        }
    }
}

fn flexible_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<NumberOrString>::deserialize(deserializer)?.map(NumberOrString::into_string))
}

fn flexible_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = NumberOrString::deserialize(deserializer)?.into_string();
    raw.trim()
        .parse()
        .map_err(|_| de::Error::custom(format!("invalid result code: {}", raw)))
}

// OAuth
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default, deserialize_with = "flexible_string")]
    pub expires_in: Option<String>,
}

impl AuthResponse {
    pub const DEFAULT_EXPIRES_IN: u64 = 3600;

    pub fn expires_in_secs(&self) -> u64 {
        self.expires_in
            .as_deref()
            .and_then(|raw| raw.trim().parse().ok())
            .unwrap_or(Self::DEFAULT_EXPIRES_IN)
    }
}

// STK push
#[derive(Clone, Serialize)]
pub struct StkPushRequest {
    #[serde(rename = "BusinessShortCode")]
    pub business_short_code: String,
    #[serde(rename = "Password")]
    pub password: String,
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "TransactionType")]
    pub transaction_type: String,
    #[serde(rename = "Amount")]
    pub amount: u64,
    #[serde(rename = "PartyA")]
    pub party_a: String,
    #[serde(rename = "PartyB")]
    pub party_b: String,
    #[serde(rename = "PhoneNumber")]
    pub phone_number: String,
    #[serde(rename = "CallBackURL")]
    pub callback_url: String,
    #[serde(rename = "AccountReference")]
    pub account_reference: String,
    #[serde(rename = "TransactionDesc")]
    pub transaction_desc: String,
}

// The password is a reversible encoding of the passkey.
impl fmt::Debug for StkPushRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StkPushRequest")
            .field("business_short_code", &self.business_short_code)
            .field("password", &"[REDACTED]")
            .field("timestamp", &self.timestamp)
            .field("transaction_type", &self.transaction_type)
            .field("amount", &self.amount)
            .field("party_a", &self.party_a)
            .field("party_b", &self.party_b)
            .field("phone_number", &self.phone_number)
            .field("callback_url", &self.callback_url)
            .field("account_reference", &self.account_reference)
            .field("transaction_desc", &self.transaction_desc)
            .finish()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StkPushResponse {
    #[serde(rename = "MerchantRequestID", default)]
    pub merchant_request_id: Option<String>,
    #[serde(rename = "CheckoutRequestID", default)]
    pub checkout_request_id: Option<String>,
    #[serde(rename = "ResponseCode", default, deserialize_with = "flexible_string")]
    pub response_code: Option<String>,
    #[serde(rename = "ResponseDescription", default)]
    pub response_description: Option<String>,
    #[serde(rename = "CustomerMessage", default)]
    pub customer_message: Option<String>,
    #[serde(rename = "requestId", default)]
    pub request_id: Option<String>,
    #[serde(rename = "errorCode", default)]
    pub error_code: Option<String>,
    #[serde(rename = "errorMessage", default)]
    pub error_message: Option<String>,
}

// STK query
#[derive(Clone, Serialize)]
pub struct StkQueryRequest {
    #[serde(rename = "BusinessShortCode")]
    pub business_short_code: String,
    #[serde(rename = "Password")]
    pub password: String,
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
}

impl fmt::Debug for StkQueryRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StkQueryRequest")
            .field("business_short_code", &self.business_short_code)
            .field("password", &"[REDACTED]")
            .field("timestamp", &self.timestamp)
            .field("checkout_request_id", &self.checkout_request_id)
            .finish()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StkQueryResponse {
    #[serde(rename = "ResponseCode", default, deserialize_with = "flexible_string")]
    pub response_code: Option<String>,
    #[serde(rename = "ResponseDescription", default)]
    pub response_description: Option<String>,
    #[serde(rename = "MerchantRequestID", default)]
    pub merchant_request_id: Option<String>,
    #[serde(rename = "CheckoutRequestID", default)]
    pub checkout_request_id: Option<String>,
    #[serde(rename = "ResultCode", default, deserialize_with = "flexible_string")]
    pub result_code: Option<String>,
    #[serde(rename = "ResultDesc", default)]
    pub result_desc: Option<String>,
    #[serde(rename = "requestId", default)]
    pub request_id: Option<String>,
    #[serde(rename = "errorCode", default)]
    pub error_code: Option<String>,
    #[serde(rename = "errorMessage", default)]
    pub error_message: Option<String>,
}

// Callback Request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MpesaCallback {
    #[serde(rename = "Body")]
    pub body: CallbackBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackBody {
    #[serde(rename = "stkCallback")]
    pub stk_callback: StkCallback,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StkCallback {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    #[serde(rename = "ResultCode", deserialize_with = "flexible_i64")]
    pub result_code: i64,
    #[serde(rename = "ResultDesc")]
    pub result_desc: String,
    #[serde(rename = "CallbackMetadata", default, skip_serializing_if = "Option::is_none")]
    pub callback_metadata: Option<CallbackMetadata>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackMetadata {
    #[serde(rename = "Item", default)]
    pub items: Vec<CallbackItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackItem {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value", default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

/// Flattened view of a gateway callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackPayload {
    pub merchant_request_id: String,
    pub checkout_request_id: String,
    pub result_code: i64,
    pub result_desc: String,
    pub amount: Option<f64>,
    pub mpesa_receipt_number: Option<String>,
    pub transaction_date: Option<String>,
    pub phone_number: Option<String>,
}

impl CallbackPayload {
    pub fn is_success(&self) -> bool {
        self.result_code == 0
    }
}

impl From<&MpesaCallback> for CallbackPayload {
    fn from(callback: &MpesaCallback) -> Self {
        let stk = &callback.body.stk_callback;
        let mut payload = CallbackPayload {
            merchant_request_id: stk.merchant_request_id.clone(),
            checkout_request_id: stk.checkout_request_id.clone(),
            result_code: stk.result_code,
            result_desc: stk.result_desc.clone(),
            amount: None,
            mpesa_receipt_number: None,
            transaction_date: None,
            phone_number: None,
        };

        if !payload.is_success() {
            return payload;
        }

        let Some(metadata) = &stk.callback_metadata else {
            return payload;
        };

        for item in &metadata.items {
            let Some(value) = &item.value else { continue };
            match item.name.as_str() {
                "Amount" => payload.amount = metadata_number(value),
                "MpesaReceiptNumber" => payload.mpesa_receipt_number = metadata_text(value),
                "TransactionDate" => payload.transaction_date = metadata_text(value),
                "PhoneNumber" => payload.phone_number = metadata_text(value),
                _ => {}
            }
        }

        payload
    }
}

fn metadata_number(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn metadata_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Completed,
    Failed,
}

/// A processed callback as kept by the transaction ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MpesaTransaction {
    pub checkout_request_id: String,
    pub merchant_request_id: String,
    pub status: TransactionStatus,
    pub result_code: i64,
    pub result_desc: String,
    pub paid_amount: Option<f64>,
    pub mpesa_receipt_number: Option<String>,
    pub transaction_date: Option<String>,
    pub paying_phone_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<CallbackPayload> for MpesaTransaction {
    fn from(payload: CallbackPayload) -> Self {
        let now = Utc::now();
        let status = if payload.is_success() {
            TransactionStatus::Completed
        } else {
            TransactionStatus::Failed
        };

        MpesaTransaction {
            checkout_request_id: payload.checkout_request_id,
            merchant_request_id: payload.merchant_request_id,
            status,
            result_code: payload.result_code,
            result_desc: payload.result_desc,
            paid_amount: payload.amount,
            mpesa_receipt_number: payload.mpesa_receipt_number,
            transaction_date: payload.transaction_date,
            paying_phone_number: payload.phone_number,
            created_at: now,
            updated_at: now,
        }
    }
}
