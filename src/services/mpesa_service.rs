// services/mpesa_service.rs
use base64::{engine::general_purpose::STANDARD as base64, Engine as _};
use chrono::{Local, NaiveDateTime};
use secrecy::ExposeSecret;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::config::{MpesaConfig, MpesaUrls, TransportKind};
use crate::errors::{AppError, Result};
use crate::models::mpesa_transactions::{
    CallbackPayload, MpesaCallback, StkPushRequest, StkQueryRequest,
};
use crate::models::payment::{PaymentRequest, PaymentResponse, PaymentStatus, PhoneValidation};
use crate::services::phone::{normalize_phone_number, validate_phone_number};
use crate::services::transport::{HttpTransport, MpesaTransport, SimulatedTransport};

/// Tokens are dropped this long before the gateway would expire them.
pub const TOKEN_EXPIRY_MARGIN_SECS: u64 = 300;
/// Upper bound on how long a token is trusted, whatever `expires_in` says.
pub const MAX_TOKEN_LIFETIME_SECS: u64 = 24 * 60 * 60;

const TRANSACTION_TYPE: &str = "CustomerPayBillOnline";
const QUERY_RETRY_BACKOFF: Duration = Duration::from_millis(500);

struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// Daraja STK push client. One instance owns its token cache, so callers
/// share it behind an `Arc`.
pub struct MpesaService {
    config: MpesaConfig,
    urls: MpesaUrls,
    transport: Arc<dyn MpesaTransport>,
    cached_token: RwLock<Option<CachedToken>>,
    refresh_lock: Mutex<()>,
}

impl MpesaService {
    pub fn new(config: MpesaConfig, transport: Arc<dyn MpesaTransport>) -> Self {
        let urls = config.urls();
        MpesaService {
            config,
            urls,
            transport,
            cached_token: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Wires the transport named by `config.transport`.
    pub fn from_config(config: MpesaConfig) -> Result<Self> {
        let transport: Arc<dyn MpesaTransport> = match config.transport {
            TransportKind::Http => Arc::new(HttpTransport::new(config.request_timeout)?),
            TransportKind::Simulated => {
                warn!("M-Pesa running with the simulated transport, no real prompts will be sent");
                Arc::new(SimulatedTransport::new())
            }
        };
        Ok(Self::new(config, transport))
    }

    pub fn config(&self) -> &MpesaConfig {
        &self.config
    }

    async fn cached_access_token(&self) -> Option<String> {
        let cached = self.cached_token.read().await;
        cached
            .as_ref()
            .filter(|cached| Instant::now() < cached.expires_at)
            .map(|cached| cached.token.clone())
    }

    pub async fn get_access_token(&self) -> Result<String> {
        if let Some(token) = self.cached_access_token().await {
            info!("Using cached access token");
            return Ok(token);
        }

        // Concurrent callers queue here; whoever waited re-reads the cache.
        let _refresh = self.refresh_lock.lock().await;
        if let Some(token) = self.cached_access_token().await {
            return Ok(token);
        }

        info!("Requesting new access token");
        let credentials = base64.encode(format!(
            "{}:{}",
            self.config.consumer_key.expose_secret(),
            self.config.consumer_secret.expose_secret()
        ));

        let auth_response = self
            .transport
            .request_token(&self.urls.auth_url, &credentials)
            .await
            .map_err(|e| {
                error!("M-Pesa token request failed: {}", e);
                AppError::authentication(e.to_string())
            })?;

        let token = auth_response
            .access_token
            .clone()
            .filter(|token| !token.is_empty())
            .ok_or_else(|| AppError::authentication("token response did not include an access_token"))?;

        let lifetime = Duration::from_secs(
            auth_response
                .expires_in_secs()
                .saturating_sub(TOKEN_EXPIRY_MARGIN_SECS)
                .min(MAX_TOKEN_LIFETIME_SECS),
        );
        let now = Instant::now();
        let expires_at = now
            .checked_add(lifetime)
            .unwrap_or_else(|| now + Duration::from_secs(TOKEN_EXPIRY_MARGIN_SECS));

        *self.cached_token.write().await = Some(CachedToken {
            token: token.clone(),
            expires_at,
        });

        info!("Access token obtained, valid for {}s", lifetime.as_secs());
        Ok(token)
    }

    fn password(&self, timestamp: &str) -> String {
        generate_password(
            &self.config.short_code,
            self.config.passkey.expose_secret(),
            timestamp,
        )
    }

    /// Sends a PIN prompt to the payer. Only an authentication failure is an
    /// `Err`; gateway rejections and transport failures come back as
    /// `success: false`.
    pub async fn initiate_payment(&self, request: &PaymentRequest) -> Result<PaymentResponse> {
        info!(
            "STK push for order {} - KSh {} from {}",
            request.order_id, request.amount, request.phone_number
        );

        let Some(amount) = payable_amount(request.amount) else {
            warn!("Rejected STK push with amount {}", request.amount);
            return Ok(PaymentResponse::failure("Amount must be greater than 0"));
        };

        let access_token = self.get_access_token().await?;
        let timestamp = timestamp();
        let password = self.password(&timestamp);
        let phone_number = normalize_phone_number(&request.phone_number);

        let stk_request = StkPushRequest {
            business_short_code: self.config.short_code.clone(),
            password,
            timestamp,
            transaction_type: TRANSACTION_TYPE.to_string(),
            amount,
            party_a: phone_number.clone(),
            party_b: self.config.short_code.clone(),
            phone_number,
            callback_url: self.config.callback_url.clone(),
            account_reference: request.order_id.clone(),
            transaction_desc: request.transaction_desc(),
        };

        match self
            .transport
            .stk_push(&self.urls.stk_push_url, &access_token, &stk_request)
            .await
        {
            Ok(response) => {
                let response = PaymentResponse::from(response);
                if response.success {
                    info!(
                        "STK push accepted: {}",
                        response.checkout_request_id.as_deref().unwrap_or("-")
                    );
                } else {
                    warn!(
                        "STK push rejected: {} - {}",
                        response.response_code.as_deref().unwrap_or("-"),
                        response.error.as_deref().unwrap_or("-")
                    );
                }
                Ok(response)
            }
            Err(e) => {
                error!("STK push failed: {}", e);
                Ok(PaymentResponse::failure(e.to_string()))
            }
        }
    }

    /// A single status poll. Transient transport failures are retried up to
    /// `query_retries` times since the query is idempotent.
    pub async fn query_payment_status(&self, checkout_request_id: &str) -> Result<PaymentStatus> {
        let access_token = self.get_access_token().await?;
        let timestamp = timestamp();
        let query = StkQueryRequest {
            business_short_code: self.config.short_code.clone(),
            password: self.password(&timestamp),
            timestamp,
            checkout_request_id: checkout_request_id.to_string(),
        };

        let mut attempt = 0;
        loop {
            match self
                .transport
                .stk_query(&self.urls.stk_query_url, &access_token, &query)
                .await
            {
                Ok(response) => {
                    let status = PaymentStatus::from(response);
                    info!(
                        "Status of {}: {} {}",
                        checkout_request_id,
                        status.result_code.as_deref().unwrap_or("-"),
                        status
                            .result_desc
                            .as_deref()
                            .or(status.error.as_deref())
                            .unwrap_or("-")
                    );
                    return Ok(status);
                }
                Err(e) if e.is_transient() && attempt < self.config.query_retries => {
                    attempt += 1;
                    warn!(
                        "Status query for {} failed ({}), retry {}/{}",
                        checkout_request_id, e, attempt, self.config.query_retries
                    );
                    tokio::time::sleep(QUERY_RETRY_BACKOFF * attempt).await;
                }
                Err(e) => {
                    error!("Status query for {} failed: {}", checkout_request_id, e);
                    return Ok(PaymentStatus::failure(e.to_string()));
                }
            }
        }
    }

    /// Polls until the payer answers the prompt or `max_attempts` is spent,
    /// returning the last status seen.
    pub async fn wait_for_completion(
        &self,
        checkout_request_id: &str,
        interval: Duration,
        max_attempts: u32,
    ) -> Result<PaymentStatus> {
        let mut status = PaymentStatus::failure("no status query was made");
        for attempt in 1..=max_attempts {
            status = self.query_payment_status(checkout_request_id).await?;
            if !status.is_pending() {
                return Ok(status);
            }
            if attempt < max_attempts {
                tokio::time::sleep(interval).await;
            }
        }
        Ok(status)
    }

    pub fn process_callback(&self, callback: &MpesaCallback) -> CallbackPayload {
        let payload = CallbackPayload::from(callback);
        info!(
            "Callback for {}: {} {}",
            payload.checkout_request_id, payload.result_code, payload.result_desc
        );
        payload
    }

    pub fn validate_phone_number(&self, phone: &str) -> PhoneValidation {
        validate_phone_number(phone)
    }
}

/// Base64 of shortcode, passkey and timestamp concatenated.
pub fn generate_password(short_code: &str, passkey: &str, timestamp: &str) -> String {
    base64.encode(format!("{}{}{}", short_code, passkey, timestamp))
}

pub fn timestamp() -> String {
    format_timestamp(&Local::now().naive_local())
}

pub fn format_timestamp(at: &NaiveDateTime) -> String {
    at.format("%Y%m%d%H%M%S").to_string()
}

/// Daraja only takes whole shillings; `None` when nothing would be charged.
pub fn payable_amount(amount: f64) -> Option<u64> {
    if !amount.is_finite() || amount <= 0.0 {
        return None;
    }
    let rounded = amount.round();
    if rounded < 1.0 {
        return None;
    }
    Some(rounded as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn password_is_deterministic() {
        let first = generate_password("174379", "passkey", "20240101120000");
        let second = generate_password("174379", "passkey", "20240101120000");
        assert_eq!(first, second);
        assert_eq!(first, base64.encode("174379passkey20240101120000"));
        assert_ne!(first, generate_password("174379", "passkey", "20240101120001"));
    }

    #[test]
    fn timestamp_has_fourteen_digits() {
        let at = NaiveDate::from_ymd_opt(2024, 3, 7)
            .unwrap()
            .and_hms_opt(9, 5, 1)
            .unwrap();
        assert_eq!(format_timestamp(&at), "20240307090501");

        let now = timestamp();
        assert_eq!(now.len(), 14);
        assert!(now.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn amounts_round_to_whole_shillings() {
        assert_eq!(payable_amount(450.7), Some(451));
        assert_eq!(payable_amount(450.5), Some(451));
        assert_eq!(payable_amount(450.2), Some(450));
        assert_eq!(payable_amount(1.0), Some(1));
        assert_eq!(payable_amount(0.4), None);
        assert_eq!(payable_amount(0.0), None);
        assert_eq!(payable_amount(-10.0), None);
        assert_eq!(payable_amount(f64::NAN), None);
    }
}
