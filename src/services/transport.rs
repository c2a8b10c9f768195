// services/transport.rs
use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::errors::Result;
use crate::models::mpesa_transactions::{
    AuthResponse, StkPushRequest, StkPushResponse, StkQueryRequest, StkQueryResponse,
};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("gateway returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("request to the gateway timed out")]
    Timeout,

    #[error("invalid gateway response: {0}")]
    Decode(String),
}

impl TransportError {
    /// Failures worth retrying on idempotent calls.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Network(_) | TransportError::Timeout => true,
            TransportError::Status { status, .. } => *status >= 500,
            TransportError::Decode(_) => false,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_decode() {
            TransportError::Decode(err.to_string())
        } else {
            TransportError::Network(err.to_string())
        }
    }
}

/// The wire seam of the payment client. The composing application picks the
/// implementation; the client itself never inspects its environment.
#[async_trait]
pub trait MpesaTransport: Send + Sync {
    /// `basic_credentials` is the already base64-encoded `key:secret` pair.
    async fn request_token(
        &self,
        url: &str,
        basic_credentials: &str,
    ) -> std::result::Result<AuthResponse, TransportError>;

    async fn stk_push(
        &self,
        url: &str,
        access_token: &str,
        request: &StkPushRequest,
    ) -> std::result::Result<StkPushResponse, TransportError>;

    async fn stk_query(
        &self,
        url: &str,
        access_token: &str,
        request: &StkQueryRequest,
    ) -> std::result::Result<StkQueryResponse, TransportError>;
}

/// Replies that carry a gateway verdict even on a non-2xx status.
trait GatewayReply {
    fn has_verdict(&self) -> bool;
}

impl GatewayReply for StkPushResponse {
    fn has_verdict(&self) -> bool {
        self.response_code.is_some() || self.error_code.is_some() || self.error_message.is_some()
    }
}

impl GatewayReply for StkQueryResponse {
    fn has_verdict(&self) -> bool {
        self.result_code.is_some()
            || self.response_code.is_some()
            || self.error_code.is_some()
            || self.error_message.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(HttpTransport { client })
    }

    async fn post_signed<Req, Resp>(
        &self,
        url: &str,
        access_token: &str,
        body: &Req,
    ) -> std::result::Result<Resp, TransportError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned + GatewayReply,
    {
        let response = self
            .client
            .post(url)
            .header(header::AUTHORIZATION, format!("Bearer {}", access_token))
            .header(header::CONTENT_TYPE, "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        match serde_json::from_str::<Resp>(&text) {
            Ok(parsed) if status.is_success() || parsed.has_verdict() => Ok(parsed),
            Ok(_) => Err(TransportError::Status {
                status: status.as_u16(),
                body: text,
            }),
            Err(_) if !status.is_success() => {
                error!("Gateway call failed: {} - {}", status, text);
                Err(TransportError::Status {
                    status: status.as_u16(),
                    body: text,
                })
            }
            Err(e) => Err(TransportError::Decode(e.to_string())),
        }
    }
}

#[async_trait]
impl MpesaTransport for HttpTransport {
    async fn request_token(
        &self,
        url: &str,
        basic_credentials: &str,
    ) -> std::result::Result<AuthResponse, TransportError> {
        let response = self
            .client
            .get(url)
            .header(header::AUTHORIZATION, format!("Basic {}", basic_credentials))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Failed to get access token: {} - {}", status, body);
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| TransportError::Decode(e.to_string()))
    }

    async fn stk_push(
        &self,
        url: &str,
        access_token: &str,
        request: &StkPushRequest,
    ) -> std::result::Result<StkPushResponse, TransportError> {
        debug!("POST {} {:?}", url, request);
        self.post_signed(url, access_token, request).await
    }

    async fn stk_query(
        &self,
        url: &str,
        access_token: &str,
        request: &StkQueryRequest,
    ) -> std::result::Result<StkQueryResponse, TransportError> {
        debug!("POST {} {:?}", url, request);
        self.post_signed(url, access_token, request).await
    }
}

/// Stands in for the gateway on hosts that cannot receive a PIN prompt.
#[derive(Debug, Clone)]
pub struct SimulatedTransport {
    push_delay: Duration,
}

impl SimulatedTransport {
    pub const DEFAULT_PUSH_DELAY: Duration = Duration::from_secs(2);

    pub fn new() -> Self {
        Self::with_delay(Self::DEFAULT_PUSH_DELAY)
    }

    pub fn with_delay(push_delay: Duration) -> Self {
        SimulatedTransport { push_delay }
    }
}

impl Default for SimulatedTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MpesaTransport for SimulatedTransport {
    async fn request_token(
        &self,
        _url: &str,
        _basic_credentials: &str,
    ) -> std::result::Result<AuthResponse, TransportError> {
        Ok(AuthResponse {
            access_token: Some(format!("simulated-{}", Uuid::new_v4().simple())),
            expires_in: Some("3599".to_string()),
        })
    }

    async fn stk_push(
        &self,
        _url: &str,
        _access_token: &str,
        request: &StkPushRequest,
    ) -> std::result::Result<StkPushResponse, TransportError> {
        tokio::time::sleep(self.push_delay).await;

        let id = Uuid::new_v4().simple().to_string();
        info!(
            "Simulated STK push for {} ({} KES)",
            request.phone_number, request.amount
        );

        Ok(StkPushResponse {
            merchant_request_id: Some(format!("SIM-{}", &id[..12])),
            checkout_request_id: Some(format!("ws_CO_SIM_{}", id)),
            response_code: Some("0".to_string()),
            response_description: Some("Success. Request accepted for processing".to_string()),
            customer_message: Some("Success. Request accepted for processing".to_string()),
            ..Default::default()
        })
    }

    async fn stk_query(
        &self,
        _url: &str,
        _access_token: &str,
        request: &StkQueryRequest,
    ) -> std::result::Result<StkQueryResponse, TransportError> {
        Ok(StkQueryResponse {
            response_code: Some("0".to_string()),
            response_description: Some("The service request has been accepted successfully".to_string()),
            checkout_request_id: Some(request.checkout_request_id.clone()),
            result_code: Some("0".to_string()),
            result_desc: Some("The service request is processed successfully.".to_string()),
            ..Default::default()
        })
    }
}
