#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mpesa_api::config::{AppConfig, MpesaConfig};
use mpesa_api::models::mpesa_transactions::{
    AuthResponse, StkPushRequest, StkPushResponse, StkQueryRequest, StkQueryResponse,
};
use mpesa_api::services::{MpesaService, MpesaTransport, TransportError};

pub const SHORT_CODE: &str = "174379";
pub const PASSKEY: &str = "bfb279f9aa9bdbcf158e97dd71a467cd2e0c893059b10f78e6b72ada1ed2c919";
pub const CALLBACK_URL: &str = "https://deliveries.example.com/api/mpesa/callback";

pub fn mpesa_config_with(overrides: &[(&'static str, &str)]) -> MpesaConfig {
    let mut vars: HashMap<&'static str, String> = HashMap::from([
        ("MPESA_CONSUMER_KEY", "test-consumer-key".to_string()),
        ("MPESA_CONSUMER_SECRET", "test-consumer-secret".to_string()),
        ("MPESA_SHORT_CODE", SHORT_CODE.to_string()),
        ("MPESA_PASSKEY", PASSKEY.to_string()),
        ("MPESA_CALLBACK_URL", CALLBACK_URL.to_string()),
    ]);
    for (key, value) in overrides {
        vars.insert(*key, value.to_string());
    }
    AppConfig::from_lookup(|key| vars.get(key).cloned())
        .expect("test config")
        .mpesa
}

pub fn mpesa_config() -> MpesaConfig {
    mpesa_config_with(&[])
}

pub fn accepted_push() -> StkPushResponse {
    StkPushResponse {
        merchant_request_id: Some("29115-34620561-1".into()),
        checkout_request_id: Some("ws_CO_191220191020363925".into()),
        response_code: Some("0".into()),
        response_description: Some("Success. Request accepted for processing".into()),
        customer_message: Some("Success. Request accepted for processing".into()),
        ..Default::default()
    }
}

pub fn settled_query(result_code: &str) -> StkQueryResponse {
    StkQueryResponse {
        response_code: Some("0".into()),
        checkout_request_id: Some("ws_CO_191220191020363925".into()),
        result_code: Some(result_code.into()),
        result_desc: Some("The service request is processed successfully.".into()),
        ..Default::default()
    }
}

pub fn pending_query() -> StkQueryResponse {
    StkQueryResponse {
        error_code: Some("500.001.1001".into()),
        error_message: Some("The transaction is being processed".into()),
        ..Default::default()
    }
}

/// Scriptable transport that records every call.
pub struct FakeTransport {
    token: Option<AuthResponse>,
    token_delay: Duration,
    push: Option<StkPushResponse>,
    queries: Mutex<VecDeque<StkQueryResponse>>,
    transient_query_failures: AtomicU32,
    pub token_calls: AtomicUsize,
    pub push_calls: AtomicUsize,
    pub query_calls: AtomicUsize,
    pub last_credentials: Mutex<Option<String>>,
    pub last_push: Mutex<Option<StkPushRequest>>,
    pub last_query: Mutex<Option<StkQueryRequest>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        FakeTransport {
            token: Some(AuthResponse {
                access_token: Some("fake-token".into()),
                expires_in: Some("3600".into()),
            }),
            token_delay: Duration::ZERO,
            push: Some(accepted_push()),
            queries: Mutex::new(VecDeque::from([settled_query("0")])),
            transient_query_failures: AtomicU32::new(0),
            token_calls: AtomicUsize::new(0),
            push_calls: AtomicUsize::new(0),
            query_calls: AtomicUsize::new(0),
            last_credentials: Mutex::new(None),
            last_push: Mutex::new(None),
            last_query: Mutex::new(None),
        }
    }

    pub fn with_token(mut self, token: Option<AuthResponse>) -> Self {
        self.token = token;
        self
    }

    pub fn with_token_delay(mut self, delay: Duration) -> Self {
        self.token_delay = delay;
        self
    }

    /// `None` makes the push fail at the network level.
    pub fn with_push(mut self, push: Option<StkPushResponse>) -> Self {
        self.push = push;
        self
    }

    /// Responses are served in order; the last one repeats.
    pub fn with_queries(self, queries: Vec<StkQueryResponse>) -> Self {
        *self.queries.lock().unwrap() = queries.into();
        self
    }

    pub fn with_transient_query_failures(self, count: u32) -> Self {
        self.transient_query_failures.store(count, Ordering::SeqCst);
        self
    }

    pub fn token_calls(&self) -> usize {
        self.token_calls.load(Ordering::SeqCst)
    }

    pub fn push_calls(&self) -> usize {
        self.push_calls.load(Ordering::SeqCst)
    }

    pub fn query_calls(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MpesaTransport for FakeTransport {
    async fn request_token(
        &self,
        _url: &str,
        basic_credentials: &str,
    ) -> Result<AuthResponse, TransportError> {
        self.token_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_credentials.lock().unwrap() = Some(basic_credentials.to_string());
        if !self.token_delay.is_zero() {
            tokio::time::sleep(self.token_delay).await;
        }
        self.token.clone().ok_or(TransportError::Status {
            status: 401,
            body: "Invalid Credentials".into(),
        })
    }

    async fn stk_push(
        &self,
        _url: &str,
        _access_token: &str,
        request: &StkPushRequest,
    ) -> Result<StkPushResponse, TransportError> {
        self.push_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_push.lock().unwrap() = Some(request.clone());
        self.push
            .clone()
            .ok_or_else(|| TransportError::Network("connection reset by peer".into()))
    }

    async fn stk_query(
        &self,
        _url: &str,
        _access_token: &str,
        request: &StkQueryRequest,
    ) -> Result<StkQueryResponse, TransportError> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_query.lock().unwrap() = Some(request.clone());

        let remaining = self.transient_query_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.transient_query_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(TransportError::Timeout);
        }

        let mut queries = self.queries.lock().unwrap();
        let response = if queries.len() > 1 {
            queries.pop_front()
        } else {
            queries.front().cloned()
        };
        Ok(response.unwrap_or_default())
    }
}

pub fn service_with(transport: FakeTransport) -> (Arc<MpesaService>, Arc<FakeTransport>) {
    service_with_config(mpesa_config(), transport)
}

pub fn service_with_config(
    config: MpesaConfig,
    transport: FakeTransport,
) -> (Arc<MpesaService>, Arc<FakeTransport>) {
    let transport = Arc::new(transport);
    let service = MpesaService::new(config, transport.clone());
    (Arc::new(service), transport)
}
