use std::sync::Arc;

use crate::errors::{AppError, Result};
use crate::services::{MpesaService, TransactionLedger};

#[derive(Clone, Default)]
pub struct AppState {
    pub mpesa_service: Option<Arc<MpesaService>>,
    pub ledger: Arc<TransactionLedger>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mpesa(mut self, mpesa_service: Arc<MpesaService>) -> Self {
        self.mpesa_service = Some(mpesa_service);
        self
    }

    pub fn mpesa(&self) -> Result<&Arc<MpesaService>> {
        self.mpesa_service
            .as_ref()
            .ok_or_else(|| AppError::ServiceUnavailable("M-Pesa service is not available".to_string()))
    }
}
