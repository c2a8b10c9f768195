pub mod mpesa_service;
pub mod phone;
pub mod transaction_ledger;
pub mod transport;

pub use mpesa_service::MpesaService;
pub use transaction_ledger::TransactionLedger;
pub use transport::{HttpTransport, MpesaTransport, SimulatedTransport, TransportError};
