pub mod mpesa_transactions;
pub mod payment;

pub use mpesa_transactions::{CallbackPayload, MpesaCallback, MpesaTransaction, TransactionStatus};
pub use payment::{PaymentRequest, PaymentResponse, PaymentStatus, PhoneValidation};
