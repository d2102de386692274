use crate::domain::appointment::{AppointmentId, PaymentStatus};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Gateway authentication failed: {0}")]
    GatewayAuth(String),
    #[error("Gateway rejected the request: {0}")]
    GatewayRejected(String),
    #[error("Gateway network error: {0}")]
    GatewayNetwork(String),
    #[error("Gateway returned an unexpected response: {0}")]
    GatewayProtocol(String),
    #[error("Event {event} is not valid while payment is {from}")]
    IllegalTransition {
        from: PaymentStatus,
        event: &'static str,
    },
    #[error("Receipt {0} has already been used")]
    DuplicateReceipt(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("Appointment {0} has already been paid for")]
    AlreadyTerminal(AppointmentId),
    #[error("Invalid receipt format: {0}")]
    InvalidReceiptFormat(String),
    #[error("Invalid phone number: {0}")]
    InvalidPhone(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Caller is not allowed to perform this action")]
    Unauthorized,
    #[error("Appointment {0} was modified concurrently")]
    ConcurrentModification(AppointmentId),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

impl PaymentError {
    /// True for failures caused by the gateway being unreachable or refusing
    /// credentials, which leave the payment untouched for a later attempt.
    pub fn is_transient_gateway_error(&self) -> bool {
        matches!(self, Self::GatewayNetwork(_) | Self::GatewayAuth(_))
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for PaymentError {
    fn from(err: rocksdb::Error) -> Self {
        PaymentError::InternalError(Box::new(err))
    }
}

impl From<serde_json::Error> for PaymentError {
    fn from(err: serde_json::Error) -> Self {
        PaymentError::InternalError(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, PaymentError>;
