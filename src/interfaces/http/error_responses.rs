use crate::error::PaymentError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::error;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: u16,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Missing or invalid x-user-id header")]
    MissingCaller,
    #[error(transparent)]
    Payment(#[from] PaymentError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingCaller => StatusCode::UNAUTHORIZED,
            ApiError::Payment(err) => match err {
                PaymentError::NotFound(_) => StatusCode::NOT_FOUND,
                PaymentError::Unauthorized => StatusCode::FORBIDDEN,
                PaymentError::DuplicateReceipt(_)
                | PaymentError::AlreadyTerminal(_)
                | PaymentError::IllegalTransition { .. }
                | PaymentError::ConcurrentModification(_) => StatusCode::CONFLICT,
                PaymentError::InvalidReceiptFormat(_)
                | PaymentError::InvalidPhone(_)
                | PaymentError::ValidationError(_) => StatusCode::BAD_REQUEST,
                PaymentError::GatewayRejected(_) | PaymentError::GatewayProtocol(_) => {
                    StatusCode::BAD_GATEWAY
                }
                PaymentError::GatewayAuth(_) | PaymentError::GatewayNetwork(_) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                PaymentError::CsvError(_)
                | PaymentError::IoError(_)
                | PaymentError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self, "http: request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = Json(ErrorResponse {
            code: status.as_u16(),
            message,
        });
        (status, body).into_response()
    }
}
