use super::AppState;
use crate::error::PaymentError;
use crate::infrastructure::mpesa::wire::CallbackEnvelope;
use axum::{Json, body::Bytes, extract::State, http::StatusCode};
use serde::Serialize;
use tracing::{error, warn};

/// The acknowledgement body the gateway expects.
#[derive(Debug, Serialize)]
pub struct CallbackAck {
    #[serde(rename = "ResultCode")]
    pub result_code: u8,
    #[serde(rename = "ResultDesc")]
    pub result_desc: &'static str,
}

const ACCEPTED: CallbackAck = CallbackAck {
    result_code: 0,
    result_desc: "Accepted",
};

const INVALID_JSON: CallbackAck = CallbackAck {
    result_code: 1,
    result_desc: "Invalid JSON",
};

/// Webhook endpoint. Only unparseable JSON is refused; every other delivery
/// is acknowledged so the gateway stops retrying, and failures are logged.
pub async fn handle_callback(
    State(state): State<AppState>,
    body: Bytes,
) -> (StatusCode, Json<CallbackAck>) {
    let value: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(err) => {
            warn!(error = %err, "callback: malformed JSON");
            return (StatusCode::BAD_REQUEST, Json(INVALID_JSON));
        }
    };

    let callback = match serde_json::from_value::<CallbackEnvelope>(value)
        .map_err(PaymentError::from)
        .and_then(CallbackEnvelope::into_callback)
    {
        Ok(callback) => callback,
        Err(err) => {
            error!(error = %err, "callback: undecodable delivery");
            return (StatusCode::OK, Json(ACCEPTED));
        }
    };

    let gateway_request_id = callback.gateway_request_id.clone();
    if let Err(err) = state.payments.handle_callback(callback).await {
        error!(%gateway_request_id, error = %err, "callback: processing failed");
    }
    (StatusCode::OK, Json(ACCEPTED))
}
