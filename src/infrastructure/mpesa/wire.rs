//! Daraja request and response bodies, and their translation into
//! [`GatewayOutcome`]. Nothing outside this module sees raw result codes.

use crate::domain::event::{GatewayCallback, GatewayOutcome, SuccessfulPayment};
use crate::domain::money::Amount;
use crate::domain::phone::Msisdn;
use crate::domain::receipt::ReceiptCode;
use crate::error::{PaymentError, Result};
use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use tracing::warn;

pub const SUCCESS_CODE: &str = "0";
pub const QUERY_IN_PROGRESS_CODE: &str = "500.001.1001";
pub const TRANSACTION_TYPE: &str = "CustomerPayBillOnline";
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";
/// Daraja timestamps are East Africa Time, UTC+3.
const EAT_OFFSET_HOURS: i64 = 3;

/// Formats `at` as a Daraja timestamp.
pub fn timestamp(at: DateTime<Utc>) -> String {
    (at.naive_utc() + TimeDelta::hours(EAT_OFFSET_HOURS))
        .format(TIMESTAMP_FORMAT)
        .to_string()
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let local = NaiveDateTime::parse_from_str(raw.trim(), TIMESTAMP_FORMAT).ok()?;
    Some((local - TimeDelta::hours(EAT_OFFSET_HOURS)).and_utc())
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StkPushRequest<'a> {
    pub business_short_code: &'a str,
    pub password: &'a str,
    pub timestamp: &'a str,
    pub transaction_type: &'static str,
    pub amount: i64,
    pub party_a: &'a str,
    pub party_b: &'a str,
    pub phone_number: &'a str,
    #[serde(rename = "CallBackURL")]
    pub callback_url: &'a str,
    pub account_reference: &'a str,
    pub transaction_desc: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct StkPushResponse {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: Option<String>,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: Option<String>,
    #[serde(rename = "ResponseCode")]
    pub response_code: Option<String>,
    #[serde(rename = "ResponseDescription")]
    pub response_description: Option<String>,
    #[serde(rename = "CustomerMessage")]
    pub customer_message: Option<String>,
    #[serde(rename = "errorMessage")]
    pub error_message: Option<String>,
}

impl StkPushResponse {
    /// The gateway's explanation for refusing the push, verbatim.
    pub fn rejection_message(&self) -> String {
        self.error_message
            .clone()
            .or_else(|| self.response_description.clone())
            .unwrap_or_else(|| "Payment initiation failed".to_string())
    }
}

#[derive(Debug, Serialize)]
pub struct StkQueryRequest<'a> {
    #[serde(rename = "BusinessShortCode")]
    pub business_short_code: &'a str,
    #[serde(rename = "Password")]
    pub password: &'a str,
    #[serde(rename = "Timestamp")]
    pub timestamp: &'a str,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: &'a str,
}

/// Result codes arrive as numbers in callbacks and as strings in query responses.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ResultCode {
    Number(i64),
    Text(String),
}

impl ResultCode {
    pub fn as_code(&self) -> String {
        match self {
            ResultCode::Number(n) => n.to_string(),
            ResultCode::Text(s) => s.trim().to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StkQueryResponse {
    #[serde(rename = "ResultCode")]
    pub result_code: Option<ResultCode>,
    #[serde(rename = "ResultDesc")]
    pub result_desc: Option<String>,
    #[serde(rename = "CallbackMetadata")]
    pub callback_metadata: Option<CallbackMetadata>,
    #[serde(rename = "errorCode")]
    pub error_code: Option<String>,
    #[serde(rename = "errorMessage")]
    pub error_message: Option<String>,
}

impl StkQueryResponse {
    /// Whether the gateway says the transaction is still being processed.
    pub fn is_in_progress(&self) -> bool {
        self.error_code.as_deref() == Some(QUERY_IN_PROGRESS_CODE)
    }

    pub fn into_outcome(self) -> Result<GatewayOutcome> {
        if self.is_in_progress() {
            return Ok(GatewayOutcome::StillPending);
        }
        classify(
            self.result_code.as_ref(),
            self.result_desc.unwrap_or_default(),
            self.callback_metadata.as_ref(),
        )
    }
}

#[derive(Debug, Deserialize)]
pub struct CallbackEnvelope {
    #[serde(rename = "Body")]
    pub body: CallbackBody,
}

#[derive(Debug, Deserialize)]
pub struct CallbackBody {
    #[serde(rename = "stkCallback")]
    pub stk_callback: StkCallback,
}

#[derive(Debug, Deserialize)]
pub struct StkCallback {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: Option<String>,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    #[serde(rename = "ResultCode")]
    pub result_code: Option<ResultCode>,
    #[serde(rename = "ResultDesc")]
    pub result_desc: Option<String>,
    #[serde(rename = "CallbackMetadata")]
    pub callback_metadata: Option<CallbackMetadata>,
}

impl CallbackEnvelope {
    pub fn into_callback(self) -> Result<GatewayCallback> {
        let callback = self.body.stk_callback;
        let outcome = classify(
            callback.result_code.as_ref(),
            callback.result_desc.unwrap_or_default(),
            callback.callback_metadata.as_ref(),
        )?;
        Ok(GatewayCallback {
            gateway_request_id: callback.checkout_request_id,
            correlation_id: callback.merchant_request_id,
            outcome,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CallbackMetadata {
    #[serde(rename = "Item", default)]
    pub items: Vec<MetadataItem>,
}

#[derive(Debug, Deserialize)]
pub struct MetadataItem {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value", default)]
    pub value: Option<Value>,
}

impl CallbackMetadata {
    fn text(&self, name: &str) -> Option<String> {
        let value = self.items.iter().find(|item| item.name == name)?.value.as_ref()?;
        match value {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
        .filter(|s| !s.is_empty())
    }

    fn payment(&self) -> Result<SuccessfulPayment> {
        let receipt = self
            .text("MpesaReceiptNumber")
            .ok_or_else(|| {
                PaymentError::GatewayProtocol("success reported without a receipt".to_string())
            })
            .and_then(|raw| ReceiptCode::new(&raw))?;

        let amount = self.text("Amount").and_then(|raw| {
            Decimal::from_str(&raw)
                .ok()
                .and_then(|value| Amount::new(value).ok())
                .or_else(|| {
                    warn!(%raw, "gateway: ignoring unreadable amount");
                    None
                })
        });
        let phone = self.text("PhoneNumber").and_then(|raw| {
            Msisdn::parse(&raw).ok().or_else(|| {
                warn!(%raw, "gateway: ignoring unreadable phone number");
                None
            })
        });
        let paid_at = self.text("TransactionDate").and_then(|raw| {
            parse_timestamp(&raw).or_else(|| {
                warn!(%raw, "gateway: ignoring unreadable transaction date");
                None
            })
        });

        Ok(SuccessfulPayment {
            receipt,
            amount,
            phone,
            paid_at,
        })
    }
}

/// Maps a result code to an outcome.
///
/// `0` succeeds, `1032`/`2032` are user cancellations, `1037` is a PIN-entry
/// timeout, an empty or absent code means no outcome yet, and anything else
/// is a failure carrying the gateway's code and description.
pub fn classify(
    code: Option<&ResultCode>,
    description: String,
    metadata: Option<&CallbackMetadata>,
) -> Result<GatewayOutcome> {
    let code = code.map(ResultCode::as_code).unwrap_or_default();
    let outcome = match code.as_str() {
        "" => GatewayOutcome::StillPending,
        SUCCESS_CODE => {
            let empty = CallbackMetadata::default();
            GatewayOutcome::Succeeded(metadata.unwrap_or(&empty).payment()?)
        }
        "1032" | "2032" => GatewayOutcome::UserCancelled { code, description },
        "1037" => GatewayOutcome::TimedOut { code, description },
        _ => GatewayOutcome::OtherFailure { code, description },
    };
    Ok(outcome)
}
