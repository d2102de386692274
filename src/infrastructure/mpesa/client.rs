use super::wire::{
    self, StkPushRequest, StkPushResponse, StkQueryRequest, StkQueryResponse, TokenResponse,
};
use crate::domain::event::GatewayOutcome;
use crate::domain::ports::{PaymentGateway, PushAccepted, PushRequest};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use clap::ValueEnum;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::fmt;
use std::time::Duration;
use tracing::{debug, error, info};

const AUTH_PATH: &str = "/oauth/v1/generate?grant_type=client_credentials";
const STK_PUSH_PATH: &str = "/mpesa/stkpush/v1/processrequest";
const STK_QUERY_PATH: &str = "/mpesa/stkpushquery/v1/query";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum MpesaEnvironment {
    #[default]
    Sandbox,
    Production,
}

impl MpesaEnvironment {
    pub fn base_url(self) -> &'static str {
        match self {
            MpesaEnvironment::Sandbox => "https://sandbox.safaricom.co.ke",
            MpesaEnvironment::Production => "https://api.safaricom.co.ke",
        }
    }
}

#[derive(Clone)]
pub struct MpesaConfig {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub shortcode: String,
    pub passkey: String,
    pub callback_url: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl fmt::Debug for MpesaConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MpesaConfig")
            .field("shortcode", &self.shortcode)
            .field("callback_url", &self.callback_url)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Bearer token for a single logical operation.
pub struct AccessToken(String);

impl AccessToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(..)")
    }
}

/// Daraja client. Holds no token state: every operation authenticates anew,
/// so concurrent requests never share or race on credentials.
pub struct MpesaClient {
    http: reqwest::Client,
    config: MpesaConfig,
}

impl MpesaClient {
    pub fn new(config: MpesaConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| PaymentError::InternalError(Box::new(err)))?;
        Ok(Self { http, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Push password: base64 of shortcode, passkey and timestamp.
    fn password(&self, timestamp: &str) -> String {
        STANDARD.encode(format!(
            "{}{}{}",
            self.config.shortcode, self.config.passkey, timestamp
        ))
    }

    pub async fn authenticate(&self) -> Result<AccessToken> {
        let resp = self
            .http
            .get(self.url(AUTH_PATH))
            .basic_auth(&self.config.consumer_key, Some(&self.config.consumer_secret))
            .send()
            .await
            .map_err(network_error)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            error!(%status, response_body = %body, "mpesa: authentication failed");
            return Err(PaymentError::GatewayAuth(format!(
                "token request failed with status {status}"
            )));
        }

        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|err| PaymentError::GatewayAuth(format!("unreadable token response: {err}")))?;
        token
            .access_token
            .filter(|t| !t.is_empty())
            .map(AccessToken)
            .ok_or_else(|| PaymentError::GatewayAuth("token response without access_token".into()))
    }

    async fn post<B, R>(&self, path: &str, token: &AccessToken, body: &B) -> Result<(StatusCode, R)>
    where
        B: serde::Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let resp = self
            .http
            .post(self.url(path))
            .bearer_auth(token.as_str())
            .json(body)
            .send()
            .await
            .map_err(network_error)?;
        let status = resp.status();
        let text = resp.text().await.map_err(network_error)?;
        debug!(%status, path, response_body = %text, "mpesa: response received");
        let decoded = serde_json::from_str(&text).map_err(|err| {
            error!(%status, path, response_body = %text, "mpesa: undecodable response");
            PaymentError::GatewayProtocol(format!("undecodable response (status {status}): {err}"))
        })?;
        Ok((status, decoded))
    }
}

fn network_error(err: reqwest::Error) -> PaymentError {
    if err.is_timeout() {
        PaymentError::GatewayNetwork(format!("request timed out: {err}"))
    } else {
        PaymentError::GatewayNetwork(err.to_string())
    }
}

#[async_trait]
impl PaymentGateway for MpesaClient {
    async fn initiate_push(&self, request: &PushRequest) -> Result<PushAccepted> {
        let token = self.authenticate().await?;
        let timestamp = wire::timestamp(Utc::now());
        let password = self.password(&timestamp);
        let phone = request.phone.as_str();

        let body = StkPushRequest {
            business_short_code: &self.config.shortcode,
            password: &password,
            timestamp: &timestamp,
            transaction_type: wire::TRANSACTION_TYPE,
            amount: request.amount.whole_units()?,
            party_a: phone,
            party_b: &self.config.shortcode,
            phone_number: phone,
            callback_url: &self.config.callback_url,
            account_reference: &request.reference,
            transaction_desc: &request.description,
        };
        info!(
            reference = %request.reference,
            %phone,
            amount = body.amount,
            "mpesa: initiating push"
        );

        let (status, response): (_, StkPushResponse) =
            self.post(STK_PUSH_PATH, &token, &body).await?;
        if response.response_code.as_deref() != Some(wire::SUCCESS_CODE) {
            let message = response.rejection_message();
            error!(%status, reference = %request.reference, %message, "mpesa: push rejected");
            return Err(PaymentError::GatewayRejected(message));
        }

        match (response.checkout_request_id, response.merchant_request_id) {
            (Some(gateway_request_id), Some(correlation_id)) => Ok(PushAccepted {
                gateway_request_id,
                correlation_id,
                customer_message: response.customer_message,
            }),
            _ => Err(PaymentError::GatewayProtocol(
                "accepted push without request identifiers".to_string(),
            )),
        }
    }

    async fn query_status(&self, gateway_request_id: &str) -> Result<GatewayOutcome> {
        let token = self.authenticate().await?;
        let timestamp = wire::timestamp(Utc::now());
        let password = self.password(&timestamp);
        let body = StkQueryRequest {
            business_short_code: &self.config.shortcode,
            password: &password,
            timestamp: &timestamp,
            checkout_request_id: gateway_request_id,
        };

        let (status, response): (_, StkQueryResponse) =
            self.post(STK_QUERY_PATH, &token, &body).await?;
        if !status.is_success() && !response.is_in_progress() {
            let message = response
                .error_message
                .unwrap_or_else(|| format!("status query failed with status {status}"));
            return Err(PaymentError::GatewayRejected(message));
        }
        let outcome = response.into_outcome()?;
        info!(gateway_request_id, outcome = outcome.kind(), "mpesa: status queried");
        Ok(outcome)
    }
}
