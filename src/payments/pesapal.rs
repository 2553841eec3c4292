use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Environment, Gateway};
use crate::error::PesapalError;
use crate::models::{OrderEnvelope, StatusReport};
use crate::phone::NormalizedPhone;

/// Per-request ceiling. PesaPal's STK endpoint is the slow one.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for a PesaPal merchant account.
#[derive(Debug, Clone)]
pub struct PesapalConfig {
    pub environment: Environment,
    /// Overrides the environment's API root when set.
    pub base_url: Option<String>,
    pub consumer_key: Option<String>,
    pub consumer_secret: Option<String>,
}

impl PesapalConfig {
    pub fn api_base(&self) -> String {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.environment.base_url())
            .trim_end_matches('/')
            .to_string()
    }
}

/// Bearer token from `RequestToken`. Valid for five minutes.
#[derive(Debug, Clone, Serialize)]
pub struct AccessToken {
    pub token: String,
    #[serde(rename = "expiryDate", skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<String>,
}

#[derive(Debug, Clone)]
pub struct IpnRegistration {
    pub ipn_id: String,
}

#[derive(Debug, Clone)]
pub struct OrderSubmission {
    pub order_tracking_id: String,
    /// Hosted payment page, when PesaPal returns one.
    pub redirect_url: Option<String>,
}

#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    consumer_key: &'a str,
    consumer_secret: &'a str,
}

#[derive(Debug, Serialize)]
struct RegisterIpnRequest<'a> {
    url: &'a str,
    ipn_notification_type: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MobileMoneyRequest<'a> {
    order_tracking_id: &'a str,
    phone_number: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Option<String>,
    #[serde(rename = "expiryDate")]
    expiry_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RegisterIpnResponse {
    ipn_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SubmitOrderResponse {
    order_tracking_id: Option<String>,
    redirect_url: Option<String>,
}

/// `reqwest` client for the PesaPal v3 API.
#[derive(Debug, Clone)]
pub struct PesapalClient {
    client: Client,
    base_url: String,
    consumer_key: Option<String>,
    consumer_secret: Option<String>,
}

impl PesapalClient {
    pub fn new(config: &PesapalConfig) -> Result<Self, PesapalError> {
        let client = Client::builder()
            .user_agent(concat!("pesapal-checkout/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url: config.api_base(),
            consumer_key: config.consumer_key.clone(),
            consumer_secret: config.consumer_secret.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, builder: RequestBuilder, token: &str) -> RequestBuilder {
        builder
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "application/json")
    }

    /// Sends a request and returns the JSON body of a successful answer.
    ///
    /// PesaPal sometimes answers 200 with `{"error": {...}, "status": "500"}`;
    /// that is reported as a provider error too.
    async fn send(&self, builder: RequestBuilder) -> Result<Value, PesapalError> {
        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;
        let body: Value = serde_json::from_str(&text).unwrap_or(Value::String(text));

        if !status.is_success() {
            return Err(PesapalError::Provider {
                status: status.as_u16(),
                message: error_message(&body)
                    .unwrap_or_else(|| format!("PesaPal API error: {}", status)),
                details: Some(body),
            });
        }

        if let Some(error) = body.get("error").filter(|e| !e.is_null()) {
            let reported = body
                .get("status")
                .and_then(|s| s.as_str().and_then(|text| text.parse().ok()).or(s.as_u64()))
                .and_then(|s| u16::try_from(s).ok())
                .filter(|s| *s >= 400)
                .unwrap_or(502);
            return Err(PesapalError::Provider {
                status: reported,
                message: error_message(&body)
                    .unwrap_or_else(|| format!("PesaPal API error: {}", error)),
                details: Some(body),
            });
        }

        Ok(body)
    }
}

/// Best human-readable message in a PesaPal error body.
fn error_message(body: &Value) -> Option<String> {
    let error = body.get("error");
    error
        .and_then(|e| e.get("message"))
        .or_else(|| error.and_then(|e| e.get("code")))
        .or_else(|| body.get("message"))
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
}

fn parse<T: serde::de::DeserializeOwned>(body: &Value, field: &'static str) -> Result<T, PesapalError> {
    serde_json::from_value(body.clone()).map_err(|_| PesapalError::MissingField {
        field,
        details: body.clone(),
    })
}

fn required(value: Option<String>, field: &'static str, body: Value) -> Result<String, PesapalError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or(PesapalError::MissingField { field, details: body })
}

#[async_trait]
impl Gateway for PesapalClient {
    async fn request_token(&self) -> Result<AccessToken, PesapalError> {
        let (Some(consumer_key), Some(consumer_secret)) =
            (self.consumer_key.as_deref(), self.consumer_secret.as_deref())
        else {
            return Err(PesapalError::MissingCredentials);
        };

        let body = self
            .send(
                self.client
                    .post(self.url("/api/Auth/RequestToken"))
                    .header(reqwest::header::ACCEPT, "application/json")
                    .json(&TokenRequest {
                        consumer_key,
                        consumer_secret,
                    }),
            )
            .await?;

        let response: TokenResponse = parse(&body, "token")?;
        Ok(AccessToken {
            token: required(response.token, "token", body)?,
            expiry_date: response.expiry_date,
        })
    }

    async fn register_ipn(&self, token: &str, url: &str) -> Result<IpnRegistration, PesapalError> {
        tracing::debug!("Registering IPN URL: {}", url);

        let body = self
            .send(self.authorized(
                self.client
                    .post(self.url("/api/URLSetup/RegisterIPN"))
                    .json(&RegisterIpnRequest {
                        url,
                        ipn_notification_type: "POST",
                    }),
                token,
            ))
            .await?;

        let response: RegisterIpnResponse = parse(&body, "ipn_id")?;
        Ok(IpnRegistration {
            ipn_id: required(response.ipn_id, "ipn_id", body)?,
        })
    }

    async fn submit_order(
        &self,
        token: &str,
        order: &OrderEnvelope,
    ) -> Result<OrderSubmission, PesapalError> {
        tracing::debug!(
            "Submitting order {} ({} {}) to PesaPal",
            order.id,
            order.amount,
            order.currency
        );

        let body = self
            .send(self.authorized(
                self.client
                    .post(self.url("/api/Transactions/SubmitOrderRequest"))
                    .json(order),
                token,
            ))
            .await?;

        let response: SubmitOrderResponse = parse(&body, "order_tracking_id")?;
        Ok(OrderSubmission {
            order_tracking_id: required(response.order_tracking_id, "order_tracking_id", body)?,
            redirect_url: response.redirect_url.filter(|u| !u.is_empty()),
        })
    }

    async fn initiate_mobile_money(
        &self,
        token: &str,
        order_tracking_id: &str,
        phone: &NormalizedPhone,
    ) -> Result<Value, PesapalError> {
        tracing::debug!("Initiating STK push for order {}", order_tracking_id);

        self.send(self.authorized(
            self.client
                .post(self.url("/api/Transactions/InitiateMobileMoneyPayment"))
                .json(&MobileMoneyRequest {
                    order_tracking_id,
                    phone_number: phone.digits(),
                }),
            token,
        ))
        .await
    }

    async fn transaction_status(
        &self,
        token: &str,
        order_tracking_id: &str,
    ) -> Result<StatusReport, PesapalError> {
        let body = self
            .send(self.authorized(
                self.client
                    .get(self.url("/api/Transactions/GetTransactionStatus"))
                    .query(&[("orderTrackingId", order_tracking_id)]),
                token,
            ))
            .await?;

        Ok(StatusReport::from_payload(body))
    }
}
