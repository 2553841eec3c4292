mod pesapal;

pub use pesapal::*;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::PesapalError;
use crate::models::{OrderEnvelope, StatusReport};
use crate::phone::NormalizedPhone;

/// Which PesaPal deployment to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Sandbox,
    Production,
}

impl Environment {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "sandbox" | "dev" | "development" | "test" => Some(Environment::Sandbox),
            "production" | "prod" | "live" => Some(Environment::Production),
            _ => None,
        }
    }

    /// API root, without trailing slash.
    pub fn base_url(&self) -> &'static str {
        match self {
            Environment::Sandbox => "https://cybqa.pesapal.com/pesapalv3",
            Environment::Production => "https://pay.pesapal.com/v3",
        }
    }

    /// Hosted payment page, takes `OrderTrackingId` as a query parameter.
    pub fn iframe_url(&self) -> &'static str {
        match self {
            Environment::Sandbox => "https://cybqa.pesapal.com/pesapaliframe/PesapalIframe3/Index",
            Environment::Production => "https://pay.pesapal.com/iframe/PesapalIframe3/Index",
        }
    }

    pub fn redirect_url(&self, order_tracking_id: &str) -> String {
        format!("{}?OrderTrackingId={}", self.iframe_url(), order_tracking_id)
    }
}

/// The PesaPal calls a payment attempt is made of.
///
/// [`PesapalClient`] is the real implementation; tests substitute fakes that
/// count calls.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// `POST /api/Auth/RequestToken`
    async fn request_token(&self) -> Result<AccessToken, PesapalError>;

    /// `POST /api/URLSetup/RegisterIPN`
    async fn register_ipn(&self, token: &str, url: &str) -> Result<IpnRegistration, PesapalError>;

    /// `POST /api/Transactions/SubmitOrderRequest`
    async fn submit_order(
        &self,
        token: &str,
        order: &OrderEnvelope,
    ) -> Result<OrderSubmission, PesapalError>;

    /// `POST /api/Transactions/InitiateMobileMoneyPayment`. Returns the
    /// provider payload as is.
    async fn initiate_mobile_money(
        &self,
        token: &str,
        order_tracking_id: &str,
        phone: &NormalizedPhone,
    ) -> Result<Value, PesapalError>;

    /// `GET /api/Transactions/GetTransactionStatus`
    async fn transaction_status(
        &self,
        token: &str,
        order_tracking_id: &str,
    ) -> Result<StatusReport, PesapalError>;
}
