//! Payment attempt orchestration.
//!
//! One attempt walks a fixed sequence of PesaPal calls:
//!
//! ```text
//! IDLE -> TOKEN_REQUESTED -> IPN_REGISTERED -> ORDER_SUBMITTED
//!      -> MPESA_PUSHED -> POLLING -> COMPLETED | FAILED
//!      -> REDIRECT_PENDING
//! ```
//!
//! A hard failure at any step ends the attempt. Nothing is retried here; the
//! caller starts a new attempt.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{PaymentError, msg};
use crate::id;
use crate::models::{BillingAddress, OrderData, OrderDraft, PaymentMethod, PaymentRequest};
use crate::payments::{AccessToken, Environment, Gateway};
use crate::phone::NormalizedPhone;
use crate::poller::{PollHandle, PollSettings};

/// Steps of a single attempt, used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Idle,
    TokenRequested,
    IpnRegistered,
    OrderSubmitted,
    MpesaPushed,
    Polling,
    RedirectPending,
    Failed,
}

impl AttemptState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::TokenRequested => "TOKEN_REQUESTED",
            Self::IpnRegistered => "IPN_REGISTERED",
            Self::OrderSubmitted => "ORDER_SUBMITTED",
            Self::MpesaPushed => "MPESA_PUSHED",
            Self::Polling => "POLLING",
            Self::RedirectPending => "REDIRECT_PENDING",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-deployment settings, fixed at construction.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub environment: Environment,
    /// IPN URL registered with PesaPal when the order does not bring its own.
    pub callback_url: String,
    pub order_id_prefix: String,
    pub branch: Option<String>,
    pub poll: PollSettings,
}

/// Result of the submit half of an attempt (IPN, order, optional push).
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    PushSent {
        order_tracking_id: String,
        stk_status: Value,
    },
    Redirect {
        redirect_url: String,
        order_tracking_id: String,
    },
}

/// What the caller sees at the end of [`PaymentOrchestrator::initiate`].
#[derive(Debug)]
pub enum PaymentOutcome {
    /// STK push sent; `poll` tracks confirmation in the background.
    Pending {
        order_tracking_id: String,
        stk_status: Value,
        poll: PollHandle,
    },
    /// Customer must finish on the PesaPal hosted page.
    Redirect {
        redirect_url: String,
        order_tracking_id: String,
    },
    /// Input refused before any network call.
    Rejected { message: String },
    /// A provider step failed.
    Failed { message: String, error: PaymentError },
}

impl PaymentOutcome {
    fn from_error(error: PaymentError) -> Self {
        match error {
            PaymentError::Validation(message) => PaymentOutcome::Rejected { message },
            error => PaymentOutcome::Failed {
                message: error.to_string(),
                error,
            },
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            PaymentOutcome::Rejected { .. } | PaymentOutcome::Failed { .. }
        )
    }

    /// The single line shown to the customer.
    pub fn status_message(&self) -> String {
        match self {
            PaymentOutcome::Pending { .. } => {
                "Please check your phone for the M-PESA payment prompt".to_string()
            }
            PaymentOutcome::Redirect { .. } => {
                "Redirecting to PesaPal to complete your payment".to_string()
            }
            PaymentOutcome::Rejected { message } | PaymentOutcome::Failed { message, .. } => {
                message.clone()
            }
        }
    }
}

/// Drives payment attempts against a [`Gateway`].
pub struct PaymentOrchestrator {
    gateway: Arc<dyn Gateway>,
    settings: OrchestratorSettings,
}

impl PaymentOrchestrator {
    pub fn new(gateway: Arc<dyn Gateway>, settings: OrchestratorSettings) -> Self {
        Self { gateway, settings }
    }

    pub fn gateway(&self) -> &Arc<dyn Gateway> {
        &self.gateway
    }

    /// Runs a full attempt: validate, token, IPN, order, push or redirect,
    /// then start polling after a push.
    ///
    /// Never returns an error; failures come back as [`PaymentOutcome`]
    /// variants carrying a readable message.
    pub async fn initiate(&self, request: PaymentRequest) -> PaymentOutcome {
        let draft = match self.draft_from_request(&request) {
            Ok(draft) => draft,
            Err(e) => {
                tracing::info!("Payment request rejected: {}", e);
                return PaymentOutcome::from_error(e);
            }
        };
        tracing::debug!("Attempt {} state: {}", draft.id, AttemptState::Idle);

        let token = match self.acquire_token().await {
            Ok(token) => token,
            Err(e) => return self.fail(&draft.id, e),
        };
        tracing::debug!("Attempt {} state: {}", draft.id, AttemptState::TokenRequested);

        let attempt_id = draft.id.clone();
        match self.submit(&token.token, draft).await {
            Ok(Submission::PushSent {
                order_tracking_id,
                stk_status,
            }) => {
                let poll = self.watch(token.token, order_tracking_id.clone());
                tracing::debug!("Attempt {} state: {}", attempt_id, AttemptState::Polling);
                PaymentOutcome::Pending {
                    order_tracking_id,
                    stk_status,
                    poll,
                }
            }
            Ok(Submission::Redirect {
                redirect_url,
                order_tracking_id,
            }) => PaymentOutcome::Redirect {
                redirect_url,
                order_tracking_id,
            },
            Err(e) => self.fail(&attempt_id, e),
        }
    }

    fn fail(&self, attempt_id: &str, error: PaymentError) -> PaymentOutcome {
        tracing::warn!(
            "Attempt {} state: {} ({})",
            attempt_id,
            AttemptState::Failed,
            error
        );
        PaymentOutcome::from_error(error)
    }

    pub async fn acquire_token(&self) -> Result<AccessToken, PaymentError> {
        self.gateway
            .request_token()
            .await
            .map_err(PaymentError::Token)
    }

    /// Registers the IPN URL, submits the order and either pushes to the
    /// customer's phone or hands back the hosted page URL.
    pub async fn submit(&self, token: &str, draft: OrderDraft) -> Result<Submission, PaymentError> {
        let ipn = self
            .gateway
            .register_ipn(token, &draft.callback_url)
            .await
            .map_err(PaymentError::IpnRegistration)?;
        tracing::debug!(
            "Attempt {} state: {} (ipn_id={})",
            draft.id,
            AttemptState::IpnRegistered,
            ipn.ipn_id
        );

        let push_to = draft.push_to.clone();
        let envelope = draft.into_envelope(ipn.ipn_id);
        let order = self
            .gateway
            .submit_order(token, &envelope)
            .await
            .map_err(PaymentError::OrderSubmission)?;
        tracing::debug!(
            "Attempt {} state: {} (order_tracking_id={})",
            envelope.id,
            AttemptState::OrderSubmitted,
            order.order_tracking_id
        );

        match push_to {
            Some(phone) => {
                let stk_status = self
                    .gateway
                    .initiate_mobile_money(token, &order.order_tracking_id, &phone)
                    .await
                    .map_err(PaymentError::MobileMoney)?;
                tracing::info!(
                    "STK push sent for order {} to {}",
                    order.order_tracking_id,
                    phone.masked()
                );
                tracing::debug!("Attempt {} state: {}", envelope.id, AttemptState::MpesaPushed);

                Ok(Submission::PushSent {
                    order_tracking_id: order.order_tracking_id,
                    stk_status,
                })
            }
            None => {
                let redirect_url = order.redirect_url.unwrap_or_else(|| {
                    self.settings
                        .environment
                        .redirect_url(&order.order_tracking_id)
                });
                tracing::debug!(
                    "Attempt {} state: {}",
                    envelope.id,
                    AttemptState::RedirectPending
                );

                Ok(Submission::Redirect {
                    redirect_url,
                    order_tracking_id: order.order_tracking_id,
                })
            }
        }
    }

    /// Starts background polling for an order.
    pub fn watch(&self, token: String, order_tracking_id: String) -> PollHandle {
        PollHandle::spawn(
            Arc::clone(&self.gateway),
            token,
            order_tracking_id,
            self.settings.poll,
        )
    }

    /// Validates form input and builds the order for it.
    pub fn draft_from_request(&self, request: &PaymentRequest) -> Result<OrderDraft, PaymentError> {
        let phone = NormalizedPhone::parse(&request.customer.phone)
            .ok_or_else(|| PaymentError::Validation(msg::INVALID_PHONE.into()))?;
        validate_amount_and_description(request.amount, &request.description)?;

        let push_to = match request.method {
            PaymentMethod::Mpesa => Some(phone.clone()),
            PaymentMethod::Card => None,
        };

        Ok(OrderDraft {
            id: id::gen_order_id(&self.settings.order_id_prefix),
            amount: request.amount,
            description: request.description.trim().to_string(),
            callback_url: self.settings.callback_url.clone(),
            billing_address: BillingAddress::for_customer(
                &request.customer.email,
                &phone,
                &request.customer.name,
            ),
            branch: self.settings.branch.clone(),
            push_to,
        })
    }

    /// Builds the order for a browser-submitted payload, filling defaults.
    pub fn draft_from_order_data(&self, data: OrderData) -> Result<OrderDraft, PaymentError> {
        validate_amount_and_description(data.amount, &data.description)?;

        let push_to = if data.wants_mobile_money() {
            let raw = data.phone_number.as_deref().unwrap_or_default().trim();
            Some(
                NormalizedPhone::parse(raw)
                    .ok_or_else(|| PaymentError::Validation(msg::INVALID_PHONE.into()))?,
            )
        } else {
            None
        };

        let order_id = match data.id.filter(|i| !i.trim().is_empty()) {
            Some(order_id) if id::is_valid_reference(&order_id) => order_id,
            Some(_) => return Err(PaymentError::Validation(msg::INVALID_ORDER_ID.into())),
            None => id::gen_order_id(&self.settings.order_id_prefix),
        };

        let callback_url = data
            .callback_url
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| self.settings.callback_url.clone());

        let mut billing_address = data.billing_address.into_billing_address();
        if let Some(phone) = &push_to {
            if billing_address.phone_number.trim().is_empty() {
                billing_address.phone_number = phone.as_str().to_string();
            }
        }

        Ok(OrderDraft {
            id: order_id,
            amount: data.amount,
            description: data.description.trim().to_string(),
            callback_url,
            billing_address,
            branch: data.branch.or_else(|| self.settings.branch.clone()),
            push_to,
        })
    }
}

fn validate_amount_and_description(
    amount: rust_decimal::Decimal,
    description: &str,
) -> Result<(), PaymentError> {
    if amount <= rust_decimal::Decimal::ZERO {
        return Err(PaymentError::Validation(msg::INVALID_AMOUNT.into()));
    }
    if description.trim().is_empty() {
        return Err(PaymentError::Validation(msg::DESCRIPTION_REQUIRED.into()));
    }
    Ok(())
}
