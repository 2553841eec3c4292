use axum::extract::State;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, Result, msg};
use crate::extractors::Json;
use crate::models::OrderData;
use crate::orchestrator::Submission;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SubmitOrderRequest {
    /// Token from `/api/get-token`
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default, rename = "orderData")]
    pub order_data: Option<OrderData>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum SubmitOrderResponse {
    /// STK push sent; the browser polls `/api/check-payment`.
    Push {
        status: &'static str,
        message: &'static str,
        order_tracking_id: String,
        stk_status: Value,
    },
    /// The browser navigates to `redirect_url`.
    Redirect {
        redirect_url: String,
        order_tracking_id: String,
    },
}

impl From<Submission> for SubmitOrderResponse {
    fn from(submission: Submission) -> Self {
        match submission {
            Submission::PushSent {
                order_tracking_id,
                stk_status,
            } => SubmitOrderResponse::Push {
                status: "success",
                message: "Payment initiated",
                order_tracking_id,
                stk_status,
            },
            Submission::Redirect {
                redirect_url,
                order_tracking_id,
            } => SubmitOrderResponse::Redirect {
                redirect_url,
                order_tracking_id,
            },
        }
    }
}

/// Registers the IPN URL, submits the order and, for M-PESA with a phone
/// number, sends the STK push.
pub async fn submit_order(
    State(state): State<AppState>,
    Json(request): Json<SubmitOrderRequest>,
) -> Result<Json<SubmitOrderResponse>> {
    let token = request
        .token
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest(msg::TOKEN_REQUIRED.into()))?;
    let order_data = request
        .order_data
        .ok_or_else(|| AppError::BadRequest(msg::ORDER_DATA_REQUIRED.into()))?;

    tracing::info!(
        "Processing order {} for {} (payment method {}, {})",
        order_data.id.as_deref().unwrap_or("without reference"),
        order_data.amount,
        order_data.payment_method.as_deref().unwrap_or("none"),
        if order_data.wants_mobile_money() { "STK push" } else { "redirect" }
    );

    let draft = state.orchestrator.draft_from_order_data(order_data)?;
    let submission = state.orchestrator.submit(&token, draft).await?;

    Ok(Json(submission.into()))
}
