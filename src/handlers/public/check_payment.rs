use axum::{extract::State, http::HeaderMap};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{AppError, Result, msg};
use crate::extractors::{Json, Query};
use crate::state::AppState;
use crate::util::extract_bearer_token;

#[derive(Debug, Deserialize)]
pub struct CheckPaymentQuery {
    #[serde(default, rename = "orderId")]
    pub order_id: Option<String>,
}

/// Looks up a transaction with the caller's token and returns PesaPal's
/// payload unchanged.
pub async fn check_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<CheckPaymentQuery>,
) -> Result<Json<Value>> {
    let order_id = query
        .order_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::BadRequest(msg::ORDER_ID_REQUIRED.into()))?;
    let token = extract_bearer_token(&headers)
        .ok_or_else(|| AppError::BadRequest(msg::AUTH_TOKEN_REQUIRED.into()))?;

    let report = state.gateway().transaction_status(token, order_id).await?;

    tracing::debug!("Payment status for order {}: {}", order_id, report.status);

    Ok(Json(report.raw))
}
