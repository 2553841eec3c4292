//! PesaPal Instant Payment Notifications.
//!
//! PesaPal calls the registered IPN URL whenever a transaction changes, with
//! the tracking id in a query string (GET) or a JSON body (POST). The
//! notification carries no status, so we look it up, log it, and answer with
//! the acknowledgement body PesaPal expects. A `status` of 500 in that body
//! tells PesaPal to retry later.

use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::error::PesapalError;
use crate::extractors::{Json, Query};
use crate::models::StatusReport;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IpnNotification {
    pub order_tracking_id: String,
    #[serde(default)]
    pub order_merchant_reference: Option<String>,
    #[serde(default)]
    pub order_notification_type: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IpnAcknowledgement {
    pub order_notification_type: String,
    pub order_tracking_id: String,
    pub order_merchant_reference: String,
    pub status: u16,
}

pub async fn handle_ipn_get(
    State(state): State<AppState>,
    Query(notification): Query<IpnNotification>,
) -> Json<IpnAcknowledgement> {
    Json(acknowledge(&state, notification).await)
}

pub async fn handle_ipn_post(
    State(state): State<AppState>,
    Json(notification): Json<IpnNotification>,
) -> Json<IpnAcknowledgement> {
    Json(acknowledge(&state, notification).await)
}

async fn lookup_status(state: &AppState, order_tracking_id: &str) -> Result<StatusReport, PesapalError> {
    let token = state.gateway().request_token().await?;
    state
        .gateway()
        .transaction_status(&token.token, order_tracking_id)
        .await
}

async fn acknowledge(state: &AppState, notification: IpnNotification) -> IpnAcknowledgement {
    let status = match lookup_status(state, &notification.order_tracking_id).await {
        Ok(report) => {
            tracing::info!(
                "IPN for order {} (ref {}): {}",
                notification.order_tracking_id,
                notification.order_merchant_reference.as_deref().unwrap_or("-"),
                report.status
            );
            200
        }
        Err(e) => {
            tracing::error!(
                "IPN status lookup for order {} failed: {}",
                notification.order_tracking_id,
                e
            );
            500
        }
    };

    IpnAcknowledgement {
        order_notification_type: notification
            .order_notification_type
            .unwrap_or_else(|| "IPNCHANGE".to_string()),
        order_tracking_id: notification.order_tracking_id,
        order_merchant_reference: notification.order_merchant_reference.unwrap_or_default(),
        status,
    }
}
