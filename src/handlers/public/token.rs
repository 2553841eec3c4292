use axum::extract::State;

use crate::error::Result;
use crate::extractors::Json;
use crate::payments::AccessToken;
use crate::state::AppState;

/// Fetches a PesaPal access token with the server's merchant credentials.
///
/// Browsers never see the consumer key or secret, only the short-lived token.
pub async fn get_token(State(state): State<AppState>) -> Result<Json<AccessToken>> {
    let token = state.orchestrator.acquire_token().await?;

    tracing::debug!(
        "Issued PesaPal token (expires {})",
        token.expiry_date.as_deref().unwrap_or("unknown")
    );

    Ok(Json(token))
}
