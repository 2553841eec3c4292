pub mod public;
pub mod webhooks;

use axum::Router;

use crate::config::{AllowedOrigins, RateLimitConfig};
use crate::error::AppError;
use crate::state::AppState;

/// Fallback for a known path hit with a method it does not serve.
pub async fn method_not_allowed() -> AppError {
    AppError::MethodNotAllowed
}

/// Every route the server exposes, with state attached.
pub fn app(state: AppState, rate_limit: RateLimitConfig, origins: &AllowedOrigins) -> Router {
    Router::new()
        // Browser-facing endpoints (CORS, strict rate limits)
        .merge(public::router(rate_limit, origins))
        // PesaPal callbacks
        .merge(webhooks::router(rate_limit, origins))
        .with_state(state)
}
