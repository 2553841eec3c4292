//! Per-IP rate limiting for the public API.
//!
//! Tiers:
//! - Strict: /api/get-token, /api/submit-order, /api/check-payment (PesaPal calls)
//! - Standard: /api/ipn
//! - Relaxed: /health
//!
//! Configure via environment variables:
//! - RATE_LIMIT_STRICT_RPM (default: 10)
//! - RATE_LIMIT_STANDARD_RPM (default: 30)
//! - RATE_LIMIT_RELAXED_RPM (default: 60)
//!
//! A tier set to 0 gets no layer at all. Rejections use the same
//! `{message, details?}` body as every other error.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::response::{IntoResponse, Response};
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::{GovernorError, GovernorLayer};

use crate::error::AppError;

/// Rate limiter layer type alias using governor types directly
pub type RateLimitLayer = GovernorLayer<
    tower_governor::key_extractor::PeerIpKeyExtractor,
    governor::middleware::NoOpMiddleware<governor::clock::QuantaInstant>,
    axum::body::Body,
>;

/// Creates a rate limiter layer with the specified requests per minute.
/// Returns `None` for 0, meaning the tier is off.
pub fn create_layer(requests_per_minute: u32) -> Option<RateLimitLayer> {
    if requests_per_minute == 0 {
        return None;
    }

    let period_secs = 60 / requests_per_minute as u64;
    let config = GovernorConfigBuilder::default()
        .period(Duration::from_secs(period_secs.max(1)))
        .burst_size(requests_per_minute)
        .finish()?;

    Some(GovernorLayer::new(Arc::new(config)).error_handler(rejection_response))
}

/// Turns a governor rejection into a JSON error, keeping its `retry-after`
/// and `x-ratelimit-*` headers.
fn rejection_response(error: GovernorError) -> Response {
    match error {
        GovernorError::TooManyRequests { wait_time, headers } => {
            let mut response = AppError::TooManyRequests {
                retry_after: wait_time,
            }
            .into_response();
            if let Some(headers) = headers {
                response.headers_mut().extend(headers);
            }
            response
        }
        GovernorError::UnableToExtractKey => {
            AppError::Internal("rate limiter could not read the peer address".into())
                .into_response()
        }
        GovernorError::Other { msg, .. } => {
            AppError::Internal(msg.unwrap_or_else(|| "rate limiter error".into())).into_response()
        }
    }
}

/// Applies a tier to a router, or returns it unchanged when the tier is off.
pub fn limit<S>(router: Router<S>, requests_per_minute: u32) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    match create_layer(requests_per_minute) {
        Some(layer) => router.layer(layer),
        None => router,
    }
}
