mod check_payment;
mod submit_order;
mod token;

pub use check_payment::*;
pub use submit_order::*;
pub use token::*;

use axum::{
    Json, Router,
    http::{HeaderValue, Method, header},
    routing::{MethodRouter, get, post},
};
use serde::Serialize;
use tower_http::cors::{AllowOrigin, CorsLayer};

use super::method_not_allowed;
use crate::config::{AllowedOrigins, RateLimitConfig};
use crate::rate_limit;
use crate::state::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// CORS for one endpoint: its own verbs plus OPTIONS.
///
/// The layer answers every `OPTIONS` request itself, preflight or not.
pub fn cors_layer(origins: &AllowedOrigins, methods: &[Method]) -> CorsLayer {
    let allow_origin = if origins.is_any() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(
            origins
                .origins()
                .iter()
                .filter_map(|o| o.parse::<HeaderValue>().ok()),
        )
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(
            methods
                .iter()
                .cloned()
                .chain([Method::OPTIONS])
                .collect::<Vec<_>>(),
        )
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

/// One path, one verb, with 405 fallback, rate limit and CORS.
fn endpoint(
    path: &str,
    method: Method,
    handler: MethodRouter<AppState>,
    origins: &AllowedOrigins,
    requests_per_minute: u32,
) -> Router<AppState> {
    let router = Router::new().route(path, handler.fallback(method_not_allowed));

    rate_limit::limit(router, requests_per_minute).layer(cors_layer(origins, &[method]))
}

pub fn router(rate_limit: RateLimitConfig, origins: &AllowedOrigins) -> Router<AppState> {
    Router::new()
        .merge(endpoint(
            "/health",
            Method::GET,
            get(health),
            origins,
            rate_limit.relaxed_rpm,
        ))
        .merge(endpoint(
            "/api/get-token",
            Method::GET,
            get(get_token),
            origins,
            rate_limit.strict_rpm,
        ))
        .merge(endpoint(
            "/api/submit-order",
            Method::POST,
            post(submit_order),
            origins,
            rate_limit.strict_rpm,
        ))
        .merge(endpoint(
            "/api/check-payment",
            Method::GET,
            get(check_payment),
            origins,
            rate_limit.strict_rpm,
        ))
}
