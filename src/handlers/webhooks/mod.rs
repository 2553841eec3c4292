pub mod ipn;

pub use ipn::{handle_ipn_get, handle_ipn_post};

use axum::{Router, http::Method, routing::get};

use super::method_not_allowed;
use super::public::cors_layer;
use crate::config::{AllowedOrigins, RateLimitConfig};
use crate::rate_limit;
use crate::state::AppState;

pub fn router(rate_limit: RateLimitConfig, origins: &AllowedOrigins) -> Router<AppState> {
    let router = Router::new().route(
        "/api/ipn",
        get(handle_ipn_get)
            .post(handle_ipn_post)
            .fallback(method_not_allowed),
    );

    rate_limit::limit(router, rate_limit.standard_rpm)
        .layer(cors_layer(origins, &[Method::GET, Method::POST]))
}
