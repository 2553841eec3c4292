use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// User-facing messages shared between handlers, the orchestrator and tests.
pub mod msg {
    pub const INVALID_PHONE: &str = "Please enter a valid Kenyan phone number";
    pub const INVALID_AMOUNT: &str = "Amount must be greater than zero";
    pub const DESCRIPTION_REQUIRED: &str = "Description is required";
    pub const TOKEN_REQUIRED: &str = "Token is required";
    pub const ORDER_DATA_REQUIRED: &str = "Order data is required";
    pub const ORDER_ID_REQUIRED: &str = "Order ID is required";
    pub const AUTH_TOKEN_REQUIRED: &str = "Authorization token is required";
    pub const METHOD_NOT_ALLOWED: &str = "Method not allowed";
    pub const TOO_MANY_REQUESTS: &str = "Too many requests, please slow down";
    pub const INVALID_ORDER_ID: &str = "Order id may only contain letters, digits, '-', '_', '.' and ':'";
}

/// Errors from a single call to the PesaPal API.
#[derive(Error, Debug)]
pub enum PesapalError {
    /// The request never got a response.
    #[error("could not reach PesaPal: {0}")]
    Transport(#[from] reqwest::Error),

    /// PesaPal answered with an error status, or a success status whose body
    /// carries an `error` object.
    #[error("{message}")]
    Provider {
        status: u16,
        message: String,
        details: Option<Value>,
    },

    /// Success status but the identifier we need is absent.
    #[error("PesaPal response is missing `{field}`")]
    MissingField { field: &'static str, details: Value },

    #[error("PesaPal consumer key and secret are not configured")]
    MissingCredentials,
}

impl PesapalError {
    /// HTTP status reported by PesaPal, if it got that far.
    pub fn status(&self) -> Option<u16> {
        match self {
            PesapalError::Provider { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Provider payload worth showing to an operator.
    pub fn details(&self) -> Option<&Value> {
        match self {
            PesapalError::Provider { details, .. } => details.as_ref(),
            PesapalError::MissingField { details, .. } => Some(details),
            _ => None,
        }
    }
}

/// Failure of one payment attempt, tagged with the step that failed.
#[derive(Error, Debug)]
pub enum PaymentError {
    /// Rejected before any network call.
    #[error("{0}")]
    Validation(String),

    #[error("Failed to get token: {0}")]
    Token(#[source] PesapalError),

    #[error("Failed to register IPN URL: {0}")]
    IpnRegistration(#[source] PesapalError),

    #[error("Failed to submit order: {0}")]
    OrderSubmission(#[source] PesapalError),

    #[error("Failed to initiate M-PESA payment: {0}")]
    MobileMoney(#[source] PesapalError),
}

impl PaymentError {
    pub fn provider_error(&self) -> Option<&PesapalError> {
        match self {
            PaymentError::Validation(_) => None,
            PaymentError::Token(e)
            | PaymentError::IpnRegistration(e)
            | PaymentError::OrderSubmission(e)
            | PaymentError::MobileMoney(e) => Some(e),
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("Too many requests (retry after {retry_after}s)")]
    TooManyRequests { retry_after: u64 },

    #[error("Upstream error: {message}")]
    Upstream {
        status: StatusCode,
        message: String,
        details: Option<Value>,
    },

    #[error("JSON error: {0}")]
    Json(#[from] JsonRejection),

    #[error("Query error: {0}")]
    Query(#[from] QueryRejection),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

/// Maps a provider status onto the status we answer with.
/// Anything that is not an error status becomes a 500.
fn upstream_status(status: Option<u16>) -> StatusCode {
    status
        .and_then(|s| StatusCode::from_u16(s).ok())
        .filter(|s| s.is_client_error() || s.is_server_error())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

impl From<PesapalError> for AppError {
    fn from(err: PesapalError) -> Self {
        AppError::Upstream {
            status: upstream_status(err.status()),
            details: err.details().cloned(),
            message: err.to_string(),
        }
    }
}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::Validation(message) => AppError::BadRequest(message),
            other => {
                let provider = other.provider_error();
                AppError::Upstream {
                    status: upstream_status(provider.and_then(PesapalError::status)),
                    details: provider.and_then(PesapalError::details).cloned(),
                    message: other.to_string(),
                }
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message, details) = match self {
            AppError::BadRequest(message) => (StatusCode::BAD_REQUEST, message, None),
            AppError::MethodNotAllowed => (
                StatusCode::METHOD_NOT_ALLOWED,
                msg::METHOD_NOT_ALLOWED.to_string(),
                None,
            ),
            AppError::TooManyRequests { retry_after } => (
                StatusCode::TOO_MANY_REQUESTS,
                msg::TOO_MANY_REQUESTS.to_string(),
                Some(serde_json::json!({ "retry_after_secs": retry_after })),
            ),
            AppError::Upstream {
                status,
                message,
                details,
            } => {
                tracing::error!("PesaPal error ({}): {}", status, message);
                (status, message, details)
            }
            AppError::Json(rejection) => (
                rejection.status(),
                "Invalid JSON".to_string(),
                Some(Value::String(rejection.body_text())),
            ),
            AppError::Query(rejection) => (
                StatusCode::BAD_REQUEST,
                "Invalid query string".to_string(),
                Some(Value::String(rejection.body_text())),
            ),
            AppError::Internal(message) => {
                tracing::error!("Internal error: {}", message);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    None,
                )
            }
        };

        (status, Json(ErrorResponse { message, details })).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
