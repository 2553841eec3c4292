//! Test utilities and fixtures for checkout integration tests

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::{Value, json};

pub use pesapal_checkout::config::{AllowedOrigins, RateLimitConfig};
pub use pesapal_checkout::error::{PaymentError, PesapalError};
pub use pesapal_checkout::handlers;
pub use pesapal_checkout::models::*;
pub use pesapal_checkout::orchestrator::{
    OrchestratorSettings, PaymentOrchestrator, PaymentOutcome, Submission,
};
pub use pesapal_checkout::payments::{
    AccessToken, Environment, Gateway, IpnRegistration, OrderSubmission, PesapalClient,
    PesapalConfig,
};
pub use pesapal_checkout::phone::NormalizedPhone;
pub use pesapal_checkout::poller::{PollOutcome, PollSettings};
pub use pesapal_checkout::state::AppState;

pub const TEST_TOKEN: &str = "test-token";
pub const TEST_IPN_ID: &str = "ipn-0001";
pub const TEST_TRACKING_ID: &str = "b945e4af-80a5-4ec1-8706-e03f8332fb04";
pub const TEST_CALLBACK_URL: &str = "https://shop.example.com/api/ipn";

/// A scripted gateway failure. `PesapalError` is not `Clone`, so fakes keep
/// this and build the error on each call.
#[derive(Debug, Clone)]
pub enum Failure {
    Provider(u16, &'static str),
    Missing(&'static str),
}

impl Failure {
    fn to_error(&self) -> PesapalError {
        match self {
            Failure::Provider(status, message) => PesapalError::Provider {
                status: *status,
                message: message.to_string(),
                details: Some(json!({ "error": { "message": message } })),
            },
            Failure::Missing(field) => PesapalError::MissingField {
                field: *field,
                details: json!({}),
            },
        }
    }
}

/// Number of calls each gateway operation received.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Calls {
    pub token: usize,
    pub ipn: usize,
    pub order: usize,
    pub push: usize,
    pub status: usize,
}

/// In-memory [`Gateway`] with scripted answers and call counters.
///
/// Every operation succeeds unless told otherwise. Status answers are served
/// from a queue; once it is empty the last answer repeats (PENDING if the
/// queue was never filled).
#[derive(Default)]
pub struct FakeGateway {
    token_failure: Option<Failure>,
    ipn_failure: Option<Failure>,
    order_failure: Option<Failure>,
    push_failure: Option<Failure>,
    redirect_url: Option<String>,
    statuses: Mutex<VecDeque<Result<Value, Failure>>>,
    last_status: Mutex<Option<Result<Value, Failure>>>,
    token_calls: AtomicUsize,
    ipn_calls: AtomicUsize,
    order_calls: AtomicUsize,
    push_calls: AtomicUsize,
    status_calls: AtomicUsize,
    orders: Mutex<Vec<OrderEnvelope>>,
    pushed_to: Mutex<Vec<String>>,
    registered_urls: Mutex<Vec<String>>,
    status_tokens: Mutex<Vec<String>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_token(mut self, failure: Failure) -> Self {
        self.token_failure = Some(failure);
        self
    }

    pub fn fail_ipn(mut self, failure: Failure) -> Self {
        self.ipn_failure = Some(failure);
        self
    }

    pub fn fail_order(mut self, failure: Failure) -> Self {
        self.order_failure = Some(failure);
        self
    }

    pub fn fail_push(mut self, failure: Failure) -> Self {
        self.push_failure = Some(failure);
        self
    }

    pub fn with_redirect_url(mut self, url: &str) -> Self {
        self.redirect_url = Some(url.to_string());
        self
    }

    pub fn with_statuses<I>(self, statuses: I) -> Self
    where
        I: IntoIterator<Item = Result<Value, Failure>>,
    {
        self.statuses.lock().unwrap().extend(statuses);
        self
    }

    pub fn calls(&self) -> Calls {
        Calls {
            token: self.token_calls.load(Ordering::SeqCst),
            ipn: self.ipn_calls.load(Ordering::SeqCst),
            order: self.order_calls.load(Ordering::SeqCst),
            push: self.push_calls.load(Ordering::SeqCst),
            status: self.status_calls.load(Ordering::SeqCst),
        }
    }

    pub fn orders(&self) -> Vec<OrderEnvelope> {
        self.orders.lock().unwrap().clone()
    }

    pub fn pushed_to(&self) -> Vec<String> {
        self.pushed_to.lock().unwrap().clone()
    }

    pub fn registered_urls(&self) -> Vec<String> {
        self.registered_urls.lock().unwrap().clone()
    }

    /// Token sent with each status call, in order.
    pub fn status_tokens(&self) -> Vec<String> {
        self.status_tokens.lock().unwrap().clone()
    }
}

#[async_trait]
impl Gateway for FakeGateway {
    async fn request_token(&self) -> Result<AccessToken, PesapalError> {
        self.token_calls.fetch_add(1, Ordering::SeqCst);
        match &self.token_failure {
            Some(failure) => Err(failure.to_error()),
            None => Ok(AccessToken {
                token: TEST_TOKEN.to_string(),
                expiry_date: Some("2030-01-01T00:05:00Z".to_string()),
            }),
        }
    }

    async fn register_ipn(&self, _token: &str, url: &str) -> Result<IpnRegistration, PesapalError> {
        self.ipn_calls.fetch_add(1, Ordering::SeqCst);
        self.registered_urls.lock().unwrap().push(url.to_string());
        match &self.ipn_failure {
            Some(failure) => Err(failure.to_error()),
            None => Ok(IpnRegistration {
                ipn_id: TEST_IPN_ID.to_string(),
            }),
        }
    }

    async fn submit_order(
        &self,
        _token: &str,
        order: &OrderEnvelope,
    ) -> Result<OrderSubmission, PesapalError> {
        self.order_calls.fetch_add(1, Ordering::SeqCst);
        self.orders.lock().unwrap().push(order.clone());
        match &self.order_failure {
            Some(failure) => Err(failure.to_error()),
            None => Ok(OrderSubmission {
                order_tracking_id: TEST_TRACKING_ID.to_string(),
                redirect_url: self.redirect_url.clone(),
            }),
        }
    }

    async fn initiate_mobile_money(
        &self,
        _token: &str,
        order_tracking_id: &str,
        phone: &NormalizedPhone,
    ) -> Result<Value, PesapalError> {
        self.push_calls.fetch_add(1, Ordering::SeqCst);
        self.pushed_to.lock().unwrap().push(phone.as_str().to_string());
        match &self.push_failure {
            Some(failure) => Err(failure.to_error()),
            None => Ok(json!({
                "order_tracking_id": order_tracking_id,
                "status": "200",
                "message": "STK push sent"
            })),
        }
    }

    async fn transaction_status(
        &self,
        token: &str,
        order_tracking_id: &str,
    ) -> Result<StatusReport, PesapalError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.status_tokens.lock().unwrap().push(token.to_string());

        let next = self.statuses.lock().unwrap().pop_front();
        let answer = match next {
            Some(answer) => {
                *self.last_status.lock().unwrap() = Some(answer.clone());
                answer
            }
            None => self
                .last_status
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| Ok(status_payload("PENDING"))),
        };

        answer
            .map(|mut raw| {
                raw["order_tracking_id"] = json!(order_tracking_id);
                StatusReport::from_payload(raw)
            })
            .map_err(|failure| failure.to_error())
    }
}

/// A `GetTransactionStatus` body as PesaPal sends it.
pub fn status_payload(description: &str) -> Value {
    let reason = if description == "FAILED" {
        "Request cancelled by user"
    } else {
        ""
    };
    json!({
        "payment_method": "MpesaKE",
        "amount": 100.0,
        "payment_status_description": description,
        "description": reason,
        "currency": "KES",
        "status": "200"
    })
}

pub fn fast_poll() -> PollSettings {
    PollSettings {
        interval: Duration::from_millis(10),
        timeout: Duration::from_secs(2),
    }
}

pub fn test_settings() -> OrchestratorSettings {
    OrchestratorSettings {
        environment: Environment::Sandbox,
        callback_url: TEST_CALLBACK_URL.to_string(),
        order_id_prefix: "test".to_string(),
        branch: None,
        poll: fast_poll(),
    }
}

pub fn test_orchestrator(gateway: Arc<FakeGateway>) -> PaymentOrchestrator {
    PaymentOrchestrator::new(gateway, test_settings())
}

/// Full router over a fake gateway. Rate limiting is off because `oneshot`
/// requests carry no peer address.
pub fn test_app(gateway: Arc<FakeGateway>) -> Router {
    test_app_with_origins(gateway, &AllowedOrigins::any())
}

pub fn test_app_with_origins(gateway: Arc<FakeGateway>, origins: &AllowedOrigins) -> Router {
    let state = AppState::new(test_orchestrator(gateway));
    handlers::app(state, RateLimitConfig::disabled(), origins)
}

pub fn mpesa_request(phone: &str) -> PaymentRequest {
    PaymentRequest {
        amount: rust_decimal::Decimal::from(100),
        description: "Premium Package".to_string(),
        customer: Customer {
            email: "jane@example.com".to_string(),
            phone: phone.to_string(),
            name: "Jane Wanjiku".to_string(),
        },
        method: PaymentMethod::Mpesa,
    }
}

pub fn card_request() -> PaymentRequest {
    PaymentRequest {
        method: PaymentMethod::Card,
        ..mpesa_request("0712345678")
    }
}

pub async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// ============ Mock PesaPal API ============

pub const MOCK_CONSUMER_KEY: &str = "mock-key";
pub const MOCK_CONSUMER_SECRET: &str = "mock-secret";
pub const MOCK_TOKEN: &str = "mock-token";

/// Requests the mock API received, in order, as `"{METHOD} {path}"` plus body.
#[derive(Clone, Default)]
pub struct MockLog(Arc<Mutex<Vec<(String, Value)>>>);

impl MockLog {
    fn record(&self, route: &str, body: Value) {
        self.0.lock().unwrap().push((route.to_string(), body));
    }

    pub fn routes(&self) -> Vec<String> {
        self.0.lock().unwrap().iter().map(|(r, _)| r.clone()).collect()
    }

    pub fn body_of(&self, route: &str) -> Option<Value> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .find(|(r, _)| r == route)
            .map(|(_, b)| b.clone())
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        == Some(format!("Bearer {}", MOCK_TOKEN).as_str())
}

fn invalid_token() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "error": {
                "error_type": "api_error",
                "code": "invalid_api_credentials_provided",
                "message": "Invalid Access Token"
            },
            "status": "401"
        })),
    )
        .into_response()
}

async fn mock_token(State(log): State<MockLog>, Json(body): Json<Value>) -> Response {
    log.record("POST /api/Auth/RequestToken", body.clone());
    if body["consumer_key"] == MOCK_CONSUMER_KEY && body["consumer_secret"] == MOCK_CONSUMER_SECRET
    {
        Json(json!({
            "token": MOCK_TOKEN,
            "expiryDate": "2030-01-01T00:05:00Z",
            "error": null,
            "status": "200",
            "message": "Request processed successfully"
        }))
        .into_response()
    } else {
        // PesaPal answers bad credentials with 200 and an error object
        Json(json!({
            "token": null,
            "error": {
                "error_type": "api_error",
                "code": "invalid_consumer_key_or_secret_provided",
                "message": "Invalid consumer key or secret"
            },
            "status": "500"
        }))
        .into_response()
    }
}

async fn mock_register_ipn(
    State(log): State<MockLog>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    log.record("POST /api/URLSetup/RegisterIPN", body.clone());
    if !authorized(&headers) {
        return invalid_token();
    }
    Json(json!({
        "url": body["url"],
        "ipn_id": "mock-ipn-id",
        "ipn_notification_type_description": "POST",
        "ipn_status_description": "Active",
        "status": "200"
    }))
    .into_response()
}

async fn mock_submit_order(
    State(log): State<MockLog>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    log.record("POST /api/Transactions/SubmitOrderRequest", body.clone());
    if !authorized(&headers) {
        return invalid_token();
    }
    if body["description"] == "no tracking id" {
        return Json(json!({ "merchant_reference": body["id"], "status": "200" })).into_response();
    }
    Json(json!({
        "order_tracking_id": "mock-tracking-id",
        "merchant_reference": body["id"],
        "redirect_url": "https://cybqa.pesapal.com/pesapaliframe/PesapalIframe3/Index?OrderTrackingId=mock-tracking-id",
        "error": null,
        "status": "200"
    }))
    .into_response()
}

async fn mock_mobile_money(
    State(log): State<MockLog>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    log.record("POST /api/Transactions/InitiateMobileMoneyPayment", body.clone());
    if !authorized(&headers) {
        return invalid_token();
    }
    Json(json!({
        "orderTrackingId": body["orderTrackingId"],
        "status": "200",
        "message": "STK push sent"
    }))
    .into_response()
}

async fn mock_transaction_status(
    State(log): State<MockLog>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    log.record("GET /api/Transactions/GetTransactionStatus", json!(query));
    if !authorized(&headers) {
        return invalid_token();
    }
    match query.get("orderTrackingId").map(String::as_str) {
        Some("broken") => (StatusCode::BAD_GATEWAY, "upstream unavailable").into_response(),
        Some(id) => {
            let mut body = status_payload("COMPLETED");
            body["order_tracking_id"] = json!(id);
            Json(body).into_response()
        }
        None => StatusCode::BAD_REQUEST.into_response(),
    }
}

/// Starts the mock PesaPal API on an ephemeral port. Returns its base URL and
/// the request log.
pub async fn spawn_mock_pesapal() -> (String, MockLog) {
    let log = MockLog::default();
    let app = Router::new()
        .route("/api/Auth/RequestToken", post(mock_token))
        .route("/api/URLSetup/RegisterIPN", post(mock_register_ipn))
        .route(
            "/api/Transactions/SubmitOrderRequest",
            post(mock_submit_order),
        )
        .route(
            "/api/Transactions/InitiateMobileMoneyPayment",
            post(mock_mobile_money),
        )
        .route(
            "/api/Transactions/GetTransactionStatus",
            get(mock_transaction_status),
        )
        .with_state(log.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), log)
}

pub fn mock_client(base_url: &str, consumer_key: &str) -> PesapalClient {
    PesapalClient::new(&PesapalConfig {
        environment: Environment::Sandbox,
        base_url: Some(base_url.to_string()),
        consumer_key: Some(consumer_key.to_string()),
        consumer_secret: Some(MOCK_CONSUMER_SECRET.to_string()),
    })
    .unwrap()
}
