//! HTTP Surface
//!
//! Thin axum layer over the orchestrator and domain services. The
//! middleware stack carries request IDs, rate limiting, timing and
//! security headers; handlers map the engine error taxonomy to status
//! codes. Every error body includes the request id.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Bytes,
    extract::{ConnectInfo, Path, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::domain::gamification::{GameEvent, GamificationService};
use crate::domain::loans::{LoanService, RepaymentService};
use crate::domain::vouching::VouchingService;
use crate::domain::{Language, VouchLevel};
use crate::error::EngineError;
use crate::orchestrator::Orchestrator;
use crate::reliability::rate_limiter::principal_key;
use crate::reliability::{RateDecision, RateLimiter, RequestId};
use crate::services::{Services, WebhookVerifier};

/// Paths exempt from rate limiting.
const OPEN_PATHS: [&str; 2] = ["/", "/health"];

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub loans: Arc<LoanService>,
    pub repayments: Arc<RepaymentService>,
    pub vouching: Arc<VouchingService>,
    pub gamification: Arc<GamificationService>,
    pub services: Services,
    pub webhook_verifier: WebhookVerifier,
    pub rate_limiter: Arc<RateLimiter>,
}

#[derive(Debug)]
struct ApiError {
    error: EngineError,
    request_id: String,
}

impl ApiError {
    fn new(error: EngineError, request_id: &RequestId) -> Self {
        Self {
            error,
            request_id: request_id.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.error {
            EngineError::Validation(_) | EngineError::Conflict(_) => StatusCode::BAD_REQUEST,
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            EngineError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            EngineError::DependencyFailure { .. } | EngineError::CircuitOpen { .. } => {
                StatusCode::BAD_GATEWAY
            }
            EngineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(request_id = %self.request_id, "unhandled error: {:#}", self.error);
        }

        let mut response = (
            status,
            Json(json!({
                "error": self.error.to_string(),
                "request_id": self.request_id,
            })),
        )
            .into_response();
        if let EngineError::RateLimited { retry_after } = self.error {
            if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
                response.headers_mut().insert("Retry-After", value);
            }
        }
        response
    }
}

/// Caller identity. Authentication itself lives outside the core; the
/// surface only requires a resolvable user id.
fn authenticated_user(headers: &HeaderMap, request_id: &RequestId) -> Result<Uuid, ApiError> {
    headers
        .get("X-User-ID")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v).ok())
        .ok_or_else(|| {
            ApiError::new(
                EngineError::Unauthorized("missing or invalid user identity".into()),
                request_id,
            )
        })
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/nova/chat", post(nova_chat))
        .route("/loans", post(create_loan))
        .route("/loans/{loan_id}/vote", post(vote_on_loan))
        .route("/vouches", post(create_vouch))
        .route("/payments/webhook", post(payments_webhook))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_tracing))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server(state: AppState, config: &Config) -> anyhow::Result<()> {
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request());

    let app = build_router(state).layer(cors);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("🚀 Bharosa Engine listening on http://{}", config.bind_addr);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}

// ── Middleware ────────────────────────────────────────────────────────────

/// Request-ID propagation plus structured request/response logging and the
/// timing header.
async fn request_tracing(mut request: Request, next: Next) -> Response {
    let started = Instant::now();
    let request_id = RequestId::from_header(
        request
            .headers()
            .get("X-Request-ID")
            .and_then(|v| v.to_str().ok()),
    );
    request.extensions_mut().insert(request_id.clone());

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    info!(request_id = %request_id, %method, %path, "request started");

    let mut response = next.run(request).await;

    let duration_ms = started.elapsed().as_millis() as u64;
    info!(
        request_id = %request_id,
        %method,
        %path,
        status = response.status().as_u16(),
        duration_ms,
        "request completed"
    );

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(request_id.as_str()) {
        headers.insert("X-Request-ID", value);
    }
    if let Ok(value) = HeaderValue::from_str(&format!("{duration_ms}ms")) {
        headers.insert("X-Response-Time", value);
    }
    response
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert("X-Content-Type-Options", HeaderValue::from_static("nosniff"));
    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
    headers.insert("X-XSS-Protection", HeaderValue::from_static("1; mode=block"));
    headers.insert(
        "Referrer-Policy",
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    headers.insert(
        "Content-Security-Policy",
        HeaderValue::from_static("default-src 'self'"),
    );
    response
}

/// Per-principal sliding-window limiter: credential when present, client
/// address otherwise.
async fn rate_limit(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path();
    if OPEN_PATHS.contains(&path) {
        return next.run(request).await;
    }

    let authorization = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok());
    let key = principal_key(authorization, &addr.ip().to_string());
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .cloned()
        .unwrap_or_else(RequestId::generate);

    match state.rate_limiter.check(&key) {
        RateDecision::Limited { retry_after } => {
            warn!(request_id = %request_id, key = %key, "rate limit exceeded");
            ApiError::new(EngineError::RateLimited { retry_after }, &request_id).into_response()
        }
        RateDecision::Allowed { remaining } => {
            let limit = state.rate_limiter.limit();
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            if let Ok(value) = HeaderValue::from_str(&limit.to_string()) {
                headers.insert("X-RateLimit-Limit", value);
            }
            if let Ok(value) = HeaderValue::from_str(&remaining.to_string()) {
                headers.insert("X-RateLimit-Remaining", value);
            }
            response
        }
    }
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    include_voice: bool,
}

async fn nova_chat(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Result<Json<Value>, ApiError> {
    let user_id = authenticated_user(&headers, &request_id)?;
    let language = Language::parse(request.language.as_deref().unwrap_or("en"));

    let outcome = state
        .orchestrator
        .process_message(user_id, &request.message, language, request_id.clone())
        .await;

    let mut voice_audio = None;
    if request.include_voice {
        if let Some(ref response) = outcome.response {
            match state.services.tts.data_url(response, language).await {
                Ok(url) => voice_audio = Some(url),
                Err(err) => warn!(request_id = %request_id, "voice generation failed: {err}"),
            }
        }
    }

    let mut body = serde_json::to_value(&outcome)
        .map_err(|e| ApiError::new(EngineError::Internal(e.into()), &request_id))?;
    body["voice_audio"] = voice_audio.map(Value::from).unwrap_or(Value::Null);
    Ok(Json(body))
}

#[derive(Debug, Deserialize)]
struct LoanCreateRequest {
    circle_id: Uuid,
    amount: f64,
    purpose: String,
    tenure_days: u32,
}

async fn create_loan(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    headers: HeaderMap,
    Json(request): Json<LoanCreateRequest>,
) -> Result<Json<Value>, ApiError> {
    let user_id = authenticated_user(&headers, &request_id)?;

    let outcome = state
        .loans
        .request_loan(
            user_id,
            request.circle_id,
            request.amount,
            &request.purpose,
            request.tenure_days,
            request_id.clone(),
        )
        .await
        .map_err(|e| ApiError::new(e, &request_id))?;

    let decision = &outcome.ai_analysis;
    if let Some(ref loan) = outcome.loan {
        Ok(Json(json!({
            "success": true,
            "loan": loan,
            "ai_analysis": decision,
            "reasoning_traces": &decision.reasoning_traces,
            "blockchain_tx": &loan.blockchain_tx_hash,
        })))
    } else {
        Ok(Json(json!({
            "success": false,
            "approved": false,
            "reason": &decision.reason,
            "advice": &decision.advice,
            "suggested_action": &decision.suggested_action,
            "reasoning_traces": &decision.reasoning_traces,
        })))
    }
}

#[derive(Debug, Deserialize)]
struct VoteRequest {
    vote: bool,
    #[serde(default)]
    tokens_spent: Option<u32>,
}

async fn vote_on_loan(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(loan_id): Path<Uuid>,
    headers: HeaderMap,
    Json(request): Json<VoteRequest>,
) -> Result<Json<Value>, ApiError> {
    let user_id = authenticated_user(&headers, &request_id)?;
    let tally = state
        .loans
        .vote_on_loan(
            loan_id,
            user_id,
            request.vote,
            request.tokens_spent.unwrap_or(1),
        )
        .await
        .map_err(|e| ApiError::new(e, &request_id))?;

    Ok(Json(json!({
        "success": true,
        "message": format!("Vote recorded. Approval: {:.2}%", tally.approval_percentage),
    })))
}

#[derive(Debug, Deserialize)]
struct VouchRequest {
    vouchee_id: Uuid,
    circle_id: Uuid,
    vouch_level: String,
    #[serde(default)]
    saathi_amount: Option<f64>,
}

async fn create_vouch(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    headers: HeaderMap,
    Json(request): Json<VouchRequest>,
) -> Result<Json<Value>, ApiError> {
    let user_id = authenticated_user(&headers, &request_id)?;
    let level = VouchLevel::parse(&request.vouch_level).ok_or_else(|| {
        ApiError::new(
            EngineError::Validation(format!("Invalid vouch level: {}", request.vouch_level)),
            &request_id,
        )
    })?;

    let assessment = state
        .orchestrator
        .process_vouch_request(
            user_id,
            request.vouchee_id,
            request.circle_id,
            level.as_str(),
            request_id.clone(),
        )
        .await;
    if !assessment.recommended {
        return Err(ApiError::new(
            EngineError::Validation(
                assessment
                    .reason
                    .unwrap_or_else(|| "Vouch not recommended".into()),
            ),
            &request_id,
        ));
    }

    let stake = request.saathi_amount.unwrap_or_else(|| level.min_stake());
    let vouch = state
        .vouching
        .create_vouch(user_id, request.vouchee_id, request.circle_id, level, stake)
        .await
        .map_err(|e| ApiError::new(e, &request_id))?;

    if let Err(err) = state.gamification.process_event(user_id, GameEvent::Vouch).await {
        warn!(request_id = %request_id, "gamification event failed: {err}");
    }

    Ok(Json(json!({
        "success": true,
        "vouch": vouch,
        "vouchee_trust_score": assessment.vouchee_trust_score,
        "vouch_quality_grade": assessment.vouch_quality_grade,
        "reasoning_traces": assessment.reasoning_traces,
    })))
}

/// Webhook ingress: verify the signature over the raw body, then hand the
/// event to the background task manager so the gateway gets a fast ack.
async fn payments_webhook(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let signature = headers
        .get("X-Dodo-Signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            ApiError::new(
                EngineError::Unauthorized("missing webhook signature".into()),
                &request_id,
            )
        })?;
    if !state.webhook_verifier.verify(&body, signature) {
        warn!(request_id = %request_id, "webhook signature verification failed");
        return Err(ApiError::new(
            EngineError::Unauthorized("invalid webhook signature".into()),
            &request_id,
        ));
    }

    let payload: Value = serde_json::from_slice(&body)
        .map_err(|_| ApiError::new(EngineError::Validation("malformed webhook body".into()), &request_id))?;
    let event_type = payload["type"].as_str().unwrap_or_default().to_string();
    let data = payload["data"].clone();
    info!(request_id = %request_id, event_type = %event_type, payment_id = %data["id"], "webhook received");

    let repayments = state.repayments.clone();
    let gamification = state.gamification.clone();
    match event_type.as_str() {
        "payment.completed" => {
            state.services.tasks.spawn("webhook.payment_completed", async move {
                let loan_id = parse_uuid(&data["metadata"]["loan_id"])?;
                let payment_id = data["id"].as_str().unwrap_or_default().to_string();
                // Gateway amounts arrive in paise.
                let amount = data["amount"].as_f64().unwrap_or(0.0) / 100.0;
                let outcome = repayments.process_repayment(loan_id, amount, &payment_id).await?;

                if !outcome.duplicate {
                    if let Ok(user_id) = parse_uuid(&data["metadata"]["user_id"]) {
                        if let Err(err) =
                            gamification.process_event(user_id, GameEvent::Repayment).await
                        {
                            warn!("gamification event failed: {err}");
                        }
                    }
                }
                Ok(())
            });
        }
        "payment.failed" => {
            state.services.tasks.spawn("webhook.payment_failed", async move {
                let loan_id = parse_uuid(&data["metadata"]["loan_id"])?;
                let payment_id = data["id"].as_str().unwrap_or_default().to_string();
                let amount = data["amount"].as_f64().unwrap_or(0.0) / 100.0;
                repayments.record_failed_payment(loan_id, amount, &payment_id).await
            });
        }
        other => warn!(request_id = %request_id, "ignoring webhook event type {other}"),
    }

    Ok(Json(json!({ "received": true, "request_id": request_id.as_str() })))
}

fn parse_uuid(value: &Value) -> Result<Uuid, EngineError> {
    value
        .as_str()
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| EngineError::Validation("missing or invalid id in webhook metadata".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let request_id = RequestId::generate();
        let cases = [
            (EngineError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (EngineError::NotFound("loan"), StatusCode::NOT_FOUND),
            (
                EngineError::Unauthorized("bad sig".into()),
                StatusCode::UNAUTHORIZED,
            ),
            (
                EngineError::RateLimited { retry_after: 60 },
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (
                EngineError::CircuitOpen {
                    name: "payments",
                    retry_after: 10,
                },
                StatusCode::BAD_GATEWAY,
            ),
            (
                EngineError::DependencyFailure {
                    name: "llm",
                    reason: "down".into(),
                },
                StatusCode::BAD_GATEWAY,
            ),
        ];
        for (error, expected) in cases {
            let response = ApiError::new(error, &request_id).into_response();
            assert_eq!(response.status(), expected);
        }
    }

    #[test]
    fn test_rate_limited_sets_retry_after() {
        let response = ApiError::new(
            EngineError::RateLimited { retry_after: 60 },
            &RequestId::generate(),
        )
        .into_response();
        assert_eq!(response.headers()["Retry-After"], "60");
    }

    #[test]
    fn test_authenticated_user_requires_valid_uuid() {
        let request_id = RequestId::generate();
        let mut headers = HeaderMap::new();
        assert!(authenticated_user(&headers, &request_id).is_err());

        headers.insert("X-User-ID", HeaderValue::from_static("not-a-uuid"));
        assert!(authenticated_user(&headers, &request_id).is_err());

        let id = Uuid::new_v4();
        headers.insert(
            "X-User-ID",
            HeaderValue::from_str(&id.to_string()).unwrap(),
        );
        assert_eq!(authenticated_user(&headers, &request_id).unwrap(), id);
    }
}
