/*
* Ledger API Routes
* -----------------
* Every route under the API prefix (default /api) requires a bearer token.
*
* POST  /api/drivers                             - register a driver (eager zero record)
* PATCH /api/drivers/{driverId}/online-time       - add hours, body { "hours": n } or { "onlineTime": n }
* PATCH /api/drivers/{driverId}/online-time/reset - reset hours to zero
* GET   /api/drivers/{driverId}/online-time       - current online time
* GET   /api/drivers/{driverId}/payment           - payment quote
* GET   /api/drivers/payment                      - payment quote of the token subject
* GET   /api/drivers/payments                     - payroll summary, admin only
* GET   /health                                   - liveness, no auth
*/

use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{DefaultBodyLimit, Path, Request, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{get, patch, post},
    Extension, Json, Router,
};
use governor::DefaultDirectRateLimiter;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{debug, warn};

use crate::api::error::ApiError;
use crate::api::middleware::auth::{auth_middleware, Claims, JwtKeys};
use crate::api::middleware::rate_limit::{api_limiter, rate_limit_middleware};
use crate::billing::{PaymentCalculator, PaymentQuote};
use crate::config::Settings;
use crate::errors::RetryPolicy;
use crate::ledger::{
    AccumulationService, DriverId, DriverTimeRecord, InMemoryLedgerStore, LedgerStore,
    PayrollSummary, QueryFacade, SnapshotLedgerStore,
};

#[derive(Clone)]
pub struct AppState {
    pub accumulation: AccumulationService,
    pub queries: QueryFacade,
    pub keys: Arc<JwtKeys>,
    pub limiter: Arc<DefaultDirectRateLimiter>,
    pub api_prefix: String,
    pub body_limit_bytes: usize,
}

impl AppState {
    /// Opens the configured store: a snapshot file when `ledger.snapshot_path`
    /// is set, memory otherwise.
    pub async fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let store: Arc<dyn LedgerStore> = match &settings.ledger.snapshot_path {
            Some(path) => Arc::new(
                SnapshotLedgerStore::open(path)
                    .await
                    .with_context(|| format!("opening ledger snapshot {}", path.display()))?,
            ),
            None => Arc::new(InMemoryLedgerStore::new()),
        };
        Self::with_store(settings, store)
    }

    pub fn with_store(settings: &Settings, store: Arc<dyn LedgerStore>) -> anyhow::Result<Self> {
        let calculator = PaymentCalculator::new(settings.payment.rate_per_hour)
            .context("invalid payment rate")?;
        let retry = RetryPolicy::new(settings.ledger.max_conflict_retries);

        Ok(Self {
            accumulation: AccumulationService::new(store.clone(), retry),
            queries: QueryFacade::new(store, calculator),
            keys: Arc::new(JwtKeys::from_secret(&settings.auth.jwt_secret)),
            limiter: api_limiter(settings.rate_limits.api_requests_per_minute),
            api_prefix: settings.server.api_prefix.clone(),
            body_limit_bytes: settings.server.body_limit_bytes,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterDriverRequest {
    pub driver_id: String,
}

#[derive(Debug, Deserialize)]
pub struct AddOnlineTimeRequest {
    #[serde(alias = "onlineTime")]
    pub hours: f64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlineTimeResponse {
    pub driver_id: DriverId,
    pub online_time: f64,
}

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let drivers = Router::new()
        .route("/drivers", post(register_driver))
        .route("/drivers/payment", get(my_payment))
        .route("/drivers/payments", get(payroll))
        .route(
            "/drivers/{driver_id}/online-time",
            get(get_online_time).patch(add_online_time),
        )
        .route("/drivers/{driver_id}/online-time/reset", patch(reset_online_time))
        .route("/drivers/{driver_id}/payment", get(get_payment))
        .route_layer(from_fn_with_state(app_state.keys.clone(), auth_middleware));

    let prefix = app_state.api_prefix.trim_end_matches('/');
    let api = if prefix.is_empty() {
        drivers
    } else {
        Router::new().nest(prefix, drivers)
    };

    Router::new()
        .route("/health", get(health))
        .merge(api)
        .fallback(fallback_handler)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(from_fn_with_state(app_state.limiter.clone(), rate_limit_middleware))
                .layer(DefaultBodyLimit::disable())
                .layer(RequestBodyLimitLayer::new(app_state.body_limit_bytes)),
        )
        .with_state(app_state)
}

fn parse_driver_id(raw: &str) -> Result<DriverId, ApiError> {
    Ok(DriverId::parse(raw)?)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

#[axum::debug_handler]
async fn register_driver(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterDriverRequest>,
) -> Result<(StatusCode, Json<DriverTimeRecord>), ApiError> {
    let driver_id = parse_driver_id(&request.driver_id)?;
    let (record, created) = state.accumulation.register_driver(&driver_id).await?;
    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(record)))
}

#[axum::debug_handler]
async fn add_online_time(
    State(state): State<Arc<AppState>>,
    Path(driver_id): Path<String>,
    Json(request): Json<AddOnlineTimeRequest>,
) -> Result<Json<DriverTimeRecord>, ApiError> {
    let driver_id = parse_driver_id(&driver_id)?;
    let record = state.accumulation.add_hours(&driver_id, request.hours).await?;
    Ok(Json(record))
}

#[axum::debug_handler]
async fn reset_online_time(
    State(state): State<Arc<AppState>>,
    Path(driver_id): Path<String>,
) -> Result<Json<DriverTimeRecord>, ApiError> {
    let driver_id = parse_driver_id(&driver_id)?;
    let record = state.accumulation.reset_hours(&driver_id).await?;
    Ok(Json(record))
}

async fn get_online_time(
    State(state): State<Arc<AppState>>,
    Path(driver_id): Path<String>,
) -> Result<Json<OnlineTimeResponse>, ApiError> {
    let driver_id = parse_driver_id(&driver_id)?;
    let online_time = state.queries.get_current_time(&driver_id).await?;
    Ok(Json(OnlineTimeResponse {
        driver_id,
        online_time,
    }))
}

async fn get_payment(
    State(state): State<Arc<AppState>>,
    Path(driver_id): Path<String>,
) -> Result<Json<PaymentQuote>, ApiError> {
    let driver_id = parse_driver_id(&driver_id)?;
    Ok(Json(state.queries.get_payment_quote(&driver_id).await?))
}

async fn my_payment(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<PaymentQuote>, ApiError> {
    let driver_id = parse_driver_id(&claims.sub)?;
    Ok(Json(state.queries.get_payment_quote(&driver_id).await?))
}

async fn payroll(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<PayrollSummary>, ApiError> {
    if !claims.is_admin() {
        warn!(sub = %claims.sub, role = %claims.role, "Payroll requested without admin role");
        return Err(ApiError::Forbidden(claims.role));
    }
    Ok(Json(state.queries.payroll_summary().await?))
}

async fn fallback_handler(req: Request) -> impl IntoResponse {
    debug!(method = %req.method(), path = %req.uri().path(), "No route matched");
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "not_found",
            "message": format!("No route for {} {}", req.method(), req.uri().path()),
        })),
    )
}
