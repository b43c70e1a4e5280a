use crate::infra::AppState;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use homestay_registry::workflows::registration::service::{FailedSideEffect, RetryReport};
use homestay_registry::workflows::registration::{
    registration_router, ApplicationRepository, InMemoryPaymentGateway, RegistrationService,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

/// Gateway notice that a payment reference has been settled for an amount.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub(crate) struct Settlement {
    pub(crate) payment_reference: String,
    pub(crate) amount: u64,
}

pub(crate) fn with_registration_routes<R>(
    service: Arc<RegistrationService<R>>,
    payments: Arc<InMemoryPaymentGateway>,
) -> Router
where
    R: ApplicationRepository + 'static,
{
    let settlements = Router::new()
        .route(
            "/api/v1/homestay/payments/settlements",
            post(settlement_endpoint),
        )
        .with_state(payments);

    let operations = Router::new()
        .route(
            "/api/v1/homestay/side-effects/failed",
            get(failed_side_effects_endpoint::<R>),
        )
        .route(
            "/api/v1/homestay/side-effects/retry",
            post(retry_side_effects_endpoint::<R>),
        )
        .with_state(service.clone());

    registration_router(service)
        .merge(operations)
        .merge(settlements)
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

pub(crate) async fn failed_side_effects_endpoint<R>(
    State(service): State<Arc<RegistrationService<R>>>,
) -> Json<Vec<FailedSideEffect>>
where
    R: ApplicationRepository + 'static,
{
    Json(service.failed_side_effects())
}

pub(crate) async fn retry_side_effects_endpoint<R>(
    State(service): State<Arc<RegistrationService<R>>>,
) -> Json<RetryReport>
where
    R: ApplicationRepository + 'static,
{
    Json(service.retry_side_effects())
}

pub(crate) async fn settlement_endpoint(
    State(payments): State<Arc<InMemoryPaymentGateway>>,
    Json(settlement): Json<Settlement>,
) -> impl IntoResponse {
    let reference = settlement.payment_reference.trim();
    if reference.is_empty() {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": "payment_reference is required" })),
        );
    }

    payments.settle(reference, settlement.amount);
    info!(
        payment_reference = %reference,
        amount = settlement.amount,
        "payment settlement recorded"
    );
    (
        StatusCode::CREATED,
        Json(json!({ "payment_reference": reference, "amount": settlement.amount })),
    )
}
