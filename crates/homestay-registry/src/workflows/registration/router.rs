use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::domain::{
    AmendmentPayload, Application, ApplicationDraft, ApplicationId, ServiceRequestId,
};
use super::error::WorkflowError;
use super::fees::FeeQuoteRequest;
use super::machine::TransitionPayload;
use super::policy::{Role, WorkflowAction};
use super::repository::{ApplicationRepository, PaymentError};
use super::service::{
    PaymentConfirmation, RegistrationService, SubmissionPayload, UpgradeQuoteRequest,
};
use super::stage::{derive_stage, stage_for_viewer, StageInputs, StageView};

/// Header carrying the caller's role; authentication happens upstream.
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// Router builder exposing the registration workflow over JSON.
pub fn registration_router<R>(service: Arc<RegistrationService<R>>) -> Router
where
    R: ApplicationRepository + 'static,
{
    Router::new()
        .route("/api/v1/homestay/applications", post(create_handler::<R>))
        .route(
            "/api/v1/homestay/applications/:application_id",
            get(get_handler::<R>)
                .put(update_handler::<R>)
                .delete(discard_handler::<R>),
        )
        .route(
            "/api/v1/homestay/applications/:application_id/submit",
            post(submit_handler::<R>),
        )
        .route(
            "/api/v1/homestay/applications/:application_id/transitions",
            post(transition_handler::<R>),
        )
        .route(
            "/api/v1/homestay/applications/:application_id/payments",
            post(payment_handler::<R>),
        )
        .route(
            "/api/v1/homestay/applications/:application_id/audit",
            get(audit_handler::<R>),
        )
        .route(
            "/api/v1/homestay/applications/:application_id/service-requests",
            post(create_service_request_handler::<R>),
        )
        .route(
            "/api/v1/homestay/service-requests/:request_id",
            get(get_service_request_handler::<R>).delete(discard_service_request_handler::<R>),
        )
        .route(
            "/api/v1/homestay/service-requests/:request_id/transitions",
            post(service_request_transition_handler::<R>),
        )
        .route(
            "/api/v1/homestay/service-requests/:request_id/audit",
            get(service_request_audit_handler::<R>),
        )
        .route("/api/v1/homestay/fees/quote", post(quote_handler::<R>))
        .route(
            "/api/v1/homestay/fees/upgrade-quote",
            post(upgrade_quote_handler::<R>),
        )
        .with_state(service)
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TransitionRequest {
    pub(crate) action: WorkflowAction,
    #[serde(flatten)]
    pub(crate) payload: TransitionPayload,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub(crate) enum PaymentCallback {
    Confirmed { payment_reference: String },
    Failed { reason: String },
}

#[derive(Debug, Serialize)]
struct ApplicationView {
    application: Application,
    stage: StageView,
    #[serde(skip_serializing_if = "Option::is_none")]
    actionable: Option<bool>,
}

fn error_kind(error: &WorkflowError) -> &'static str {
    match error {
        WorkflowError::InvalidTransition { .. } => "invalid_transition",
        WorkflowError::Forbidden { .. } => "forbidden",
        WorkflowError::PreconditionNotMet { .. } => "precondition_not_met",
        WorkflowError::ConflictingServiceRequest { .. } => "conflicting_service_request",
        WorkflowError::StaleState { .. } => "stale_state",
        WorkflowError::Validation(_) => "validation",
        WorkflowError::NotFound(_) => "not_found",
        WorkflowError::CorruptedRecord { .. } => "corrupted_record",
        WorkflowError::Repository(_) => "repository",
        WorkflowError::Document(_) => "document_store",
        WorkflowError::Payment(_) => "payment",
    }
}

pub(crate) fn error_response(error: WorkflowError) -> Response {
    let status = match &error {
        WorkflowError::InvalidTransition { .. }
        | WorkflowError::ConflictingServiceRequest { .. }
        | WorkflowError::StaleState { .. } => StatusCode::CONFLICT,
        WorkflowError::Forbidden { .. } => StatusCode::FORBIDDEN,
        WorkflowError::PreconditionNotMet { .. } | WorkflowError::Validation(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        WorkflowError::Payment(
            PaymentError::Declined { .. } | PaymentError::AmountMismatch { .. },
        ) => StatusCode::UNPROCESSABLE_ENTITY,
        WorkflowError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let mut payload = json!({
        "error": error.to_string(),
        "kind": error_kind(&error),
    });
    if let WorkflowError::PreconditionNotMet { missing } = &error {
        payload["missing"] = json!(missing);
    }
    (status, Json(payload)).into_response()
}

fn actor(headers: &HeaderMap) -> Result<Role, Response> {
    let raw = headers
        .get(ACTOR_ROLE_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty());

    match raw {
        Some(raw) => serde_json::from_value(json!(raw)).map_err(|_| {
            let payload = json!({ "error": format!("unknown actor role '{raw}'") });
            (StatusCode::BAD_REQUEST, Json(payload)).into_response()
        }),
        None => {
            let payload = json!({ "error": format!("missing {ACTOR_ROLE_HEADER} header") });
            Err((StatusCode::BAD_REQUEST, Json(payload)).into_response())
        }
    }
}

fn respond<T: Serialize>(status: StatusCode, result: Result<T, WorkflowError>) -> Response {
    match result {
        Ok(body) => (status, Json(body)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn create_handler<R>(
    State(service): State<Arc<RegistrationService<R>>>,
    headers: HeaderMap,
    Json(draft): Json<ApplicationDraft>,
) -> Response
where
    R: ApplicationRepository + 'static,
{
    let role = match actor(&headers) {
        Ok(role) => role,
        Err(response) => return response,
    };
    respond(StatusCode::CREATED, service.create_draft(role, draft))
}

pub(crate) async fn get_handler<R>(
    State(service): State<Arc<RegistrationService<R>>>,
    headers: HeaderMap,
    Path(application_id): Path<String>,
) -> Response
where
    R: ApplicationRepository + 'static,
{
    let application = match service.get(&ApplicationId(application_id)) {
        Ok(application) => application,
        Err(error) => return error_response(error),
    };

    let inputs = StageInputs::from(&application.workflow);
    let (stage, actionable) = if headers.contains_key(ACTOR_ROLE_HEADER) {
        match actor(&headers) {
            Ok(role) => {
                let viewer = stage_for_viewer(role, &inputs);
                (viewer.view, Some(viewer.actionable))
            }
            Err(response) => return response,
        }
    } else {
        (derive_stage(&inputs), None)
    };

    let view = ApplicationView {
        application,
        stage,
        actionable,
    };
    (StatusCode::OK, Json(view)).into_response()
}

pub(crate) async fn update_handler<R>(
    State(service): State<Arc<RegistrationService<R>>>,
    headers: HeaderMap,
    Path(application_id): Path<String>,
    Json(draft): Json<ApplicationDraft>,
) -> Response
where
    R: ApplicationRepository + 'static,
{
    let role = match actor(&headers) {
        Ok(role) => role,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        service.update_draft(&ApplicationId(application_id), role, draft),
    )
}

pub(crate) async fn discard_handler<R>(
    State(service): State<Arc<RegistrationService<R>>>,
    headers: HeaderMap,
    Path(application_id): Path<String>,
) -> Response
where
    R: ApplicationRepository + 'static,
{
    let role = match actor(&headers) {
        Ok(role) => role,
        Err(response) => return response,
    };
    match service.discard_draft(&ApplicationId(application_id), role) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn submit_handler<R>(
    State(service): State<Arc<RegistrationService<R>>>,
    headers: HeaderMap,
    Path(application_id): Path<String>,
    Json(submission): Json<SubmissionPayload>,
) -> Response
where
    R: ApplicationRepository + 'static,
{
    let role = match actor(&headers) {
        Ok(role) => role,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        service.submit_application(&ApplicationId(application_id), role, submission),
    )
}

pub(crate) async fn transition_handler<R>(
    State(service): State<Arc<RegistrationService<R>>>,
    headers: HeaderMap,
    Path(application_id): Path<String>,
    Json(request): Json<TransitionRequest>,
) -> Response
where
    R: ApplicationRepository + 'static,
{
    let role = match actor(&headers) {
        Ok(role) => role,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        service.transition(
            &ApplicationId(application_id),
            role,
            request.action,
            request.payload,
        ),
    )
}

pub(crate) async fn payment_handler<R>(
    State(service): State<Arc<RegistrationService<R>>>,
    Path(application_id): Path<String>,
    Json(callback): Json<PaymentCallback>,
) -> Response
where
    R: ApplicationRepository + 'static,
{
    let id = ApplicationId(application_id);
    let result = match callback {
        PaymentCallback::Confirmed { payment_reference } => {
            service.confirm_payment(&id, PaymentConfirmation { payment_reference })
        }
        PaymentCallback::Failed { reason } => service.payment_failed(&id, &reason),
    };
    respond(StatusCode::OK, result)
}

pub(crate) async fn audit_handler<R>(
    State(service): State<Arc<RegistrationService<R>>>,
    Path(application_id): Path<String>,
) -> Response
where
    R: ApplicationRepository + 'static,
{
    let id = ApplicationId(application_id);
    let result = service
        .get(&id)
        .and_then(|_| service.audit_trail(&id.0));
    respond(StatusCode::OK, result)
}

pub(crate) async fn service_request_audit_handler<R>(
    State(service): State<Arc<RegistrationService<R>>>,
    Path(request_id): Path<String>,
) -> Response
where
    R: ApplicationRepository + 'static,
{
    let id = ServiceRequestId(request_id);
    let result = service
        .get_service_request(&id)
        .and_then(|_| service.audit_trail(&id.0));
    respond(StatusCode::OK, result)
}

pub(crate) async fn create_service_request_handler<R>(
    State(service): State<Arc<RegistrationService<R>>>,
    headers: HeaderMap,
    Path(application_id): Path<String>,
    Json(payload): Json<AmendmentPayload>,
) -> Response
where
    R: ApplicationRepository + 'static,
{
    let role = match actor(&headers) {
        Ok(role) => role,
        Err(response) => return response,
    };
    respond(
        StatusCode::CREATED,
        service.create_service_request(&ApplicationId(application_id), role, payload),
    )
}

pub(crate) async fn get_service_request_handler<R>(
    State(service): State<Arc<RegistrationService<R>>>,
    Path(request_id): Path<String>,
) -> Response
where
    R: ApplicationRepository + 'static,
{
    respond(
        StatusCode::OK,
        service.get_service_request(&ServiceRequestId(request_id)),
    )
}

pub(crate) async fn discard_service_request_handler<R>(
    State(service): State<Arc<RegistrationService<R>>>,
    headers: HeaderMap,
    Path(request_id): Path<String>,
) -> Response
where
    R: ApplicationRepository + 'static,
{
    let role = match actor(&headers) {
        Ok(role) => role,
        Err(response) => return response,
    };
    match service.discard_service_request(&ServiceRequestId(request_id), role) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn service_request_transition_handler<R>(
    State(service): State<Arc<RegistrationService<R>>>,
    headers: HeaderMap,
    Path(request_id): Path<String>,
    Json(request): Json<TransitionRequest>,
) -> Response
where
    R: ApplicationRepository + 'static,
{
    let role = match actor(&headers) {
        Ok(role) => role,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        service.transition_service_request(
            &ServiceRequestId(request_id),
            role,
            request.action,
            request.payload,
        ),
    )
}

pub(crate) async fn quote_handler<R>(
    State(service): State<Arc<RegistrationService<R>>>,
    Json(request): Json<FeeQuoteRequest>,
) -> Response
where
    R: ApplicationRepository + 'static,
{
    respond(StatusCode::OK, service.quote_fee(&request))
}

pub(crate) async fn upgrade_quote_handler<R>(
    State(service): State<Arc<RegistrationService<R>>>,
    Json(request): Json<UpgradeQuoteRequest>,
) -> Response
where
    R: ApplicationRepository + 'static,
{
    respond(StatusCode::OK, service.quote_upgrade(&request))
}
