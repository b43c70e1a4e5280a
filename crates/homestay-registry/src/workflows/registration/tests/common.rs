use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use axum::response::Response;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde_json::Value;

use crate::workflows::registration::domain::{
    Application, ApplicationDraft, ApplicationId, ApplicationKind, ApplicationStatus, Gender,
    InspectionRecommendation, InspectionReport, LocationType, OwnerProfile, PropertyDetails,
    RoomType, RoomTypeConfig, ServiceRequest, ServiceRequestId,
};
use crate::workflows::registration::machine::TransitionPayload;
use crate::workflows::registration::memory::{
    InMemoryDocumentStore, InMemoryInspectionLog, InMemoryPaymentGateway, InMemoryRepository,
    RecordingNotifier,
};
use crate::workflows::registration::policy::{Role, WorkflowAction};
use crate::workflows::registration::repository::{
    ApplicationRepository, AuditEntry, Clock, Notice, NotificationError, NotificationService,
    RepositoryError,
};
use crate::workflows::registration::service::{
    Collaborators, PaymentConfirmation, RegistrationService, SubmissionPayload,
};
use crate::workflows::registration::FeeEngine;

/// Clock that advances one minute on every read.
pub(super) struct SteppingClock {
    minutes: AtomicI64,
}

impl SteppingClock {
    pub(super) fn new() -> Self {
        Self {
            minutes: AtomicI64::new(0),
        }
    }
}

pub(super) fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 4, 1, 9, 0, 0)
        .single()
        .expect("valid base time")
}

impl Clock for SteppingClock {
    fn now(&self) -> DateTime<Utc> {
        let minutes = self.minutes.fetch_add(1, Ordering::SeqCst);
        base_time() + Duration::minutes(minutes)
    }
}

/// Notifier whose transport can be switched off to exercise the retry ledger.
#[derive(Default)]
pub(super) struct FlakyNotifier {
    pub(super) offline: AtomicBool,
    pub(super) inner: RecordingNotifier,
}

impl NotificationService for FlakyNotifier {
    fn notify(&self, notice: Notice) -> Result<(), NotificationError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(NotificationError::Transport("smtp relay offline".to_string()));
        }
        self.inner.notify(notice)
    }
}

pub(super) struct Harness {
    pub(super) service: RegistrationService<InMemoryRepository>,
    pub(super) repository: Arc<InMemoryRepository>,
    pub(super) documents: Arc<InMemoryDocumentStore>,
    pub(super) payments: Arc<InMemoryPaymentGateway>,
    pub(super) notifier: Arc<FlakyNotifier>,
    pub(super) inspections: Arc<InMemoryInspectionLog>,
}

pub(super) fn harness_with_documents(documents: InMemoryDocumentStore) -> Harness {
    let repository = Arc::new(InMemoryRepository::default());
    let documents = Arc::new(documents);
    let payments = Arc::new(InMemoryPaymentGateway::default());
    let notifier = Arc::new(FlakyNotifier::default());
    let inspections = Arc::new(InMemoryInspectionLog::default());
    let collaborators = Collaborators::new(
        documents.clone(),
        payments.clone(),
        notifier.clone(),
        inspections.clone(),
    )
    .with_clock(Arc::new(SteppingClock::new()));

    Harness {
        service: RegistrationService::new(repository.clone(), collaborators, FeeEngine::default()),
        repository,
        documents,
        payments,
        notifier,
        inspections,
    }
}

pub(super) fn harness() -> Harness {
    harness_with_documents(InMemoryDocumentStore::accepting_all())
}

pub(super) fn property() -> PropertyDetails {
    PropertyDetails {
        name: "Deodar Retreat".to_string(),
        address: "Ward 4, Killar".to_string(),
        district: "Chamba".to_string(),
        location_type: LocationType::GramPanchayat,
    }
}

pub(super) fn owner(gender: Gender, sub_division: Option<&str>) -> OwnerProfile {
    OwnerProfile {
        name: "Kamla Devi".to_string(),
        mobile: "9816000001".to_string(),
        email: Some("kamla@example.org".to_string()),
        gender,
        sub_division: sub_division.map(str::to_string),
    }
}

pub(super) fn rooms(count: u8, rate: u32) -> Vec<RoomTypeConfig> {
    vec![RoomTypeConfig {
        room_type: RoomType::Double,
        count,
        beds_per_room: 2,
        nightly_rate: rate,
    }]
}

pub(super) fn draft(kind: ApplicationKind) -> ApplicationDraft {
    ApplicationDraft {
        kind,
        property: property(),
        owner: owner(Gender::Female, Some("Pangi")),
        rooms: rooms(3, 2_500),
        validity_years: 3,
        declared_category: None,
        existing_certificate_number: None,
    }
}

pub(super) fn declaration() -> SubmissionPayload {
    SubmissionPayload {
        declaration_accepted: true,
    }
}

pub(super) fn inspection_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 4, 10).expect("valid date")
}

pub(super) fn report() -> InspectionReport {
    InspectionReport {
        inspected_on: inspection_date(),
        findings: "Rooms, beds and tariff card match the declaration".to_string(),
        recommendation: InspectionRecommendation::Approve,
    }
}

pub(super) fn schedule_payload() -> TransitionPayload {
    TransitionPayload {
        inspection_date: Some(inspection_date()),
        ..TransitionPayload::default()
    }
}

pub(super) fn report_payload() -> TransitionPayload {
    TransitionPayload {
        report: Some(report()),
        ..TransitionPayload::default()
    }
}

pub(super) fn submitted(h: &Harness, draft: ApplicationDraft) -> Application {
    let created = h
        .service
        .create_draft(Role::PropertyOwner, draft)
        .expect("draft created");
    h.service
        .submit_application(&created.id, Role::PropertyOwner, declaration())
        .expect("submitted")
}

pub(super) fn act(
    h: &Harness,
    id: &ApplicationId,
    role: Role,
    action: WorkflowAction,
    payload: TransitionPayload,
) -> Application {
    h.service
        .transition(id, role, action, payload)
        .unwrap_or_else(|err| panic!("{action} by {role} failed: {err}"))
}

/// Walk a new registration through review, inspection and payment.
pub(super) fn approved(h: &Harness) -> Application {
    let application = submitted(h, draft(ApplicationKind::NewRegistration));
    let id = application.id.clone();
    act(
        h,
        &id,
        Role::DealingAssistant,
        WorkflowAction::ForwardToDtdo,
        TransitionPayload::default(),
    );
    act(h, &id, Role::DistrictOfficer, WorkflowAction::ScheduleInspection, schedule_payload());
    act(h, &id, Role::DealingAssistant, WorkflowAction::SubmitReport, report_payload());
    let pending = act(
        h,
        &id,
        Role::DistrictOfficer,
        WorkflowAction::Approve,
        TransitionPayload::default(),
    );
    assert_eq!(pending.status(), ApplicationStatus::PaymentPending);

    let reference = format!("PAY-{}", id.0);
    h.payments.settle(
        reference.clone(),
        pending.total_fee.as_ref().expect("fee snapshot").total_fee,
    );
    h.service
        .confirm_payment(
            &id,
            PaymentConfirmation {
                payment_reference: reference,
            },
        )
        .expect("payment confirmed")
}

pub(super) fn act_on_request(
    h: &Harness,
    id: &ServiceRequestId,
    role: Role,
    action: WorkflowAction,
    payload: TransitionPayload,
) -> ServiceRequest {
    h.service
        .transition_service_request(id, role, action, payload)
        .unwrap_or_else(|err| panic!("{action} by {role} failed: {err}"))
}

pub(super) struct UnavailableRepository;

fn offline<T>() -> Result<T, RepositoryError> {
    Err(RepositoryError::Unavailable("database offline".to_string()))
}

impl ApplicationRepository for UnavailableRepository {
    fn insert(&self, _application: Application) -> Result<Application, RepositoryError> {
        offline()
    }

    fn commit(
        &self,
        _application: Application,
        _expected_version: u64,
        _audit: Vec<AuditEntry>,
    ) -> Result<Application, RepositoryError> {
        offline()
    }

    fn fetch(&self, _id: &ApplicationId) -> Result<Option<Application>, RepositoryError> {
        offline()
    }

    fn remove(
        &self,
        _id: &ApplicationId,
        _expected_version: u64,
        _audit: AuditEntry,
    ) -> Result<(), RepositoryError> {
        offline()
    }

    fn insert_service_request(
        &self,
        _request: ServiceRequest,
    ) -> Result<ServiceRequest, RepositoryError> {
        offline()
    }

    fn commit_service_request(
        &self,
        _request: ServiceRequest,
        _expected_version: u64,
        _audit: Vec<AuditEntry>,
    ) -> Result<ServiceRequest, RepositoryError> {
        offline()
    }

    fn commit_amendment(
        &self,
        _request: ServiceRequest,
        _expected_request_version: u64,
        _parent: Application,
        _expected_parent_version: u64,
        _audit: Vec<AuditEntry>,
    ) -> Result<(ServiceRequest, Application), RepositoryError> {
        offline()
    }

    fn fetch_service_request(
        &self,
        _id: &ServiceRequestId,
    ) -> Result<Option<ServiceRequest>, RepositoryError> {
        offline()
    }

    fn active_service_request(
        &self,
        _parent: &ApplicationId,
    ) -> Result<Option<ServiceRequest>, RepositoryError> {
        offline()
    }

    fn remove_service_request(
        &self,
        _id: &ServiceRequestId,
        _expected_version: u64,
        _audit: AuditEntry,
    ) -> Result<(), RepositoryError> {
        offline()
    }

    fn append_audit(&self, _entry: AuditEntry) -> Result<(), RepositoryError> {
        offline()
    }

    fn audit_trail(&self, _record_id: &str) -> Result<Vec<AuditEntry>, RepositoryError> {
        offline()
    }
}

pub(super) fn unavailable_service() -> RegistrationService<UnavailableRepository> {
    let collaborators = Collaborators::new(
        Arc::new(InMemoryDocumentStore::accepting_all()),
        Arc::new(InMemoryPaymentGateway::default()),
        Arc::new(RecordingNotifier::default()),
        Arc::new(InMemoryInspectionLog::default()),
    );
    RegistrationService::new(
        Arc::new(UnavailableRepository),
        collaborators,
        FeeEngine::default(),
    )
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
