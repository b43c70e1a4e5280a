use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::amendments::{self, AmendmentPlan};
use super::classifier::{classify_rooms, validate_validity_years, ValidationError};
use super::domain::{
    AmendmentPayload, Application, ApplicationDraft, ApplicationId, ApplicationKind,
    ApplicationStatus, Category, DocumentKind, InspectionReport, LocationType, OwnerAttributes,
    RoomConfiguration, ServiceRequest, ServiceRequestId, WorkflowState,
};
use super::error::WorkflowError;
use super::fees::{FeeBreakdown, FeeEngine, FeeQuoteRequest, UpgradeQuote};
use super::machine::{self, AppliedTransition, TransitionContext, TransitionPayload};
use super::policy::{is_allowed, Role, WorkflowAction};
use super::repository::{
    ApplicationRepository, AuditEntry, Clock, DocumentStore, InspectionService, Notice,
    NotificationService, PaymentError, PaymentGateway, SystemClock,
};
use super::stage::{stage_for_viewer, StageInputs, ViewerStage};

/// Owner confirmation sent with a submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionPayload {
    #[serde(default)]
    pub declaration_accepted: bool,
}

/// Gateway callback body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentConfirmation {
    pub payment_reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeQuoteRequest {
    pub from: Category,
    pub to: Category,
    pub location_type: LocationType,
    pub validity_years: u8,
    pub owner: OwnerAttributes,
}

/// Work dispatched after a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum SideEffect {
    Notify { notice: Notice },
    RecordSchedule { record_id: String, date: NaiveDate },
    RecordReport { record_id: String, report: InspectionReport },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedSideEffect {
    pub effect: SideEffect,
    pub error: String,
    pub failed_at: DateTime<Utc>,
    pub attempts: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RetryReport {
    pub delivered: usize,
    pub still_failing: usize,
}

/// External systems the service talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub documents: Arc<dyn DocumentStore>,
    pub payments: Arc<dyn PaymentGateway>,
    pub notifications: Arc<dyn NotificationService>,
    pub inspections: Arc<dyn InspectionService>,
    pub clock: Arc<dyn Clock>,
}

impl Collaborators {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        payments: Arc<dyn PaymentGateway>,
        notifications: Arc<dyn NotificationService>,
        inspections: Arc<dyn InspectionService>,
    ) -> Self {
        Self {
            documents,
            payments,
            notifications,
            inspections,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

#[derive(Debug)]
struct Sequences {
    application: AtomicU64,
    service_request: AtomicU64,
    application_number: AtomicU64,
    certificate: AtomicU64,
}

impl Default for Sequences {
    fn default() -> Self {
        Self {
            application: AtomicU64::new(1),
            service_request: AtomicU64::new(1),
            application_number: AtomicU64::new(1),
            certificate: AtomicU64::new(1),
        }
    }
}

fn next(counter: &AtomicU64) -> u64 {
    counter.fetch_add(1, Ordering::Relaxed)
}

/// Documents that must be on file before a registration can be submitted.
pub fn required_documents(kind: ApplicationKind, category: Option<Category>) -> Vec<DocumentKind> {
    let mut required = vec![
        DocumentKind::IdentityProof,
        DocumentKind::OwnershipProof,
        DocumentKind::PropertyPhotos,
    ];
    if category.is_some_and(Category::requires_utility_bills) {
        required.push(DocumentKind::ElectricityBill);
        required.push(DocumentKind::WaterBill);
    }
    if kind == ApplicationKind::ExistingRcOnboarding {
        required.push(DocumentKind::ExistingCertificate);
    }
    required
}

/// Fee still owed on an application; onboarding of an existing certificate is exempt.
pub fn fee_due(application: &Application) -> u64 {
    match application.kind {
        ApplicationKind::ExistingRcOnboarding => 0,
        _ => application
            .total_fee
            .as_ref()
            .map(|fee| fee.total_fee)
            .unwrap_or_default(),
    }
}

fn blank(value: &str) -> bool {
    value.trim().is_empty()
}

fn audit_entry(
    record_id: &str,
    actor: Role,
    applied: &AppliedTransition,
    at: DateTime<Utc>,
) -> AuditEntry {
    AuditEntry {
        at,
        record_id: record_id.to_string(),
        actor,
        action: applied.action,
        from: applied.from,
        to: Some(applied.to),
        remark: applied.remark.clone(),
    }
}

fn check_expected(
    record: &str,
    expected: Option<ApplicationStatus>,
    found: ApplicationStatus,
) -> Result<(), WorkflowError> {
    match expected {
        Some(expected) if expected != found => Err(WorkflowError::StaleState {
            record: record.to_string(),
            detail: format!("expected status {expected}, found {found}"),
        }),
        _ => Ok(()),
    }
}

/// Facade composing the state machine, fee engine, repository and collaborators.
pub struct RegistrationService<R> {
    repository: Arc<R>,
    collaborators: Collaborators,
    engine: Arc<FeeEngine>,
    sequences: Sequences,
    failed_effects: Mutex<Vec<FailedSideEffect>>,
}

impl<R> RegistrationService<R>
where
    R: ApplicationRepository + 'static,
{
    pub fn new(repository: Arc<R>, collaborators: Collaborators, engine: FeeEngine) -> Self {
        Self {
            repository,
            collaborators,
            engine: Arc::new(engine),
            sequences: Sequences::default(),
            failed_effects: Mutex::new(Vec::new()),
        }
    }

    pub fn engine(&self) -> &FeeEngine {
        &self.engine
    }

    fn now(&self) -> DateTime<Utc> {
        self.collaborators.clock.now()
    }

    fn load(&self, id: &ApplicationId) -> Result<Application, WorkflowError> {
        self.repository
            .fetch(id)?
            .ok_or_else(|| WorkflowError::NotFound(format!("application {id}")))
    }

    fn load_service_request(&self, id: &ServiceRequestId) -> Result<ServiceRequest, WorkflowError> {
        self.repository
            .fetch_service_request(id)?
            .ok_or_else(|| WorkflowError::NotFound(format!("service request {id}")))
    }

    /// Start a new primary application in `draft`.
    pub fn create_draft(
        &self,
        actor: Role,
        draft: ApplicationDraft,
    ) -> Result<Application, WorkflowError> {
        machine::authorize(actor, ApplicationStatus::Draft, WorkflowAction::EditDraft)?;
        if draft.kind.is_service_request() {
            return Err(ValidationError::Payload(format!(
                "{} is filed as a service request against an approved registration",
                draft.kind
            ))
            .into());
        }

        let now = self.now();
        let id = ApplicationId(format!("app-{:06}", next(&self.sequences.application)));
        let application = Application {
            id,
            application_number: None,
            kind: draft.kind,
            category: classify_rooms(&draft.rooms),
            declared_category: draft.declared_category,
            property: draft.property,
            owner: draft.owner,
            rooms: draft.rooms,
            validity_years: draft.validity_years,
            existing_certificate_number: draft.existing_certificate_number,
            workflow: WorkflowState::new(now),
            total_fee: None,
            certificate: None,
        };

        let stored = self.repository.insert(application)?;
        info!(application_id = %stored.id, kind = %stored.kind, actor = %actor, "draft created");
        Ok(stored)
    }

    pub fn update_draft(
        &self,
        id: &ApplicationId,
        actor: Role,
        draft: ApplicationDraft,
    ) -> Result<Application, WorkflowError> {
        let mut application = self.load(id)?;
        if application.status() != ApplicationStatus::Draft {
            return Err(WorkflowError::InvalidTransition {
                kind: application.kind,
                from: application.status(),
                action: WorkflowAction::EditDraft,
            });
        }
        machine::authorize(actor, ApplicationStatus::Draft, WorkflowAction::EditDraft)?;
        if draft.kind.is_service_request() {
            return Err(ValidationError::Payload(format!(
                "{} is filed as a service request against an approved registration",
                draft.kind
            ))
            .into());
        }

        let now = self.now();
        let expected_version = application.workflow.version;
        application.kind = draft.kind;
        application.category = classify_rooms(&draft.rooms);
        application.declared_category = draft.declared_category;
        application.property = draft.property;
        application.owner = draft.owner;
        application.rooms = draft.rooms;
        application.validity_years = draft.validity_years;
        application.existing_certificate_number = draft.existing_certificate_number;
        application.workflow.updated_at = now;
        application.workflow.version += 1;

        let entry = AuditEntry {
            at: now,
            record_id: id.0.clone(),
            actor,
            action: WorkflowAction::EditDraft,
            from: ApplicationStatus::Draft,
            to: Some(ApplicationStatus::Draft),
            remark: None,
        };
        let stored = self
            .repository
            .commit(application, expected_version, vec![entry])?;
        debug!(application_id = %id, category = ?stored.category, "draft updated");
        Ok(stored)
    }

    pub fn discard_draft(&self, id: &ApplicationId, actor: Role) -> Result<(), WorkflowError> {
        let application = self.load(id)?;
        if application.status() != ApplicationStatus::Draft {
            return Err(WorkflowError::InvalidTransition {
                kind: application.kind,
                from: application.status(),
                action: WorkflowAction::Discard,
            });
        }
        machine::authorize(actor, ApplicationStatus::Draft, WorkflowAction::Discard)?;

        let entry = AuditEntry {
            at: self.now(),
            record_id: id.0.clone(),
            actor,
            action: WorkflowAction::Discard,
            from: ApplicationStatus::Draft,
            to: None,
            remark: None,
        };
        self.repository
            .remove(id, application.workflow.version, entry)?;
        info!(application_id = %id, actor = %actor, "draft discarded");
        Ok(())
    }

    /// Validate a draft, snapshot its fee and move it to `submitted`.
    pub fn submit_application(
        &self,
        id: &ApplicationId,
        actor: Role,
        submission: SubmissionPayload,
    ) -> Result<Application, WorkflowError> {
        let mut application = self.load(id)?;
        let from = application.status();
        machine::next_status(application.kind, from, WorkflowAction::Submit, 0)?;
        if !is_allowed(actor, from, WorkflowAction::Submit) {
            return Err(WorkflowError::Forbidden {
                role: actor,
                action: WorkflowAction::Submit,
                status: from,
            });
        }

        let mut missing = Vec::new();
        if !submission.declaration_accepted {
            missing.push("declaration".to_string());
        }
        for (field, value) in [
            ("property.name", &application.property.name),
            ("property.address", &application.property.address),
            ("property.district", &application.property.district),
            ("owner.name", &application.owner.name),
            ("owner.mobile", &application.owner.mobile),
        ] {
            if blank(value) {
                missing.push(field.to_string());
            }
        }
        if application.rooms.is_empty() {
            missing.push("rooms".to_string());
        }
        if application.kind == ApplicationKind::ExistingRcOnboarding
            && application
                .existing_certificate_number
                .as_deref()
                .map_or(true, blank)
        {
            missing.push("existing_certificate_number".to_string());
        }
        for document in required_documents(application.kind, classify_rooms(&application.rooms)) {
            if !self.collaborators.documents.has_document(id, document)? {
                missing.push(format!("document:{}", document.label()));
            }
        }
        if !missing.is_empty() {
            return Err(WorkflowError::PreconditionNotMet { missing });
        }

        let validity_years = validate_validity_years(application.validity_years)?;
        let category = self.engine.limits().validate_rooms(&application.rooms)?;
        if let Some(declared) = application.declared_category {
            if declared != category {
                return Err(ValidationError::CategoryMismatch {
                    declared,
                    derived: category,
                    rate: application.rooms.highest_rate().unwrap_or_default(),
                }
                .into());
            }
        }

        let fee = self.engine.quote_for_category(
            category,
            application.property.location_type,
            validity_years,
            &application.owner.fee_attributes(),
        )?;

        let now = self.now();
        application.category = Some(category);
        application.total_fee = Some(fee);
        if application.application_number.is_none() {
            application.application_number = Some(format!(
                "HS/{}/{:05}",
                now.year(),
                next(&self.sequences.application_number)
            ));
        }

        self.commit_transition(
            application,
            actor,
            WorkflowAction::Submit,
            &TransitionPayload::default(),
            now,
        )
    }

    /// Apply a reviewer or owner action from the transition table.
    pub fn transition(
        &self,
        id: &ApplicationId,
        actor: Role,
        action: WorkflowAction,
        payload: TransitionPayload,
    ) -> Result<Application, WorkflowError> {
        if matches!(
            action,
            WorkflowAction::Submit
                | WorkflowAction::EditDraft
                | WorkflowAction::Discard
                | WorkflowAction::RequestAmendment
        ) {
            return Err(ValidationError::Payload(format!(
                "{action} has a dedicated operation"
            ))
            .into());
        }

        let application = self.load(id)?;
        check_expected(&id.0, payload.expected_status, application.status())?;
        let now = self.now();
        self.commit_transition(application, actor, action, &payload, now)
    }

    fn commit_transition(
        &self,
        mut application: Application,
        actor: Role,
        action: WorkflowAction,
        payload: &TransitionPayload,
        now: DateTime<Utc>,
    ) -> Result<Application, WorkflowError> {
        let due = fee_due(&application);
        if action == WorkflowAction::ConfirmPayment {
            machine::admit(application.kind, application.status(), action, due, actor)?;
            self.verify_payment(payload, due)?;
        }

        let expected_version = application.workflow.version;
        let context = TransitionContext {
            kind: application.kind,
            fee_due: due,
            now,
        };
        let applied = machine::apply(&mut application.workflow, context, actor, action, payload)?;

        if applied.to == ApplicationStatus::Approved && application.certificate.is_none() {
            let number = format!(
                "HS-CERT-{}-{:06}",
                now.year(),
                next(&self.sequences.certificate)
            );
            application.certificate = Some(machine::issue_certificate(
                number,
                now,
                application.validity_years,
            ));
        }

        let entry = audit_entry(&application.id.0, actor, &applied, now);
        let stored = self
            .repository
            .commit(application, expected_version, vec![entry])?;

        info!(
            application_id = %stored.id,
            actor = %actor,
            action = %applied.action,
            from = %applied.from,
            to = %applied.to,
            version = stored.workflow.version,
            "transition committed"
        );

        let certificate_number = stored
            .certificate
            .as_ref()
            .map(|certificate| certificate.number.as_str());
        let effects =
            self.effects_for(&stored.id.0, &stored.workflow, &applied, due, certificate_number);
        self.run_effects(effects);
        Ok(stored)
    }

    fn verify_payment(&self, payload: &TransitionPayload, due: u64) -> Result<(), WorkflowError> {
        let reference = payload
            .payment_reference
            .as_deref()
            .map(str::trim)
            .filter(|reference| !reference.is_empty())
            .ok_or_else(|| WorkflowError::missing(["payment_reference"]))?;
        let receipt = self.collaborators.payments.verify(reference)?;
        if receipt.amount != due {
            return Err(PaymentError::AmountMismatch {
                reference: receipt.reference,
                expected: due,
                found: receipt.amount,
            }
            .into());
        }
        Ok(())
    }

    /// Gateway callback for a settled payment.
    pub fn confirm_payment(
        &self,
        id: &ApplicationId,
        confirmation: PaymentConfirmation,
    ) -> Result<Application, WorkflowError> {
        let payload = TransitionPayload {
            payment_reference: Some(confirmation.payment_reference),
            ..TransitionPayload::default()
        };
        self.transition(id, Role::PropertyOwner, WorkflowAction::ConfirmPayment, payload)
    }

    /// Gateway callback for a failed payment; the application stays in `payment_pending`.
    pub fn payment_failed(
        &self,
        id: &ApplicationId,
        reason: &str,
    ) -> Result<Application, WorkflowError> {
        let application = self.load(id)?;
        if application.status() != ApplicationStatus::PaymentPending {
            return Err(WorkflowError::InvalidTransition {
                kind: application.kind,
                from: application.status(),
                action: WorkflowAction::ConfirmPayment,
            });
        }

        let remark = if blank(reason) {
            "payment failed".to_string()
        } else {
            reason.trim().to_string()
        };
        self.repository.append_audit(AuditEntry {
            at: self.now(),
            record_id: id.0.clone(),
            actor: Role::PropertyOwner,
            action: WorkflowAction::ConfirmPayment,
            from: ApplicationStatus::PaymentPending,
            to: Some(ApplicationStatus::PaymentPending),
            remark: Some(remark.clone()),
        })?;
        warn!(application_id = %id, reason = %remark, "payment failed");

        let mut details = BTreeMap::new();
        details.insert("reason".to_string(), remark);
        details.insert("amount".to_string(), fee_due(&application).to_string());
        self.run_effects(vec![SideEffect::Notify {
            notice: Notice {
                template: "payment_failed".to_string(),
                record_id: id.0.clone(),
                recipient: Role::PropertyOwner,
                details,
            },
        }]);
        Ok(application)
    }

    /// Open an amendment against an approved registration, in `draft`.
    pub fn create_service_request(
        &self,
        parent_id: &ApplicationId,
        actor: Role,
        payload: AmendmentPayload,
    ) -> Result<ServiceRequest, WorkflowError> {
        let parent = self.load(parent_id)?;
        machine::authorize(actor, parent.status(), WorkflowAction::RequestAmendment)?;
        let plan = amendments::plan(&parent, &payload, &self.engine)?;
        if let Some(active) = self.repository.active_service_request(parent_id)? {
            return Err(WorkflowError::ConflictingServiceRequest {
                parent: parent_id.clone(),
                active: active.id,
            });
        }

        let request = ServiceRequest {
            id: ServiceRequestId(format!("srq-{:06}", next(&self.sequences.service_request))),
            parent_id: parent_id.clone(),
            payload,
            workflow: WorkflowState::new(self.now()),
            resulting_category: plan.resulting_category,
            fee: plan.fee,
            upgrade_fee: plan.upgrade_fee,
        };
        let stored = self.repository.insert_service_request(request)?;
        info!(
            service_request_id = %stored.id,
            parent_id = %parent_id,
            kind = %stored.kind(),
            upgrade_fee = stored.upgrade_fee,
            "service request opened"
        );
        Ok(stored)
    }

    pub fn transition_service_request(
        &self,
        id: &ServiceRequestId,
        actor: Role,
        action: WorkflowAction,
        payload: TransitionPayload,
    ) -> Result<ServiceRequest, WorkflowError> {
        if matches!(
            action,
            WorkflowAction::EditDraft | WorkflowAction::Discard | WorkflowAction::RequestAmendment
        ) {
            return Err(ValidationError::Payload(format!(
                "{action} has a dedicated operation"
            ))
            .into());
        }

        let mut request = self.load_service_request(id)?;
        check_expected(&id.0, payload.expected_status, request.status())?;
        let mut parent = self.load(&request.parent_id)?;
        machine::admit(
            request.kind(),
            request.status(),
            action,
            request.upgrade_fee,
            actor,
        )?;

        if action == WorkflowAction::Submit {
            let AmendmentPlan {
                resulting_category,
                fee,
                upgrade_fee,
            } = amendments::plan(&parent, &request.payload, &self.engine)?;
            request.resulting_category = resulting_category;
            request.fee = fee;
            request.upgrade_fee = upgrade_fee;
        }
        if action == WorkflowAction::ConfirmPayment {
            self.verify_payment(&payload, request.upgrade_fee)?;
        }

        let now = self.now();
        let expected_version = request.workflow.version;
        let context = TransitionContext {
            kind: request.kind(),
            fee_due: request.upgrade_fee,
            now,
        };
        let applied = machine::apply(&mut request.workflow, context, actor, action, &payload)?;
        let mut audit = vec![audit_entry(&id.0, actor, &applied, now)];

        let stored = if applied.to == ApplicationStatus::Approved {
            let parent_version = parent.workflow.version;
            let parent_from = parent.status();
            amendments::apply_to_parent(&mut parent, &request, now)?;
            audit.push(AuditEntry {
                at: now,
                record_id: parent.id.0.clone(),
                actor,
                action: WorkflowAction::RequestAmendment,
                from: parent_from,
                to: Some(parent.status()),
                remark: Some(format!("{} applied from {}", request.kind(), id)),
            });
            let (stored, parent) = self.repository.commit_amendment(
                request,
                expected_version,
                parent,
                parent_version,
                audit,
            )?;
            info!(
                service_request_id = %stored.id,
                parent_id = %parent.id,
                parent_status = %parent.status(),
                category = ?parent.category,
                "amendment applied"
            );
            stored
        } else {
            self.repository
                .commit_service_request(request, expected_version, audit)?
        };

        info!(
            service_request_id = %stored.id,
            actor = %actor,
            action = %applied.action,
            from = %applied.from,
            to = %applied.to,
            version = stored.workflow.version,
            "transition committed"
        );

        let effects = self.effects_for(
            &stored.id.0,
            &stored.workflow,
            &applied,
            stored.upgrade_fee,
            None,
        );
        self.run_effects(effects);
        Ok(stored)
    }

    pub fn discard_service_request(
        &self,
        id: &ServiceRequestId,
        actor: Role,
    ) -> Result<(), WorkflowError> {
        let request = self.load_service_request(id)?;
        if request.status() != ApplicationStatus::Draft {
            return Err(WorkflowError::InvalidTransition {
                kind: request.kind(),
                from: request.status(),
                action: WorkflowAction::Discard,
            });
        }
        machine::authorize(actor, ApplicationStatus::Draft, WorkflowAction::Discard)?;

        let entry = AuditEntry {
            at: self.now(),
            record_id: id.0.clone(),
            actor,
            action: WorkflowAction::Discard,
            from: ApplicationStatus::Draft,
            to: None,
            remark: None,
        };
        self.repository
            .remove_service_request(id, request.workflow.version, entry)?;
        info!(service_request_id = %id, actor = %actor, "service request discarded");
        Ok(())
    }

    pub fn quote_fee(&self, request: &FeeQuoteRequest) -> Result<FeeBreakdown, WorkflowError> {
        let quote = self.engine.quote(request)?;
        debug!(
            category = %quote.category.label(),
            location = %quote.location_type.label(),
            total_fee = quote.total_fee,
            "fee quoted"
        );
        Ok(quote)
    }

    pub fn quote_upgrade(
        &self,
        request: &UpgradeQuoteRequest,
    ) -> Result<UpgradeQuote, WorkflowError> {
        Ok(self.engine.quote_upgrade(
            request.from,
            request.to,
            request.location_type,
            request.validity_years,
            &request.owner,
        )?)
    }

    pub fn get(&self, id: &ApplicationId) -> Result<Application, WorkflowError> {
        self.load(id)
    }

    pub fn get_service_request(
        &self,
        id: &ServiceRequestId,
    ) -> Result<ServiceRequest, WorkflowError> {
        self.load_service_request(id)
    }

    pub fn stage(&self, id: &ApplicationId, viewer: Role) -> Result<ViewerStage, WorkflowError> {
        let application = self.load(id)?;
        Ok(stage_for_viewer(viewer, &StageInputs::from(&application.workflow)))
    }

    pub fn audit_trail(&self, record_id: &str) -> Result<Vec<AuditEntry>, WorkflowError> {
        Ok(self.repository.audit_trail(record_id)?)
    }

    pub fn failed_side_effects(&self) -> Vec<FailedSideEffect> {
        self.failed_effects
            .lock()
            .map(|ledger| ledger.clone())
            .unwrap_or_default()
    }

    /// Re-dispatch every undelivered side effect once.
    pub fn retry_side_effects(&self) -> RetryReport {
        let pending = match self.failed_effects.lock() {
            Ok(mut ledger) => std::mem::take(&mut *ledger),
            Err(_) => return RetryReport::default(),
        };

        let mut report = RetryReport::default();
        let mut still_failing = Vec::new();
        for mut failed in pending {
            match self.dispatch(&failed.effect) {
                Ok(()) => report.delivered += 1,
                Err(error) => {
                    failed.attempts += 1;
                    failed.error = error;
                    failed.failed_at = self.now();
                    still_failing.push(failed);
                }
            }
        }
        report.still_failing = still_failing.len();

        if let Ok(mut ledger) = self.failed_effects.lock() {
            ledger.extend(still_failing);
        }
        info!(
            delivered = report.delivered,
            still_failing = report.still_failing,
            "side effects retried"
        );
        report
    }

    fn effects_for(
        &self,
        record_id: &str,
        workflow: &WorkflowState,
        applied: &AppliedTransition,
        amount_due: u64,
        certificate_number: Option<&str>,
    ) -> Vec<SideEffect> {
        let mut effects = Vec::new();
        match applied.action {
            WorkflowAction::ScheduleInspection => {
                if let Some(date) = workflow.inspection_scheduled_for {
                    effects.push(SideEffect::RecordSchedule {
                        record_id: record_id.to_string(),
                        date,
                    });
                }
            }
            WorkflowAction::SubmitReport => {
                if let Some(report) = &workflow.inspection_report {
                    effects.push(SideEffect::RecordReport {
                        record_id: record_id.to_string(),
                        report: report.clone(),
                    });
                }
            }
            _ => {}
        }

        let mut details = BTreeMap::new();
        details.insert("status".to_string(), applied.to.label().to_string());
        if let Some(remark) = &applied.remark {
            details.insert("remark".to_string(), remark.clone());
        }

        let (template, recipient) = match applied.to {
            ApplicationStatus::Submitted if applied.action == WorkflowAction::Resubmit => {
                ("application_resubmitted", Role::DealingAssistant)
            }
            ApplicationStatus::Submitted => ("application_submitted", Role::DealingAssistant),
            ApplicationStatus::ForwardedToDtdo => ("forwarded_to_dtdo", Role::DistrictOfficer),
            ApplicationStatus::SentBackForCorrections
            | ApplicationStatus::RevertedByDtdo
            | ApplicationStatus::ObjectionRaised => ("corrections_requested", Role::PropertyOwner),
            ApplicationStatus::InspectionScheduled => {
                if let Some(date) = workflow.inspection_scheduled_for {
                    details.insert("inspection_date".to_string(), date.to_string());
                }
                ("inspection_scheduled", Role::PropertyOwner)
            }
            ApplicationStatus::PaymentPending => {
                details.insert("amount".to_string(), amount_due.to_string());
                ("payment_due", Role::PropertyOwner)
            }
            ApplicationStatus::Approved => {
                if let Some(number) = certificate_number {
                    details.insert("certificate_number".to_string(), number.to_string());
                }
                ("application_approved", Role::PropertyOwner)
            }
            ApplicationStatus::Rejected => ("application_rejected", Role::PropertyOwner),
            _ => return effects,
        };

        effects.push(SideEffect::Notify {
            notice: Notice {
                template: template.to_string(),
                record_id: record_id.to_string(),
                recipient,
                details,
            },
        });
        effects
    }

    fn dispatch(&self, effect: &SideEffect) -> Result<(), String> {
        match effect {
            SideEffect::Notify { notice } => self
                .collaborators
                .notifications
                .notify(notice.clone())
                .map_err(|err| err.to_string()),
            SideEffect::RecordSchedule { record_id, date } => self
                .collaborators
                .inspections
                .record_schedule(record_id, *date)
                .map_err(|err| err.to_string()),
            SideEffect::RecordReport { record_id, report } => self
                .collaborators
                .inspections
                .record_report(record_id, report)
                .map_err(|err| err.to_string()),
        }
    }

    fn run_effects(&self, effects: Vec<SideEffect>) {
        for effect in effects {
            if let Err(error) = self.dispatch(&effect) {
                warn!(?effect, %error, "side effect failed; kept for retry");
                if let Ok(mut ledger) = self.failed_effects.lock() {
                    ledger.push(FailedSideEffect {
                        effect,
                        error,
                        failed_at: self.now(),
                        attempts: 1,
                    });
                }
            }
        }
    }
}
