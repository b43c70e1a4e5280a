use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    Application, ApplicationId, ApplicationStatus, DocumentKind, InspectionReport,
    ServiceRequest, ServiceRequestId,
};
use super::policy::{Role, WorkflowAction};

/// Append-only record of a committed change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub at: DateTime<Utc>,
    pub record_id: String,
    pub actor: Role,
    pub action: WorkflowAction,
    pub from: ApplicationStatus,
    /// `None` when the record was removed.
    pub to: Option<ApplicationStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remark: Option<String>,
}

/// Storage abstraction for applications, service requests and the audit log.
///
/// Every `commit_*` call compares the stored version with `expected_version` and appends the
/// audit entries in the same atomic step, so a lost race surfaces as `VersionMismatch`.
pub trait ApplicationRepository: Send + Sync {
    fn insert(&self, application: Application) -> Result<Application, RepositoryError>;
    fn commit(
        &self,
        application: Application,
        expected_version: u64,
        audit: Vec<AuditEntry>,
    ) -> Result<Application, RepositoryError>;
    fn fetch(&self, id: &ApplicationId) -> Result<Option<Application>, RepositoryError>;
    fn remove(
        &self,
        id: &ApplicationId,
        expected_version: u64,
        audit: AuditEntry,
    ) -> Result<(), RepositoryError>;

    /// Fails with `ActiveServiceRequest` when the parent already has a non-terminal request.
    fn insert_service_request(
        &self,
        request: ServiceRequest,
    ) -> Result<ServiceRequest, RepositoryError>;
    fn commit_service_request(
        &self,
        request: ServiceRequest,
        expected_version: u64,
        audit: Vec<AuditEntry>,
    ) -> Result<ServiceRequest, RepositoryError>;
    /// Commits an approved amendment together with the rewritten parent.
    fn commit_amendment(
        &self,
        request: ServiceRequest,
        expected_request_version: u64,
        parent: Application,
        expected_parent_version: u64,
        audit: Vec<AuditEntry>,
    ) -> Result<(ServiceRequest, Application), RepositoryError>;
    fn fetch_service_request(
        &self,
        id: &ServiceRequestId,
    ) -> Result<Option<ServiceRequest>, RepositoryError>;
    fn active_service_request(
        &self,
        parent: &ApplicationId,
    ) -> Result<Option<ServiceRequest>, RepositoryError>;
    fn remove_service_request(
        &self,
        id: &ServiceRequestId,
        expected_version: u64,
        audit: AuditEntry,
    ) -> Result<(), RepositoryError>;

    fn append_audit(&self, entry: AuditEntry) -> Result<(), RepositoryError>;
    fn audit_trail(&self, record_id: &str) -> Result<Vec<AuditEntry>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("{0} not found")]
    NotFound(String),
    #[error("record {record} is at version {found}, expected {expected}")]
    VersionMismatch {
        record: String,
        expected: u64,
        found: u64,
    },
    #[error("application {parent} already has active service request {active}")]
    ActiveServiceRequest {
        parent: ApplicationId,
        active: ServiceRequestId,
    },
    #[error("record {record} could not be decoded: {reason}")]
    Corrupted { record: String, reason: String },
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Lookup of uploaded documents; storage itself lives elsewhere.
pub trait DocumentStore: Send + Sync {
    fn has_document(
        &self,
        application: &ApplicationId,
        kind: DocumentKind,
    ) -> Result<bool, DocumentStoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DocumentStoreError {
    #[error("document store unavailable: {0}")]
    Unavailable(String),
}

/// Amount the gateway settled for a payment reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub reference: String,
    pub amount: u64,
}

pub trait PaymentGateway: Send + Sync {
    fn verify(&self, reference: &str) -> Result<PaymentReceipt, PaymentError>;
}

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("payment {reference} was not settled: {reason}")]
    Declined { reference: String, reason: String },
    #[error("payment {reference} settled {found} but {expected} is due")]
    AmountMismatch {
        reference: String,
        expected: u64,
        found: u64,
    },
    #[error("payment gateway unavailable: {0}")]
    Unavailable(String),
}

/// Outbound message for owners and officers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub template: String,
    pub record_id: String,
    pub recipient: Role,
    pub details: BTreeMap<String, String>,
}

pub trait NotificationService: Send + Sync {
    fn notify(&self, notice: Notice) -> Result<(), NotificationError>;
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// Field inspection records kept by the inspection wing.
pub trait InspectionService: Send + Sync {
    fn record_schedule(&self, record_id: &str, date: NaiveDate) -> Result<(), InspectionError>;
    fn record_report(
        &self,
        record_id: &str,
        report: &InspectionReport,
    ) -> Result<(), InspectionError>;
}

#[derive(Debug, thiserror::Error)]
pub enum InspectionError {
    #[error("inspection records unavailable: {0}")]
    Unavailable(String),
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
