//! In-process implementations of the storage and collaborator seams.
//!
//! Records are held as JSON documents so a persisted value that no longer decodes is reported
//! as `Corrupted` instead of being silently coerced.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use super::domain::{
    Application, ApplicationId, DocumentKind, InspectionReport, ServiceRequest, ServiceRequestId,
};
use super::repository::{
    ApplicationRepository, AuditEntry, DocumentStore, DocumentStoreError, InspectionError,
    InspectionService, Notice, NotificationError, NotificationService, PaymentError,
    PaymentGateway, PaymentReceipt, RepositoryError,
};

#[derive(Debug, Default)]
struct Tables {
    applications: HashMap<ApplicationId, Value>,
    service_requests: HashMap<ServiceRequestId, Value>,
    audit: Vec<AuditEntry>,
}

/// Mutex-guarded repository; every method holds the lock for its whole check-and-write.
#[derive(Debug, Default, Clone)]
pub struct InMemoryRepository {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryRepository {
    fn lock(&self) -> Result<MutexGuard<'_, Tables>, RepositoryError> {
        self.tables
            .lock()
            .map_err(|_| RepositoryError::Unavailable("repository lock poisoned".to_string()))
    }

    /// Stores a raw application document, bypassing validation.
    pub fn insert_raw_application(
        &self,
        id: ApplicationId,
        document: Value,
    ) -> Result<(), RepositoryError> {
        self.lock()?.applications.insert(id, document);
        Ok(())
    }

    /// Stores a raw service request document, bypassing validation.
    pub fn insert_raw_service_request(
        &self,
        id: ServiceRequestId,
        document: Value,
    ) -> Result<(), RepositoryError> {
        self.lock()?.service_requests.insert(id, document);
        Ok(())
    }
}

fn encode<T: Serialize>(record: &str, value: &T) -> Result<Value, RepositoryError> {
    serde_json::to_value(value).map_err(|err| RepositoryError::Corrupted {
        record: record.to_string(),
        reason: err.to_string(),
    })
}

fn decode<T: DeserializeOwned>(record: &str, value: &Value) -> Result<T, RepositoryError> {
    serde_json::from_value(value.clone()).map_err(|err| RepositoryError::Corrupted {
        record: record.to_string(),
        reason: err.to_string(),
    })
}

fn check_version(record: &str, expected: u64, found: u64) -> Result<(), RepositoryError> {
    if expected == found {
        Ok(())
    } else {
        Err(RepositoryError::VersionMismatch {
            record: record.to_string(),
            expected,
            found,
        })
    }
}

impl Tables {
    fn application(&self, id: &ApplicationId) -> Result<Application, RepositoryError> {
        let document = self
            .applications
            .get(id)
            .ok_or_else(|| RepositoryError::NotFound(format!("application {id}")))?;
        decode(&id.0, document)
    }

    fn service_request(&self, id: &ServiceRequestId) -> Result<ServiceRequest, RepositoryError> {
        let document = self
            .service_requests
            .get(id)
            .ok_or_else(|| RepositoryError::NotFound(format!("service request {id}")))?;
        decode(&id.0, document)
    }

    /// Only documents that name `parent` are decoded; a damaged request for another
    /// parent does not block this one.
    fn active_for(
        &self,
        parent: &ApplicationId,
    ) -> Result<Option<ServiceRequest>, RepositoryError> {
        for (id, document) in &self.service_requests {
            match document.get("parent_id").and_then(Value::as_str) {
                Some(owner) if owner == parent.0 => {}
                Some(_) => continue,
                None => {
                    warn!(service_request_id = %id, "service request without a parent id skipped");
                    continue;
                }
            }
            let request: ServiceRequest = decode(&id.0, document)?;
            if request.is_active() {
                return Ok(Some(request));
            }
        }
        Ok(None)
    }
}

impl ApplicationRepository for InMemoryRepository {
    fn insert(&self, application: Application) -> Result<Application, RepositoryError> {
        let mut tables = self.lock()?;
        if tables.applications.contains_key(&application.id) {
            return Err(RepositoryError::Conflict);
        }
        let document = encode(&application.id.0, &application)?;
        tables.applications.insert(application.id.clone(), document);
        Ok(application)
    }

    fn commit(
        &self,
        application: Application,
        expected_version: u64,
        audit: Vec<AuditEntry>,
    ) -> Result<Application, RepositoryError> {
        let mut tables = self.lock()?;
        let stored = tables.application(&application.id)?;
        check_version(&application.id.0, expected_version, stored.workflow.version)?;

        let document = encode(&application.id.0, &application)?;
        tables.applications.insert(application.id.clone(), document);
        tables.audit.extend(audit);
        Ok(application)
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<Application>, RepositoryError> {
        let tables = self.lock()?;
        tables
            .applications
            .get(id)
            .map(|document| decode(&id.0, document))
            .transpose()
    }

    fn remove(
        &self,
        id: &ApplicationId,
        expected_version: u64,
        audit: AuditEntry,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.lock()?;
        let stored = tables.application(id)?;
        check_version(&id.0, expected_version, stored.workflow.version)?;
        tables.applications.remove(id);
        tables.audit.push(audit);
        Ok(())
    }

    fn insert_service_request(
        &self,
        request: ServiceRequest,
    ) -> Result<ServiceRequest, RepositoryError> {
        let mut tables = self.lock()?;
        if let Some(active) = tables.active_for(&request.parent_id)? {
            return Err(RepositoryError::ActiveServiceRequest {
                parent: request.parent_id,
                active: active.id,
            });
        }
        if tables.service_requests.contains_key(&request.id) {
            return Err(RepositoryError::Conflict);
        }
        let document = encode(&request.id.0, &request)?;
        tables.service_requests.insert(request.id.clone(), document);
        Ok(request)
    }

    fn commit_service_request(
        &self,
        request: ServiceRequest,
        expected_version: u64,
        audit: Vec<AuditEntry>,
    ) -> Result<ServiceRequest, RepositoryError> {
        let mut tables = self.lock()?;
        let stored = tables.service_request(&request.id)?;
        check_version(&request.id.0, expected_version, stored.workflow.version)?;

        let document = encode(&request.id.0, &request)?;
        tables.service_requests.insert(request.id.clone(), document);
        tables.audit.extend(audit);
        Ok(request)
    }

    fn commit_amendment(
        &self,
        request: ServiceRequest,
        expected_request_version: u64,
        parent: Application,
        expected_parent_version: u64,
        audit: Vec<AuditEntry>,
    ) -> Result<(ServiceRequest, Application), RepositoryError> {
        let mut tables = self.lock()?;
        let stored_request = tables.service_request(&request.id)?;
        check_version(
            &request.id.0,
            expected_request_version,
            stored_request.workflow.version,
        )?;
        let stored_parent = tables.application(&parent.id)?;
        check_version(
            &parent.id.0,
            expected_parent_version,
            stored_parent.workflow.version,
        )?;

        let request_document = encode(&request.id.0, &request)?;
        let parent_document = encode(&parent.id.0, &parent)?;
        tables
            .service_requests
            .insert(request.id.clone(), request_document);
        tables.applications.insert(parent.id.clone(), parent_document);
        tables.audit.extend(audit);
        Ok((request, parent))
    }

    fn fetch_service_request(
        &self,
        id: &ServiceRequestId,
    ) -> Result<Option<ServiceRequest>, RepositoryError> {
        let tables = self.lock()?;
        tables
            .service_requests
            .get(id)
            .map(|document| decode(&id.0, document))
            .transpose()
    }

    fn active_service_request(
        &self,
        parent: &ApplicationId,
    ) -> Result<Option<ServiceRequest>, RepositoryError> {
        self.lock()?.active_for(parent)
    }

    fn remove_service_request(
        &self,
        id: &ServiceRequestId,
        expected_version: u64,
        audit: AuditEntry,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.lock()?;
        let stored = tables.service_request(id)?;
        check_version(&id.0, expected_version, stored.workflow.version)?;
        tables.service_requests.remove(id);
        tables.audit.push(audit);
        Ok(())
    }

    fn append_audit(&self, entry: AuditEntry) -> Result<(), RepositoryError> {
        self.lock()?.audit.push(entry);
        Ok(())
    }

    fn audit_trail(&self, record_id: &str) -> Result<Vec<AuditEntry>, RepositoryError> {
        Ok(self
            .lock()?
            .audit
            .iter()
            .filter(|entry| entry.record_id == record_id)
            .cloned()
            .collect())
    }
}

/// Document index keyed by application; `accept_all` treats every lookup as present.
#[derive(Debug, Default, Clone)]
pub struct InMemoryDocumentStore {
    accept_all: bool,
    documents: Arc<Mutex<HashMap<ApplicationId, BTreeSet<DocumentKind>>>>,
}

impl InMemoryDocumentStore {
    pub fn accepting_all() -> Self {
        Self {
            accept_all: true,
            ..Self::default()
        }
    }

    pub fn attach(&self, application: &ApplicationId, kind: DocumentKind) {
        if let Ok(mut documents) = self.documents.lock() {
            documents.entry(application.clone()).or_default().insert(kind);
        }
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn has_document(
        &self,
        application: &ApplicationId,
        kind: DocumentKind,
    ) -> Result<bool, DocumentStoreError> {
        if self.accept_all {
            return Ok(true);
        }
        let documents = self
            .documents
            .lock()
            .map_err(|_| DocumentStoreError::Unavailable("document index poisoned".to_string()))?;
        Ok(documents
            .get(application)
            .is_some_and(|kinds| kinds.contains(&kind)))
    }
}

/// Gateway stub that settles whatever amount was registered for a reference.
#[derive(Debug, Default, Clone)]
pub struct InMemoryPaymentGateway {
    settled: Arc<Mutex<HashMap<String, u64>>>,
}

impl InMemoryPaymentGateway {
    pub fn settle(&self, reference: impl Into<String>, amount: u64) {
        if let Ok(mut settled) = self.settled.lock() {
            settled.insert(reference.into(), amount);
        }
    }
}

impl PaymentGateway for InMemoryPaymentGateway {
    fn verify(&self, reference: &str) -> Result<PaymentReceipt, PaymentError> {
        let settled = self
            .settled
            .lock()
            .map_err(|_| PaymentError::Unavailable("payment ledger poisoned".to_string()))?;
        settled
            .get(reference)
            .map(|amount| PaymentReceipt {
                reference: reference.to_string(),
                amount: *amount,
            })
            .ok_or_else(|| PaymentError::Declined {
                reference: reference.to_string(),
                reason: "no settlement on record".to_string(),
            })
    }
}

/// Notifier that keeps every delivered notice and writes it to the log.
#[derive(Debug, Default, Clone)]
pub struct RecordingNotifier {
    notices: Arc<Mutex<Vec<Notice>>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices
            .lock()
            .map(|notices| notices.clone())
            .unwrap_or_default()
    }
}

impl NotificationService for RecordingNotifier {
    fn notify(&self, notice: Notice) -> Result<(), NotificationError> {
        info!(
            template = %notice.template,
            record_id = %notice.record_id,
            recipient = %notice.recipient,
            "notice delivered"
        );
        self.notices
            .lock()
            .map_err(|_| NotificationError::Transport("notice log poisoned".to_string()))?
            .push(notice);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InspectionEntry {
    Scheduled { record_id: String, date: NaiveDate },
    Reported { record_id: String, report: InspectionReport },
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryInspectionLog {
    entries: Arc<Mutex<Vec<InspectionEntry>>>,
}

impl InMemoryInspectionLog {
    pub fn entries(&self) -> Vec<InspectionEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    fn push(&self, entry: InspectionEntry) -> Result<(), InspectionError> {
        self.entries
            .lock()
            .map_err(|_| InspectionError::Unavailable("inspection log poisoned".to_string()))?
            .push(entry);
        Ok(())
    }
}

impl InspectionService for InMemoryInspectionLog {
    fn record_schedule(&self, record_id: &str, date: NaiveDate) -> Result<(), InspectionError> {
        self.push(InspectionEntry::Scheduled {
            record_id: record_id.to_string(),
            date,
        })
    }

    fn record_report(
        &self,
        record_id: &str,
        report: &InspectionReport,
    ) -> Result<(), InspectionError> {
        self.push(InspectionEntry::Reported {
            record_id: record_id.to_string(),
            report: report.clone(),
        })
    }
}
