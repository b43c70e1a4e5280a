use super::classifier::ValidationError;
use super::domain::{ApplicationId, ApplicationKind, ApplicationStatus, ServiceRequestId};
use super::fees::FeeError;
use super::policy::{Role, WorkflowAction};
use super::repository::{DocumentStoreError, PaymentError, RepositoryError};

/// Failures reported synchronously by every workflow operation.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("cannot {action} a {kind} record in status {from}")]
    InvalidTransition {
        kind: ApplicationKind,
        from: ApplicationStatus,
        action: WorkflowAction,
    },
    #[error("{role} may not {action} a record in status {status}")]
    Forbidden {
        role: Role,
        action: WorkflowAction,
        status: ApplicationStatus,
    },
    #[error("precondition not met; missing: {}", .missing.join(", "))]
    PreconditionNotMet { missing: Vec<String> },
    #[error("application {parent} already has active service request {active}")]
    ConflictingServiceRequest {
        parent: ApplicationId,
        active: ServiceRequestId,
    },
    #[error("record {record} changed since it was read: {detail}")]
    StaleState { record: String, detail: String },
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{0} not found")]
    NotFound(String),
    #[error("record {record} is blocked: {reason}")]
    CorruptedRecord { record: String, reason: String },
    #[error(transparent)]
    Repository(RepositoryError),
    #[error(transparent)]
    Document(#[from] DocumentStoreError),
    #[error(transparent)]
    Payment(#[from] PaymentError),
}

impl WorkflowError {
    pub(crate) fn missing<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::PreconditionNotMet {
            missing: items.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<FeeError> for WorkflowError {
    fn from(value: FeeError) -> Self {
        match value {
            FeeError::Validation(err) => Self::Validation(err),
            other @ FeeError::NotAnUpgrade { .. } => {
                Self::Validation(ValidationError::Payload(other.to_string()))
            }
        }
    }
}

impl From<RepositoryError> for WorkflowError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::NotFound(record) => Self::NotFound(record),
            RepositoryError::VersionMismatch {
                record,
                expected,
                found,
            } => Self::StaleState {
                record,
                detail: format!("expected version {expected}, found {found}"),
            },
            RepositoryError::ActiveServiceRequest { parent, active } => {
                Self::ConflictingServiceRequest { parent, active }
            }
            RepositoryError::Corrupted { record, reason } => {
                Self::CorruptedRecord { record, reason }
            }
            other => Self::Repository(other),
        }
    }
}
