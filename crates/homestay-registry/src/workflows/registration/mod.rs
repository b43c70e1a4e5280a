//! Homestay registration: category classification, fee quotes, the review state machine,
//! amendment (service request) routing and the HTTP surface over them.

pub mod amendments;
pub mod classifier;
pub mod domain;
pub mod error;
pub mod fees;
pub mod machine;
pub mod memory;
pub mod policy;
pub mod repository;
pub mod router;
pub mod service;
pub mod stage;

#[cfg(test)]
mod tests;

pub use classifier::{classify, CategoryLimits, RoomLimits, ValidationError};
pub use domain::{
    AmendmentPayload, Application, ApplicationDraft, ApplicationId, ApplicationKind,
    ApplicationStatus, Category, CertificateDetails, DocumentKind, Gender, InspectionRecommendation,
    InspectionReport, LocationType, OwnerAttributes, OwnerProfile, PropertyDetails, RoomRemoval,
    RoomType, RoomTypeConfig, ServiceRequest, ServiceRequestId, WorkflowState,
};
pub use error::WorkflowError;
pub use fees::{FeeBreakdown, FeeEngine, FeePolicy, FeeQuoteRequest, FeeSchedule, UpgradeQuote};
pub use machine::TransitionPayload;
pub use memory::{
    InMemoryDocumentStore, InMemoryInspectionLog, InMemoryPaymentGateway, InMemoryRepository,
    RecordingNotifier,
};
pub use policy::{allowed_actions, Role, WorkflowAction};
pub use repository::{
    ApplicationRepository, AuditEntry, Clock, DocumentStore, InspectionService, Notice,
    NotificationService, PaymentGateway, RepositoryError, SystemClock,
};
pub use router::registration_router;
pub use service::{
    Collaborators, PaymentConfirmation, RegistrationService, SubmissionPayload,
    UpgradeQuoteRequest,
};
pub use stage::{derive_stage, stage_for_viewer, Stage, StageInputs, StageView};
