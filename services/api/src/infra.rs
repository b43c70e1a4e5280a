use homestay_registry::config::FeeSettings;
use homestay_registry::error::AppError;
use homestay_registry::workflows::registration::{
    CategoryLimits, Collaborators, FeeEngine, FeePolicy, FeeSchedule, InMemoryDocumentStore,
    InMemoryInspectionLog, InMemoryPaymentGateway, InMemoryRepository, LocationType,
    RecordingNotifier, RegistrationService,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// In-process collaborators; the payment gateway handle is kept so callers can settle payments.
pub(crate) struct Backends {
    pub(crate) repository: Arc<InMemoryRepository>,
    pub(crate) documents: Arc<InMemoryDocumentStore>,
    pub(crate) payments: Arc<InMemoryPaymentGateway>,
    pub(crate) notifier: Arc<RecordingNotifier>,
    pub(crate) inspections: Arc<InMemoryInspectionLog>,
}

impl Default for Backends {
    fn default() -> Self {
        Self {
            repository: Arc::new(InMemoryRepository::default()),
            documents: Arc::new(InMemoryDocumentStore::accepting_all()),
            payments: Arc::new(InMemoryPaymentGateway::default()),
            notifier: Arc::new(RecordingNotifier::default()),
            inspections: Arc::new(InMemoryInspectionLog::default()),
        }
    }
}

impl Backends {
    pub(crate) fn service(&self, engine: FeeEngine) -> RegistrationService<InMemoryRepository> {
        let collaborators = Collaborators::new(
            self.documents.clone(),
            self.payments.clone(),
            self.notifier.clone(),
            self.inspections.clone(),
        );
        RegistrationService::new(self.repository.clone(), collaborators, engine)
    }
}

/// Fee engine from configuration: the schedule file when one is set, the built-in tariff otherwise.
pub(crate) fn fee_engine(settings: &FeeSettings) -> Result<FeeEngine, AppError> {
    let schedule = match &settings.schedule_path {
        Some(path) => {
            let schedule = FeeSchedule::from_path(path)?;
            info!(path = %path.display(), "fee schedule loaded");
            schedule
        }
        None => FeeSchedule::standard(),
    };
    let policy = FeePolicy::default().with_sub_divisions(settings.discounted_sub_divisions.clone());
    Ok(FeeEngine::new(schedule, policy, CategoryLimits::default()))
}

pub(crate) fn parse_location(raw: &str) -> Result<LocationType, String> {
    raw.parse::<LocationType>()
}
