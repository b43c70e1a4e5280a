//! End-to-end registration scenarios driven through the public service facade and HTTP router.

mod common {
    use std::io::Cursor;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{header, Request};
    use axum::response::Response;
    use serde_json::Value;

    use homestay_registry::workflows::registration::{
        ApplicationDraft, ApplicationKind, CategoryLimits, Collaborators, FeeEngine, FeePolicy,
        FeeSchedule, Gender, InMemoryDocumentStore, InMemoryInspectionLog,
        InMemoryPaymentGateway, InMemoryRepository, LocationType, OwnerProfile, PropertyDetails,
        RecordingNotifier, RegistrationService, RoomType, RoomTypeConfig,
    };

    pub(super) struct World {
        pub(super) service: Arc<RegistrationService<InMemoryRepository>>,
        pub(super) payments: Arc<InMemoryPaymentGateway>,
        pub(super) notifier: Arc<RecordingNotifier>,
        pub(super) inspections: Arc<InMemoryInspectionLog>,
    }

    /// Schedule with the municipal gold tariff raised above the notified rate.
    fn revised_schedule() -> FeeSchedule {
        let csv = "\
category,location_type,annual_fee
silver,gram_panchayat,3000
silver,town_planning_area,5000
silver,municipal_corporation,8000
gold,gram_panchayat,6000
gold,town_planning_area,8000
gold,municipal_corporation,15000
diamond,gram_panchayat,10000
diamond,town_planning_area,12000
diamond,municipal_corporation,18000
";
        FeeSchedule::from_reader(Cursor::new(csv)).expect("schedule parses")
    }

    pub(super) fn world() -> World {
        let payments = Arc::new(InMemoryPaymentGateway::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let inspections = Arc::new(InMemoryInspectionLog::default());
        let collaborators = Collaborators::new(
            Arc::new(InMemoryDocumentStore::accepting_all()),
            payments.clone(),
            notifier.clone(),
            inspections.clone(),
        );
        let engine = FeeEngine::new(
            revised_schedule(),
            FeePolicy::default().with_sub_divisions(vec!["Bharmour".to_string()]),
            CategoryLimits::default(),
        );

        World {
            service: Arc::new(RegistrationService::new(
                Arc::new(InMemoryRepository::default()),
                collaborators,
                engine,
            )),
            payments,
            notifier,
            inspections,
        }
    }

    pub(super) fn municipal_draft(kind: ApplicationKind) -> ApplicationDraft {
        ApplicationDraft {
            kind,
            property: PropertyDetails {
                name: "Ridge View Homestay".to_string(),
                address: "Near Mall Road, Dalhousie".to_string(),
                district: "Chamba".to_string(),
                location_type: LocationType::MunicipalCorporation,
            },
            owner: OwnerProfile {
                name: "Rakesh Thakur".to_string(),
                mobile: "9418000022".to_string(),
                email: None,
                gender: Gender::Male,
                sub_division: Some("Dalhousie".to_string()),
            },
            rooms: vec![
                RoomTypeConfig {
                    room_type: RoomType::Double,
                    count: 2,
                    beds_per_room: 2,
                    nightly_rate: 4_500,
                },
                RoomTypeConfig {
                    room_type: RoomType::Family,
                    count: 1,
                    beds_per_room: 4,
                    nightly_rate: 6_000,
                },
            ],
            validity_years: 1,
            declared_category: None,
            existing_certificate_number: None,
        }
    }

    pub(super) fn post(uri: &str, role: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::post(uri).header(header::CONTENT_TYPE, "application/json");
        if let Some(role) = role {
            builder = builder.header("x-actor-role", role);
        }
        builder
            .body(Body::from(serde_json::to_vec(&body).expect("encode body")))
            .expect("request")
    }

    pub(super) async fn json_body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .expect("read body");
        serde_json::from_slice(&bytes).expect("json payload")
    }
}

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Months;
use serde_json::json;
use tower::ServiceExt;

use common::*;
use homestay_registry::workflows::registration::memory::InspectionEntry;
use homestay_registry::workflows::registration::{
    registration_router, ApplicationId, ApplicationKind, ApplicationStatus, Category,
    PaymentConfirmation, Role, Stage, SubmissionPayload, TransitionPayload, WorkflowAction,
    WorkflowError,
};

#[tokio::test]
async fn municipal_gold_registration_flows_from_draft_to_certificate() {
    let world = world();
    let router = registration_router(world.service.clone());

    let created = router
        .clone()
        .oneshot(post(
            "/api/v1/homestay/applications",
            Some("property_owner"),
            serde_json::to_value(municipal_draft(ApplicationKind::NewRegistration))
                .expect("draft json"),
        ))
        .await
        .expect("create");
    assert_eq!(created.status(), StatusCode::CREATED);
    let created = json_body(created).await;
    assert_eq!(created["category"], "gold");
    let id = created["id"].as_str().expect("id").to_string();
    let base = format!("/api/v1/homestay/applications/{id}");

    let submitted = router
        .clone()
        .oneshot(post(
            &format!("{base}/submit"),
            Some("property_owner"),
            json!({ "declaration_accepted": true }),
        ))
        .await
        .expect("submit");
    assert_eq!(submitted.status(), StatusCode::OK);
    let submitted = json_body(submitted).await;
    assert_eq!(submitted["total_fee"]["total_fee"], 15_000);
    assert!(submitted["application_number"]
        .as_str()
        .is_some_and(|number| number.starts_with("HS/")));

    let steps = [
        ("dealing_assistant", json!({ "action": "forward_to_dtdo" })),
        (
            "district_officer",
            json!({ "action": "schedule_inspection", "inspection_date": "2025-05-02" }),
        ),
        (
            "dealing_assistant",
            json!({
                "action": "submit_report",
                "report": {
                    "inspected_on": "2025-05-02",
                    "findings": "Fire extinguisher and first-aid kit present",
                    "recommendation": "approve"
                }
            }),
        ),
        (
            "district_officer",
            json!({ "action": "approve", "expected_status": "inspection_completed" }),
        ),
    ];
    for (role, body) in steps {
        let response = router
            .clone()
            .oneshot(post(&format!("{base}/transitions"), Some(role), body))
            .await
            .expect("transition");
        assert_eq!(response.status(), StatusCode::OK, "{role}");
    }

    let pending = world
        .service
        .get(&ApplicationId(id.clone()))
        .expect("pending application");
    assert_eq!(pending.status(), ApplicationStatus::PaymentPending);

    world.payments.settle("HPPAY-77120", 15_000);
    let paid = router
        .clone()
        .oneshot(post(
            &format!("{base}/payments"),
            None,
            json!({ "outcome": "confirmed", "payment_reference": "HPPAY-77120" }),
        ))
        .await
        .expect("payment callback");
    assert_eq!(paid.status(), StatusCode::OK);
    let paid = json_body(paid).await;
    assert_eq!(paid["workflow"]["status"], "approved");
    assert_eq!(paid["workflow"]["payment_reference"], "HPPAY-77120");

    let application = world
        .service
        .get(&ApplicationId(id.clone()))
        .expect("approved application");
    let certificate = application.certificate.expect("certificate issued");
    assert!(certificate.number.starts_with("HS-CERT-"));
    assert_eq!(
        certificate.issued_on.checked_add_months(Months::new(12)),
        Some(certificate.expires_on)
    );

    let audit = router
        .oneshot(
            Request::get(format!("{base}/audit"))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("audit");
    let audit = json_body(audit).await;
    let actions: Vec<&str> = audit
        .as_array()
        .expect("audit list")
        .iter()
        .filter_map(|entry| entry["action"].as_str())
        .collect();
    assert_eq!(
        actions,
        vec![
            "submit",
            "forward_to_dtdo",
            "schedule_inspection",
            "submit_report",
            "approve",
            "confirm_payment",
        ]
    );

    let templates: Vec<String> = world
        .notifier
        .notices()
        .into_iter()
        .map(|notice| notice.template)
        .collect();
    assert!(templates.iter().any(|template| template == "payment_due"));
    assert!(templates.iter().any(|template| template == "application_approved"));
    assert_eq!(world.inspections.entries().len(), 2);
    assert!(matches!(
        world.inspections.entries().first(),
        Some(InspectionEntry::Scheduled { .. })
    ));
}

#[test]
fn onboarding_existing_certificate_skips_inspection_and_payment() {
    let world = world();
    let mut draft = municipal_draft(ApplicationKind::ExistingRcOnboarding);
    draft.existing_certificate_number = Some("HS/CHB/2019/0042".to_string());

    let created = world
        .service
        .create_draft(Role::PropertyOwner, draft)
        .expect("draft");
    let submitted = world
        .service
        .submit_application(
            &created.id,
            Role::PropertyOwner,
            SubmissionPayload {
                declaration_accepted: true,
            },
        )
        .expect("submitted");
    assert_eq!(submitted.status(), ApplicationStatus::Submitted);

    world
        .service
        .transition(
            &created.id,
            Role::DealingAssistant,
            WorkflowAction::ForwardToDtdo,
            TransitionPayload::default(),
        )
        .expect("forwarded");
    let approved = world
        .service
        .transition(
            &created.id,
            Role::DistrictOfficer,
            WorkflowAction::Approve,
            TransitionPayload::default(),
        )
        .expect("approved without payment");

    assert_eq!(approved.status(), ApplicationStatus::Approved);
    assert!(approved.certificate.is_some());
    assert!(world.inspections.entries().is_empty());

    let stage = world
        .service
        .stage(&created.id, Role::PropertyOwner)
        .expect("stage");
    assert_eq!(stage.view.stage, Stage::Approved);
}

#[test]
fn renewal_payment_must_match_the_quoted_fee() {
    let world = world();
    let created = world
        .service
        .create_draft(Role::PropertyOwner, municipal_draft(ApplicationKind::Renewal))
        .expect("draft");
    world
        .service
        .submit_application(
            &created.id,
            Role::PropertyOwner,
            SubmissionPayload {
                declaration_accepted: true,
            },
        )
        .expect("submitted");
    world
        .service
        .transition(
            &created.id,
            Role::DealingAssistant,
            WorkflowAction::ForwardToDtdo,
            TransitionPayload::default(),
        )
        .expect("forwarded");
    let pending = world
        .service
        .transition(
            &created.id,
            Role::DistrictOfficer,
            WorkflowAction::Approve,
            TransitionPayload::default(),
        )
        .expect("payment due");
    assert_eq!(pending.status(), ApplicationStatus::PaymentPending);
    assert_eq!(pending.category, Some(Category::Gold));

    world.payments.settle("HPPAY-SHORT", 1_500);
    let err = world
        .service
        .confirm_payment(
            &created.id,
            PaymentConfirmation {
                payment_reference: "HPPAY-SHORT".to_string(),
            },
        )
        .expect_err("amount does not match the fee");
    assert!(matches!(err, WorkflowError::Payment(_)));

    let still_pending = world.service.get(&created.id).expect("application");
    assert_eq!(still_pending.status(), ApplicationStatus::PaymentPending);
}
