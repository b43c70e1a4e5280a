use crate::infra::{fee_engine, parse_location, Backends};
use chrono::{Duration, Local};
use clap::Args;
use homestay_registry::config::AppConfig;
use homestay_registry::error::AppError;
use homestay_registry::workflows::registration::{
    Application, ApplicationDraft, ApplicationKind, FeeBreakdown, FeeQuoteRequest, Gender,
    InMemoryRepository, InspectionRecommendation, InspectionReport, LocationType,
    OwnerAttributes, OwnerProfile, PaymentConfirmation, PropertyDetails, RegistrationService,
    Role, RoomType, RoomTypeConfig, SubmissionPayload, TransitionPayload, WorkflowAction,
};

#[derive(Args, Debug)]
pub(crate) struct FeeQuoteArgs {
    /// Highest nightly room rate in rupees
    #[arg(long)]
    pub(crate) rate: u32,
    /// Location type: gram_panchayat, town_planning_area or municipal_corporation
    #[arg(long, value_parser = parse_location)]
    pub(crate) location: LocationType,
    /// Certificate validity in years (1 or 3)
    #[arg(long, default_value_t = 1)]
    pub(crate) validity: u8,
    /// Number of rooms at the given rate
    #[arg(long, default_value_t = 1)]
    pub(crate) rooms: u8,
    /// Apply the female owner discount
    #[arg(long)]
    pub(crate) female: bool,
    /// Owner's sub-division, checked against the discounted list
    #[arg(long)]
    pub(crate) sub_division: Option<String>,
}

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Nightly rate of the demo property's rooms
    #[arg(long, default_value_t = 2_500)]
    pub(crate) rate: u32,
    /// Location type of the demo property
    #[arg(long, value_parser = parse_location, default_value = "gram_panchayat")]
    pub(crate) location: LocationType,
    /// Certificate validity in years (1 or 3)
    #[arg(long, default_value_t = 3)]
    pub(crate) validity: u8,
}

pub(crate) fn run_fee_quote(args: FeeQuoteArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let engine = fee_engine(&config.fees)?;

    let request = FeeQuoteRequest {
        rooms: vec![RoomTypeConfig {
            room_type: RoomType::Double,
            count: args.rooms,
            beds_per_room: 2,
            nightly_rate: args.rate,
        }],
        location_type: args.location,
        validity_years: args.validity,
        owner: OwnerAttributes {
            gender: if args.female {
                Gender::Female
            } else {
                Gender::Other
            },
            sub_division: args.sub_division,
        },
    };

    match engine.quote(&request) {
        Ok(quote) => render_fee(&quote),
        Err(err) => println!("Quote unavailable: {}", err),
    }
    Ok(())
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let backends = Backends::default();
    let service = backends.service(fee_engine(&config.fees)?);

    println!("Homestay registration demo");
    let draft = demo_draft(&args);
    let application = service.create_draft(Role::PropertyOwner, draft)?;
    print_stage(&service, &application, "Draft saved")?;

    let application = service.submit_application(
        &application.id,
        Role::PropertyOwner,
        SubmissionPayload {
            declaration_accepted: true,
        },
    )?;
    println!(
        "Application number {} ({} category)",
        application.application_number.as_deref().unwrap_or("-"),
        application
            .category
            .map(|category| category.label())
            .unwrap_or("unclassified")
    );
    if let Some(fee) = &application.total_fee {
        render_fee(fee);
    }
    print_stage(&service, &application, "Submitted by owner")?;

    let inspection_date = Local::now().date_naive() + Duration::days(7);
    let steps = [
        (
            Role::DealingAssistant,
            WorkflowAction::ForwardToDtdo,
            TransitionPayload::default(),
        ),
        (
            Role::DistrictOfficer,
            WorkflowAction::ScheduleInspection,
            TransitionPayload {
                inspection_date: Some(inspection_date),
                ..TransitionPayload::default()
            },
        ),
        (
            Role::DealingAssistant,
            WorkflowAction::SubmitReport,
            TransitionPayload {
                report: Some(InspectionReport {
                    inspected_on: inspection_date,
                    findings: "Rooms and tariff card match the declaration".to_string(),
                    recommendation: InspectionRecommendation::Approve,
                }),
                ..TransitionPayload::default()
            },
        ),
        (
            Role::DistrictOfficer,
            WorkflowAction::Approve,
            TransitionPayload::default(),
        ),
    ];

    let mut application = application;
    for (role, action, payload) in steps {
        application = service.transition(&application.id, role, action, payload)?;
        print_stage(&service, &application, &format!("{} by {}", action, role))?;
    }

    if let Some(fee) = application.total_fee.as_ref().map(|fee| fee.total_fee) {
        if fee > 0 {
            let reference = format!("DEMO-{}", application.id);
            backends.payments.settle(reference.clone(), fee);
            application = service.confirm_payment(
                &application.id,
                PaymentConfirmation {
                    payment_reference: reference,
                },
            )?;
            print_stage(&service, &application, "Payment confirmed")?;
        }
    }

    if let Some(certificate) = &application.certificate {
        println!(
            "\nCertificate {} valid {} -> {}",
            certificate.number, certificate.issued_on, certificate.expires_on
        );
    }

    let notices = backends.notifier.notices();
    if notices.is_empty() {
        println!("Notices: none dispatched");
    } else {
        println!("Notices");
        for notice in notices {
            println!("- {} -> {}", notice.template, notice.recipient);
        }
    }

    println!("Audit trail");
    for entry in service.audit_trail(&application.id.0)? {
        let to = entry
            .to
            .map(|status| status.label())
            .unwrap_or("(removed)");
        println!(
            "- {} {} by {}: {} -> {}",
            entry.at.format("%Y-%m-%d %H:%M"),
            entry.action,
            entry.actor,
            entry.from.label(),
            to
        );
    }

    Ok(())
}

pub(crate) fn demo_draft(args: &DemoArgs) -> ApplicationDraft {
    ApplicationDraft {
        kind: ApplicationKind::NewRegistration,
        property: PropertyDetails {
            name: "Deodar Retreat".to_string(),
            address: "Ward 4, Killar".to_string(),
            district: "Chamba".to_string(),
            location_type: args.location,
        },
        owner: OwnerProfile {
            name: "Kamla Devi".to_string(),
            mobile: "9816000001".to_string(),
            email: None,
            gender: Gender::Female,
            sub_division: Some("Pangi".to_string()),
        },
        rooms: vec![RoomTypeConfig {
            room_type: RoomType::Double,
            count: 3,
            beds_per_room: 2,
            nightly_rate: args.rate,
        }],
        validity_years: args.validity,
        declared_category: None,
        existing_certificate_number: None,
    }
}

fn print_stage(
    service: &RegistrationService<InMemoryRepository>,
    application: &Application,
    event: &str,
) -> Result<(), AppError> {
    let owner = service.stage(&application.id, Role::PropertyOwner)?;
    let officer = service.stage(&application.id, Role::DistrictOfficer)?;
    println!(
        "\n{}\n- status {} | pill '{}' | owner actionable: {} | DTDO actionable: {}",
        event,
        application.status(),
        owner.view.pill.label,
        owner.actionable,
        officer.actionable
    );
    Ok(())
}

fn render_fee(fee: &FeeBreakdown) {
    println!(
        "Fee quote: {} / {} for {} year(s)",
        fee.category.label(),
        fee.location_type.label(),
        fee.validity_years
    );
    println!(
        "- base {} x {} = {} before discounts",
        fee.base_fee, fee.validity_years, fee.total_before_discount
    );
    println!(
        "- discounts: validity {} | female owner {} | sub-division {}",
        fee.validity_discount, fee.female_owner_discount, fee.sub_division_discount
    );
    println!(
        "- total {} (saves {}, {:.2}%)",
        fee.total_fee, fee.savings_amount, fee.savings_percentage
    );
}
