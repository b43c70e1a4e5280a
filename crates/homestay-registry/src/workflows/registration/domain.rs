use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::fees::FeeBreakdown;

/// Identifier wrapper for applications.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApplicationId(pub String);

/// Identifier wrapper for amendment (service) requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceRequestId(pub String);

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ServiceRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Tariff band of a homestay, ordered from lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Silver,
    Gold,
    Diamond,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Silver, Category::Gold, Category::Diamond];

    pub const fn label(self) -> &'static str {
        match self {
            Category::Silver => "silver",
            Category::Gold => "gold",
            Category::Diamond => "diamond",
        }
    }

    /// Gold and Diamond homestays must attach utility bills before submission.
    pub const fn requires_utility_bills(self) -> bool {
        matches!(self, Category::Gold | Category::Diamond)
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "silver" => Ok(Category::Silver),
            "gold" => Ok(Category::Gold),
            "diamond" => Ok(Category::Diamond),
            other => Err(format!("unknown category '{other}'")),
        }
    }
}

/// Local body governing the property; drives the base fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationType {
    GramPanchayat,
    MunicipalCorporation,
    TownPlanningArea,
}

impl LocationType {
    pub const ALL: [LocationType; 3] = [
        LocationType::GramPanchayat,
        LocationType::TownPlanningArea,
        LocationType::MunicipalCorporation,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            LocationType::GramPanchayat => "gram_panchayat",
            LocationType::MunicipalCorporation => "municipal_corporation",
            LocationType::TownPlanningArea => "town_planning_area",
        }
    }
}

impl FromStr for LocationType {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "gram_panchayat" | "gp" => Ok(LocationType::GramPanchayat),
            "municipal_corporation" | "mc" => Ok(LocationType::MunicipalCorporation),
            "town_planning_area" | "tcp" => Ok(LocationType::TownPlanningArea),
            other => Err(format!("unknown location type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    Other,
}

/// Owner identity plus the attributes the fee engine looks at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerProfile {
    pub name: String,
    pub mobile: String,
    #[serde(default)]
    pub email: Option<String>,
    pub gender: Gender,
    #[serde(default)]
    pub sub_division: Option<String>,
}

impl OwnerProfile {
    pub fn fee_attributes(&self) -> OwnerAttributes {
        OwnerAttributes {
            gender: self.gender,
            sub_division: self.sub_division.clone(),
        }
    }
}

/// Subset of owner data relevant to discounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerAttributes {
    pub gender: Gender,
    #[serde(default)]
    pub sub_division: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDetails {
    pub name: String,
    pub address: String,
    pub district: String,
    pub location_type: LocationType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomType {
    Single,
    Double,
    Family,
    Suite,
}

/// One row of the room configuration: `count` rooms of the same type and tariff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomTypeConfig {
    pub room_type: RoomType,
    pub count: u8,
    pub beds_per_room: u8,
    pub nightly_rate: u32,
}

/// Aggregate helpers over a room configuration.
pub trait RoomConfiguration {
    fn total_rooms(&self) -> u32;
    fn total_beds(&self) -> u32;
    fn highest_rate(&self) -> Option<u32>;
}

impl RoomConfiguration for [RoomTypeConfig] {
    fn total_rooms(&self) -> u32 {
        self.iter().map(|room| room.count as u32).sum()
    }

    fn total_beds(&self) -> u32 {
        self.iter()
            .map(|room| room.count as u32 * room.beds_per_room as u32)
            .sum()
    }

    fn highest_rate(&self) -> Option<u32> {
        self.iter()
            .filter(|room| room.count > 0)
            .map(|room| room.nightly_rate)
            .max()
    }
}

/// Registration and amendment kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationKind {
    NewRegistration,
    Renewal,
    ExistingRcOnboarding,
    AddRooms,
    DeleteRooms,
    ChangeCategory,
    ChangeOwnership,
    CancelCertificate,
}

impl ApplicationKind {
    pub const fn label(self) -> &'static str {
        match self {
            ApplicationKind::NewRegistration => "new_registration",
            ApplicationKind::Renewal => "renewal",
            ApplicationKind::ExistingRcOnboarding => "existing_rc_onboarding",
            ApplicationKind::AddRooms => "add_rooms",
            ApplicationKind::DeleteRooms => "delete_rooms",
            ApplicationKind::ChangeCategory => "change_category",
            ApplicationKind::ChangeOwnership => "change_ownership",
            ApplicationKind::CancelCertificate => "cancel_certificate",
        }
    }

    pub const fn is_service_request(self) -> bool {
        !matches!(
            self,
            ApplicationKind::NewRegistration
                | ApplicationKind::Renewal
                | ApplicationKind::ExistingRcOnboarding
        )
    }

    /// Kinds that must pass a site inspection before the DTDO can approve.
    pub const fn requires_inspection(self) -> bool {
        matches!(
            self,
            ApplicationKind::NewRegistration
                | ApplicationKind::AddRooms
                | ApplicationKind::ChangeCategory
        )
    }
}

impl fmt::Display for ApplicationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Every status an application or service request can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Draft,
    Submitted,
    UnderScrutiny,
    SentBackForCorrections,
    ForwardedToDtdo,
    ObjectionRaised,
    RevertedByDtdo,
    InspectionScheduled,
    InspectionCompleted,
    PaymentPending,
    VerifiedForPayment,
    Approved,
    Rejected,
    Cancelled,
}

impl ApplicationStatus {
    pub const ALL: [ApplicationStatus; 14] = [
        ApplicationStatus::Draft,
        ApplicationStatus::Submitted,
        ApplicationStatus::UnderScrutiny,
        ApplicationStatus::SentBackForCorrections,
        ApplicationStatus::ForwardedToDtdo,
        ApplicationStatus::ObjectionRaised,
        ApplicationStatus::RevertedByDtdo,
        ApplicationStatus::InspectionScheduled,
        ApplicationStatus::InspectionCompleted,
        ApplicationStatus::PaymentPending,
        ApplicationStatus::VerifiedForPayment,
        ApplicationStatus::Approved,
        ApplicationStatus::Rejected,
        ApplicationStatus::Cancelled,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStatus::Draft => "draft",
            ApplicationStatus::Submitted => "submitted",
            ApplicationStatus::UnderScrutiny => "under_scrutiny",
            ApplicationStatus::SentBackForCorrections => "sent_back_for_corrections",
            ApplicationStatus::ForwardedToDtdo => "forwarded_to_dtdo",
            ApplicationStatus::ObjectionRaised => "objection_raised",
            ApplicationStatus::RevertedByDtdo => "reverted_by_dtdo",
            ApplicationStatus::InspectionScheduled => "inspection_scheduled",
            ApplicationStatus::InspectionCompleted => "inspection_completed",
            ApplicationStatus::PaymentPending => "payment_pending",
            ApplicationStatus::VerifiedForPayment => "verified_for_payment",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::Cancelled => "cancelled",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            ApplicationStatus::Approved | ApplicationStatus::Rejected | ApplicationStatus::Cancelled
        )
    }

    /// Statuses in which the owner has to act on a reviewer's remark.
    pub const fn requires_correction(self) -> bool {
        matches!(
            self,
            ApplicationStatus::SentBackForCorrections
                | ApplicationStatus::RevertedByDtdo
                | ApplicationStatus::ObjectionRaised
        )
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ApplicationStatus {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let needle = raw.trim();
        ApplicationStatus::ALL
            .into_iter()
            .find(|status| status.label() == needle)
            .ok_or_else(|| format!("unknown application status '{needle}'"))
    }
}

/// Owner's note attached to a resubmission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionNote {
    pub at: DateTime<Utc>,
    pub note: String,
}

/// Reviewer remark recorded when an application is sent back or objected to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevertNote {
    pub at: DateTime<Utc>,
    pub by: super::policy::Role,
    pub remark: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InspectionRecommendation {
    Approve,
    ApproveWithConditions,
    Reject,
}

/// Field report filed after the site visit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectionReport {
    pub inspected_on: NaiveDate,
    pub findings: String,
    pub recommendation: InspectionRecommendation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateDetails {
    pub number: String,
    pub issued_on: NaiveDate,
    pub expires_on: NaiveDate,
}

/// Status and timeline shared by applications and service requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub status: ApplicationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub inspection_scheduled_for: Option<NaiveDate>,
    pub inspection_completed_at: Option<DateTime<Utc>>,
    pub inspection_report: Option<InspectionReport>,
    pub correction_submission_count: u32,
    pub latest_correction: Option<CorrectionNote>,
    pub latest_revert: Option<RevertNote>,
    pub rejection_remark: Option<String>,
    pub payment_reference: Option<String>,
    pub version: u64,
}

impl WorkflowState {
    pub fn new(created_at: DateTime<Utc>) -> Self {
        Self {
            status: ApplicationStatus::Draft,
            created_at,
            updated_at: created_at,
            submitted_at: None,
            approved_at: None,
            inspection_scheduled_for: None,
            inspection_completed_at: None,
            inspection_report: None,
            correction_submission_count: 0,
            latest_correction: None,
            latest_revert: None,
            rejection_remark: None,
            payment_reference: None,
            version: 0,
        }
    }
}

/// Owner-editable fields of an application draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationDraft {
    pub kind: ApplicationKind,
    pub property: PropertyDetails,
    pub owner: OwnerProfile,
    #[serde(default)]
    pub rooms: Vec<RoomTypeConfig>,
    pub validity_years: u8,
    #[serde(default)]
    pub declared_category: Option<Category>,
    #[serde(default)]
    pub existing_certificate_number: Option<String>,
}

/// Application record as persisted by the repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub application_number: Option<String>,
    pub kind: ApplicationKind,
    pub category: Option<Category>,
    pub declared_category: Option<Category>,
    pub property: PropertyDetails,
    pub owner: OwnerProfile,
    pub rooms: Vec<RoomTypeConfig>,
    pub validity_years: u8,
    pub existing_certificate_number: Option<String>,
    pub workflow: WorkflowState,
    pub total_fee: Option<FeeBreakdown>,
    pub certificate: Option<CertificateDetails>,
}

impl Application {
    pub fn status(&self) -> ApplicationStatus {
        self.workflow.status
    }
}

/// Tagged payload describing what an amendment changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AmendmentPayload {
    AddRooms {
        rooms: Vec<RoomTypeConfig>,
    },
    DeleteRooms {
        rooms: Vec<RoomRemoval>,
    },
    ChangeCategory {
        target: Category,
        revised_rooms: Vec<RoomTypeConfig>,
    },
    ChangeOwnership {
        new_owner: OwnerProfile,
        proof_of_transfer: String,
    },
    CancelCertificate {
        reason: String,
    },
}

impl AmendmentPayload {
    pub const fn kind(&self) -> ApplicationKind {
        match self {
            AmendmentPayload::AddRooms { .. } => ApplicationKind::AddRooms,
            AmendmentPayload::DeleteRooms { .. } => ApplicationKind::DeleteRooms,
            AmendmentPayload::ChangeCategory { .. } => ApplicationKind::ChangeCategory,
            AmendmentPayload::ChangeOwnership { .. } => ApplicationKind::ChangeOwnership,
            AmendmentPayload::CancelCertificate { .. } => ApplicationKind::CancelCertificate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomRemoval {
    pub room_type: RoomType,
    pub count: u8,
}

/// Amendment against an approved application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRequest {
    pub id: ServiceRequestId,
    pub parent_id: ApplicationId,
    pub payload: AmendmentPayload,
    pub workflow: WorkflowState,
    pub resulting_category: Option<Category>,
    pub fee: Option<FeeBreakdown>,
    pub upgrade_fee: u64,
}

impl ServiceRequest {
    pub fn kind(&self) -> ApplicationKind {
        self.payload.kind()
    }

    pub fn status(&self) -> ApplicationStatus {
        self.workflow.status
    }

    pub fn is_active(&self) -> bool {
        !self.workflow.status.is_terminal()
    }
}

/// Documents the reviewer chain expects to find in the document store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    IdentityProof,
    OwnershipProof,
    PropertyPhotos,
    ElectricityBill,
    WaterBill,
    ExistingCertificate,
    TransferDeed,
}

impl DocumentKind {
    pub const fn label(self) -> &'static str {
        match self {
            DocumentKind::IdentityProof => "identity_proof",
            DocumentKind::OwnershipProof => "ownership_proof",
            DocumentKind::PropertyPhotos => "property_photos",
            DocumentKind::ElectricityBill => "electricity_bill",
            DocumentKind::WaterBill => "water_bill",
            DocumentKind::ExistingCertificate => "existing_certificate",
            DocumentKind::TransferDeed => "transfer_deed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_labels_round_trip_through_from_str() {
        for status in ApplicationStatus::ALL {
            assert_eq!(status.label().parse::<ApplicationStatus>(), Ok(status));
        }
        assert!("awaiting_owner".parse::<ApplicationStatus>().is_err());
    }

    #[test]
    fn location_type_accepts_common_spellings() {
        assert_eq!(
            "Gram-Panchayat".parse::<LocationType>(),
            Ok(LocationType::GramPanchayat)
        );
        assert_eq!("tcp".parse::<LocationType>(), Ok(LocationType::TownPlanningArea));
        assert!("cantonment".parse::<LocationType>().is_err());
    }

    #[test]
    fn room_aggregates_skip_empty_rows_for_rate() {
        let rooms = vec![
            RoomTypeConfig {
                room_type: RoomType::Double,
                count: 2,
                beds_per_room: 2,
                nightly_rate: 2500,
            },
            RoomTypeConfig {
                room_type: RoomType::Suite,
                count: 0,
                beds_per_room: 3,
                nightly_rate: 12000,
            },
        ];
        assert_eq!(rooms.total_rooms(), 2);
        assert_eq!(rooms.total_beds(), 4);
        assert_eq!(rooms.highest_rate(), Some(2500));
    }
}
