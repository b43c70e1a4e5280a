//! Single status classification consumed by every owner and officer screen.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{ApplicationStatus, WorkflowState};
use super::policy::{allowed_actions, Role, WorkflowAction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Draft,
    UnderReview,
    AwaitingOwner,
    Resubmitted,
    WithDistrictOfficer,
    Inspection,
    Payment,
    Approved,
    Rejected,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PillTone {
    Neutral,
    Info,
    Warning,
    Success,
    Danger,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pill {
    pub label: &'static str,
    pub tone: PillTone,
}

/// Inputs the classification depends on; nothing else is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageInputs {
    pub status: ApplicationStatus,
    pub correction_submission_count: u32,
    pub latest_correction_at: Option<DateTime<Utc>>,
    pub latest_revert_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
}

impl From<&WorkflowState> for StageInputs {
    fn from(workflow: &WorkflowState) -> Self {
        Self {
            status: workflow.status,
            correction_submission_count: workflow.correction_submission_count,
            latest_correction_at: workflow.latest_correction.as_ref().map(|note| note.at),
            latest_revert_at: workflow.latest_revert.as_ref().map(|note| note.at),
            approved_at: workflow.approved_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageView {
    pub stage: Stage,
    pub pill: Pill,
    pub is_awaiting_owner: bool,
    pub is_resubmitted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_on: Option<NaiveDate>,
}

/// Stage as seen by a particular role, with whether that role has work to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ViewerStage {
    #[serde(flatten)]
    pub view: StageView,
    pub actionable: bool,
}

fn resubmitted(inputs: &StageInputs) -> bool {
    if inputs.correction_submission_count == 0 {
        return false;
    }
    match (inputs.latest_correction_at, inputs.latest_revert_at) {
        (Some(correction), Some(revert)) => correction > revert,
        (Some(_), None) => true,
        (None, _) => false,
    }
}

pub fn derive_stage(inputs: &StageInputs) -> StageView {
    use ApplicationStatus as S;

    let status = inputs.status;
    let open = !status.is_terminal() && status != S::Draft;
    let is_resubmitted = open && resubmitted(inputs);
    let is_awaiting_owner = status.requires_correction() && !is_resubmitted;

    let stage = match status {
        S::Draft => Stage::Draft,
        S::SentBackForCorrections | S::RevertedByDtdo | S::ObjectionRaised => {
            if is_resubmitted {
                Stage::Resubmitted
            } else {
                Stage::AwaitingOwner
            }
        }
        S::Submitted | S::UnderScrutiny if is_resubmitted => Stage::Resubmitted,
        S::Submitted | S::UnderScrutiny => Stage::UnderReview,
        S::ForwardedToDtdo => Stage::WithDistrictOfficer,
        S::InspectionScheduled | S::InspectionCompleted => Stage::Inspection,
        S::VerifiedForPayment | S::PaymentPending => Stage::Payment,
        S::Approved => Stage::Approved,
        S::Rejected => Stage::Rejected,
        S::Cancelled => Stage::Cancelled,
    };

    let pill = match (stage, status) {
        (Stage::Draft, _) => Pill {
            label: "Draft",
            tone: PillTone::Neutral,
        },
        (Stage::UnderReview, S::UnderScrutiny) => Pill {
            label: "Under scrutiny",
            tone: PillTone::Info,
        },
        (Stage::UnderReview, _) => Pill {
            label: "Submitted",
            tone: PillTone::Info,
        },
        (Stage::AwaitingOwner, S::ObjectionRaised) => Pill {
            label: "Objection raised",
            tone: PillTone::Warning,
        },
        (Stage::AwaitingOwner, _) => Pill {
            label: "Corrections requested",
            tone: PillTone::Warning,
        },
        (Stage::Resubmitted, _) => Pill {
            label: "Resubmitted",
            tone: PillTone::Info,
        },
        (Stage::WithDistrictOfficer, _) => Pill {
            label: "With DTDO",
            tone: PillTone::Info,
        },
        (Stage::Inspection, S::InspectionScheduled) => Pill {
            label: "Inspection scheduled",
            tone: PillTone::Info,
        },
        (Stage::Inspection, _) => Pill {
            label: "Inspection completed",
            tone: PillTone::Info,
        },
        (Stage::Payment, S::PaymentPending) => Pill {
            label: "Payment pending",
            tone: PillTone::Warning,
        },
        (Stage::Payment, _) => Pill {
            label: "Verified for payment",
            tone: PillTone::Info,
        },
        (Stage::Approved, _) => Pill {
            label: "Approved",
            tone: PillTone::Success,
        },
        (Stage::Rejected, _) => Pill {
            label: "Rejected",
            tone: PillTone::Danger,
        },
        (Stage::Cancelled, _) => Pill {
            label: "Cancelled",
            tone: PillTone::Danger,
        },
    };

    StageView {
        stage,
        pill,
        is_awaiting_owner,
        is_resubmitted,
        approved_on: match status {
            S::Approved | S::Cancelled => inputs.approved_at.map(|at| at.date_naive()),
            _ => None,
        },
    }
}

/// Identical classification for every role; only `actionable` depends on the viewer.
pub fn stage_for_viewer(role: Role, inputs: &StageInputs) -> ViewerStage {
    let actionable = allowed_actions(role, inputs.status)
        .into_iter()
        .any(|action| !matches!(action, WorkflowAction::Reject | WorkflowAction::RequestAmendment));

    ViewerStage {
        view: derive_stage(inputs),
        actionable,
    }
}
