//! Role policy gate: which actions a role may take on a record in a given status.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::domain::ApplicationStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    PropertyOwner,
    DealingAssistant,
    #[serde(alias = "district_tourism_officer")]
    DistrictOfficer,
    Admin,
    SuperAdmin,
}

impl Role {
    pub const fn label(self) -> &'static str {
        match self {
            Role::PropertyOwner => "property_owner",
            Role::DealingAssistant => "dealing_assistant",
            Role::DistrictOfficer => "district_officer",
            Role::Admin => "admin",
            Role::SuperAdmin => "super_admin",
        }
    }

    pub const fn is_administrative(self) -> bool {
        matches!(self, Role::Admin | Role::SuperAdmin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Every action the gate knows about, including owner-side record management.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowAction {
    EditDraft,
    Discard,
    Submit,
    StartScrutiny,
    ForwardToDtdo,
    Revert,
    RaiseObjection,
    Resubmit,
    ResubmitToDtdo,
    ScheduleInspection,
    SubmitReport,
    VerifyForPayment,
    Approve,
    ConfirmPayment,
    Reject,
    RequestAmendment,
}

impl WorkflowAction {
    pub const fn label(self) -> &'static str {
        match self {
            WorkflowAction::EditDraft => "edit_draft",
            WorkflowAction::Discard => "discard",
            WorkflowAction::Submit => "submit",
            WorkflowAction::StartScrutiny => "start_scrutiny",
            WorkflowAction::ForwardToDtdo => "forward_to_dtdo",
            WorkflowAction::Revert => "revert",
            WorkflowAction::RaiseObjection => "raise_objection",
            WorkflowAction::Resubmit => "resubmit",
            WorkflowAction::ResubmitToDtdo => "resubmit_to_dtdo",
            WorkflowAction::ScheduleInspection => "schedule_inspection",
            WorkflowAction::SubmitReport => "submit_report",
            WorkflowAction::VerifyForPayment => "verify_for_payment",
            WorkflowAction::Approve => "approve",
            WorkflowAction::ConfirmPayment => "confirm_payment",
            WorkflowAction::Reject => "reject",
            WorkflowAction::RequestAmendment => "request_amendment",
        }
    }
}

impl fmt::Display for WorkflowAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

const REVIEW_ROLES: [Role; 3] = [
    Role::PropertyOwner,
    Role::DealingAssistant,
    Role::DistrictOfficer,
];

/// Actions `role` may perform while a record sits in `status`.
///
/// Administrative roles receive the union of every reviewing role's actions.
pub fn allowed_actions(role: Role, status: ApplicationStatus) -> BTreeSet<WorkflowAction> {
    if role.is_administrative() {
        return REVIEW_ROLES
            .into_iter()
            .flat_map(|role| role_actions(role, status).iter().copied())
            .collect();
    }
    role_actions(role, status).iter().copied().collect()
}

pub fn is_allowed(role: Role, status: ApplicationStatus, action: WorkflowAction) -> bool {
    allowed_actions(role, status).contains(&action)
}

fn role_actions(role: Role, status: ApplicationStatus) -> &'static [WorkflowAction] {
    use ApplicationStatus as S;
    use WorkflowAction as A;

    if status.is_terminal() {
        return match (role, status) {
            (Role::PropertyOwner, S::Approved) => &[A::RequestAmendment],
            _ => &[],
        };
    }

    match role {
        Role::PropertyOwner => match status {
            S::Draft => &[A::EditDraft, A::Submit, A::Discard],
            S::SentBackForCorrections => &[A::Resubmit],
            S::RevertedByDtdo | S::ObjectionRaised => &[A::Resubmit, A::ResubmitToDtdo],
            S::PaymentPending => &[A::ConfirmPayment],
            _ => &[],
        },
        Role::DealingAssistant => match status {
            S::Draft => &[],
            S::Submitted => &[A::StartScrutiny, A::ForwardToDtdo, A::Revert, A::Reject],
            S::UnderScrutiny => &[A::ForwardToDtdo, A::Revert, A::Reject],
            S::InspectionScheduled => &[A::SubmitReport, A::Reject],
            S::InspectionCompleted => &[A::VerifyForPayment, A::Reject],
            _ => &[A::Reject],
        },
        Role::DistrictOfficer => match status {
            S::Draft => &[],
            S::ForwardedToDtdo => &[
                A::ScheduleInspection,
                A::Approve,
                A::Revert,
                A::RaiseObjection,
                A::Reject,
            ],
            S::InspectionCompleted | S::VerifiedForPayment => {
                &[A::Approve, A::Revert, A::RaiseObjection, A::Reject]
            }
            _ => &[A::Reject],
        },
        Role::Admin | Role::SuperAdmin => &[],
    }
}
