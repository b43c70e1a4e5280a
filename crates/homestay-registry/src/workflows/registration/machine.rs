//! Canonical transition table shared by applications and service requests.
//!
//! The table is closed: every `(status, action)` pair not listed here fails with
//! `InvalidTransition`. The role gate is consulted only for pairs that exist, so an
//! unknown move is reported as such rather than as a permission problem.

use chrono::{DateTime, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::classifier::ValidationError;
use super::domain::{
    ApplicationKind, ApplicationStatus, CertificateDetails, CorrectionNote, InspectionReport,
    RevertNote, WorkflowState,
};
use super::error::WorkflowError;
use super::policy::{is_allowed, Role, WorkflowAction};

/// Action-specific inputs supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionPayload {
    /// Status the caller read before acting; a mismatch fails with `StaleState`.
    #[serde(default)]
    pub expected_status: Option<ApplicationStatus>,
    #[serde(default)]
    pub remark: Option<String>,
    #[serde(default)]
    pub correction_note: Option<String>,
    #[serde(default)]
    pub inspection_date: Option<NaiveDate>,
    #[serde(default)]
    pub report: Option<InspectionReport>,
    #[serde(default)]
    pub payment_reference: Option<String>,
}

impl TransitionPayload {
    pub fn with_remark(remark: impl Into<String>) -> Self {
        Self {
            remark: Some(remark.into()),
            ..Self::default()
        }
    }

    pub fn expecting(mut self, status: ApplicationStatus) -> Self {
        self.expected_status = Some(status);
        self
    }

    fn remark(&self) -> Option<&str> {
        self.remark
            .as_deref()
            .map(str::trim)
            .filter(|remark| !remark.is_empty())
    }
}

/// Facts about the record that the table depends on.
#[derive(Debug, Clone, Copy)]
pub struct TransitionContext {
    pub kind: ApplicationKind,
    pub fee_due: u64,
    pub now: DateTime<Utc>,
}

/// Summary of a transition that was applied to a workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedTransition {
    pub action: WorkflowAction,
    pub from: ApplicationStatus,
    pub to: ApplicationStatus,
    pub remark: Option<String>,
}

/// Pure lookup of the status reached by `action` from `from`.
pub fn next_status(
    kind: ApplicationKind,
    from: ApplicationStatus,
    action: WorkflowAction,
    fee_due: u64,
) -> Result<ApplicationStatus, WorkflowError> {
    use ApplicationStatus as S;
    use WorkflowAction as A;

    let settle = || {
        if fee_due > 0 {
            S::PaymentPending
        } else {
            S::Approved
        }
    };

    let to = match (from, action) {
        (S::Draft, A::Submit) => S::Submitted,
        (S::Submitted, A::StartScrutiny) => S::UnderScrutiny,
        (S::Submitted | S::UnderScrutiny, A::ForwardToDtdo) => S::ForwardedToDtdo,
        (S::Submitted | S::UnderScrutiny, A::Revert) => S::SentBackForCorrections,
        (S::SentBackForCorrections | S::RevertedByDtdo | S::ObjectionRaised, A::Resubmit) => {
            S::Submitted
        }
        (S::RevertedByDtdo | S::ObjectionRaised, A::ResubmitToDtdo) => S::ForwardedToDtdo,
        (S::ForwardedToDtdo, A::ScheduleInspection) => S::InspectionScheduled,
        (S::ForwardedToDtdo, A::Approve) => settle(),
        (S::ForwardedToDtdo | S::InspectionCompleted | S::VerifiedForPayment, A::Revert) => {
            S::RevertedByDtdo
        }
        (
            S::ForwardedToDtdo | S::InspectionCompleted | S::VerifiedForPayment,
            A::RaiseObjection,
        ) => S::ObjectionRaised,
        (S::InspectionScheduled, A::SubmitReport) => S::InspectionCompleted,
        (S::InspectionCompleted, A::VerifyForPayment) => S::VerifiedForPayment,
        (S::InspectionCompleted | S::VerifiedForPayment, A::Approve) => settle(),
        (S::PaymentPending, A::ConfirmPayment) => S::Approved,
        (status, A::Reject) if !status.is_terminal() && status != S::Draft => S::Rejected,
        _ => {
            return Err(WorkflowError::InvalidTransition {
                kind,
                from,
                action,
            })
        }
    };

    Ok(to)
}

/// Gate check for a pair that exists in the table.
pub fn authorize(
    role: Role,
    status: ApplicationStatus,
    action: WorkflowAction,
) -> Result<(), WorkflowError> {
    if is_allowed(role, status, action) {
        if role.is_administrative() {
            warn!(role = %role, action = %action, status = %status, "administrative override");
        }
        Ok(())
    } else {
        Err(WorkflowError::Forbidden {
            role,
            action,
            status,
        })
    }
}

/// Record facts a table move needs beyond the caller's payload.
fn check_preconditions(
    kind: ApplicationKind,
    from: ApplicationStatus,
    action: WorkflowAction,
) -> Result<(), WorkflowError> {
    if from == ApplicationStatus::ForwardedToDtdo
        && action == WorkflowAction::Approve
        && kind.requires_inspection()
    {
        return Err(WorkflowError::missing(["inspection_report"]));
    }
    Ok(())
}

/// Table lookup, then the role gate, then record preconditions.
///
/// Callers that touch collaborators before `apply` (payment verification, amendment
/// planning) run this first so an unauthorised actor never reaches them.
pub fn admit(
    kind: ApplicationKind,
    from: ApplicationStatus,
    action: WorkflowAction,
    fee_due: u64,
    role: Role,
) -> Result<ApplicationStatus, WorkflowError> {
    let to = next_status(kind, from, action, fee_due)?;
    if !is_allowed(role, from, action) {
        return Err(WorkflowError::Forbidden {
            role,
            action,
            status: from,
        });
    }
    check_preconditions(kind, from, action)?;
    Ok(to)
}

/// Validate and apply `action` to `workflow`, bumping its version.
pub fn apply(
    workflow: &mut WorkflowState,
    context: TransitionContext,
    role: Role,
    action: WorkflowAction,
    payload: &TransitionPayload,
) -> Result<AppliedTransition, WorkflowError> {
    let from = workflow.status;
    let to = admit(context.kind, from, action, context.fee_due, role)?;
    if role.is_administrative() {
        warn!(role = %role, action = %action, status = %from, "administrative override");
    }

    let remark = payload.remark().map(str::to_string);
    let now = context.now;

    match action {
        WorkflowAction::Revert | WorkflowAction::RaiseObjection => {
            let remark = remark.clone().ok_or_else(|| WorkflowError::missing(["remark"]))?;
            workflow.latest_revert = Some(RevertNote {
                at: now,
                by: role,
                remark,
            });
        }
        WorkflowAction::Reject => {
            let remark = remark.clone().ok_or_else(|| WorkflowError::missing(["remark"]))?;
            workflow.rejection_remark = Some(remark);
        }
        WorkflowAction::Resubmit | WorkflowAction::ResubmitToDtdo => {
            let note = payload
                .correction_note
                .as_deref()
                .map(str::trim)
                .filter(|note| !note.is_empty())
                .or(remark.as_deref())
                .unwrap_or("corrections submitted")
                .to_string();
            workflow.correction_submission_count += 1;
            workflow.latest_correction = Some(CorrectionNote { at: now, note });
        }
        WorkflowAction::ScheduleInspection => {
            let date = payload
                .inspection_date
                .ok_or_else(|| WorkflowError::missing(["inspection_date"]))?;
            if let Some(existing) = workflow.inspection_scheduled_for {
                if date < existing {
                    return Err(ValidationError::Payload(format!(
                        "inspection date {date} is earlier than the scheduled {existing}"
                    ))
                    .into());
                }
            }
            workflow.inspection_scheduled_for = Some(date);
        }
        WorkflowAction::SubmitReport => {
            let report = payload
                .report
                .clone()
                .ok_or_else(|| WorkflowError::missing(["inspection_report"]))?;
            workflow.inspection_completed_at = Some(now);
            workflow.inspection_report = Some(report);
        }
        WorkflowAction::ConfirmPayment => {
            let reference = payload
                .payment_reference
                .as_deref()
                .map(str::trim)
                .filter(|reference| !reference.is_empty())
                .ok_or_else(|| WorkflowError::missing(["payment_reference"]))?;
            workflow.payment_reference = Some(reference.to_string());
        }
        WorkflowAction::Submit => {
            if workflow.submitted_at.is_none() {
                workflow.submitted_at = Some(now);
            }
        }
        _ => {}
    }

    if to == ApplicationStatus::Approved {
        workflow.approved_at = Some(now);
    }

    workflow.status = to;
    workflow.updated_at = now;
    workflow.version += 1;

    Ok(AppliedTransition {
        action,
        from,
        to,
        remark,
    })
}

/// Certificate issued on approval: valid from the approval date for `validity_years`.
pub fn issue_certificate(
    number: String,
    approved_at: DateTime<Utc>,
    validity_years: u8,
) -> CertificateDetails {
    let issued_on = approved_at.date_naive();
    let expires_on = issued_on
        .checked_add_months(Months::new(12 * validity_years as u32))
        .unwrap_or(NaiveDate::MAX);

    CertificateDetails {
        number,
        issued_on,
        expires_on,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeSet, VecDeque};

    use crate::workflows::registration::domain::InspectionRecommendation;

    const ALL_ACTIONS: [WorkflowAction; 16] = [
        WorkflowAction::EditDraft,
        WorkflowAction::Discard,
        WorkflowAction::Submit,
        WorkflowAction::StartScrutiny,
        WorkflowAction::ForwardToDtdo,
        WorkflowAction::Revert,
        WorkflowAction::RaiseObjection,
        WorkflowAction::Resubmit,
        WorkflowAction::ResubmitToDtdo,
        WorkflowAction::ScheduleInspection,
        WorkflowAction::SubmitReport,
        WorkflowAction::VerifyForPayment,
        WorkflowAction::Approve,
        WorkflowAction::ConfirmPayment,
        WorkflowAction::Reject,
        WorkflowAction::RequestAmendment,
    ];

    fn at(minute: u32) -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(2025, 4, 1)
            .and_then(|date| date.and_hms_opt(10, minute, 0))
            .expect("valid timestamp")
            .and_utc()
    }

    fn context(kind: ApplicationKind, fee_due: u64, minute: u32) -> TransitionContext {
        TransitionContext {
            kind,
            fee_due,
            now: at(minute),
        }
    }

    fn successors(
        kind: ApplicationKind,
        fee_due: u64,
        from: ApplicationStatus,
    ) -> Vec<ApplicationStatus> {
        ALL_ACTIONS
            .into_iter()
            .filter(|action| check_preconditions(kind, from, *action).is_ok())
            .filter_map(|action| next_status(kind, from, action, fee_due).ok())
            .collect()
    }

    #[test]
    fn every_reachable_status_can_still_terminate() {
        for kind in [
            ApplicationKind::NewRegistration,
            ApplicationKind::ExistingRcOnboarding,
            ApplicationKind::ChangeOwnership,
        ] {
            for fee_due in [0, 3_150] {
                let mut reachable = BTreeSet::from([ApplicationStatus::Draft]);
                let mut queue = VecDeque::from([ApplicationStatus::Draft]);
                while let Some(status) = queue.pop_front() {
                    for next in successors(kind, fee_due, status) {
                        assert!(ApplicationStatus::ALL.contains(&next));
                        if reachable.insert(next) {
                            queue.push_back(next);
                        }
                    }
                }

                assert!(!reachable.contains(&ApplicationStatus::Cancelled));
                for status in &reachable {
                    let mut seen = BTreeSet::from([*status]);
                    let mut frontier = vec![*status];
                    let mut terminates = status.is_terminal();
                    while let Some(current) = frontier.pop() {
                        if current.is_terminal() {
                            terminates = true;
                            break;
                        }
                        for next in successors(kind, fee_due, current) {
                            if seen.insert(next) {
                                frontier.push(next);
                            }
                        }
                    }
                    assert!(terminates, "{kind}: {status} cannot reach a terminal status");
                }
            }
        }
    }

    #[test]
    fn terminal_statuses_have_no_successors() {
        for status in [
            ApplicationStatus::Approved,
            ApplicationStatus::Rejected,
            ApplicationStatus::Cancelled,
        ] {
            assert!(successors(ApplicationKind::NewRegistration, 100, status).is_empty());
        }
    }

    #[test]
    fn direct_approval_requires_inspection_free_kind() {
        assert!(matches!(
            admit(
                ApplicationKind::NewRegistration,
                ApplicationStatus::ForwardedToDtdo,
                WorkflowAction::Approve,
                0,
                Role::DistrictOfficer,
            ),
            Err(WorkflowError::PreconditionNotMet { .. })
        ));
        assert_eq!(
            admit(
                ApplicationKind::ExistingRcOnboarding,
                ApplicationStatus::ForwardedToDtdo,
                WorkflowAction::Approve,
                0,
                Role::DistrictOfficer,
            )
            .expect("onboarding approves directly"),
            ApplicationStatus::Approved
        );
    }

    #[test]
    fn role_gate_runs_before_record_preconditions() {
        let mut workflow = WorkflowState::new(at(0));
        workflow.status = ApplicationStatus::ForwardedToDtdo;
        let err = apply(
            &mut workflow,
            context(ApplicationKind::NewRegistration, 0, 1),
            Role::PropertyOwner,
            WorkflowAction::Approve,
            &TransitionPayload::default(),
        )
        .expect_err("owner cannot approve");
        assert!(matches!(
            err,
            WorkflowError::Forbidden {
                role: Role::PropertyOwner,
                action: WorkflowAction::Approve,
                ..
            }
        ));
        assert_eq!(workflow.version, 0);
    }

    #[test]
    fn approval_with_fee_due_enters_payment() {
        assert_eq!(
            next_status(
                ApplicationKind::NewRegistration,
                ApplicationStatus::InspectionCompleted,
                WorkflowAction::Approve,
                3_150
            )
            .expect("approve"),
            ApplicationStatus::PaymentPending
        );
    }

    #[test]
    fn out_of_table_pair_is_invalid_before_role_check() {
        let mut workflow = WorkflowState::new(at(0));
        let err = apply(
            &mut workflow,
            context(ApplicationKind::NewRegistration, 0, 1),
            Role::DealingAssistant,
            WorkflowAction::Approve,
            &TransitionPayload::default(),
        )
        .expect_err("draft cannot be approved");
        assert!(matches!(err, WorkflowError::InvalidTransition { .. }));
        assert_eq!(workflow.status, ApplicationStatus::Draft);
        assert_eq!(workflow.version, 0);
    }

    #[test]
    fn wrong_role_is_forbidden() {
        let mut workflow = WorkflowState::new(at(0));
        workflow.status = ApplicationStatus::Submitted;
        let err = apply(
            &mut workflow,
            context(ApplicationKind::NewRegistration, 0, 1),
            Role::PropertyOwner,
            WorkflowAction::ForwardToDtdo,
            &TransitionPayload::default(),
        )
        .expect_err("owner cannot forward");
        assert!(matches!(
            err,
            WorkflowError::Forbidden {
                role: Role::PropertyOwner,
                ..
            }
        ));
    }

    #[test]
    fn revert_requires_remark_and_records_it() {
        let mut workflow = WorkflowState::new(at(0));
        workflow.status = ApplicationStatus::Submitted;

        let err = apply(
            &mut workflow,
            context(ApplicationKind::NewRegistration, 0, 1),
            Role::DealingAssistant,
            WorkflowAction::Revert,
            &TransitionPayload::with_remark("   "),
        )
        .expect_err("blank remark rejected");
        match err {
            WorkflowError::PreconditionNotMet { missing } => assert_eq!(missing, vec!["remark"]),
            other => panic!("expected missing remark, got {other:?}"),
        }

        let applied = apply(
            &mut workflow,
            context(ApplicationKind::NewRegistration, 0, 2),
            Role::DealingAssistant,
            WorkflowAction::Revert,
            &TransitionPayload::with_remark("Upload clearer photos"),
        )
        .expect("revert");
        assert_eq!(applied.to, ApplicationStatus::SentBackForCorrections);
        let revert = workflow.latest_revert.as_ref().expect("revert recorded");
        assert_eq!(revert.remark, "Upload clearer photos");
        assert_eq!(revert.by, Role::DealingAssistant);
        assert_eq!(revert.at, at(2));
    }

    #[test]
    fn resubmission_increments_counter_and_stamps_correction() {
        let mut workflow = WorkflowState::new(at(0));
        workflow.status = ApplicationStatus::RevertedByDtdo;

        apply(
            &mut workflow,
            context(ApplicationKind::NewRegistration, 0, 5),
            Role::PropertyOwner,
            WorkflowAction::ResubmitToDtdo,
            &TransitionPayload {
                correction_note: Some("Fire NOC attached".to_string()),
                ..TransitionPayload::default()
            },
        )
        .expect("resubmit to dtdo");

        assert_eq!(workflow.status, ApplicationStatus::ForwardedToDtdo);
        assert_eq!(workflow.correction_submission_count, 1);
        assert_eq!(
            workflow.latest_correction,
            Some(CorrectionNote {
                at: at(5),
                note: "Fire NOC attached".to_string()
            })
        );
        assert_eq!(workflow.version, 1);
    }

    #[test]
    fn inspection_dates_only_move_forward() {
        let mut workflow = WorkflowState::new(at(0));
        workflow.status = ApplicationStatus::ForwardedToDtdo;
        workflow.inspection_scheduled_for = NaiveDate::from_ymd_opt(2025, 5, 10);

        let payload = TransitionPayload {
            inspection_date: NaiveDate::from_ymd_opt(2025, 5, 1),
            ..TransitionPayload::default()
        };
        assert!(matches!(
            apply(
                &mut workflow,
                context(ApplicationKind::NewRegistration, 0, 1),
                Role::DistrictOfficer,
                WorkflowAction::ScheduleInspection,
                &payload,
            ),
            Err(WorkflowError::Validation(_))
        ));
    }

    #[test]
    fn report_submission_requires_report() {
        let mut workflow = WorkflowState::new(at(0));
        workflow.status = ApplicationStatus::InspectionScheduled;

        assert!(matches!(
            apply(
                &mut workflow,
                context(ApplicationKind::NewRegistration, 0, 1),
                Role::DealingAssistant,
                WorkflowAction::SubmitReport,
                &TransitionPayload::default(),
            ),
            Err(WorkflowError::PreconditionNotMet { .. })
        ));

        let payload = TransitionPayload {
            report: Some(InspectionReport {
                inspected_on: NaiveDate::from_ymd_opt(2025, 4, 3).expect("valid"),
                findings: "Rooms match declaration".to_string(),
                recommendation: InspectionRecommendation::Approve,
            }),
            ..TransitionPayload::default()
        };
        apply(
            &mut workflow,
            context(ApplicationKind::NewRegistration, 0, 2),
            Role::DealingAssistant,
            WorkflowAction::SubmitReport,
            &payload,
        )
        .expect("report filed");
        assert_eq!(workflow.status, ApplicationStatus::InspectionCompleted);
        assert_eq!(workflow.inspection_completed_at, Some(at(2)));
    }

    #[test]
    fn payment_confirmation_approves() {
        let mut workflow = WorkflowState::new(at(0));
        workflow.status = ApplicationStatus::PaymentPending;

        apply(
            &mut workflow,
            context(ApplicationKind::NewRegistration, 3_150, 9),
            Role::PropertyOwner,
            WorkflowAction::ConfirmPayment,
            &TransitionPayload {
                payment_reference: Some("PAY-991".to_string()),
                ..TransitionPayload::default()
            },
        )
        .expect("payment confirmed");
        assert_eq!(workflow.status, ApplicationStatus::Approved);
        assert_eq!(workflow.approved_at, Some(at(9)));
        assert_eq!(workflow.payment_reference.as_deref(), Some("PAY-991"));
    }

    #[test]
    fn certificate_expiry_adds_validity_years() {
        let certificate = issue_certificate("HS-CERT-2025-000001".to_string(), at(0), 3);
        assert_eq!(certificate.issued_on, NaiveDate::from_ymd_opt(2025, 4, 1).expect("valid"));
        assert_eq!(
            certificate.expires_on,
            NaiveDate::from_ymd_opt(2028, 4, 1).expect("valid")
        );
    }
}
