//! Per-kind validation and application of amendments against an approved registration.

use chrono::{DateTime, Utc};

use super::classifier::ValidationError;
use super::domain::{
    AmendmentPayload, Application, ApplicationStatus, Category, RoomConfiguration, RoomRemoval,
    RoomTypeConfig, ServiceRequest,
};
use super::error::WorkflowError;
use super::fees::{FeeBreakdown, FeeEngine};
use super::policy::WorkflowAction;

/// Outcome of validating an amendment against its parent.
#[derive(Debug, Clone, PartialEq)]
pub struct AmendmentPlan {
    pub resulting_category: Option<Category>,
    pub fee: Option<FeeBreakdown>,
    pub upgrade_fee: u64,
}

impl AmendmentPlan {
    fn unchanged(parent: &Application) -> Self {
        Self {
            resulting_category: parent.category,
            fee: None,
            upgrade_fee: 0,
        }
    }
}

fn non_blank(value: &str) -> bool {
    !value.trim().is_empty()
}

/// Validate `payload` for `parent` and price it.
pub fn plan(
    parent: &Application,
    payload: &AmendmentPayload,
    engine: &FeeEngine,
) -> Result<AmendmentPlan, WorkflowError> {
    if parent.status() != ApplicationStatus::Approved {
        return Err(WorkflowError::InvalidTransition {
            kind: payload.kind(),
            from: parent.status(),
            action: WorkflowAction::RequestAmendment,
        });
    }

    match payload {
        AmendmentPayload::AddRooms { rooms } => {
            if rooms.is_empty() {
                return Err(WorkflowError::missing(["rooms"]));
            }
            let merged = merge_rooms(&parent.rooms, rooms)?;
            let category = engine.limits().validate_rooms(&merged)?;
            priced(parent, category, engine)
        }
        AmendmentPayload::DeleteRooms { rooms } => {
            if rooms.is_empty() {
                return Err(WorkflowError::missing(["rooms"]));
            }
            let remaining = remove_rooms(&parent.rooms, rooms)?;
            let category = engine.limits().validate_rooms(&remaining)?;
            Ok(AmendmentPlan {
                resulting_category: Some(category),
                fee: None,
                upgrade_fee: 0,
            })
        }
        AmendmentPayload::ChangeCategory {
            target,
            revised_rooms,
        } => {
            let current = current_category(parent)?;
            if *target <= current {
                return Err(ValidationError::Payload(format!(
                    "category change from {} to {} is not an upgrade",
                    current.label(),
                    target.label()
                ))
                .into());
            }
            let derived = engine.limits().validate_rooms(revised_rooms)?;
            if derived != *target {
                return Err(ValidationError::CategoryMismatch {
                    declared: *target,
                    derived,
                    rate: revised_rooms.highest_rate().unwrap_or_default(),
                }
                .into());
            }
            priced(parent, derived, engine)
        }
        AmendmentPayload::ChangeOwnership {
            new_owner,
            proof_of_transfer,
        } => {
            let mut missing = Vec::new();
            if !non_blank(proof_of_transfer) {
                missing.push("proof_of_transfer");
            }
            if !non_blank(&new_owner.name) {
                missing.push("new_owner.name");
            }
            if !non_blank(&new_owner.mobile) {
                missing.push("new_owner.mobile");
            }
            if missing.is_empty() {
                Ok(AmendmentPlan::unchanged(parent))
            } else {
                Err(WorkflowError::missing(missing))
            }
        }
        AmendmentPayload::CancelCertificate { reason } => {
            if non_blank(reason) {
                Ok(AmendmentPlan::unchanged(parent))
            } else {
                Err(WorkflowError::missing(["reason"]))
            }
        }
    }
}

fn current_category(parent: &Application) -> Result<Category, WorkflowError> {
    parent.category.ok_or_else(|| WorkflowError::CorruptedRecord {
        record: parent.id.0.clone(),
        reason: "approved application has no category".to_string(),
    })
}

fn priced(
    parent: &Application,
    category: Category,
    engine: &FeeEngine,
) -> Result<AmendmentPlan, WorkflowError> {
    let current = current_category(parent)?;
    if category <= current {
        return Ok(AmendmentPlan {
            resulting_category: Some(category),
            fee: None,
            upgrade_fee: 0,
        });
    }

    let quote = engine.quote_upgrade(
        current,
        category,
        parent.property.location_type,
        parent.validity_years,
        &parent.owner.fee_attributes(),
    )?;
    Ok(AmendmentPlan {
        resulting_category: Some(category),
        upgrade_fee: quote.upgrade_fee,
        fee: Some(quote.next),
    })
}

/// Add rows to a configuration, folding rows that share type, beds and tariff.
pub fn merge_rooms(
    existing: &[RoomTypeConfig],
    additions: &[RoomTypeConfig],
) -> Result<Vec<RoomTypeConfig>, ValidationError> {
    let mut merged = existing.to_vec();
    for (index, addition) in additions.iter().enumerate() {
        if addition.count == 0 {
            return Err(ValidationError::EmptyRoomEntry { index });
        }
        let same_row = merged.iter_mut().find(|room| {
            room.room_type == addition.room_type
                && room.beds_per_room == addition.beds_per_room
                && room.nightly_rate == addition.nightly_rate
        });
        match same_row {
            Some(room) => {
                room.count = room.count.checked_add(addition.count).ok_or_else(|| {
                    ValidationError::Payload(format!(
                        "room count overflow for {:?} rooms",
                        addition.room_type
                    ))
                })?;
            }
            None => merged.push(addition.clone()),
        }
    }
    Ok(merged)
}

/// Remove counts per room type, draining the most recently added rows first.
pub fn remove_rooms(
    existing: &[RoomTypeConfig],
    removals: &[RoomRemoval],
) -> Result<Vec<RoomTypeConfig>, ValidationError> {
    let mut remaining = existing.to_vec();
    for (index, removal) in removals.iter().enumerate() {
        if removal.count == 0 {
            return Err(ValidationError::EmptyRoomEntry { index });
        }
        let available: u32 = remaining
            .iter()
            .filter(|room| room.room_type == removal.room_type)
            .map(|room| room.count as u32)
            .sum();
        if removal.count as u32 > available {
            return Err(ValidationError::Payload(format!(
                "cannot remove {} {:?} rooms; only {available} configured",
                removal.count, removal.room_type
            )));
        }

        let mut outstanding = removal.count;
        for room in remaining
            .iter_mut()
            .rev()
            .filter(|room| room.room_type == removal.room_type)
        {
            let taken = outstanding.min(room.count);
            room.count -= taken;
            outstanding -= taken;
            if outstanding == 0 {
                break;
            }
        }
        remaining.retain(|room| room.count > 0);
    }

    if remaining.total_rooms() == 0 {
        return Err(ValidationError::Payload(
            "at least one room must remain registered".to_string(),
        ));
    }
    Ok(remaining)
}

/// Rewrite the parent once its amendment is approved. Certificate details are never touched.
pub fn apply_to_parent(
    parent: &mut Application,
    request: &ServiceRequest,
    now: DateTime<Utc>,
) -> Result<(), WorkflowError> {
    match &request.payload {
        AmendmentPayload::AddRooms { rooms } => {
            parent.rooms = merge_rooms(&parent.rooms, rooms)?;
            parent.category = request.resulting_category.or(parent.category);
        }
        AmendmentPayload::DeleteRooms { rooms } => {
            parent.rooms = remove_rooms(&parent.rooms, rooms)?;
            parent.category = request.resulting_category.or(parent.category);
        }
        AmendmentPayload::ChangeCategory {
            target,
            revised_rooms,
        } => {
            parent.rooms = revised_rooms.clone();
            parent.category = Some(*target);
        }
        AmendmentPayload::ChangeOwnership { new_owner, .. } => {
            parent.owner = new_owner.clone();
        }
        AmendmentPayload::CancelCertificate { .. } => {
            parent.workflow.status = ApplicationStatus::Cancelled;
        }
    }

    parent.workflow.updated_at = now;
    parent.workflow.version += 1;
    Ok(())
}
