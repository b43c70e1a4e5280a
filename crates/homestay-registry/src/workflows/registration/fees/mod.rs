//! Deterministic fee quotes derived from room tariff, location, validity and owner attributes.

mod calculator;
mod config;
mod schedule;

pub use config::FeePolicy;
pub use schedule::{FeeSchedule, FeeScheduleError};

use serde::{Deserialize, Serialize};

use super::classifier::{validate_validity_years, CategoryLimits, ValidationError};
use super::domain::{Category, LocationType, OwnerAttributes, RoomTypeConfig};
use calculator::{compute_amounts, savings_percentage, to_rupees};

/// Inputs for a fee quote computed from a room configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeQuoteRequest {
    pub rooms: Vec<RoomTypeConfig>,
    pub location_type: LocationType,
    pub validity_years: u8,
    pub owner: OwnerAttributes,
}

/// Computed fee, never persisted as the source of truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeBreakdown {
    pub category: Category,
    pub location_type: LocationType,
    pub validity_years: u8,
    pub base_fee: u64,
    pub total_before_discount: u64,
    pub validity_discount: u64,
    pub female_owner_discount: u64,
    pub sub_division_discount: u64,
    pub total_fee: u64,
    pub savings_amount: u64,
    pub savings_percentage: f64,
}

/// Fee delta charged when an approved homestay moves to a higher category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpgradeQuote {
    pub previous: FeeBreakdown,
    pub next: FeeBreakdown,
    pub upgrade_fee: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeeError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("category change from {from:?} to {to:?} is not an upgrade")]
    NotAnUpgrade { from: Category, to: Category },
}

/// Stateless fee calculator backed by a schedule and discount policy.
#[derive(Debug, Clone, Default)]
pub struct FeeEngine {
    schedule: FeeSchedule,
    policy: FeePolicy,
    limits: CategoryLimits,
}

impl FeeEngine {
    pub fn new(schedule: FeeSchedule, policy: FeePolicy, limits: CategoryLimits) -> Self {
        Self {
            schedule,
            policy,
            limits,
        }
    }

    pub fn policy(&self) -> &FeePolicy {
        &self.policy
    }

    pub fn limits(&self) -> &CategoryLimits {
        &self.limits
    }

    /// Quote from a room configuration; the category is classified from the tariff.
    pub fn quote(&self, request: &FeeQuoteRequest) -> Result<FeeBreakdown, FeeError> {
        let category = self.limits.validate_rooms(&request.rooms)?;
        self.quote_for_category(
            category,
            request.location_type,
            request.validity_years,
            &request.owner,
        )
    }

    pub fn quote_for_category(
        &self,
        category: Category,
        location_type: LocationType,
        validity_years: u8,
        owner: &OwnerAttributes,
    ) -> Result<FeeBreakdown, FeeError> {
        let validity_years = validate_validity_years(validity_years)?;
        let base_fee = self.schedule.annual_fee(category, location_type);
        let amounts = compute_amounts(base_fee, validity_years, owner, &self.policy);

        let total_before_discount = to_rupees(amounts.total_before_discount);
        let total_fee = to_rupees(amounts.total_fee);
        let savings_amount = total_before_discount - total_fee;

        Ok(FeeBreakdown {
            category,
            location_type,
            validity_years,
            base_fee,
            total_before_discount,
            validity_discount: to_rupees(amounts.validity_discount),
            female_owner_discount: to_rupees(amounts.female_owner_discount),
            sub_division_discount: to_rupees(amounts.sub_division_discount),
            total_fee,
            savings_amount,
            savings_percentage: savings_percentage(savings_amount, total_before_discount),
        })
    }

    /// Delta between two category fees with identical validity and owner inputs.
    pub fn quote_upgrade(
        &self,
        previous: Category,
        next: Category,
        location_type: LocationType,
        validity_years: u8,
        owner: &OwnerAttributes,
    ) -> Result<UpgradeQuote, FeeError> {
        if next <= previous {
            return Err(FeeError::NotAnUpgrade {
                from: previous,
                to: next,
            });
        }

        let previous = self.quote_for_category(previous, location_type, validity_years, owner)?;
        let next = self.quote_for_category(next, location_type, validity_years, owner)?;
        let upgrade_fee = next
            .total_fee
            .checked_sub(previous.total_fee)
            .ok_or(FeeError::NotAnUpgrade {
                from: previous.category,
                to: next.category,
            })?;

        Ok(UpgradeQuote {
            previous,
            next,
            upgrade_fee,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::registration::domain::{Gender, RoomType};

    fn owner(gender: Gender, sub_division: Option<&str>) -> OwnerAttributes {
        OwnerAttributes {
            gender,
            sub_division: sub_division.map(str::to_string),
        }
    }

    fn request(rate: u32, validity_years: u8, owner: OwnerAttributes) -> FeeQuoteRequest {
        FeeQuoteRequest {
            rooms: vec![RoomTypeConfig {
                room_type: RoomType::Double,
                count: 3,
                beds_per_room: 2,
                nightly_rate: rate,
            }],
            location_type: LocationType::GramPanchayat,
            validity_years,
            owner,
        }
    }

    #[test]
    fn full_discount_stack_matches_worked_example() {
        let engine = FeeEngine::default();
        let quote = engine
            .quote(&request(2_500, 3, owner(Gender::Female, Some("Pangi"))))
            .expect("quote");

        assert_eq!(quote.category, Category::Silver);
        assert_eq!(quote.base_fee, 3_000);
        assert_eq!(quote.total_before_discount, 9_000);
        assert_eq!(quote.validity_discount, 900);
        assert_eq!(quote.female_owner_discount, 450);
        assert_eq!(quote.sub_division_discount, 4_500);
        assert_eq!(quote.total_fee, 3_150);
        assert_eq!(quote.savings_amount, 5_850);
        assert_eq!(quote.savings_percentage, 65.0);
    }

    #[test]
    fn quotes_are_deterministic_and_balanced() {
        let engine = FeeEngine::default();
        for rate in [1_000, 2_999, 3_000, 10_000, 10_001] {
            for validity in [1, 3] {
                for gender in [Gender::Male, Gender::Female, Gender::Other] {
                    for sub_division in [None, Some("Pangi"), Some("Kullu")] {
                        let req = request(rate, validity, owner(gender, sub_division));
                        let first = engine.quote(&req).expect("quote");
                        let second = engine.quote(&req).expect("quote");
                        assert_eq!(first, second);
                        assert_eq!(
                            first.savings_amount + first.total_fee,
                            first.total_before_discount
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn category_follows_highest_rate() {
        let engine = FeeEngine::default();
        let male = || owner(Gender::Male, None);
        assert_eq!(
            engine.quote(&request(10_000, 1, male())).expect("quote").base_fee,
            6_000
        );
        assert_eq!(
            engine.quote(&request(10_001, 1, male())).expect("quote").base_fee,
            10_000
        );
    }

    #[test]
    fn rejects_unsupported_validity() {
        let engine = FeeEngine::default();
        assert_eq!(
            engine.quote(&request(2_000, 2, owner(Gender::Male, None))),
            Err(FeeError::Validation(ValidationError::ValidityYears(2)))
        );
    }

    #[test]
    fn upgrade_charges_only_the_delta() {
        let engine = FeeEngine::default();
        let quote = engine
            .quote_upgrade(
                Category::Silver,
                Category::Gold,
                LocationType::GramPanchayat,
                1,
                &owner(Gender::Female, None),
            )
            .expect("upgrade quote");

        assert_eq!(quote.previous.total_fee, 2_850);
        assert_eq!(quote.next.total_fee, 5_700);
        assert_eq!(quote.upgrade_fee, 2_850);
    }

    #[test]
    fn downgrade_is_not_an_upgrade() {
        let engine = FeeEngine::default();
        assert_eq!(
            engine.quote_upgrade(
                Category::Diamond,
                Category::Gold,
                LocationType::MunicipalCorporation,
                1,
                &owner(Gender::Male, None),
            ),
            Err(FeeError::NotAnUpgrade {
                from: Category::Diamond,
                to: Category::Gold
            })
        );
    }
}
